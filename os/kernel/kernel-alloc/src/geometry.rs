//! # Map Geometry
//!
//! The shape of the buddy tree: how many pages form a frame, how deep the tree
//! is, how large the map must be, and which tree level serves a request of a
//! given number of pages.
//!
//! The kernel uses [`MapGeometry::KERNEL`], derived from the constants in
//! `kernel_info::memory`. Smaller geometries are useful for tests.
//!
//! ## Level Selection
//!
//! With a granularity of `G = 2^g` pages per frame:
//!
//! | Request (pages) | Depth |
//! |-----------------|-------|
//! | `0` | rejected |
//! | `1..=G` | `max_depth` |
//! | `> G` | `max_depth - (count_bits(pages - 1) - g)` |
//!
//! The chosen block is the smallest power-of-two multiple of the frame size
//! that holds the whole request.

use crate::buddy_map::Node;
use crate::{FrameError, PhysicalAddress};
use kernel_info::memory::{GRANULARITY, PAGE_SIZE, PHYSICAL_ADDRESS_SPACE};

/// Number of significant bits in `value`, i.e. the position of the highest
/// set bit plus one. `count_bits(0) == 0`.
///
/// ```rust
/// # use kernel_alloc::geometry::count_bits;
/// assert_eq!(count_bits(0), 0);
/// assert_eq!(count_bits(1), 1);
/// assert_eq!(count_bits(2), 2);
/// assert_eq!(count_bits(3), 2);
/// assert_eq!(count_bits(4), 3);
/// ```
#[inline]
#[must_use]
pub const fn count_bits(value: u32) -> u32 {
    u32::BITS - value.leading_zeros()
}

/// Shape of the buddy tree over a managed physical range starting at 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MapGeometry {
    page_shift: u32,
    granularity_shift: u32,
    max_depth: u32,
}

impl MapGeometry {
    /// The geometry of the kernel's physical map.
    pub const KERNEL: Self = Self::new(PHYSICAL_ADDRESS_SPACE, PAGE_SIZE, GRANULARITY);

    /// Build a geometry for `address_space` bytes of pages of `page_size`
    /// bytes, allocated in frames of `granularity` pages.
    ///
    /// # Panics
    /// If any argument is not a power of two, if the address space is smaller
    /// than one frame, or if the tree would be deeper than 31 levels. In a
    /// `const` context this is a compile-time error.
    #[must_use]
    pub const fn new(address_space: u64, page_size: u64, granularity: u64) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        assert!(granularity.is_power_of_two(), "granularity must be a power of two");
        assert!(
            address_space.is_power_of_two(),
            "address space must be a power of two"
        );
        let frame_size = page_size * granularity;
        assert!(address_space >= frame_size, "address space smaller than a frame");
        let max_depth = (address_space / frame_size).trailing_zeros();
        assert!(max_depth < 32, "buddy tree too deep");
        Self {
            page_shift: page_size.trailing_zeros(),
            granularity_shift: granularity.trailing_zeros(),
            max_depth,
        }
    }

    /// Depth of the single-frame level. The root is depth 0.
    #[inline]
    #[must_use]
    pub const fn max_depth(self) -> u32 {
        self.max_depth
    }

    #[inline]
    #[must_use]
    pub const fn page_size(self) -> u64 {
        1 << self.page_shift
    }

    /// Pages per frame.
    #[inline]
    #[must_use]
    pub const fn granularity(self) -> u64 {
        1 << self.granularity_shift
    }

    /// Bytes per frame.
    #[inline]
    #[must_use]
    pub const fn frame_size(self) -> u64 {
        1 << (self.page_shift + self.granularity_shift)
    }

    #[inline]
    #[must_use]
    pub const fn frame_count(self) -> u64 {
        1 << self.max_depth
    }

    /// Bytes covered by the root node.
    #[inline]
    #[must_use]
    pub const fn managed_bytes(self) -> u64 {
        self.frame_size() << self.max_depth
    }

    #[inline]
    #[must_use]
    pub const fn node_count(self) -> u64 {
        (1 << (self.max_depth + 1)) - 1
    }

    /// Bytes of map storage needed to hold one bit per node.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn map_length(self) -> usize {
        // At most 2^32 bits, so the byte count fits any 32-bit usize.
        self.node_count().div_ceil(8) as usize
    }

    /// Bytes covered by one node at `depth`.
    #[inline]
    #[must_use]
    pub const fn block_size(self, depth: u32) -> u64 {
        self.managed_bytes() >> depth
    }

    /// Pages covered by one node at `depth`.
    #[inline]
    #[must_use]
    pub const fn block_pages(self, depth: u32) -> u64 {
        self.block_size(depth) >> self.page_shift
    }

    /// Whether `addr` lies inside the managed range.
    #[inline]
    #[must_use]
    pub const fn contains(self, addr: PhysicalAddress) -> bool {
        addr.as_u64() < self.managed_bytes()
    }

    /// Tree level whose block size is the smallest one covering `pages`.
    ///
    /// # Errors
    /// - [`FrameError::ZeroSizedRequest`] if `pages` is zero.
    /// - [`FrameError::RequestTooLarge`] if no block, not even the root, is
    ///   large enough.
    ///
    /// ```rust
    /// # use kernel_alloc::MapGeometry;
    /// let g = MapGeometry::KERNEL;
    /// assert_eq!(g.depth_for_request(1), Ok(g.max_depth()));
    /// assert_eq!(g.depth_for_request(2), Ok(g.max_depth()));
    /// assert_eq!(g.depth_for_request(3), Ok(g.max_depth() - 1));
    /// ```
    #[allow(clippy::cast_lossless)]
    pub const fn depth_for_request(self, pages: u32) -> Result<u32, FrameError> {
        if pages == 0 {
            return Err(FrameError::ZeroSizedRequest);
        }
        if pages as u64 <= self.granularity() {
            return Ok(self.max_depth);
        }
        // pages - 1 >= G, so the bit count always exceeds the granularity shift.
        let doublings = count_bits(pages - 1) - self.granularity_shift;
        if doublings > self.max_depth {
            return Err(FrameError::RequestTooLarge { pages });
        }
        Ok(self.max_depth - doublings)
    }

    /// Physical start address of the block represented by `node`.
    #[inline]
    #[must_use]
    pub const fn node_address(self, node: Node) -> PhysicalAddress {
        PhysicalAddress::new(node.offset() * self.block_size(node.depth()))
    }

    /// The node at `depth` whose block contains `addr`.
    ///
    /// `addr` must lie inside the managed range.
    #[inline]
    #[must_use]
    pub const fn node_containing(self, addr: PhysicalAddress, depth: u32) -> Node {
        debug_assert!(self.contains(addr));
        Node::new(depth, addr.as_u64() / self.block_size(depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::{FRAME_SIZE, MAP_LENGTH, MAX_DEEP};

    const SMALL: MapGeometry = MapGeometry::new(64 * 1024, 4096, 2);

    #[test]
    fn kernel_geometry_matches_configuration() {
        let g = MapGeometry::KERNEL;
        assert_eq!(g.max_depth(), MAX_DEEP);
        assert_eq!(g.map_length(), MAP_LENGTH);
        assert_eq!(g.frame_size(), FRAME_SIZE);
        assert_eq!(g.managed_bytes(), PHYSICAL_ADDRESS_SPACE);
        assert_eq!(g.block_size(MAX_DEEP), FRAME_SIZE);
    }

    #[test]
    fn small_geometry_shape() {
        assert_eq!(SMALL.frame_count(), 8);
        assert_eq!(SMALL.max_depth(), 3);
        assert_eq!(SMALL.node_count(), 15);
        assert_eq!(SMALL.map_length(), 2);
        assert_eq!(SMALL.block_pages(0), 16);
        assert_eq!(SMALL.block_pages(3), 2);
    }

    #[test]
    fn level_selection_follows_bit_count() {
        let g = MapGeometry::KERNEL;
        let max = g.max_depth();
        assert_eq!(g.depth_for_request(1), Ok(max));
        assert_eq!(g.depth_for_request(2), Ok(max));
        assert_eq!(g.depth_for_request(3), Ok(max - 1));
        assert_eq!(g.depth_for_request(4), Ok(max - 1));
        assert_eq!(g.depth_for_request(5), Ok(max - 2));
        assert_eq!(g.depth_for_request(8), Ok(max - 2));
        assert_eq!(g.depth_for_request(9), Ok(max - 3));
        assert_eq!(g.depth_for_request(1 << 20), Ok(0));
    }

    #[test]
    fn selected_block_is_smallest_covering_power_of_two() {
        let g = SMALL;
        for pages in 1..=16u32 {
            let depth = g.depth_for_request(pages).unwrap();
            let block = g.block_pages(depth);
            assert!(block >= u64::from(pages), "{pages} pages in {block}");
            if depth < g.max_depth() {
                assert!(g.block_pages(depth + 1) < u64::from(pages));
            }
        }
    }

    #[test]
    fn rejects_zero_and_oversized_requests() {
        assert_eq!(SMALL.depth_for_request(0), Err(FrameError::ZeroSizedRequest));
        assert_eq!(
            SMALL.depth_for_request(17),
            Err(FrameError::RequestTooLarge { pages: 17 })
        );
        assert_eq!(
            MapGeometry::KERNEL.depth_for_request(u32::MAX),
            Err(FrameError::RequestTooLarge { pages: u32::MAX })
        );
    }

    #[test]
    fn node_addresses_round_trip() {
        let g = SMALL;
        let node = g.node_containing(PhysicalAddress::new(0x9000), 2);
        assert_eq!(node, Node::new(2, 2));
        assert_eq!(g.node_address(node), PhysicalAddress::new(0x8000));
    }
}
