//! # Buddy Frame Allocator
//!
//! Allocates naturally aligned, power-of-two sized runs of frames from the
//! buddy tree in [`BuddyMap`].
//!
//! - **Allocation** searches first-fit from the root, always trying the left
//!   child first, down to the level selected by
//!   [`MapGeometry::depth_for_request`]. The found node is marked in the same
//!   walk, together with all of its ancestors.
//! - **Reservation** marks a caller-chosen, block-aligned area, e.g. fixed boot
//!   regions.
//! - **Release** locates the allocated block starting at an address from the
//!   used-bit pattern alone (no size is passed), clears it, and merges upward
//!   while both buddies are free.
//!
//! Every operation validates its input before touching the map, so a failed
//! call leaves the map unchanged.
//!
//! ```rust
//! use kernel_alloc::{BuddyFrameAllocator, MapGeometry};
//!
//! let geometry = MapGeometry::new(64 * 1024, 4096, 2);
//! let mut frames = BuddyFrameAllocator::new([0u8; 2], geometry).unwrap();
//!
//! let a = frames.allocate(3).unwrap(); // 4 pages
//! let b = frames.allocate(1).unwrap(); // 2 pages
//! assert_eq!(a.as_u64(), 0x0000);
//! assert_eq!(b.as_u64(), 0x4000);
//!
//! frames.free(a).unwrap();
//! frames.free(b).unwrap();
//! assert!(frames.map().as_bytes().iter().all(|&b| b == 0));
//! ```

use crate::buddy_map::{BuddyMap, Node};
use crate::{FrameError, MapGeometry, PhysicalAddress};
use log::{debug, trace, warn};

/// Binary buddy allocator over a bit-encoded tree.
///
/// The allocator owns its map storage `S`. In the kernel that is the fixed
/// physical region bound at boot; tests use plain arrays or vectors.
pub struct BuddyFrameAllocator<S> {
    map: BuddyMap<S>,
    geometry: MapGeometry,
}

impl<S> BuddyFrameAllocator<S>
where
    S: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Bind the allocator to `storage` and mark every frame free.
    ///
    /// # Errors
    /// [`FrameError::MapTooSmall`] if `storage` cannot hold
    /// [`MapGeometry::map_length`] bytes.
    pub fn new(storage: S, geometry: MapGeometry) -> Result<Self, FrameError> {
        let mut map = BuddyMap::new(storage, geometry)?;
        map.clear();
        debug!(
            "Frame map initialized: {} frames of {:#x} bytes, depth {}, {} map bytes",
            geometry.frame_count(),
            geometry.frame_size(),
            geometry.max_depth(),
            geometry.map_length()
        );
        Ok(Self { map, geometry })
    }

    #[inline]
    #[must_use]
    pub const fn geometry(&self) -> MapGeometry {
        self.geometry
    }

    /// Read-only view of the map.
    #[inline]
    #[must_use]
    pub const fn map(&self) -> &BuddyMap<S> {
        &self.map
    }

    /// Allocate a block of at least `pages` pages and return its base.
    ///
    /// # Errors
    /// - [`FrameError::ZeroSizedRequest`] / [`FrameError::RequestTooLarge`]
    ///   for requests no block can serve.
    /// - [`FrameError::OutOfMemory`] if no free block exists at the required
    ///   level.
    pub fn allocate(&mut self, pages: u32) -> Result<PhysicalAddress, FrameError> {
        let depth = self.geometry.depth_for_request(pages)?;

        let root = Node::root();
        if self.map.is_block(root) {
            return Err(FrameError::OutOfMemory { pages });
        }

        let node = self
            .find_free(root, depth)
            .ok_or(FrameError::OutOfMemory { pages })?;
        self.claim(node);

        let addr = self.geometry.node_address(node);
        trace!(
            "Allocated {pages} pages at {addr} ({:#x} bytes)",
            self.geometry.block_size(depth)
        );
        Ok(addr)
    }

    /// Mark the block of `pages` pages at `addr` as used.
    ///
    /// Reserving the same block twice is a no-op; a single
    /// [`free`](Self::free) releases it.
    ///
    /// # Errors
    /// - [`FrameError::ZeroSizedRequest`] / [`FrameError::RequestTooLarge`]
    ///   for requests no block can serve.
    /// - [`FrameError::OutOfRange`] if `addr` lies outside the managed range.
    /// - [`FrameError::Misaligned`] if `addr` is not aligned to the block size
    ///   selected for `pages`.
    /// - [`FrameError::AreaInUse`] if the block lies inside a larger allocated
    ///   block or already contains smaller allocations.
    pub fn reserve(&mut self, addr: PhysicalAddress, pages: u32) -> Result<(), FrameError> {
        let depth = self.geometry.depth_for_request(pages)?;
        if !self.geometry.contains(addr) {
            return Err(FrameError::OutOfRange(addr));
        }
        let align = self.geometry.block_size(depth);
        if !addr.is_aligned(align) {
            return Err(FrameError::Misaligned { addr, align });
        }

        let target = self.geometry.node_containing(addr, depth);
        let mut node = Node::root();
        while node.depth() < depth {
            if self.map.is_block(node) {
                return Err(FrameError::AreaInUse(addr));
            }
            node = node.child_towards(target);
        }

        if self.map.is_block(target) {
            trace!("Area at {addr} ({pages} pages) already reserved");
            return Ok(());
        }
        if self.map.is_used(target) {
            return Err(FrameError::AreaInUse(addr));
        }

        self.claim(target);
        trace!("Reserved {pages} pages at {addr}");
        Ok(())
    }

    /// Reserve every frame touching `[start, end)`, whatever its alignment.
    ///
    /// The range is widened to frame boundaries, clipped to the managed
    /// range, and split into the largest aligned blocks that fit. Blocks that
    /// are already allocated are left as they are. Reserved pieces are meant
    /// to stay reserved; they are not individually addressable by a single
    /// [`free`](Self::free) of `start`.
    ///
    /// An empty or inverted range (`start >= end`) touches no frame and
    /// leaves the map as it is.
    ///
    /// # Errors
    /// [`FrameError::OutOfRange`] if no part of a non-empty range lies inside
    /// the managed range.
    pub fn reserve_range(
        &mut self,
        start: PhysicalAddress,
        end: PhysicalAddress,
    ) -> Result<(), FrameError> {
        if start >= end {
            trace!("Empty range {start}..{end}, nothing to reserve");
            return Ok(());
        }
        let frame = self.geometry.frame_size();
        let limit = self.geometry.managed_bytes();
        let first = start.align_down(frame).as_u64();
        let last = end.align_up(frame).as_u64().min(limit);
        if first >= last {
            return Err(FrameError::OutOfRange(start));
        }

        debug!(
            "Reserving physical range {}..{}",
            PhysicalAddress::new(first),
            PhysicalAddress::new(last)
        );
        self.reserve_span(Node::root(), first, last);
        Ok(())
    }

    /// Release the allocated block starting at `addr`.
    ///
    /// # Errors
    /// - [`FrameError::OutOfRange`] if `addr` lies outside the managed range.
    /// - [`FrameError::Misaligned`] if `addr` is not frame aligned.
    /// - [`FrameError::InvalidFree`] if no allocated block starts at `addr`
    ///   (double free, or an address inside a block).
    pub fn free(&mut self, addr: PhysicalAddress) -> Result<(), FrameError> {
        let node = self.locate_block(addr)?;
        self.release(node);
        trace!(
            "Freed {:#x} bytes at {addr}",
            self.geometry.block_size(node.depth())
        );
        Ok(())
    }

    /// Size in bytes of the allocated block starting at `addr`.
    ///
    /// # Errors
    /// Same as [`free`](Self::free), without modifying the map.
    pub fn allocation_size(&self, addr: PhysicalAddress) -> Result<u64, FrameError> {
        let node = self.locate_block(addr)?;
        Ok(self.geometry.block_size(node.depth()))
    }

    /// First free node at `depth` below `node`, left to right.
    fn find_free(&self, node: Node, depth: u32) -> Option<Node> {
        if self.map.is_free(node) {
            return Some(node.leftmost_at(depth));
        }
        if node.depth() == depth || self.map.is_block(node) {
            return None;
        }
        self.find_free(node.left(), depth)
            .or_else(|| self.find_free(node.right(), depth))
    }

    /// Mark a free node used and propagate the flag to its ancestors.
    fn claim(&mut self, node: Node) {
        debug_assert!(self.map.is_free(node));
        self.map.mark_used(node);
        let mut current = node.parent();
        while let Some(parent) = current {
            if self.map.is_used(parent) {
                // Ancestors of a used node are used already.
                break;
            }
            self.map.mark_used(parent);
            current = parent.parent();
        }
    }

    /// Clear an allocated block and merge free buddies upward.
    fn release(&mut self, node: Node) {
        self.map.mark_free(node);
        let mut current = node;
        while let (Some(parent), Some(buddy)) = (current.parent(), current.buddy()) {
            if self.map.is_used(buddy) {
                break;
            }
            self.map.mark_free(parent);
            current = parent;
        }
    }

    /// Find the allocated block that starts exactly at `addr`.
    fn locate_block(&self, addr: PhysicalAddress) -> Result<Node, FrameError> {
        if !self.geometry.contains(addr) {
            return Err(FrameError::OutOfRange(addr));
        }
        let frame = self.geometry.frame_size();
        if !addr.is_aligned(frame) {
            return Err(FrameError::Misaligned { addr, align: frame });
        }

        let leaf = self.geometry.node_containing(addr, self.geometry.max_depth());
        let mut node = Node::root();
        loop {
            if self.map.is_free(node) {
                warn!("Invalid free of {addr}: no allocation covers it");
                return Err(FrameError::InvalidFree(addr));
            }
            if self.map.is_block(node) {
                if self.geometry.node_address(node) == addr {
                    return Ok(node);
                }
                warn!(
                    "Invalid free of {addr}: inside the block at {}",
                    self.geometry.node_address(node)
                );
                return Err(FrameError::InvalidFree(addr));
            }
            node = node.child_towards(leaf);
        }
    }

    /// Mark every free block fully inside `[first, last)` below `node`.
    fn reserve_span(&mut self, node: Node, first: u64, last: u64) {
        let start = self.geometry.node_address(node).as_u64();
        let end = start + self.geometry.block_size(node.depth());
        if end <= first || start >= last || self.map.is_block(node) {
            return;
        }
        if first <= start && end <= last && self.map.is_free(node) {
            self.claim(node);
            return;
        }
        // Partial overlap, or a split node fully inside the span. Frames are
        // the unit of the span, so single-frame nodes never get here.
        debug_assert!(node.depth() < self.geometry.max_depth());
        self.reserve_span(node.left(), first, last);
        self.reserve_span(node.right(), first, last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 64 KiB of 4 KiB pages in frames of two pages: eight frames, depth 3.
    const SMALL: MapGeometry = MapGeometry::new(64 * 1024, 4096, 2);

    fn small() -> BuddyFrameAllocator<[u8; 2]> {
        BuddyFrameAllocator::new([0xff; 2], SMALL).unwrap()
    }

    fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    #[test]
    fn new_clears_the_map() {
        let frames = small();
        assert_eq!(frames.map().as_bytes(), &[0, 0]);
    }

    #[test]
    fn first_allocation_splits_down_the_left_edge() {
        let mut frames = small();
        assert_eq!(frames.allocate(1), Ok(pa(0)));

        let map = frames.map();
        for node in [Node::root(), Node::new(1, 0), Node::new(2, 0), Node::new(3, 0)] {
            assert!(map.is_used(node), "{node:?}");
        }
        assert!(map.is_free(Node::new(3, 1)));
        assert!(map.is_free(Node::new(1, 1)));
    }

    #[test]
    fn search_prefers_left_and_skips_used_blocks() {
        let mut frames = small();
        assert_eq!(frames.allocate(2), Ok(pa(0x0000)));
        assert_eq!(frames.allocate(4), Ok(pa(0x4000)));
        assert_eq!(frames.allocate(2), Ok(pa(0x2000)));
        assert_eq!(frames.allocate(8), Ok(pa(0x8000)));
        assert_eq!(
            frames.allocate(1),
            Err(FrameError::OutOfMemory { pages: 1 })
        );
    }

    #[test]
    fn fragmentation_blocks_large_requests() {
        let mut frames = small();
        let a = frames.allocate(1).unwrap();
        let _b = frames.allocate(1).unwrap();
        let c = frames.allocate(1).unwrap();
        frames.free(a).unwrap();
        // 0x0000 is free again, 0x2000 and 0x4000 are taken: no free 8-page block
        // in the lower half, but the upper half is untouched.
        assert_eq!(frames.allocate(8), Ok(pa(0x8000)));
        assert_eq!(frames.allocate(8), Err(FrameError::OutOfMemory { pages: 8 }));
        assert_eq!(frames.allocate(1), Ok(pa(0x0000)));
        frames.free(c).unwrap();
    }

    #[test]
    fn whole_range_request_takes_the_root() {
        let mut frames = small();
        assert_eq!(frames.allocate(16), Ok(pa(0)));
        assert!(frames.map().is_block(Node::root()));
        assert_eq!(frames.allocate(1), Err(FrameError::OutOfMemory { pages: 1 }));
        frames.free(pa(0)).unwrap();
        assert_eq!(frames.map().as_bytes(), &[0, 0]);
    }

    #[test]
    fn free_merges_buddies_only_when_both_are_free() {
        let mut frames = small();
        let a = frames.allocate(1).unwrap();
        let b = frames.allocate(1).unwrap();

        frames.free(a).unwrap();
        let map = frames.map();
        assert!(map.is_free(Node::new(3, 0)));
        assert!(map.is_used(Node::new(2, 0)), "buddy still allocated");

        frames.free(b).unwrap();
        assert_eq!(frames.map().as_bytes(), &[0, 0]);
    }

    #[test]
    fn free_infers_block_size_from_the_map() {
        let mut frames = small();
        let a = frames.allocate(4).unwrap();
        let b = frames.allocate(1).unwrap();
        assert_eq!(frames.allocation_size(a), Ok(0x4000));
        assert_eq!(frames.allocation_size(b), Ok(0x2000));
    }

    #[test]
    fn double_free_is_rejected_without_changes() {
        let mut frames = small();
        let a = frames.allocate(1).unwrap();
        let _b = frames.allocate(1).unwrap();
        frames.free(a).unwrap();
        let before = frames.map().as_bytes().to_vec();
        assert_eq!(frames.free(a), Err(FrameError::InvalidFree(a)));
        assert_eq!(frames.map().as_bytes(), before.as_slice());
    }

    #[test]
    fn free_inside_a_block_is_rejected() {
        let mut frames = small();
        let a = frames.allocate(4).unwrap();
        let before = frames.map().as_bytes().to_vec();
        assert_eq!(
            frames.free(a + 0x2000),
            Err(FrameError::InvalidFree(a + 0x2000))
        );
        assert_eq!(frames.map().as_bytes(), before.as_slice());
    }

    #[test]
    fn free_validates_the_address() {
        let mut frames = small();
        assert_eq!(
            frames.free(pa(0x1_0000)),
            Err(FrameError::OutOfRange(pa(0x1_0000)))
        );
        assert_eq!(
            frames.free(pa(0x1000)),
            Err(FrameError::Misaligned {
                addr: pa(0x1000),
                align: 0x2000
            })
        );
        assert_eq!(frames.free(pa(0)), Err(FrameError::InvalidFree(pa(0))));
    }

    #[test]
    fn reserve_is_idempotent() {
        let mut frames = small();
        frames.reserve(pa(0x8000), 3).unwrap();
        let once = frames.map().as_bytes().to_vec();
        frames.reserve(pa(0x8000), 3).unwrap();
        assert_eq!(frames.map().as_bytes(), once.as_slice());

        frames.free(pa(0x8000)).unwrap();
        assert_eq!(frames.map().as_bytes(), &[0, 0]);
    }

    #[test]
    fn reserved_blocks_are_skipped_by_allocation() {
        let mut frames = small();
        frames.reserve(pa(0x0000), 2).unwrap();
        frames.reserve(pa(0x4000), 4).unwrap();
        assert_eq!(frames.allocate(2), Ok(pa(0x2000)));
        assert_eq!(frames.allocate(4), Ok(pa(0x8000)));
    }

    #[test]
    fn reserve_rejects_invalid_input_without_changes() {
        let mut frames = small();
        let _ = frames.allocate(1).unwrap();
        let before = frames.map().as_bytes().to_vec();

        assert_eq!(frames.reserve(pa(0x4000), 0), Err(FrameError::ZeroSizedRequest));
        assert_eq!(
            frames.reserve(pa(0x2000), 4),
            Err(FrameError::Misaligned {
                addr: pa(0x2000),
                align: 0x4000
            })
        );
        assert_eq!(
            frames.reserve(pa(0x2_0000), 1),
            Err(FrameError::OutOfRange(pa(0x2_0000)))
        );
        assert_eq!(
            frames.reserve(pa(0), 32),
            Err(FrameError::RequestTooLarge { pages: 32 })
        );
        assert_eq!(frames.map().as_bytes(), before.as_slice());
    }

    #[test]
    fn reserve_rejects_overlap_with_allocations() {
        let mut frames = small();
        let a = frames.allocate(4).unwrap();
        let before = frames.map().as_bytes().to_vec();

        // Inside an allocated block.
        assert_eq!(
            frames.reserve(a + 0x2000, 1),
            Err(FrameError::AreaInUse(a + 0x2000))
        );
        // Covering an allocated block.
        assert_eq!(frames.reserve(pa(0), 8), Err(FrameError::AreaInUse(pa(0))));
        assert_eq!(frames.map().as_bytes(), before.as_slice());
    }

    #[test]
    fn reserve_range_covers_unaligned_regions() {
        let mut frames = small();
        // 0x1000..0x7000 widens to frames 0..4 (0x0000..0x8000).
        frames.reserve_range(pa(0x1000), pa(0x7000)).unwrap();
        assert!(frames.map().is_block(Node::new(1, 0)));
        assert_eq!(frames.allocate(1), Ok(pa(0x8000)));
        assert_eq!(frames.map().first_violation(), None);
    }

    #[test]
    fn reserve_range_keeps_existing_allocations() {
        let mut frames = small();
        let a = frames.allocate(1).unwrap();
        frames.reserve_range(pa(0), pa(0x6000)).unwrap();

        let map = frames.map();
        assert!(map.is_block(Node::new(3, 0)));
        assert!(map.is_block(Node::new(3, 1)));
        assert!(map.is_block(Node::new(3, 2)));
        assert!(map.is_free(Node::new(3, 3)));
        assert_eq!(map.first_violation(), None);

        // The earlier allocation is still individually releasable.
        frames.free(a).unwrap();
        assert_eq!(frames.allocate(1), Ok(pa(0)));
    }

    #[test]
    fn empty_or_inverted_range_reserves_nothing() {
        let mut frames = small();
        assert_eq!(frames.reserve_range(pa(0x1000), pa(0x1000)), Ok(()));
        assert_eq!(frames.reserve_range(pa(0x6800), pa(0x6100)), Ok(()));
        assert_eq!(frames.reserve_range(pa(0x2_0000), pa(0x2_0000)), Ok(()));
        assert_eq!(frames.map().as_bytes(), &[0, 0]);
        assert_eq!(frames.allocation_size(pa(0)), Err(FrameError::InvalidFree(pa(0))));
        assert_eq!(
            frames.allocation_size(pa(0x6000)),
            Err(FrameError::InvalidFree(pa(0x6000)))
        );

        // A single byte still touches its frame.
        frames.reserve_range(pa(0x6800), pa(0x6801)).unwrap();
        assert_eq!(frames.allocation_size(pa(0x6000)), Ok(0x2000));
    }

    #[test]
    fn reserve_range_is_clipped_to_the_managed_range() {
        let mut frames = small();
        frames.reserve_range(pa(0xC000), pa(0x10_0000)).unwrap();
        assert!(frames.map().is_block(Node::new(2, 3)));
        assert_eq!(
            frames.reserve_range(pa(0x10_0000), pa(0x20_0000)),
            Err(FrameError::OutOfRange(pa(0x10_0000)))
        );
    }

    #[test]
    fn map_stays_consistent_through_mixed_operations() {
        let mut frames = small();
        let mut live = Vec::new();
        for pages in [1, 3, 1, 2, 1] {
            live.push(frames.allocate(pages).unwrap());
            assert_eq!(frames.map().first_violation(), None);
        }
        for addr in live.drain(..).rev() {
            frames.free(addr).unwrap();
            assert_eq!(frames.map().first_violation(), None);
        }
        assert_eq!(frames.map().as_bytes(), &[0, 0]);
    }
}
