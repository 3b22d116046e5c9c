//! # Bit-Encoded Buddy Tree
//!
//! The frame map stores a complete binary tree as a flat bit array, one bit per
//! node, in heap order: the root is bit 0 and node `i` has children `2i + 1`
//! and `2i + 2`. A node at `(depth, offset)` therefore lives at bit
//! `2^depth - 1 + offset`.
//!
//! ```text
//! depth 0            [0]
//! depth 1        [1]     [2]
//! depth 2      [3] [4] [5] [6]
//! ```
//!
//! ## Bit Semantics
//!
//! - `0`: the whole subtree is free.
//! - `1`: at least one frame below (or at) the node is allocated.
//!
//! A used node is either an **allocated block** (both children free, or a
//! single-frame node) or a **split node** (at least one used child). The bit
//! alone cannot tell "fully used" from "partially used", so merging on free
//! must look at both children instead of trusting the parent.
//!
//! Byte and bit arithmetic is confined to [`Node::bit_index`] and the private
//! locator in [`BuddyMap`]; callers address the tree by [`Node`] only.

use crate::{FrameError, MapGeometry};

/// A node of the buddy tree, identified by its depth and its index within
/// that depth (counted from the left).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node {
    depth: u32,
    offset: u64,
}

impl Node {
    #[inline]
    #[must_use]
    pub const fn new(depth: u32, offset: u64) -> Self {
        debug_assert!(offset < (1 << depth));
        Self { depth, offset }
    }

    #[inline]
    #[must_use]
    pub const fn root() -> Self {
        Self::new(0, 0)
    }

    #[inline]
    #[must_use]
    pub const fn depth(self) -> u32 {
        self.depth
    }

    #[inline]
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.offset
    }

    /// Heap-order position of this node in the map.
    ///
    /// ```rust
    /// # use kernel_alloc::buddy_map::Node;
    /// assert_eq!(Node::root().bit_index(), 0);
    /// assert_eq!(Node::new(1, 1).bit_index(), 2);
    /// assert_eq!(Node::new(2, 0).bit_index(), 3);
    /// ```
    #[inline]
    #[must_use]
    pub const fn bit_index(self) -> u64 {
        (1 << self.depth) - 1 + self.offset
    }

    #[inline]
    #[must_use]
    pub const fn left(self) -> Self {
        Self::new(self.depth + 1, self.offset * 2)
    }

    #[inline]
    #[must_use]
    pub const fn right(self) -> Self {
        Self::new(self.depth + 1, self.offset * 2 + 1)
    }

    #[inline]
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        if self.depth == 0 {
            None
        } else {
            Some(Self::new(self.depth - 1, self.offset / 2))
        }
    }

    /// The sibling sharing this node's parent.
    #[inline]
    #[must_use]
    pub const fn buddy(self) -> Option<Self> {
        if self.depth == 0 {
            None
        } else {
            Some(Self::new(self.depth, self.offset ^ 1))
        }
    }

    /// The child of `self` on the path down to `target`.
    ///
    /// `target` must be a strict descendant of `self`.
    #[inline]
    #[must_use]
    pub const fn child_towards(self, target: Self) -> Self {
        debug_assert!(target.depth > self.depth);
        let shift = target.depth - self.depth - 1;
        if (target.offset >> shift) & 1 == 0 {
            self.left()
        } else {
            self.right()
        }
    }

    /// The leftmost descendant of `self` at `depth`.
    #[inline]
    #[must_use]
    pub const fn leftmost_at(self, depth: u32) -> Self {
        debug_assert!(depth >= self.depth);
        Self::new(depth, self.offset << (depth - self.depth))
    }
}

/// The frame map: one bit per buddy tree node over caller-provided storage.
pub struct BuddyMap<S> {
    storage: S,
    max_depth: u32,
    length: usize,
}

impl<S> BuddyMap<S>
where
    S: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Bind the map to `storage`. The contents are left untouched; call
    /// [`clear`](Self::clear) to mark everything free.
    ///
    /// # Errors
    /// [`FrameError::MapTooSmall`] if `storage` is shorter than
    /// [`MapGeometry::map_length`].
    pub fn new(storage: S, geometry: MapGeometry) -> Result<Self, FrameError> {
        let needed = geometry.map_length();
        let actual = storage.as_ref().len();
        if actual < needed {
            return Err(FrameError::MapTooSmall { needed, actual });
        }
        Ok(Self {
            storage,
            max_depth: geometry.max_depth(),
            length: needed,
        })
    }

    /// Mark every node free.
    pub fn clear(&mut self) {
        self.storage.as_mut()[..self.length].fill(0);
    }

    #[inline]
    #[must_use]
    pub const fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[inline]
    #[must_use]
    pub fn is_used(&self, node: Node) -> bool {
        let (byte, mask) = self.locate(node);
        self.storage.as_ref()[byte] & mask != 0
    }

    #[inline]
    #[must_use]
    pub fn is_free(&self, node: Node) -> bool {
        !self.is_used(node)
    }

    /// Whether `node` is an allocated block: used, with no used child.
    #[must_use]
    pub fn is_block(&self, node: Node) -> bool {
        self.is_used(node)
            && (node.depth() == self.max_depth
                || (self.is_free(node.left()) && self.is_free(node.right())))
    }

    #[inline]
    pub(crate) fn mark_used(&mut self, node: Node) {
        let (byte, mask) = self.locate(node);
        self.storage.as_mut()[byte] |= mask;
    }

    #[inline]
    pub(crate) fn mark_free(&mut self, node: Node) {
        let (byte, mask) = self.locate(node);
        self.storage.as_mut()[byte] &= !mask;
    }

    /// The raw map bytes, e.g. to compare snapshots.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage.as_ref()[..self.length]
    }

    /// Walk the whole tree and return the first free node that has a used
    /// child, if any. A consistent map returns `None`.
    #[must_use]
    pub fn first_violation(&self) -> Option<Node> {
        for depth in 0..self.max_depth {
            for offset in 0..(1u64 << depth) {
                let node = Node::new(depth, offset);
                if self.is_free(node) && (self.is_used(node.left()) || self.is_used(node.right()))
                {
                    return Some(node);
                }
            }
        }
        None
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn locate(&self, node: Node) -> (usize, u8) {
        debug_assert!(node.depth() <= self.max_depth);
        let bit = node.bit_index();
        // The tree has fewer than 2^32 nodes, so the byte index fits in usize.
        ((bit / 8) as usize, 1 << (bit % 8))
    }
}
