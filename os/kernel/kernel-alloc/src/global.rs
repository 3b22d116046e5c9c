//! # Kernel-Wide Physical Allocator
//!
//! The one frame map the kernel uses, reachable from anywhere through
//! [`PHYSICAL_ALLOCATOR`]. The free functions are thin wrappers that mask
//! interrupts and take the lock around each call.
//!
//! ```rust,no_run
//! use kernel_alloc::global;
//! use kernel_alloc::phys_mapper::IdentityPhysMapper;
//!
//! unsafe { global::init_physical_map(&IdentityPhysMapper, None) }.unwrap();
//! let frame = global::get_physical_addr(4).unwrap();
//! global::drop_physical_addr(frame).unwrap();
//! ```

use crate::boot::{self, PhysicalMapStorage};
use crate::phys_mapper::PhysMapper;
use crate::{FrameError, PhysicalAddress, SharedFrameAllocator};

/// The kernel's physical frame allocator. Empty until
/// [`init_physical_map`] runs.
pub static PHYSICAL_ALLOCATOR: SharedFrameAllocator<PhysicalMapStorage> =
    SharedFrameAllocator::new();

/// Set up the frame map (see [`boot::init_physical_map`]) and install it in
/// [`PHYSICAL_ALLOCATOR`].
///
/// # Safety
/// Same as [`boot::init_physical_map`].
///
/// # Errors
/// [`FrameError::AlreadyInitialized`] on a second call. The existing map is
/// left untouched.
pub unsafe fn init_physical_map<M: PhysMapper>(
    mapper: &M,
    limit: Option<PhysicalAddress>,
) -> Result<(), FrameError> {
    // SAFETY: Forwarded to the caller; the builder only runs once.
    PHYSICAL_ALLOCATOR.install_with(|| unsafe { boot::init_physical_map(mapper, limit) })
}

/// Allocate at least `pages` contiguous pages.
///
/// # Errors
/// See [`BuddyFrameAllocator::allocate`](crate::BuddyFrameAllocator::allocate),
/// plus [`FrameError::NotInitialized`].
pub fn get_physical_addr(pages: u32) -> Result<PhysicalAddress, FrameError> {
    PHYSICAL_ALLOCATOR.with_irq(|frames| frames.allocate(pages))
}

/// Reserve the block of `pages` pages at `addr`.
///
/// # Errors
/// See [`BuddyFrameAllocator::reserve`](crate::BuddyFrameAllocator::reserve),
/// plus [`FrameError::NotInitialized`].
pub fn mark_physical_area(addr: PhysicalAddress, pages: u32) -> Result<(), FrameError> {
    PHYSICAL_ALLOCATOR.with_irq(|frames| frames.reserve(addr, pages))
}

/// Reserve every frame touching `[start, end)`.
///
/// # Errors
/// See [`BuddyFrameAllocator::reserve_range`](crate::BuddyFrameAllocator::reserve_range),
/// plus [`FrameError::NotInitialized`].
pub fn mark_physical_range(start: PhysicalAddress, end: PhysicalAddress) -> Result<(), FrameError> {
    PHYSICAL_ALLOCATOR.with_irq(|frames| frames.reserve_range(start, end))
}

/// Release the block starting at `addr`.
///
/// # Errors
/// See [`BuddyFrameAllocator::free`](crate::BuddyFrameAllocator::free),
/// plus [`FrameError::NotInitialized`].
pub fn drop_physical_addr(addr: PhysicalAddress) -> Result<(), FrameError> {
    PHYSICAL_ALLOCATOR.with_irq(|frames| frames.free(addr))
}

/// Size in bytes of the block starting at `addr`.
///
/// # Errors
/// See [`BuddyFrameAllocator::allocation_size`](crate::BuddyFrameAllocator::allocation_size),
/// plus [`FrameError::NotInitialized`].
pub fn physical_area_size(addr: PhysicalAddress) -> Result<u64, FrameError> {
    PHYSICAL_ALLOCATOR.with_irq(|frames| frames.allocation_size(addr))
}
