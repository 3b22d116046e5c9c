//! # Kernel Physical Frame Allocation
//!
//! This crate manages the kernel's physical memory in power-of-two sized,
//! naturally aligned blocks. It tracks a 4 GiB physical range with a binary
//! buddy tree packed into a single bitmap, one bit per tree node, stored at a
//! fixed physical address.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Global Entry Points ([`global`])           │
//! │    • get_physical_addr / drop_physical_addr         │
//! │    • mark_physical_area / init_physical_map         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ IRQs masked, spin lock held
//! ┌─────────────────▼───────────────────────────────────┐
//! │   Shared Handle ([`shared`], on `kernel_sync`)      │
//! │    • install-once slot for the allocator            │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Buddy Frame Allocator ([`frame_alloc`])      │
//! │    • first-fit allocate, reserve, free              │
//! │    • size inferred from the bit pattern on free     │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │   Frame Map ([`buddy_map`]) + Shape ([`geometry`])  │
//! │    • 2^20 - 1 node bits, 128 KiB at 0x380000        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! [`boot`] binds the map through a [`phys_mapper::PhysMapper`] and reserves
//! the memory the kernel must never hand out.
//!
//! ## Sizes
//!
//! A *page* is 4 KiB. The allocator works in *frames* of two pages, so the
//! smallest block is 8 KiB and a request for `n` pages is rounded up to the
//! next power-of-two number of frames.
//!
//! | Request | Block | Alignment |
//! |---------|-------|-----------|
//! | 1-2 pages | 8 KiB | 8 KiB |
//! | 3-4 pages | 16 KiB | 16 KiB |
//! | 5-8 pages | 32 KiB | 32 KiB |
//! | 2^20 pages | 4 GiB | root |
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{BuddyFrameAllocator, FrameError, MapGeometry, PhysicalAddress};
//! use kernel_info::memory::MAP_LENGTH;
//!
//! let mut frames = BuddyFrameAllocator::new(vec![0u8; MAP_LENGTH], MapGeometry::KERNEL)?;
//! frames.reserve_range(PhysicalAddress::zero(), PhysicalAddress::new(0x10_0000))?;
//!
//! let block = frames.allocate(8)?;
//! assert_eq!(block, PhysicalAddress::new(0x10_0000));
//! assert_eq!(frames.allocation_size(block)?, 32 * 1024);
//!
//! frames.free(block)?;
//! assert_eq!(frames.free(block), Err(FrameError::InvalidFree(block)));
//! # Ok::<(), FrameError>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod address;
pub mod boot;
pub mod buddy_map;
mod error;
pub mod frame_alloc;
pub mod geometry;
pub mod global;
pub mod phys_mapper;
pub mod shared;

pub use address::PhysicalAddress;
pub use error::{ErrorKind, FrameError};
pub use frame_alloc::BuddyFrameAllocator;
pub use geometry::MapGeometry;
pub use shared::SharedFrameAllocator;

const _: () = {
    use kernel_info::memory::{MAP_LENGTH, MAX_DEEP, PHYS_MAP_LOCATION};

    assert!(MapGeometry::KERNEL.map_length() == MAP_LENGTH);
    assert!(MapGeometry::KERNEL.max_depth() == MAX_DEEP);
    // The map must sit on frame boundaries so it can reserve itself.
    assert!(PHYS_MAP_LOCATION.is_multiple_of(MapGeometry::KERNEL.frame_size()));
    assert!((MAP_LENGTH as u64).is_multiple_of(MapGeometry::KERNEL.frame_size()));
};
