//! # Boot-Time Frame Map Setup
//!
//! Binds the frame map to its fixed physical home and pre-reserves the areas
//! the allocator must never hand out:
//!
//! - the map's own storage at `PHYS_MAP_LOCATION`,
//! - low memory below `LOW_MEMORY_END` (real-mode structures, BIOS areas),
//! - everything at or above the installed-memory limit, if one is known.
//!
//! The kernel image and any firmware-reported holes are reserved by the caller
//! afterwards, through [`BuddyFrameAllocator::reserve_range`].

use crate::phys_mapper::PhysMapper;
use crate::{BuddyFrameAllocator, FrameError, MapGeometry, PhysicalAddress};
use kernel_info::memory::{LOW_MEMORY_END, MAP_LENGTH, PHYS_MAP_LOCATION};
use log::info;

/// Storage of the kernel's frame map.
pub type PhysicalMapStorage = &'static mut [u8; MAP_LENGTH];

/// The frame allocator as bound at boot.
pub type KernelFrameAllocator = BuddyFrameAllocator<PhysicalMapStorage>;

/// Physical base of the frame map.
#[must_use]
pub const fn map_location() -> PhysicalAddress {
    PhysicalAddress::new(PHYS_MAP_LOCATION)
}

/// Bind the frame map at `PHYS_MAP_LOCATION`, mark everything free, then
/// reserve the map itself, low memory and, if `limit` is given, all memory
/// from `limit` to the end of the managed range.
///
/// # Safety
/// - `mapper` must map `MAP_LENGTH` writable bytes at `PHYS_MAP_LOCATION`
///   for the rest of the kernel's lifetime.
/// - Nothing else may reference that memory, and this function must not be
///   called again while the returned allocator is alive.
///
/// # Errors
/// Propagates [`FrameError`] from the initial reservations; with the kernel
/// geometry these cannot fail.
pub unsafe fn init_physical_map<M: PhysMapper>(
    mapper: &M,
    limit: Option<PhysicalAddress>,
) -> Result<KernelFrameAllocator, FrameError> {
    // SAFETY: Forwarded to the caller.
    let storage: PhysicalMapStorage = unsafe { mapper.phys_to_mut(map_location()) };
    let mut frames = BuddyFrameAllocator::new(storage, MapGeometry::KERNEL)?;

    let map_start = map_location();
    frames.reserve_range(map_start, map_start + MAP_LENGTH as u64)?;
    frames.reserve_range(PhysicalAddress::zero(), PhysicalAddress::new(LOW_MEMORY_END))?;

    let managed = MapGeometry::KERNEL.managed_bytes();
    if let Some(limit) = limit.filter(|l| MapGeometry::KERNEL.contains(*l)) {
        frames.reserve_range(limit, PhysicalAddress::new(managed))?;
    }

    info!(
        "Physical frame map at {map_start}: {} KiB tracking {} MiB, usable up to {}",
        MAP_LENGTH / 1024,
        managed >> 20,
        limit.map_or(PhysicalAddress::new(managed), |l| {
            PhysicalAddress::new(l.as_u64().min(managed))
        })
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys_mapper::HhdmPhysMapper;

    /// Stands in for physical RAM: exposes a leaked heap buffer at
    /// `PHYS_MAP_LOCATION`.
    struct MapWindow {
        window: *mut u8,
    }

    impl MapWindow {
        fn new() -> Self {
            let buf = vec![0xAAu8; MAP_LENGTH].leak();
            Self {
                window: buf.as_mut_ptr(),
            }
        }
    }

    impl PhysMapper for MapWindow {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            assert_eq!(pa, map_location());
            unsafe { &mut *self.window.cast::<T>() }
        }
    }

    #[test]
    fn binds_through_a_direct_map() {
        let ram: *mut u8 = vec![0x55u8; MAP_LENGTH].leak().as_mut_ptr();
        // Place the buffer so that `base + PHYS_MAP_LOCATION` lands on it.
        let mapper = HhdmPhysMapper::with_base((ram as u64).wrapping_sub(PHYS_MAP_LOCATION));

        let frames = unsafe { init_physical_map(&mapper, None) }.unwrap();
        assert_eq!(frames.allocation_size(map_location()), Ok(MAP_LENGTH as u64));
        assert_eq!(frames.map().first_violation(), None);
        assert_eq!(frames.map().as_bytes().as_ptr(), ram.cast_const());
    }

    #[test]
    fn low_memory_and_map_are_reserved() {
        let window = MapWindow::new();
        let mut frames = unsafe { init_physical_map(&window, None) }.unwrap();

        // First fit lands right above low memory.
        assert_eq!(frames.allocate(1), Ok(PhysicalAddress::new(LOW_MEMORY_END)));

        // Both areas were reserved as single aligned blocks.
        let map = map_location();
        assert_eq!(frames.reserve(PhysicalAddress::zero(), 256), Ok(()));
        assert_eq!(frames.reserve(map, 32), Ok(()));
        assert_eq!(frames.allocation_size(PhysicalAddress::zero()), Ok(LOW_MEMORY_END));
        assert_eq!(frames.allocation_size(map), Ok(MAP_LENGTH as u64));

        let inside = PhysicalAddress::new(0x8_0000);
        assert_eq!(frames.reserve(inside, 1), Err(FrameError::AreaInUse(inside)));
        let below_map = PhysicalAddress::new(PHYS_MAP_LOCATION - 0x2000);
        assert_eq!(frames.allocation_size(below_map), Err(FrameError::InvalidFree(below_map)));
        assert_eq!(frames.map().first_violation(), None);
    }

    #[test]
    fn memory_above_limit_is_never_handed_out() {
        let window = MapWindow::new();
        let limit = PhysicalAddress::new(0x4000_0000);
        let mut frames = unsafe { init_physical_map(&window, Some(limit)) }.unwrap();

        // 1 GiB blocks: the first holds the boot reservations, the rest lie
        // above the limit.
        assert_eq!(
            frames.allocate(1 << 18),
            Err(FrameError::OutOfMemory { pages: 1 << 18 })
        );
        assert_eq!(frames.allocate(1 << 17), Ok(PhysicalAddress::new(0x2000_0000)));
        assert_eq!(frames.reserve(limit, 1 << 18), Ok(()));
    }

    #[test]
    fn limit_beyond_managed_range_is_ignored() {
        let window = MapWindow::new();
        let limit = PhysicalAddress::new(1 << 40);
        let mut frames = unsafe { init_physical_map(&window, Some(limit)) }.unwrap();
        assert_eq!(frames.allocate(1 << 19), Ok(PhysicalAddress::new(0x8000_0000)));
    }
}
