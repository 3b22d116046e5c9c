//! # Physical Mappers for the Frame Map
//!
//! The frame map lives at a fixed *physical* location, but code can only
//! dereference *virtual* addresses. A [`PhysMapper`] turns the physical base of
//! the map into a usable reference in the current address space.
//!
//! - [`IdentityPhysMapper`]: early boot, while low physical memory is identity
//!   mapped (or paging is still off).
//! - [`HhdmPhysMapper`]: after the switch to the higher half, where every
//!   physical address `pa` is visible at `HHDM_BASE + pa`.
//!
//! Tests provide their own mapper backed by a heap buffer that stands in for
//! physical RAM.

use crate::PhysicalAddress;
use kernel_info::memory::HHDM_BASE;

/// Converts physical addresses to usable references in the current virtual
/// address space.
pub trait PhysMapper {
    /// Convert a *physical* address to a mutable reference in the current
    /// address space.
    ///
    /// # Safety
    /// - `pa` must be mapped writable for `size_of::<T>()` bytes in the
    ///   current page tables, and stay mapped for `'a`.
    /// - The memory must be valid for `T` and not aliased by any other
    ///   reference while the returned one is alive.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// [`PhysMapper`] for identity-mapped physical memory.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u64() as *mut T;
        // SAFETY: Caller guarantees the identity mapping covers `pa`.
        unsafe { &mut *va }
    }
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// Every physical address `pa` is visible at `base + pa`. The default base
/// is [`HHDM_BASE`].
///
/// # Safety
/// The HHDM mapping must be present and cover the referenced physical range.
#[derive(Debug, Copy, Clone)]
pub struct HhdmPhysMapper {
    base: u64,
}

impl Default for HhdmPhysMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl HhdmPhysMapper {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_base(HHDM_BASE)
    }

    /// A direct map starting at `base` instead of [`HHDM_BASE`].
    #[must_use]
    pub const fn with_base(base: u64) -> Self {
        Self { base }
    }

    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }
}

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = self.base.wrapping_add(pa.as_u64()) as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and mapped via HHDM.
        unsafe { &mut *va }
    }
}
