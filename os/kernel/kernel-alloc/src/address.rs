use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address.
///
/// A thin wrapper around a raw `u64` that denotes a **physical** address.
/// Every address handed out or accepted by the frame allocator uses this type,
/// so that a physical frame cannot be confused with an integer page count or a
/// virtual pointer.
///
/// ### Examples
/// ```rust
/// # use kernel_alloc::PhysicalAddress;
/// let pa = PhysicalAddress::new(0x0038_1234);
/// assert_eq!(pa.align_down(0x2000).as_u64(), 0x0038_0000);
/// assert_eq!(pa.align_up(0x2000).as_u64(), 0x0038_2000);
/// assert!(!pa.is_aligned(0x1000));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether the address is a multiple of `align` (a power of two).
    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }

    /// Align down to a multiple of `align` (a power of two).
    #[inline]
    #[must_use]
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }

    /// Align up to a multiple of `align` (a power of two), saturating at the
    /// last aligned address representable in `u64`.
    #[inline]
    #[must_use]
    pub const fn align_up(self, align: u64) -> Self {
        match self.0.checked_add(align - 1) {
            Some(v) => Self(v & !(align - 1)),
            None => Self(u64::MAX & !(align - 1)),
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(a: PhysicalAddress) -> Self {
        a.as_u64()
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
