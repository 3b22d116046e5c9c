use crate::PhysicalAddress;

/// Errors returned by the frame allocator.
///
/// A failed operation never leaves a partial change behind: the map is
/// exactly as it was before the call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("zero-sized page request")]
    ZeroSizedRequest,
    #[error("request of {pages} pages exceeds the managed range")]
    RequestTooLarge { pages: u32 },
    #[error("address {0} is outside the managed range")]
    OutOfRange(PhysicalAddress),
    #[error("address {addr} is not aligned to {align:#x} bytes")]
    Misaligned { addr: PhysicalAddress, align: u64 },
    #[error("out of memory (no free block for {pages} pages)")]
    OutOfMemory { pages: u32 },
    #[error("address {0} is not the start of an allocated block")]
    InvalidFree(PhysicalAddress),
    #[error("area at {0} overlaps an existing allocation")]
    AreaInUse(PhysicalAddress),
    #[error("map storage too small: need {needed} bytes, got {actual}")]
    MapTooSmall { needed: usize, actual: usize },
    #[error("frame allocator already initialized")]
    AlreadyInitialized,
    #[error("frame allocator not initialized")]
    NotInitialized,
}

/// Coarse classification of a [`FrameError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Zero or oversized request, address outside the range, misalignment,
    /// or a reservation overlapping existing allocations.
    InvalidArgument,
    /// No free block exists at the required level.
    OutOfMemory,
    /// Double free, or an address that never started an allocated block.
    InvalidFree,
    /// The allocator itself is not in a usable state for the call.
    State,
}

impl FrameError {
    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::ZeroSizedRequest
            | Self::RequestTooLarge { .. }
            | Self::OutOfRange(_)
            | Self::Misaligned { .. }
            | Self::AreaInUse(_) => ErrorKind::InvalidArgument,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::InvalidFree(_) => ErrorKind::InvalidFree,
            Self::MapTooSmall { .. } | Self::AlreadyInitialized | Self::NotInitialized => {
                ErrorKind::State
            }
        }
    }
}
