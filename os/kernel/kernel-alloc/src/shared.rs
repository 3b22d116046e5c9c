//! # Shared Frame Allocator Handle
//!
//! [`SharedFrameAllocator`] wraps an optional [`BuddyFrameAllocator`] in a
//! [`kernel_sync::SpinLock`] so a single map can be reached from a
//! `static`. The handle starts empty; [`install`](SharedFrameAllocator::install)
//! binds the allocator exactly once.
//!
//! Every map update runs inside the lock. [`with_irq`](SharedFrameAllocator::with_irq)
//! additionally masks interrupts, so an interrupt handler on the same CPU
//! cannot spin forever on a lock its own CPU holds.

use crate::{BuddyFrameAllocator, FrameError};
use kernel_sync::SpinLock;
use log::debug;

/// A lazily installed, spin-locked [`BuddyFrameAllocator`].
pub struct SharedFrameAllocator<S> {
    slot: SpinLock<Option<BuddyFrameAllocator<S>>>,
}

impl<S> Default for SharedFrameAllocator<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SharedFrameAllocator<S> {
    /// An empty handle, usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: SpinLock::new(None),
        }
    }

    /// Whether an allocator has been installed.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<S> SharedFrameAllocator<S>
where
    S: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Bind `frames` to this handle.
    ///
    /// # Errors
    /// [`FrameError::AlreadyInitialized`] if an allocator is already
    /// installed. `frames` is dropped in that case.
    pub fn install(&self, frames: BuddyFrameAllocator<S>) -> Result<(), FrameError> {
        self.install_with(|| Ok(frames))
    }

    /// Build and bind an allocator under the lock.
    ///
    /// `build` runs only if no allocator is installed yet, so it may freely
    /// clear map storage that an installed allocator would still be using.
    ///
    /// # Errors
    /// [`FrameError::AlreadyInitialized`] if an allocator is already
    /// installed, or whatever `build` returns.
    pub fn install_with(
        &self,
        build: impl FnOnce() -> Result<BuddyFrameAllocator<S>, FrameError>,
    ) -> Result<(), FrameError> {
        let mut slot = self.slot.lock_irq();
        if slot.is_some() {
            return Err(FrameError::AlreadyInitialized);
        }
        let frames = build()?;
        debug!(
            "frame allocator installed ({} frames of {} bytes)",
            frames.geometry().frame_count(),
            frames.geometry().frame_size()
        );
        *slot = Some(frames);
        Ok(())
    }

    /// Run `f` on the installed allocator while holding the lock.
    ///
    /// # Errors
    /// [`FrameError::NotInitialized`] if nothing is installed, or whatever
    /// `f` returns.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut BuddyFrameAllocator<S>) -> Result<R, FrameError>,
    ) -> Result<R, FrameError> {
        let mut slot = self.slot.lock();
        f(slot.as_mut().ok_or(FrameError::NotInitialized)?)
    }

    /// Like [`with`](Self::with), with interrupts masked for the duration.
    ///
    /// # Errors
    /// Same as [`with`](Self::with).
    pub fn with_irq<R>(
        &self,
        f: impl FnOnce(&mut BuddyFrameAllocator<S>) -> Result<R, FrameError>,
    ) -> Result<R, FrameError> {
        let mut slot = self.slot.lock_irq();
        f(slot.as_mut().ok_or(FrameError::NotInitialized)?)
    }
}
