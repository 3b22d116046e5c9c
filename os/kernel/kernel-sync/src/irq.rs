//! Interrupt masking for short critical sections.
//!
//! On bare-metal x86-64 this uses `pushfq`/`cli`/`sti`. On any other target,
//! including hosted test builds, there are no interrupts to mask and the guard
//! does nothing.

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the `IF` bit (bit 9 of `RFLAGS`). If interrupts
/// were enabled, it executes `cli`. On drop, it executes `sti` **only** if
/// they were previously enabled, preserving the original state.
///
/// # Platform / Privilege
///
/// Requires a privileged context permitting `cli/sti` when built for
/// `x86_64-*-none`.
pub struct IrqGuard {
    /// Whether interrupts were enabled (IF=1) when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            disable_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            enable_interrupts();
        }
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[inline]
fn interrupts_enabled() -> bool {
    let rflags: u64;
    // SAFETY: Reading RFLAGS has no side effects.
    unsafe { core::arch::asm!("pushfq; pop {}", out(reg) rflags, options(nostack, preserves_flags)) }
    rflags & (1 << 9) != 0
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[inline]
fn disable_interrupts() {
    // SAFETY: Kernel code runs at CPL 0, where `cli` is permitted.
    unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[inline]
fn enable_interrupts() {
    // SAFETY: Only re-enables what a guard found enabled; CPL 0 as above.
    unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
#[inline]
const fn interrupts_enabled() -> bool {
    false
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
#[inline]
const fn disable_interrupts() {}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
#[inline]
const fn enable_interrupts() {}
