//! # Kernel synchronization primitives
//!
//! A test-and-test-and-set [`SpinLock`] and an [`IrqGuard`] that masks
//! interrupts on bare-metal x86-64. [`SpinLock::lock_irq`] combines both, so
//! a critical section can neither be entered by another CPU nor preempted by
//! an interrupt handler on the current one.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;

pub use irq::IrqGuard;
pub use spin_lock::{IrqSpinLockGuard, SpinLock, SpinLockGuard};
