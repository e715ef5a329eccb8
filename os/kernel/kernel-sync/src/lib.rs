//! # Kernel synchronization primitives
//!
//! The primitives here are shared by every subsystem that mutates state from
//! more than one core:
//!
//! * [`SpinLock`]: a test-and-test-and-set spin lock whose guard also masks
//!   local interrupts for as long as it is held. The interrupt strategy is a
//!   type parameter implementing [`Interrupts`], so the same lock runs with
//!   `cli/sti` in the kernel and without any masking in hosted tests.
//! * [`IrqGuard`]: the RAII interrupt mask on its own.
//! * [`SyncOnceCell`]: a write-once cell for values published during boot.
//!
//! None of the locks detect deadlocks or time out. A holder that never
//! releases leaves every contender spinning forever.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod interrupts;
mod raw_spin;
mod spin_lock;
mod sync_once_cell;

pub use interrupts::{Interrupts, IrqGuard, NoInterrupts};
#[cfg(target_arch = "x86_64")]
pub use interrupts::X86Interrupts;
pub use raw_spin::RawSpin;
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
