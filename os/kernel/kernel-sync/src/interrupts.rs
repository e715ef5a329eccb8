//! Local interrupt masking.
//!
//! A lock that is also taken from interrupt context must keep interrupts off
//! on the acquiring core for as long as it is held; otherwise a handler that
//! fires inside the critical section spins on a lock its own core owns.

use core::marker::PhantomData;

/// Strategy for masking interrupts on the current core.
///
/// Implementations are zero-sized markers; all methods are associated
/// functions so the strategy can be chosen as a type parameter.
pub trait Interrupts {
    /// Whether interrupts are currently enabled on this core.
    fn are_enabled() -> bool;

    /// Masks interrupts on this core.
    fn disable();

    /// Unmasks interrupts on this core.
    fn enable();
}

/// Hardware interrupt masking on `x86/x86_64` (`cli`, `sti`, `RFLAGS.IF`).
///
/// # Safety & Privilege
///
/// Must only be used where `cli`/`sti` are legal (ring 0). Executing them in
/// user mode raises a general protection fault.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X86Interrupts;

#[cfg(target_arch = "x86_64")]
impl X86Interrupts {
    /// Interrupt-enable flag in `RFLAGS`.
    const IF: u64 = 1 << 9;

    /// Returns the current `RFLAGS` value (via `pushfq/pop`).
    #[inline]
    #[must_use]
    pub fn rflags() -> u64 {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nomem, preserves_flags)) }
        r
    }
}

#[cfg(target_arch = "x86_64")]
impl Interrupts for X86Interrupts {
    #[inline]
    fn are_enabled() -> bool {
        Self::rflags() & Self::IF != 0
    }

    // No `nomem`: the lock word must not be reordered across `cli`/`sti`.
    #[inline]
    fn disable() {
        unsafe { core::arch::asm!("cli", options(nostack, preserves_flags)) }
    }

    #[inline]
    fn enable() {
        unsafe { core::arch::asm!("sti", options(nostack, preserves_flags)) }
    }
}

/// No interrupt masking at all.
///
/// For hosted builds and tests, and for single-core contexts that never take
/// the same lock from a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoInterrupts;

impl Interrupts for NoInterrupts {
    #[inline]
    fn are_enabled() -> bool {
        false
    }

    #[inline]
    fn disable() {}

    #[inline]
    fn enable() {}
}

/// RAII guard that masks interrupts on creation and restores them on drop.
///
/// The guard snapshots whether interrupts were enabled. It only disables them
/// if they were on, and only re-enables them on drop in that case, so guards
/// nest: the innermost drop leaves interrupts masked for the outer holder.
///
/// The guard is `!Send`; it must be dropped on the core that created it.
///
/// # Examples
///
/// ```
/// use kernel_sync::{IrqGuard, NoInterrupts};
///
/// {
///     let _g = IrqGuard::<NoInterrupts>::new();
///     // critical section
/// }
/// ```
pub struct IrqGuard<I: Interrupts> {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
    _strategy: PhantomData<(fn() -> I, *mut ())>,
}

impl<I: Interrupts> IrqGuard<I> {
    /// Disables interrupts if they are currently enabled and remembers the state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let were_enabled = I::are_enabled();
        if were_enabled {
            I::disable();
        }
        Self {
            were_enabled,
            _strategy: PhantomData,
        }
    }

    /// Whether this guard will re-enable interrupts when dropped.
    #[inline]
    #[must_use]
    pub const fn restores(&self) -> bool {
        self.were_enabled
    }
}

impl<I: Interrupts> Default for IrqGuard<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Interrupts> Drop for IrqGuard<I> {
    fn drop(&mut self) {
        if self.were_enabled {
            I::enable();
        }
    }
}
