use crate::RawSpin;
use crate::interrupts::{Interrupts, IrqGuard};
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

/// A spin lock that masks local interrupts while held.
///
/// [`lock`](Self::lock) first masks interrupts through `I`, then spins for the
/// lock word. The guard releases the lock word first and restores interrupts
/// afterwards, so no handler can observe the lock held by its own core.
///
/// # Examples
///
/// ```
/// use kernel_sync::{NoInterrupts, SpinLock};
///
/// static COUNTER: SpinLock<u64, NoInterrupts> = SpinLock::new(0);
///
/// *COUNTER.lock() += 1;
/// assert_eq!(COUNTER.with_lock(|v| *v), 1);
/// ```
pub struct SpinLock<T, I: Interrupts> {
    raw: RawSpin,
    inner: UnsafeCell<T>,
    _strategy: PhantomData<fn() -> I>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send, I: Interrupts> Sync for SpinLock<T, I> {}
unsafe impl<T: Send, I: Interrupts> Send for SpinLock<T, I> {}

impl<T, I: Interrupts> SpinLock<T, I> {
    pub const fn new(inner: T) -> Self {
        Self {
            raw: RawSpin::new(),
            inner: UnsafeCell::new(inner),
            _strategy: PhantomData,
        }
    }

    /// Masks interrupts, then spins until the lock is acquired.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T, I> {
        let irq = IrqGuard::new();
        self.raw.lock();
        SpinLockGuard {
            lock: self,
            _irq: irq,
        }
    }

    /// Try once; on failure the interrupt state is restored before returning.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T, I>> {
        let irq = IrqGuard::new();
        if self.raw.try_lock() {
            Some(SpinLockGuard {
                lock: self,
                _irq: irq,
            })
        } else {
            None
        }
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Raw pointer to the protected value, bypassing the lock.
    ///
    /// Dereferencing it is only sound while no other context can reach the
    /// lock, e.g. during single-threaded boot before the value is shared.
    #[inline]
    pub const fn as_mut_ptr(&self) -> *mut T {
        self.inner.get()
    }

    /// Snapshot of whether some context holds the lock.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

/// Exclusive access to the value in a [`SpinLock`].
///
/// Holds the interrupt mask for its whole lifetime. Not `Send`.
pub struct SpinLockGuard<'a, T, I: Interrupts> {
    lock: &'a SpinLock<T, I>,
    /// Dropped after [`Drop::drop`] released the lock word.
    _irq: IrqGuard<I>,
}

impl<T, I: Interrupts> Deref for SpinLockGuard<'_, T, I> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T, I: Interrupts> DerefMut for SpinLockGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T, I: Interrupts> Drop for SpinLockGuard<'_, T, I> {
    fn drop(&mut self) {
        // Release publishes the critical section; `_irq` restores interrupts next.
        unsafe { self.lock.raw.unlock() }
    }
}
