use kernel_sync::{Interrupts, NoInterrupts, SpinLock};
use std::cell::Cell;
use std::{panic, thread};

type Lock<T> = SpinLock<T, NoInterrupts>;

thread_local! {
    static IF: Cell<bool> = const { Cell::new(true) };
    static DISABLES: Cell<usize> = const { Cell::new(0) };
}

/// Per-thread stand-in for the `RFLAGS.IF` bit.
struct FakeIrq;

impl Interrupts for FakeIrq {
    fn are_enabled() -> bool {
        IF.with(Cell::get)
    }

    fn disable() {
        DISABLES.with(|d| d.set(d.get() + 1));
        IF.with(|f| f.set(false));
    }

    fn enable() {
        IF.with(|f| f.set(true));
    }
}

#[test]
fn basic_lock_and_raii() {
    let l = Lock::new(0_u32);

    {
        let mut g = l.lock();
        *g = 41;
        assert!(l.is_locked());
    }
    assert!(!l.is_locked());

    {
        let mut g = l.lock();
        *g += 1;
        assert_eq!(*g, 42);
    }
}

#[test]
fn try_lock_semantics() {
    let l = Lock::new(1u8);

    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert_eq!(**g1.as_ref().unwrap(), 1);

    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn with_lock_works_and_unlocks() {
    let l = Lock::new(String::from("a"));
    let len = l.with_lock(|s| {
        s.push('b');
        s.len()
    });
    assert_eq!(len, 2);

    let got = l.with_lock(|s| s.clone());
    assert_eq!(got, "ab");
}

#[test]
fn get_mut_allows_direct_mutation() {
    let mut l = Lock::new(vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.lock().as_slice(), &[1, 2, 3, 4]);
}

#[test]
fn raw_pointer_bypasses_the_lock() {
    let l = Lock::new(7_u32);
    unsafe { *l.as_mut_ptr() = 8 };
    assert!(!l.is_locked());
    assert_eq!(l.with_lock(|v| *v), 8);
}

#[test]
fn lock_masks_interrupts_until_release() {
    let l: SpinLock<u32, FakeIrq> = SpinLock::new(0);
    assert!(FakeIrq::are_enabled());

    {
        let _g = l.lock();
        assert!(!FakeIrq::are_enabled(), "critical section runs with interrupts on");
    }

    assert!(FakeIrq::are_enabled());
    assert!(!l.is_locked());
}

#[test]
fn nested_locks_restore_interrupts_only_at_the_outermost_release() {
    let a: SpinLock<u32, FakeIrq> = SpinLock::new(0);
    let b: SpinLock<u32, FakeIrq> = SpinLock::new(0);
    let before = DISABLES.with(Cell::get);

    let ga = a.lock();
    {
        let _gb = b.lock();
        assert!(!FakeIrq::are_enabled());
    }
    assert!(!FakeIrq::are_enabled(), "inner release re-enabled interrupts");
    drop(ga);
    assert!(FakeIrq::are_enabled());

    // Only the outer acquisition had to issue a disable.
    assert_eq!(DISABLES.with(Cell::get) - before, 1);
}

#[test]
fn failed_try_lock_restores_interrupts() {
    let l: SpinLock<u32, FakeIrq> = SpinLock::new(0);
    let held = thread::scope(|s| {
        let g = l.lock();
        let attempt = s.spawn(|| {
            let got = l.try_lock().is_some();
            (got, FakeIrq::are_enabled())
        });
        let res = attempt.join().unwrap();
        drop(g);
        res
    });
    assert_eq!(held, (false, true));
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    let threads = 8;
    let iters = 5_000;

    let lock = Arc::new(Lock::new(0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let lock = Arc::clone(&lock);
        let in_cs = Arc::clone(&in_cs);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for _ in 0..iters {
                lock.with_lock(|v| {
                    let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(prev, 0, "mutual exclusion violated");
                    *v += 1;
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                });
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(lock.with_lock(|v| *v), threads * iters);
    assert_eq!(in_cs.load(Ordering::SeqCst), 0);
}

#[test]
fn lock_is_released_on_panic() {
    let l = Lock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");

    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = Lock::new(0u8);
    takes_sync(&l);
}
