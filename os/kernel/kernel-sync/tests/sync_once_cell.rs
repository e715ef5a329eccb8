use kernel_sync::SyncOnceCell;
use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn empty_until_set() {
    let cell = SyncOnceCell::<u64>::new();
    assert!(cell.get().is_none());
    assert!(!cell.is_set());

    assert_eq!(cell.set(0x1000), Ok(()));
    assert!(cell.is_set());
    assert_eq!(cell.get(), Some(&0x1000));
}

#[test]
fn second_set_hands_the_value_back() {
    let cell = SyncOnceCell::new();
    cell.set("first").unwrap();
    assert_eq!(cell.set("second"), Err("second"));
    assert_eq!(cell.get(), Some(&"first"));
}

#[test]
fn exactly_one_racing_writer_wins() {
    let threads = 8;
    let cell = SyncOnceCell::new();
    let wins = AtomicUsize::new(0);
    let start = Barrier::new(threads);

    thread::scope(|s| {
        for id in 0..threads {
            let (cell, wins, start) = (&cell, &wins, &start);
            s.spawn(move || {
                start.wait();
                if cell.set(id).is_ok() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
                // Every thread sees the single published value.
                assert!(*cell.wait() < threads);
            });
        }
    });

    assert_eq!(wins.load(Ordering::SeqCst), 1);
}

#[test]
fn published_value_is_dropped_with_the_cell() {
    use std::rc::Rc;

    let tracker = Rc::new(());
    {
        let cell = SyncOnceCell::new();
        cell.set(Rc::clone(&tracker)).unwrap();
        assert_eq!(Rc::strong_count(&tracker), 2);
    }
    assert_eq!(Rc::strong_count(&tracker), 1);
}
