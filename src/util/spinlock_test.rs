use super::*;

use std::{sync::Arc, thread};

#[test]
fn test_spinlock_exclusion() {
    let lock = Arc::new(Spinlock::new(0_u64));

    let n_threads = 8_u64;
    let n_incrs = 1_000_u64;

    let mut handles = vec![];
    for _t in 0..n_threads {
        let lock = Arc::clone(&lock);
        handles.push(thread::spawn(move || {
            for _i in 0..n_incrs {
                let mut value = lock.write();
                *value += 1;
            }
        }));
    }

    // concurrent readers only ever observe committed values
    let reader = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let mut last = 0;
            for _i in 0..n_incrs {
                let value = lock.read();
                assert!(*value >= last);
                last = *value;
            }
        })
    };

    for handle in handles.into_iter() {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(*lock.read(), n_threads * n_incrs);
}

#[test]
fn test_spinlock_concurrent_readers() {
    let lock = Arc::new(Spinlock::new(42_u64));

    let g1 = lock.read();
    let g2 = lock.read();
    assert_eq!(*g1, 42);
    assert_eq!(*g2, 42);
}
