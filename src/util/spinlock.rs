//! Module `spinlock` implement read-write-spinlock, useful for
//! non-blocking concurrency.
//!
//! Blocking concurrency can have impact on latency. When the critical
//! section is quick and short we can use non-blocking primitives like
//! latch-and-spin instead of OS locks.
//!
//! **What is latch and spin ?**
//!
//! In typical multi-core processors, concurrent read operations are
//! always safe and consistent. But it becomes unsafe when a writer is
//! concurrently modifying data while readers are loading it from memory.
//!
//! * A **reader** can enter the critical section only when the latch is
//!   not acquired by a writer.
//! * A **writer** first latches the door, preventing further readers
//!   from entering, then spins until every reader already inside has
//!   left, then locks.
//! * Waiting callers spin; release happens when the guard drops.

use std::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU32, Ordering::SeqCst},
};

/// Spinlock implements latch-and-spin mechanism for non-blocking
/// concurrency.
///
/// It uses a single AtomicU32 for:
/// * ref-count of readers inside, bits \[0-29\].
/// * latch flag, bit 30.
/// * lock flag, bit 31.
pub struct Spinlock<T> {
    latchlock: AtomicU32,
    value: T,
}

impl<T> Spinlock<T> {
    const LATCH_FLAG: u32 = 0x40000000;
    const LOCK_FLAG: u32 = 0x80000000;
    const LATCH_LOCK_FLAG: u32 = 0xC0000000;
    const READERS_FLAG: u32 = 0x3FFFFFFF;

    /// Create a new Spinlock over `value`.
    pub fn new(value: T) -> Spinlock<T> {
        Spinlock {
            latchlock: AtomicU32::new(0),
            value,
        }
    }

    /// Acquire latch for read permission. Typically every iterator held
    /// over an index owns one of these for its lifetime.
    pub fn read(&self) -> ReadGuard<T> {
        loop {
            let old = self.latchlock.load(SeqCst);
            if (old & Self::LATCH_LOCK_FLAG) == 0 {
                // latch is not acquired by a writer
                if self
                    .latchlock
                    .compare_exchange(old, old + 1, SeqCst, SeqCst)
                    .is_ok()
                {
                    break ReadGuard { door: self };
                }
            }
        }
    }

    /// Acquire latch for write permission. Excludes other writers and
    /// all readers.
    pub fn write(&self) -> WriteGuard<T> {
        // acquire latch
        loop {
            let old = self.latchlock.load(SeqCst);
            if (old & Self::LATCH_FLAG) == 0 {
                if (old & Self::LOCK_FLAG) != 0 {
                    panic!("if latch is off, lock can't be on! call the programmer");
                }
                let new = old | Self::LATCH_FLAG;
                if self
                    .latchlock
                    .compare_exchange(old, new, SeqCst, SeqCst)
                    .is_ok()
                {
                    break;
                }
            }
        }
        // acquire lock
        loop {
            let old = self.latchlock.load(SeqCst);
            if (old & Self::READERS_FLAG) == 0 {
                let new = old | Self::LOCK_FLAG;
                if self
                    .latchlock
                    .compare_exchange(old, new, SeqCst, SeqCst)
                    .is_ok()
                {
                    let door = unsafe {
                        let door = self as *const Self as *mut Self;
                        door.as_mut().unwrap()
                    };
                    break WriteGuard { door };
                }
                panic!("latched, ZERO readers, but unable to lock! call the programmer");
            }
        }
    }
}

/// Type to handle read-latch, when value gets dropped the latch is released.
pub struct ReadGuard<'a, T> {
    door: &'a Spinlock<T>,
}

impl<'a, T> Deref for ReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.door.value
    }
}

impl<'a, T> Drop for ReadGuard<'a, T> {
    fn drop(&mut self) {
        self.door.latchlock.fetch_sub(1, SeqCst);
    }
}

/// Type to handle write-latch, when value gets dropped the latch is released.
pub struct WriteGuard<'a, T> {
    door: &'a mut Spinlock<T>,
}

impl<'a, T> Deref for WriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.door.value
    }
}

impl<'a, T> DerefMut for WriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.door.value
    }
}

impl<'a, T> Drop for WriteGuard<'a, T> {
    fn drop(&mut self) {
        let old = self.door.latchlock.load(SeqCst);
        if (old & Spinlock::<T>::READERS_FLAG) > 0 {
            panic!("can't have active readers, when lock is held! call the programmer");
        }
        if self
            .door
            .latchlock
            .compare_exchange(old, 0, SeqCst, SeqCst)
            .is_err()
        {
            panic!("can't have readers/writers to modify when locked! call the programmer")
        }
    }
}

#[cfg(test)]
#[path = "spinlock_test.rs"]
mod spinlock_test;
