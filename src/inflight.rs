/*!
 * Connection-Wide In-Flight Counter
 *
 * Counts commands sent to the server and not yet answered, across every
 * batch sharing one connection. Submitters block once the ceiling is
 * reached; the reactor thread only ever releases permits and never waits.
 */

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct InFlight {
    count: AtomicUsize,
    ceiling: usize,
    lock: Mutex<()>,
    slot_freed: Condvar,
}

impl InFlight {
    pub fn new(ceiling: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            ceiling: ceiling.max(1),
            lock: Mutex::new(()),
            slot_freed: Condvar::new(),
        }
    }

    /// Commands currently awaiting a reply
    #[inline]
    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Take one permit, blocking while the ceiling is reached
    pub fn acquire(&self) {
        if self.try_acquire() {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.try_acquire() {
            log::trace!("in-flight ceiling {} reached, waiting", self.ceiling);
            self.slot_freed.wait(&mut guard);
        }
    }

    /// Take one permit if one is free
    pub fn try_acquire(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.ceiling).then_some(n + 1)
            })
            .is_ok()
    }

    /// Return one permit, waking submitters if the ceiling was reached
    pub fn release(&self) {
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "in-flight counter underflow");
        if prev >= self.ceiling {
            // Taking the lock orders this notify after any waiter's check.
            let _guard = self.lock.lock();
            self.slot_freed.notify_all();
        }
    }
}
