use super::{RawCondvar, WaitTimeoutResult};
use crate::{lock::Lock, restrictions, time};
use core::{fmt, mem, time::Duration};
use parking_lot::Condvar;

/// The native backend of a [`ConditionVariable`], a thin layer over
/// [`parking_lot::Condvar`] waiting directly on the [`Lock`]'s mutex.
///
/// [`ConditionVariable`]: crate::ConditionVariable
pub struct NativeCondvar<'a> {
    user_lock: &'a Lock,
    cond: Condvar,
}

impl fmt::Debug for NativeCondvar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCondvar")
            .field("user_lock", self.user_lock)
            .finish()
    }
}

impl<'a> NativeCondvar<'a> {
    pub fn new(user_lock: &'a Lock) -> Self {
        Self {
            user_lock,
            cond: Condvar::new(),
        }
    }
}

impl RawCondvar for NativeCondvar<'_> {
    fn wait(&self) {
        self.timed_wait(time::FOREVER);
    }

    fn timed_wait(&self, max_time: Duration) -> WaitTimeoutResult {
        restrictions::assert_wait_allowed();
        self.user_lock.check_held_and_unmark();

        // SAFETY: the check above proved this thread holds the mutex, and the
        // guard is forgotten below so the mutex stays held on return.
        let mut guard = unsafe { self.user_lock.make_guard_unchecked() };
        let timed_out = match time::timeout(max_time) {
            None => {
                self.cond.wait(&mut guard);
                false
            }
            Some(timeout) => self.cond.wait_for(&mut guard, timeout).timed_out(),
        };
        mem::forget(guard);

        self.user_lock.check_unheld_and_mark();
        WaitTimeoutResult(timed_out)
    }

    fn signal(&self) {
        self.cond.notify_one();
    }

    fn broadcast(&self) {
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_utils::thread::scope;
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Instant,
    };

    #[test]
    fn timed_wait_times_out() {
        let lock = Lock::new();
        let cv = NativeCondvar::new(&lock);

        let _held = lock.lock();
        let started = Instant::now();
        assert!(cv.timed_wait(Duration::from_millis(20)).timed_out());
        assert!(started.elapsed() >= Duration::from_millis(15));
        lock.assert_acquired();
    }

    #[test]
    fn signal_wakes_waiter() {
        let lock = Lock::new();
        let cv = NativeCondvar::new(&lock);
        let ready = AtomicBool::new(false);

        scope(|s| {
            s.spawn(|_| {
                let _held = lock.lock();
                while !ready.load(Ordering::Relaxed) {
                    cv.wait();
                }
                lock.assert_acquired();
            });

            let _held = lock.lock();
            ready.store(true, Ordering::Relaxed);
            cv.signal();
        })
        .unwrap();
    }

    #[test]
    #[should_panic(expected = "does not hold it")]
    fn wait_without_lock_panics() {
        let lock = Lock::new();
        NativeCondvar::new(&lock).timed_wait(Duration::from_millis(1));
    }
}
