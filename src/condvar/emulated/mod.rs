//! Condition variable built from one auto-reset event per waiting thread.
//!
//! Each waiter takes an [`EventNode`] (recycled, or freshly allocated when
//! the recycling pool is empty), links it into the waiting list, and blocks on
//! its event after dropping the caller's lock. `signal()` unlinks and sets the
//! most recent waiter's event, `broadcast()` unlinks and sets all of them.
//! After waking, a waiter moves its node back into the recycling pool.
//!
//! Both lists are only touched under a private lock which is never held
//! across a blocking call. The node is linked into the waiting list before
//! the caller's lock is released, so a `signal()` issued by anyone who takes
//! the caller's lock afterwards always finds it.

mod node;

use self::node::{EventList, EventNode};
use super::{RawCondvar, WaitTimeoutResult};
use crate::{
    event::{AutoResetEvent, OsEvent},
    lock::{AutoUnlock, Lock},
    restrictions, time,
};
use core::{fmt, ptr::NonNull, time::Duration};
use parking_lot::{Mutex, MutexGuard};
use std::thread;
use tracing::{trace, warn};

/// How long a hasty destructor waits for stragglers on each round.
const GRACE_PERIOD: Duration = Duration::from_millis(10);
const GRACE_ROUNDS: usize = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RunState {
    Running,
    Shutdown,
}

struct Inner<E> {
    run_state: RunState,
    /// Events that threads are blocked on.
    waiting: EventList<E>,
    waiting_len: usize,
    /// Free list of events from earlier waits.
    recycling: EventList<E>,
    recycling_len: usize,
    /// Events ever allocated. They're only freed with the backend.
    allocated: usize,
}

impl<E: AutoResetEvent> Inner<E> {
    /// Hand out a unique event for a thread about to wait, already linked
    /// into the waiting list.
    fn get_event_for_waiting(&mut self) -> NonNull<EventNode<E>> {
        let node = match self.recycling.pop_front() {
            Some(node) => {
                self.recycling_len -= 1;
                node
            }
            None => {
                debug_assert_eq!(self.recycling_len, 0);
                self.allocated += 1;
                trace!(allocated = self.allocated, "allocating condition variable event");
                EventNode::new_element()
            }
        };

        // SAFETY: node is a singleton element owned by neither list.
        unsafe { self.waiting.push_back(node) };
        self.waiting_len += 1;
        node
    }

    /// Unlink the most recent waiter, if any.
    fn pop_waiting(&mut self) -> Option<NonNull<EventNode<E>>> {
        let node = self.waiting.pop_back()?;
        self.waiting_len -= 1;
        Some(node)
    }

    /// Return a node used for waiting to the recycling pool.
    ///
    /// # Safety
    ///
    /// `node` must have come from [`get_event_for_waiting`] on this instance
    /// and not have been recycled since.
    ///
    /// [`get_event_for_waiting`]: Self::get_event_for_waiting
    unsafe fn recycle_event(&mut self, node: NonNull<EventNode<E>>) {
        // Still linked in waiting on timeout, already unlinked if signaled.
        if !EventNode::is_singleton(node) {
            self.waiting_len -= 1;
        }
        EventNode::extract(node);
        self.recycling.push_back(node);
        self.recycling_len += 1;
    }
}

/// The emulated backend of a [`ConditionVariable`].
///
/// Generic over the event type so alternative [`AutoResetEvent`]s can be
/// plugged in; [`OsEvent`] is the default.
///
/// [`ConditionVariable`]: crate::ConditionVariable
pub struct EmulatedCondvar<'a, E: AutoResetEvent = OsEvent> {
    user_lock: &'a Lock,
    inner: Mutex<Inner<E>>,
}

impl<E: AutoResetEvent> fmt::Debug for EmulatedCondvar<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EmulatedCondvar")
            .field("run_state", &inner.run_state)
            .field("waiting", &inner.waiting_len)
            .field("recycling", &inner.recycling_len)
            .field("allocated", &inner.allocated)
            .finish()
    }
}

impl<'a, E: AutoResetEvent> EmulatedCondvar<'a, E> {
    pub fn new(user_lock: &'a Lock) -> Self {
        Self {
            user_lock,
            inner: Mutex::new(Inner {
                run_state: RunState::Running,
                waiting: EventList::new(),
                waiting_len: 0,
                recycling: EventList::new(),
                recycling_len: 0,
                allocated: 0,
            }),
        }
    }

    /// Number of events allocated over the lifetime of this instance.
    pub fn allocated_nodes(&self) -> usize {
        self.inner.lock().allocated
    }

    /// Number of events sitting idle in the recycling pool.
    pub fn recycled_nodes(&self) -> usize {
        self.inner.lock().recycling_len
    }

    /// Number of threads registered as waiting and not yet signaled.
    pub fn waiting_nodes(&self) -> usize {
        self.inner.lock().waiting_len
    }

    fn wait_for(&self, timeout: Option<Duration>) -> WaitTimeoutResult {
        restrictions::assert_wait_allowed();
        self.user_lock.assert_acquired();

        let node = {
            let mut inner = self.inner.lock();
            if inner.run_state != RunState::Running {
                // Destruction in progress.
                return WaitTimeoutResult(false);
            }
            inner.get_event_for_waiting()
        };

        // SAFETY: nodes are only freed when `self` is dropped, which can't
        // happen while this call borrows it.
        let event = unsafe { EventNode::event(node) };

        let signaled = {
            let _unlocked = AutoUnlock::new(self.user_lock);
            let signaled = event.wait(timeout);

            // Recycle as soon as possible to keep the window for a stale
            // set() on a reused event small.
            let mut inner = self.inner.lock();
            unsafe { inner.recycle_event(node) };
            signaled
        };

        WaitTimeoutResult(!signaled)
    }
}

impl<E: AutoResetEvent> RawCondvar for EmulatedCondvar<'_, E> {
    fn wait(&self) {
        self.wait_for(None);
    }

    fn timed_wait(&self, max_time: Duration) -> WaitTimeoutResult {
        self.wait_for(time::timeout(max_time))
    }

    /// Wakes the thread that started waiting most recently (LIFO).
    fn signal(&self) {
        let node = {
            let mut inner = self.inner.lock();
            match inner.pop_waiting() {
                Some(node) => node,
                None => return,
            }
        };

        // Set outside the private lock to keep it out of the kernel.
        unsafe { EventNode::event(node) }.set();
    }

    /// Wakes every thread waiting before the call. Threads which start
    /// waiting while the events are being set are left alone.
    fn broadcast(&self) {
        let mut nodes = Vec::new();
        {
            let mut inner = self.inner.lock();
            while let Some(node) = inner.pop_waiting() {
                nodes.push(node);
            }
        }

        // Popping reverses the drain, so the oldest waiter is set first.
        while let Some(node) = nodes.pop() {
            unsafe { EventNode::event(node) }.set();
        }
    }
}

impl<E: AutoResetEvent> Drop for EmulatedCondvar<'_, E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<E: AutoResetEvent> EmulatedCondvar<'_, E> {
    /// Refuse new waits, then give threads still holding an event a bounded
    /// chance to hand it back.
    fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.run_state = RunState::Shutdown;

        // Every allocated event should be back in the pool. If not, some
        // thread is still between its event wait and recycling it; wake
        // everyone and give them a chance to reach the private lock.
        if inner.recycling_len != inner.allocated {
            warn!(
                allocated = inner.allocated,
                recycled = inner.recycling_len,
                "condition variable destroyed with threads still waiting"
            );
        }

        for _ in 0..GRACE_ROUNDS {
            if inner.recycling_len == inner.allocated {
                break;
            }
            MutexGuard::unlocked(&mut inner, || {
                self.broadcast();
                thread::sleep(GRACE_PERIOD);
            });
        }

        debug_assert_eq!(
            inner.recycling_len, inner.allocated,
            "condition variable destroyed with threads still waiting"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_utils::thread::scope;
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Instant,
    };

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let started = Instant::now();
        while !condition() {
            assert!(
                started.elapsed() < Duration::from_secs(10),
                "condition not reached in time"
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    impl<E: AutoResetEvent> EmulatedCondvar<'_, E> {
        fn is_consistent(&self) -> bool {
            let inner = self.inner.lock();
            inner.waiting.is_consistent()
                && inner.recycling.is_consistent()
                && inner.recycling.len() == inner.recycling_len
                && inner.waiting.len() == inner.waiting_len
        }
    }

    #[test]
    fn signal_without_waiters_is_noop() {
        let lock = Lock::new();
        let cv = EmulatedCondvar::<OsEvent>::new(&lock);
        cv.signal();
        cv.broadcast();
        assert_eq!(cv.allocated_nodes(), 0);
        assert!(cv.is_consistent());
    }

    #[test]
    fn timeout_recycles_node() {
        let lock = Lock::new();
        let cv = EmulatedCondvar::<OsEvent>::new(&lock);

        let _held = lock.lock();
        for _ in 0..3 {
            assert!(cv.timed_wait(Duration::from_millis(5)).timed_out());
            lock.assert_acquired();
        }

        assert_eq!(cv.allocated_nodes(), 1);
        assert_eq!(cv.recycled_nodes(), 1);
        assert_eq!(cv.waiting_nodes(), 0);
        assert!(cv.is_consistent());
    }

    #[test]
    fn concurrent_waiters_allocate_distinct_nodes() {
        const WAITERS: usize = 4;

        let lock = Lock::new();
        let cv = EmulatedCondvar::<OsEvent>::new(&lock);
        let released = AtomicBool::new(false);

        scope(|s| {
            for _ in 0..WAITERS {
                s.spawn(|_| {
                    let _held = lock.lock();
                    while !released.load(Ordering::Relaxed) {
                        cv.wait();
                    }
                });
            }

            wait_until(|| cv.waiting_nodes() == WAITERS);
            assert_eq!(cv.allocated_nodes(), WAITERS);

            let _held = lock.lock();
            released.store(true, Ordering::Relaxed);
            cv.broadcast();
        })
        .unwrap();

        assert_eq!(cv.recycled_nodes(), WAITERS);
        assert!(cv.is_consistent());
    }

    #[test]
    fn timeout_races_signal() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 200;

        let lock = Lock::new();
        let cv = EmulatedCondvar::<OsEvent>::new(&lock);
        let done = AtomicUsize::new(0);

        scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|_| {
                    for _ in 0..ROUNDS {
                        let _held = lock.lock();
                        cv.timed_wait(Duration::from_micros(100));
                    }
                    done.fetch_add(1, Ordering::Release);
                });
            }

            // Keep picking waiters right around when their timeouts fire.
            while done.load(Ordering::Acquire) != THREADS {
                cv.signal();
                assert!(cv.is_consistent());
                thread::yield_now();
            }
        })
        .unwrap();

        assert_eq!(cv.waiting_nodes(), 0);
        assert_eq!(cv.recycled_nodes(), cv.allocated_nodes());
        assert!(cv.allocated_nodes() <= THREADS);
        assert!(cv.is_consistent());
    }

    #[test]
    fn wait_after_shutdown_returns_immediately() {
        let lock = Lock::new();
        let cv = EmulatedCondvar::<OsEvent>::new(&lock);
        cv.inner.lock().run_state = RunState::Shutdown;

        let _held = lock.lock();
        let result = cv.timed_wait(time::FOREVER);

        assert!(!result.timed_out());
        assert_eq!(cv.allocated_nodes(), 0);
        assert_eq!(cv.waiting_nodes(), 0);
        lock.assert_acquired();
    }

    #[test]
    fn shutdown_releases_straggler() {
        let lock = Lock::new();
        let cv = EmulatedCondvar::<OsEvent>::new(&lock);
        let node = cv.inner.lock().get_event_for_waiting();
        let node_addr = node.as_ptr() as usize;
        let finished = AtomicBool::new(false);

        scope(|s| {
            // A waiter past its registration but not yet back in the pool.
            let straggler = s.spawn(|_| {
                let node = NonNull::new(node_addr as *mut EventNode<OsEvent>).unwrap();
                assert!(unsafe { EventNode::event(node) }.wait(None));
                unsafe { cv.inner.lock().recycle_event(node) };
                finished.store(true, Ordering::Relaxed);
            });

            cv.shutdown();
            assert_eq!(cv.recycled_nodes(), cv.allocated_nodes());

            straggler.join().unwrap();
            assert!(finished.load(Ordering::Relaxed));
        })
        .unwrap();

        assert_eq!(cv.inner.lock().run_state, RunState::Shutdown);
        assert_eq!(cv.waiting_nodes(), 0);
        assert!(cv.is_consistent());
        drop(cv);
    }

    /// An event whose `set()` blocks while the test holds [`SET_GATE`].
    #[derive(Default)]
    struct GatedEvent(OsEvent);

    static SET_GATE: Mutex<()> = parking_lot::const_mutex(());

    unsafe impl AutoResetEvent for GatedEvent {
        fn set(&self) {
            let _gate = SET_GATE.lock();
            self.0.set();
        }

        fn wait(&self, timeout: Option<Duration>) -> bool {
            self.0.wait(timeout)
        }
    }

    #[test]
    fn broadcast_wakes_only_earlier_waiters() {
        let lock = Lock::new();
        let cv = EmulatedCondvar::<GatedEvent>::new(&lock);
        let early_woken = AtomicUsize::new(0);
        let late_woken = AtomicBool::new(false);

        scope(|s| {
            for _ in 0..2 {
                s.spawn(|_| {
                    let _held = lock.lock();
                    cv.wait();
                    early_woken.fetch_add(1, Ordering::Relaxed);
                });
            }
            wait_until(|| cv.waiting_nodes() == 2);

            // Let broadcast() take its snapshot, then stall it on set().
            let gate = SET_GATE.lock();
            let broadcaster = s.spawn(|_| cv.broadcast());
            wait_until(|| cv.waiting_nodes() == 0);

            let late = s.spawn(|_| {
                let _held = lock.lock();
                cv.wait();
                late_woken.store(true, Ordering::Relaxed);
            });
            wait_until(|| cv.waiting_nodes() == 1);

            drop(gate);
            broadcaster.join().unwrap();
            wait_until(|| early_woken.load(Ordering::Relaxed) == 2);

            thread::sleep(Duration::from_millis(50));
            assert!(!late_woken.load(Ordering::Relaxed));
            assert_eq!(cv.waiting_nodes(), 1);

            cv.signal();
            late.join().unwrap();
            assert!(late_woken.load(Ordering::Relaxed));
        })
        .unwrap();

        assert!(cv.is_consistent());
    }
}
