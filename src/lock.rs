//! The caller-side lock a [`ConditionVariable`] is bound to.
//!
//! [`ConditionVariable`]: crate::ConditionVariable

use core::{
    cell::Cell,
    fmt,
    marker::PhantomData,
    mem,
    sync::atomic::{AtomicUsize, Ordering},
};

type RawLock = lock_api::Mutex<parking_lot::RawMutex, ()>;

pub(crate) type RawLockGuard<'a> = lock_api::MutexGuard<'a, parking_lot::RawMutex, ()>;

const NO_OWNER: usize = 0;

/// A non-recursive mutual exclusion lock that guards no data of its own.
///
/// Unlike [`parking_lot::Mutex`] the lock is acquired and released
/// explicitly, which lets a condition variable hold a reference to it and
/// drop it for the duration of a wait. The owning thread is recorded so that
/// releasing a lock the caller does not hold is caught instead of corrupting
/// the mutex state.
pub struct Lock {
    mutex: RawLock,
    owner: AtomicUsize,
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_held_by_current_thread() {
            "held_by_current"
        } else if self.mutex.is_locked() {
            "locked"
        } else {
            "unlocked"
        };

        f.debug_struct("Lock").field("state", &state).finish()
    }
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            mutex: RawLock::const_new(<parking_lot::RawMutex as lock_api::RawMutex>::INIT, ()),
            owner: AtomicUsize::new(NO_OWNER),
        }
    }

    /// Block until the lock is acquired by the current thread.
    pub fn acquire(&self) {
        debug_assert!(
            !self.is_held_by_current_thread(),
            "Lock::acquire() called recursively"
        );

        mem::forget(self.mutex.lock());
        self.check_unheld_and_mark();
    }

    /// Acquire the lock only if no other thread holds it.
    pub fn try_acquire(&self) -> bool {
        match self.mutex.try_lock() {
            Some(guard) => {
                mem::forget(guard);
                self.check_unheld_and_mark();
                true
            }
            None => false,
        }
    }

    /// Release a lock previously acquired by the current thread.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock.
    pub fn release(&self) {
        self.check_held_and_unmark();

        // SAFETY: the ownership mark proved the current thread locked the mutex.
        unsafe { self.mutex.force_unlock() };
    }

    /// Panics if the current thread does not hold the lock.
    pub fn assert_acquired(&self) {
        assert!(
            self.is_held_by_current_thread(),
            "Lock is not held by the current thread"
        );
    }

    /// Acquire the lock for the lifetime of the returned guard.
    pub fn lock(&self) -> AutoLock<'_> {
        AutoLock::new(self)
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == current_thread()
    }

    /// Clear the ownership mark right before the underlying mutex is unlocked.
    pub(crate) fn check_held_and_unmark(&self) {
        let me = current_thread();
        if let Err(owner) =
            self.owner
                .compare_exchange(me, NO_OWNER, Ordering::Relaxed, Ordering::Relaxed)
        {
            panic!(
                "Lock released by a thread that does not hold it (owner: {:#x})",
                owner
            );
        }
    }

    /// Set the ownership mark right after the underlying mutex is locked.
    pub(crate) fn check_unheld_and_mark(&self) {
        let previous = self.owner.swap(current_thread(), Ordering::Relaxed);
        debug_assert_eq!(previous, NO_OWNER, "Lock acquired while still marked held");
    }

    /// Materialize a guard for the mutex the current thread already holds.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock and must `mem::forget` the guard instead
    /// of dropping it, leaving the lock held exactly as before.
    pub(crate) unsafe fn make_guard_unchecked(&self) -> RawLockGuard<'_> {
        self.mutex.make_guard_unchecked()
    }
}

/// An id for the calling thread, never handed out twice in this process.
fn current_thread() -> usize {
    static NEXT_ID: AtomicUsize = AtomicUsize::new(NO_OWNER + 1);
    thread_local!(static THREAD_ID: Cell<usize> = Cell::new(NO_OWNER));

    THREAD_ID.with(|id| {
        if id.get() == NO_OWNER {
            id.set(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

/// Holds a [`Lock`] from construction until drop.
#[must_use = "if unused the Lock will immediately be released"]
pub struct AutoLock<'a> {
    lock: &'a Lock,
    _not_send: PhantomData<*const ()>,
}

impl<'a> AutoLock<'a> {
    pub fn new(lock: &'a Lock) -> Self {
        lock.acquire();
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl Drop for AutoLock<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Releases a held [`Lock`] from construction until drop, then re-acquires it.
#[must_use = "if unused the Lock will immediately be re-acquired"]
pub struct AutoUnlock<'a> {
    lock: &'a Lock,
    _not_send: PhantomData<*const ()>,
}

impl<'a> AutoUnlock<'a> {
    pub fn new(lock: &'a Lock) -> Self {
        lock.release();
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl Drop for AutoUnlock<'_> {
    fn drop(&mut self) {
        self.lock.acquire();
    }
}
