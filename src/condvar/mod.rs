mod emulated;
mod native;

pub use self::{emulated::EmulatedCondvar, native::NativeCondvar};

use crate::{
    event::OsEvent,
    lock::Lock,
    probe::{self, BackendKind},
};
use core::{fmt, time::Duration};
use tracing::debug;

/// The operations shared by both condition variable backends.
///
/// Every wait must be called with the backend's [`Lock`] held by the calling
/// thread. The lock is released while blocked and held again on return.
/// Wake ups can be spurious, so callers re-check their predicate in a loop.
pub trait RawCondvar {
    /// Block until signaled.
    fn wait(&self);

    /// Block until signaled or until `max_time` elapses.
    ///
    /// [`FOREVER`](crate::time::FOREVER) waits without a timeout.
    fn timed_wait(&self, max_time: Duration) -> WaitTimeoutResult;

    /// Wake at most one waiting thread.
    fn signal(&self);

    /// Wake every thread waiting at the time of the call.
    fn broadcast(&self);
}

/// Whether a [`timed_wait`] returned because its timeout elapsed.
///
/// This is a hint only: a waiter signaled right at its deadline may report
/// either outcome.
///
/// [`timed_wait`]: RawCondvar::timed_wait
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WaitTimeoutResult(pub(crate) bool);

impl WaitTimeoutResult {
    #[inline]
    pub fn timed_out(self) -> bool {
        self.0
    }
}

/// A condition variable bound to a caller supplied [`Lock`].
///
/// The backend is picked when the condition variable is created: the native
/// one when the process-wide probe allows it, the event based emulation
/// otherwise (see [`probe::selected_backend`]). Both behave the same to
/// callers, except that the emulation wakes waiters in LIFO order on
/// [`signal`](Self::signal).
pub struct ConditionVariable<'a> {
    kind: BackendKind,
    backend: Box<dyn RawCondvar + Send + Sync + 'a>,
}

impl fmt::Debug for ConditionVariable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionVariable")
            .field("backend", &self.kind)
            .finish()
    }
}

impl<'a> ConditionVariable<'a> {
    pub fn new(user_lock: &'a Lock) -> Self {
        Self::with_backend(user_lock, probe::selected_backend())
    }

    /// Create a condition variable on a specific backend, bypassing the
    /// process-wide probe.
    ///
    /// Asking for [`BackendKind::Native`] in a build without the `native`
    /// feature yields the emulated backend.
    pub fn with_backend(user_lock: &'a Lock, kind: BackendKind) -> Self {
        let kind = match kind {
            BackendKind::Native if !probe::native_available() => {
                debug!("native condition variable unavailable, using emulation");
                BackendKind::Emulated
            }
            kind => kind,
        };

        let backend: Box<dyn RawCondvar + Send + Sync + 'a> = match kind {
            BackendKind::Native => Box::new(NativeCondvar::new(user_lock)),
            BackendKind::Emulated => Box::new(EmulatedCondvar::<OsEvent>::new(user_lock)),
        };

        Self { kind, backend }
    }

    /// The backend chosen at construction.
    pub fn backend(&self) -> BackendKind {
        self.kind
    }

    /// Release the lock, block until signaled, then re-acquire the lock.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock, or in debug
    /// builds if waiting was disallowed on this thread.
    pub fn wait(&self) {
        self.backend.wait()
    }

    /// Like [`wait`](Self::wait), giving up after `max_time`.
    ///
    /// Passing [`FOREVER`](crate::time::FOREVER) is the same as calling
    /// `wait`.
    pub fn timed_wait(&self, max_time: Duration) -> WaitTimeoutResult {
        self.backend.timed_wait(max_time)
    }

    /// Wake at most one waiting thread. Does nothing if none are waiting.
    pub fn signal(&self) {
        self.backend.signal()
    }

    /// Wake every thread that was waiting when this was called.
    pub fn broadcast(&self) {
        self.backend.broadcast()
    }
}
