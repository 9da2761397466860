use core::time::Duration;

/// A single-waiter event which resets itself when a wait consumes it.
///
/// An event starts out unset. [`set`] marks it set, waking the thread blocked
/// in [`wait`] if there is one. A wait returns as soon as the event is set and
/// leaves it unset again. Setting an event which is already set does nothing.
///
/// Constructing an event through [`Default`] acquires whatever OS resource
/// backs it; implementations panic if that fails as there is no way to
/// provide wake ups without one.
///
/// # Safety
///
/// Implementations must establish Release ordering in `set` and Acquire
/// ordering in a `wait` which observes it, and must tolerate `set` racing
/// with a `wait` that is timing out.
///
/// [`set`]: AutoResetEvent::set
/// [`wait`]: AutoResetEvent::wait
pub unsafe trait AutoResetEvent: Default + Send + Sync {
    /// Set the event, waking up the thread waiting on it if any.
    fn set(&self);

    /// Block until the event is set or the timeout elapses.
    ///
    /// `None` waits forever. Returns `true` if the set state was consumed
    /// and `false` if the wait timed out.
    fn wait(&self, timeout: Option<Duration>) -> bool;
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux::Event as SystemEvent;

#[cfg(all(unix, not(target_os = "linux")))]
mod posix;
#[cfg(all(unix, not(target_os = "linux")))]
use posix::Event as SystemEvent;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows::Event as SystemEvent;

/// The default [`AutoResetEvent`] using the OS primitives.
#[derive(Default)]
pub struct OsEvent(SystemEvent);

unsafe impl Send for OsEvent {}
unsafe impl Sync for OsEvent {}

unsafe impl AutoResetEvent for OsEvent {
    #[inline]
    fn set(&self) {
        self.0.set()
    }

    #[inline]
    fn wait(&self, timeout: Option<Duration>) -> bool {
        self.0.wait(timeout)
    }
}
