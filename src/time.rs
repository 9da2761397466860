//! Timeouts as seen by the condition variable and its events.

use core::time::Duration;

/// Passing this to [`timed_wait`] blocks until signaled, the same as [`wait`].
///
/// [`timed_wait`]: crate::ConditionVariable::timed_wait
/// [`wait`]: crate::ConditionVariable::wait
pub const FOREVER: Duration = Duration::MAX;

/// Millisecond count meaning "no timeout", matching Win32's `INFINITE`.
pub const INFINITE_MILLIS: u32 = u32::MAX;

/// Map the [`FOREVER`] sentinel to `None`.
#[inline]
pub fn timeout(duration: Duration) -> Option<Duration> {
    if duration == FOREVER {
        None
    } else {
        Some(duration)
    }
}

/// Convert a timeout to a millisecond count.
///
/// Finite timeouts saturate just below [`INFINITE_MILLIS`] so that a very
/// long wait never turns into an infinite one.
pub fn as_millis(timeout: Option<Duration>) -> u32 {
    match timeout {
        None => INFINITE_MILLIS,
        Some(timeout) => timeout
            .as_millis()
            .try_into()
            .unwrap_or(INFINITE_MILLIS - 1)
            .min(INFINITE_MILLIS - 1),
    }
}
