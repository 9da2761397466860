//! Per-thread permission to block inside a wait.
//!
//! Threads that must stay responsive (event loops, UI threads) can opt out of
//! blocking. Every wait on a [`ConditionVariable`] asserts the permission in
//! debug builds; release builds skip the check entirely.
//!
//! [`ConditionVariable`]: crate::ConditionVariable

use std::{cell::Cell, marker::PhantomData};

thread_local!(static WAIT_DISALLOWED: Cell<bool> = Cell::new(false));

/// Allow or disallow blocking waits on the current thread.
///
/// Returns whether waiting was allowed before the call.
pub fn set_wait_allowed(allowed: bool) -> bool {
    WAIT_DISALLOWED.with(|disallowed| !disallowed.replace(!allowed))
}

pub fn is_wait_allowed() -> bool {
    WAIT_DISALLOWED.with(|disallowed| !disallowed.get())
}

#[inline]
pub(crate) fn assert_wait_allowed() {
    #[cfg(debug_assertions)]
    assert!(
        is_wait_allowed(),
        "blocking wait on a thread that disallows waiting"
    );
}

/// Disallows waiting on the current thread until dropped.
pub struct ScopedDisallowWait {
    was_allowed: bool,
    _not_send: PhantomData<*const ()>,
}

impl Default for ScopedDisallowWait {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopedDisallowWait {
    pub fn new() -> Self {
        Self {
            was_allowed: set_wait_allowed(false),
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScopedDisallowWait {
    fn drop(&mut self) {
        set_wait_allowed(self.was_allowed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_disallow_restores() {
        assert!(is_wait_allowed());
        {
            let _outer = ScopedDisallowWait::new();
            assert!(!is_wait_allowed());
            {
                let _inner = ScopedDisallowWait::new();
                assert!(!is_wait_allowed());
            }
            assert!(!is_wait_allowed());
        }
        assert!(is_wait_allowed());
    }

    #[test]
    fn set_returns_previous() {
        assert!(set_wait_allowed(false));
        assert!(!set_wait_allowed(true));
        assert!(is_wait_allowed());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "disallows waiting")]
    fn assert_panics_when_disallowed() {
        let _guard = ScopedDisallowWait::new();
        assert_wait_allowed();
    }
}
