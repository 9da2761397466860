//! A condition variable over an explicitly acquired [`Lock`].
//!
//! [`ConditionVariable`] picks one of two backends once per process:
//!
//! * the native one, which waits on a [`parking_lot::Condvar`] directly on
//!   the lock's mutex, or
//! * an emulation built from a private lock and one auto-reset
//!   [`event`](crate::event) per waiting thread, for when the native one is
//!   disabled (`native` feature off, or `YAAR_CONDVAR_BACKEND=emulated`).
//!
//! ```
//! use crossbeam_utils::thread::scope;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use yaar_condvar::{ConditionVariable, Lock};
//!
//! let lock = Lock::new();
//! let cv = ConditionVariable::new(&lock);
//! let ready = AtomicBool::new(false);
//!
//! scope(|s| {
//!     s.spawn(|_| {
//!         let _held = lock.lock();
//!         ready.store(true, Ordering::Relaxed);
//!         cv.signal();
//!     });
//!
//!     let _held = lock.lock();
//!     while !ready.load(Ordering::Relaxed) {
//!         cv.wait();
//!     }
//! })
//! .unwrap();
//! ```

#![warn(rust_2018_idioms)]

pub mod event;
pub mod lock;
pub mod probe;
pub mod restrictions;
pub mod time;

mod condvar;

pub use self::{
    condvar::{ConditionVariable, EmulatedCondvar, NativeCondvar, RawCondvar, WaitTimeoutResult},
    lock::{AutoLock, AutoUnlock, Lock},
    probe::BackendKind,
};
