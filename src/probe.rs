//! Process-wide choice between the native and the emulated backend.
//!
//! The decision is a property of the deployment (build features and
//! environment), not of any single condition variable, so it is computed the
//! first time it's needed and reused for the rest of the process.

use core::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU8, Ordering},
};
use std::env;
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable consulted once per process by [`selected_backend`].
pub const BACKEND_ENV: &str = "YAAR_CONDVAR_BACKEND";

/// The two implementations a [`ConditionVariable`] can be built on.
///
/// [`ConditionVariable`]: crate::ConditionVariable
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// The platform condition variable (`parking_lot::Condvar`).
    Native,
    /// Per-waiter auto-reset events managed under a private lock.
    Emulated,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Emulated => "emulated",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown condition variable backend {0:?}, expected \"native\" or \"emulated\"")]
pub struct ParseBackendError(String);

impl FromStr for BackendKind {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("native") {
            Ok(Self::Native)
        } else if s.eq_ignore_ascii_case("emulated") {
            Ok(Self::Emulated)
        } else {
            Err(ParseBackendError(s.to_owned()))
        }
    }
}

/// Whether this build can use the native backend at all.
#[inline]
pub fn native_available() -> bool {
    cfg!(feature = "native")
}

const UNINIT: u8 = 0;
const NATIVE: u8 = 1;
const EMULATED: u8 = 2;

static SELECTED: AtomicU8 = AtomicU8::new(UNINIT);

/// The backend every [`ConditionVariable::new`] in this process uses.
///
/// [`ConditionVariable::new`]: crate::ConditionVariable::new
pub fn selected_backend() -> BackendKind {
    match SELECTED.load(Ordering::Acquire) {
        NATIVE => BackendKind::Native,
        EMULATED => BackendKind::Emulated,
        _ => probe_slow(),
    }
}

#[cold]
fn probe_slow() -> BackendKind {
    let configured = env::var(BACKEND_ENV).ok();
    let kind = decide(native_available(), configured.as_deref());

    // Racing probers compute the same answer; the first one to publish wins.
    let state = match kind {
        BackendKind::Native => NATIVE,
        BackendKind::Emulated => EMULATED,
    };
    match SELECTED.compare_exchange(UNINIT, state, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            debug!(backend = %kind, native_available = native_available(), "condition variable backend selected");
            kind
        }
        Err(NATIVE) => BackendKind::Native,
        Err(_) => BackendKind::Emulated,
    }
}

/// Pick a backend from the build capability and the configured override.
pub fn decide(native_available: bool, configured: Option<&str>) -> BackendKind {
    let requested = match configured.map(str::parse::<BackendKind>) {
        None => None,
        Some(Ok(kind)) => Some(kind),
        Some(Err(error)) => {
            warn!(%error, env = BACKEND_ENV, "ignoring backend override");
            None
        }
    };

    match requested {
        Some(BackendKind::Emulated) => BackendKind::Emulated,
        Some(BackendKind::Native) | None if native_available => BackendKind::Native,
        Some(BackendKind::Native) => {
            warn!(env = BACKEND_ENV, "native backend requested but not available in this build");
            BackendKind::Emulated
        }
        None => BackendKind::Emulated,
    }
}
