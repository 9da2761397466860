#![allow(dead_code)]

use std::{
    thread,
    time::{Duration, Instant},
};
use tracing_subscriber::EnvFilter;
use yaar_condvar::BackendKind;

pub const BACKENDS: [BackendKind; 2] = [BackendKind::Native, BackendKind::Emulated];

/// Route `tracing` output through the test harness' captured stdout.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds, failing the test after a generous bound.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let started = Instant::now();
    while !condition() {
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "timed out waiting for {}",
            what
        );
        thread::sleep(Duration::from_millis(1));
    }
}
