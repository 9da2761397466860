use criterion::{criterion_group, criterion_main, Criterion};
use crossbeam_utils::thread::scope;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time,
};
use yaar_condvar::{BackendKind, ConditionVariable, Lock};

const ROUND_TRIPS: u64 = 1_000;

/// Two threads handing a turn flag back and forth, one signal per hand-off.
fn ping_pong(kind: BackendKind, iters: u64) -> time::Duration {
    let lock = Lock::new();
    let cv = ConditionVariable::with_backend(&lock, kind);
    let ping = AtomicBool::new(true);
    let rounds = iters * ROUND_TRIPS;

    scope(|s| {
        s.spawn(|_| {
            for _ in 0..rounds {
                let _held = lock.lock();
                while ping.load(Ordering::Relaxed) {
                    cv.wait();
                }
                ping.store(true, Ordering::Relaxed);
                cv.signal();
            }
        });

        let start = time::Instant::now();
        for _ in 0..rounds {
            let _held = lock.lock();
            while !ping.load(Ordering::Relaxed) {
                cv.wait();
            }
            ping.store(false, Ordering::Relaxed);
            cv.signal();
        }
        start.elapsed()
    })
    .unwrap()
}

fn bench_ping_pong(c: &mut Criterion) {
    let mut group = c.benchmark_group("ping_pong");
    for &kind in [BackendKind::Native, BackendKind::Emulated].iter() {
        group.bench_function(kind.as_str(), |b| b.iter_custom(|iters| ping_pong(kind, iters)));
    }
    group.finish();
}

criterion_group!(benches, bench_ping_pong);
criterion_main!(benches);
