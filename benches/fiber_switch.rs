//! Fiber switch latency benchmark using criterion.
//!
//! Measures the raw context-switch cost: two fibers yielding to each other
//! in a tight loop, so each iteration is two switches plus queue traffic.

use cofiber::{Fiber, Scheduler};
use criterion::{Criterion, criterion_group, criterion_main};

const PING_PONGS: u32 = 1000;

/// One scheduler run of two fibers trading `PING_PONGS` yields each.
#[inline(never)]
fn ping_pong_run() {
    for _ in 0..2 {
        Fiber::spawn(|| {
            for _ in 0..PING_PONGS {
                Fiber::yield_now();
            }
        });
    }
    Scheduler::run();
}

/// Benchmark yield-driven switching between two fibers.
fn bench_yield_ping_pong(c: &mut Criterion) {
    // Warmup
    for _ in 0..10 {
        ping_pong_run();
    }

    c.bench_function("yield_ping_pong", |b| {
        b.iter(|| {
            ping_pong_run();
        })
    });
}

/// Benchmark the full create-run-exit round trip of a single fiber.
fn bench_spawn_and_exit(c: &mut Criterion) {
    c.bench_function("spawn_and_exit", |b| {
        b.iter(|| {
            Fiber::spawn(std::hint::black_box(|| {}));
            Scheduler::run();
        })
    });
}

criterion_group!(benches, bench_yield_ping_pong, bench_spawn_and_exit);
criterion_main!(benches);
