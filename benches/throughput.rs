//! Throughput benchmark using criterion.
//!
//! Measures fiber throughput when spawning large batches of tiny fibers and
//! when pushing messages through a mutex+semaphore mailbox.

use cofiber::{Fiber, Mutex, Scheduler, Semaphore};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

const FIBER_COUNT: usize = 1000;

/// Benchmark spawning and draining a batch of trivial fibers. The batch is
/// created up front, so its stacks (64 KiB each) are all resident at once.
fn bench_spawn_fiber_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.throughput(Throughput::Elements(FIBER_COUNT as u64));
    group.sample_size(10); // Reduce samples since each iteration is expensive

    group.bench_function(BenchmarkId::new("spawn_fibers", FIBER_COUNT), |b| {
        b.iter(|| {
            for _ in 0..FIBER_COUNT {
                Fiber::spawn(|| {
                    std::hint::black_box(1 + 1);
                });
            }
            Scheduler::run();
        })
    });

    group.finish();
}

/// Benchmark message throughput through a mailbox at several queue depths.
fn bench_mailbox_throughput(c: &mut Criterion) {
    const MESSAGES: u32 = 5000;

    let mut group = c.benchmark_group("mailbox_throughput");
    group.throughput(Throughput::Elements(MESSAGES as u64));
    group.sample_size(10);

    for producers in [1u32, 2, 4] {
        group.bench_function(BenchmarkId::new("producers", producers), |b| {
            b.iter(|| {
                let lock = Rc::new(Mutex::new());
                let available = Rc::new(Semaphore::new());
                let queue = Rc::new(RefCell::new(VecDeque::new()));

                let per_producer = MESSAGES / producers;
                for _ in 0..producers {
                    let lock = lock.clone();
                    let available = available.clone();
                    let queue = queue.clone();
                    Fiber::spawn(move || {
                        for message in 0..per_producer {
                            lock.acquire();
                            queue.borrow_mut().push_back(message);
                            lock.release();
                            available.post();
                        }
                    });
                }

                let lock_clone = lock.clone();
                let available_clone = available.clone();
                let queue_clone = queue.clone();
                Fiber::spawn(move || {
                    for _ in 0..per_producer * producers {
                        available_clone.wait();
                        lock_clone.acquire();
                        let message = queue_clone.borrow_mut().pop_front();
                        lock_clone.release();
                        std::hint::black_box(message);
                    }
                });

                Scheduler::run();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spawn_fiber_batch, bench_mailbox_throughput);
criterion_main!(benches);
