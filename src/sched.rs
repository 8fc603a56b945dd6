//! The cooperative scheduler.
//!
//! One scheduler exists per host thread, bound in a thread-local. It owns the
//! FIFO ready queue, the running-fiber handle and, while [`Scheduler::run`]
//! is executing, a handle to the stackless main fiber that represents the
//! host thread itself.

use crate::fiber::{switch_to, Fiber, FiberHandle};
#[cfg(feature = "metrics")]
use crate::metrics::{Metrics, MetricsSnapshot};
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ptr;
#[cfg(feature = "trace")]
use std::time::Instant;

thread_local! {
    static SCHEDULER: UnsafeCell<Scheduler> = UnsafeCell::new(Scheduler::new());
}

/// Returns a raw pointer to this thread's scheduler.
///
/// Raw access sidesteps RefCell borrows, which cannot be held across a
/// context switch: the fiber that would release the borrow is suspended.
/// Single-thread confinement makes the unsynchronized mutation sound; only
/// the running fiber touches this state, and nothing else makes progress
/// while it does.
pub(crate) fn scheduler() -> *mut Scheduler {
    SCHEDULER.with(|sched| sched.get())
}

/// Per-thread scheduler state.
///
/// Public interaction goes through the associated functions
/// ([`Scheduler::run`], [`Scheduler::fiber_count`], ...); fibers and
/// synchronizers reach the state itself through [`scheduler`].
pub struct Scheduler {
    /// The running fiber. Null outside `run`.
    pub(crate) running: FiberHandle,
    /// The main fiber proxying the host thread. Set only during `run`.
    pub(crate) main: FiberHandle,
    /// FIFO of runnable fibers. The next fiber to run is popped from the
    /// head; yielding and unparked fibers are pushed at the tail.
    pub(crate) ready: VecDeque<FiberHandle>,
    /// Number of live fiber records, the main fiber included while `run` is
    /// executing. Diagnostic only; `run` keys off the ready queue.
    pub(crate) fiber_count: usize,
    /// Seed for fiber ids.
    pub(crate) next_id: u64,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Metrics,
    /// When the current run slice began.
    #[cfg(feature = "trace")]
    pub(crate) slice_start: Instant,
}

impl Scheduler {
    fn new() -> Self {
        Scheduler {
            running: FiberHandle::null(),
            main: FiberHandle::null(),
            ready: VecDeque::new(),
            fiber_count: 0,
            next_id: 0,
            #[cfg(feature = "metrics")]
            metrics: Metrics::new(),
            #[cfg(feature = "trace")]
            slice_start: Instant::now(),
        }
    }

    /// Runs the scheduler. The host thread switches into the first ready
    /// fiber and resumes only when a scheduling decision finds the ready
    /// queue empty: every fiber has exited or parked. Returns immediately if
    /// nothing is ready.
    ///
    /// Fibers may still be parked on synchronizers when `run` returns; the
    /// synchronizers' destructors police that.
    ///
    /// # Example
    ///
    /// ```
    /// use cofiber::{Fiber, Scheduler};
    ///
    /// Fiber::spawn(|| println!("scheduled"));
    /// Scheduler::run();
    /// ```
    pub fn run() {
        let sched = scheduler();
        // SAFETY: thread-local state; the switch target is a live fiber
        // popped from the ready queue.
        unsafe {
            assert!(
                (*sched).running.is_null(),
                "a scheduler is already running on this thread"
            );

            if (*sched).ready.is_empty() {
                return;
            }

            // The main fiber borrows the host thread's own stack, so the
            // record owns none; its context is recorded into this very
            // frame by the switch below.
            (*sched).next_id += 1;
            (*sched).fiber_count += 1;
            let mut main_fiber = Fiber {
                id: (*sched).next_id,
                stack: None,
                context: ptr::null_mut(),
                entry: None,
            };
            (*sched).main = FiberHandle(&mut main_fiber);

            #[cfg(feature = "trace")]
            {
                (*sched).slice_start = Instant::now();
            }

            let next = (*sched).find_next();
            switch_to((*sched).main, next);

            // Back on the host stack: no runnable fibers remain.
            assert!((*sched).ready.is_empty());
            (*sched).running = FiberHandle::null();
            (*sched).main = FiberHandle::null();
        }
        // main_fiber drops here and leaves the count.
    }

    /// Number of live fibers. Zero when idle; during `run` it includes the
    /// main fiber and any fibers parked on synchronizers.
    pub fn fiber_count() -> usize {
        // SAFETY: thread-local state, read-only access.
        unsafe { (*scheduler()).fiber_count }
    }

    /// Whether a `run` invocation is active on this thread.
    pub fn is_running() -> bool {
        // SAFETY: thread-local state, read-only access.
        unsafe { !(*scheduler()).running.is_null() }
    }

    /// Snapshot of the scheduler's counters.
    #[cfg(feature = "metrics")]
    pub fn metrics() -> MetricsSnapshot {
        // SAFETY: thread-local state, read-only access.
        unsafe { (*scheduler()).metrics.snapshot() }
    }

    /// Returns and removes the first fiber in the ready queue, falling back
    /// to the main fiber so the scheduler can exit.
    pub(crate) fn find_next(&mut self) -> FiberHandle {
        self.ready.pop_front().unwrap_or(self.main)
    }

    /// Bookkeeping for a switch away from `prev`.
    #[allow(unused_variables)]
    pub(crate) fn note_switch(&mut self, prev: FiberHandle) {
        #[cfg(feature = "metrics")]
        {
            self.metrics.context_switches += 1;
        }
        #[cfg(feature = "trace")]
        {
            let now = Instant::now();
            crate::trace::record_event(
                "fiber",
                prev.id(),
                self.slice_start,
                now.duration_since(self.slice_start),
            );
            self.slice_start = now;
        }
    }
}
