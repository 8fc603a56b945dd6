//! Fiber management and execution context.
//!
//! This module provides lightweight cooperative execution contexts (fibers)
//! multiplexed onto the host thread. A fiber owns a fixed-size stack and a
//! starting closure; all scheduling is explicit through [`Fiber::yield_now`],
//! [`Fiber::park`], [`FiberHandle::unpark`] and [`Fiber::exit`].

use crate::arch::{self, StackPointer};
use crate::sched::scheduler;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// The fixed stack size of a user fiber.
pub const STACK_SIZE: usize = 16 * 4096;

/// A non-owning handle to a fiber.
///
/// Handles are how fibers appear in the ready queue and in synchronizer wait
/// lists; the fiber record itself owns its stack and closure. A handle stays
/// valid from [`Fiber::spawn`] until the fiber exits, and a parked fiber
/// cannot exit, so a handle held by a wait list never dangles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FiberHandle(pub(crate) *mut Fiber);

impl FiberHandle {
    pub(crate) fn null() -> Self {
        FiberHandle(ptr::null_mut())
    }

    pub(crate) fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Returns the fiber's id, unique for the lifetime of the runtime.
    pub fn id(&self) -> u64 {
        assert!(!self.is_null(), "id() on a null fiber handle");
        // SAFETY: a non-null handle references a live fiber record.
        unsafe { (*self.0).id }
    }

    /// Makes a parked (or freshly created) fiber eligible to run by placing
    /// it at the tail of the ready queue.
    ///
    /// The target must not be running and must not already be in the ready
    /// queue; unparking a fiber that was never parked corrupts the
    /// scheduler's queues.
    pub fn unpark(&self) {
        assert!(!self.is_null(), "unpark of a null fiber handle");
        let sched = scheduler();
        // SAFETY: the scheduler is thread-local and no other fiber makes
        // progress while we mutate it.
        unsafe {
            assert!(
                *self != (*sched).running,
                "unpark of the running fiber {}",
                self.id()
            );
            debug_assert!(
                !(*sched).ready.contains(self),
                "unpark of an already ready fiber {}",
                self.id()
            );
            (*sched).ready.push_back(*self);
            #[cfg(feature = "metrics")]
            {
                (*sched).metrics.unparks += 1;
            }
        }
    }
}

/// A lightweight cooperatively scheduled user thread.
///
/// The distinguished *main fiber* represents the host thread itself: it owns
/// no stack (`stack` is `None`) and is switched back in when the ready queue
/// runs dry, which is how [`Scheduler::run`](crate::Scheduler::run) returns.
pub struct Fiber {
    /// Monotonically increasing id, assigned at creation.
    pub(crate) id: u64,
    /// The fiber's stack. `None` for the main fiber.
    pub(crate) stack: Option<Box<[u8]>>,
    /// Recorded stack pointer while suspended. Stale while running.
    pub(crate) context: StackPointer,
    /// The starting closure, taken by the trampoline on first run.
    pub(crate) entry: Option<Box<dyn FnOnce() + 'static>>,
}

impl Fiber {
    /// Creates a fiber that will run `f`, placing it at the tail of the
    /// ready queue. May be called before the scheduler starts or from a
    /// running fiber.
    ///
    /// # Example
    ///
    /// ```
    /// use cofiber::{Fiber, Scheduler};
    ///
    /// Fiber::spawn(|| println!("hello from a fiber"));
    /// Scheduler::run();
    /// ```
    pub fn spawn<F>(f: F)
    where
        F: FnOnce() + 'static,
    {
        let sched = scheduler();
        // SAFETY: thread-local scheduler state, mutated only here and now.
        let id = unsafe {
            (*sched).next_id += 1;
            (*sched).fiber_count += 1;
            #[cfg(feature = "metrics")]
            {
                (*sched).metrics.fibers_spawned += 1;
            }
            (*sched).next_id
        };

        let mut stack = vec![0u8; STACK_SIZE].into_boxed_slice();
        // SAFETY: one-past-the-end of the owned stack allocation; seed_frame
        // writes the synthetic first frame strictly below it.
        let context = unsafe {
            let top = stack.as_mut_ptr().add(STACK_SIZE);
            arch::seed_frame(top, trampoline as usize)
        };

        let fiber = Box::new(Fiber {
            id,
            stack: Some(stack),
            context,
            entry: Some(Box::new(f)),
        });

        // The record now owns itself; queues and wait lists only ever hold
        // handles. Reclaimed by destroy_record when the fiber exits.
        FiberHandle(Box::into_raw(fiber)).unpark();
    }

    /// Returns the handle of the running fiber.
    pub fn current() -> FiberHandle {
        let sched = scheduler();
        // SAFETY: thread-local scheduler state.
        let current = unsafe { (*sched).running };
        assert!(!current.is_null(), "no fiber is running on this thread");
        current
    }

    /// Relinquishes the processor to the first fiber in the ready queue,
    /// placing the caller at the tail. Returns immediately if no other fiber
    /// is ready.
    pub fn yield_now() {
        let sched = scheduler();
        // SAFETY: thread-local scheduler state; the switch target is a live
        // fiber popped from the ready queue.
        unsafe {
            let current = (*sched).running;
            assert!(!current.is_null(), "yield outside a running scheduler");
            if (*sched).ready.is_empty() {
                return;
            }
            (*sched).ready.push_back(current);
            let next = (*sched).find_next();
            #[cfg(feature = "metrics")]
            {
                (*sched).metrics.yields += 1;
            }
            switch_to(current, next);
        }
    }

    /// Suspends the running fiber and switches to the next ready fiber, or
    /// to the main fiber if none is ready.
    ///
    /// The caller is responsible for having placed itself in some wait list
    /// first; a fiber that parks without arranging to be unparked stays
    /// parked forever and its stack is never reclaimed.
    pub fn park() {
        let sched = scheduler();
        // SAFETY: thread-local scheduler state; see yield_now.
        unsafe {
            let current = (*sched).running;
            assert!(!current.is_null(), "park outside a running scheduler");
            let next = (*sched).find_next();
            #[cfg(feature = "metrics")]
            {
                (*sched).metrics.parks += 1;
            }
            switch_to(current, next);
        }
    }

    /// Terminates the running fiber. Its stack and record are freed after
    /// the switch to the next ready fiber (or to the main fiber, making the
    /// scheduler exit). Never returns.
    pub fn exit() -> ! {
        let sched = scheduler();
        // SAFETY: thread-local scheduler state; destroy_record runs on the
        // successor's stack, after the switch away from the dying one.
        unsafe {
            let current = (*sched).running;
            assert!(!current.is_null(), "exit outside a running scheduler");
            let next = (*sched).find_next();
            (*sched).note_switch(current);
            (*sched).running = next;
            arch::switch_and_destroy(current.0 as *mut u8, &(*next.0).context, destroy_record)
        }
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        let sched = scheduler();
        // SAFETY: thread-local scheduler state. Every record is dropped on
        // the thread whose scheduler counted it.
        unsafe {
            (*sched).fiber_count -= 1;
        }
    }
}

/// Selects `next` as the running fiber and context-switches into it.
///
/// # Safety
///
/// `current` must be the running fiber and `next` a live fiber whose context
/// was recorded by a previous switch out or by `seed_frame`.
pub(crate) unsafe fn switch_to(current: FiberHandle, next: FiberHandle) {
    let sched = scheduler();
    unsafe {
        (*sched).note_switch(current);
        (*sched).running = next;
        arch::switch(&mut (*current.0).context, &(*next.0).context);
    }
}

/// The function at which every fresh fiber first runs: invokes the starting
/// closure, then exits the fiber. A panic unwinding out of the closure is
/// arrested here and treated as termination.
extern "C" fn trampoline() -> ! {
    let current = Fiber::current();
    // SAFETY: the running fiber's record is live and only touched by itself.
    let entry = unsafe { (*current.0).entry.take() };
    let entry = entry.expect("fresh fiber has no entry closure");

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "unknown panic payload"
        };
        eprintln!("fiber {} panicked: {}", current.id(), msg);
    }

    Fiber::exit()
}

/// Frees a terminated fiber's record and stack. Called from the context
/// switch primitive while already executing on the successor's stack.
extern "C" fn destroy_record(fiber: *mut u8) {
    // SAFETY: `fiber` is the pointer produced by Box::into_raw in spawn; it
    // is reclaimed exactly once, here.
    unsafe {
        #[cfg(feature = "metrics")]
        {
            (*scheduler()).metrics.fibers_completed += 1;
        }
        drop(Box::from_raw(fiber as *mut Fiber));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Scheduler;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn spawn_then_run_executes_the_closure() {
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();

        Fiber::spawn(move || ran_clone.set(true));
        Scheduler::run();

        assert!(ran.get());
        assert_eq!(Scheduler::fiber_count(), 0);
    }

    #[test]
    fn ids_increase_monotonically() {
        let ids = Rc::new(Cell::new((0u64, 0u64)));
        let outer = ids.clone();

        Fiber::spawn(move || {
            let first = Fiber::current().id();
            outer.set((first, 0));
            let inner = outer.clone();
            Fiber::spawn(move || {
                let (a, _) = inner.get();
                inner.set((a, Fiber::current().id()));
            });
        });
        Scheduler::run();

        let (first, second) = ids.get();
        assert!(second > first);
    }

    #[test]
    fn yield_with_empty_ready_queue_is_a_noop() {
        let rounds = Rc::new(Cell::new(0u32));
        let rounds_clone = rounds.clone();

        Fiber::spawn(move || {
            for _ in 0..100 {
                Fiber::yield_now();
                rounds_clone.set(rounds_clone.get() + 1);
            }
        });
        Scheduler::run();

        assert_eq!(rounds.get(), 100);
    }

    #[test]
    fn explicit_exit_skips_the_rest_of_the_closure() {
        let reached = Rc::new(Cell::new(false));
        let reached_clone = reached.clone();

        Fiber::spawn(move || {
            Fiber::exit();
            #[allow(unreachable_code)]
            reached_clone.set(true);
        });
        Scheduler::run();

        assert!(!reached.get());
        assert_eq!(Scheduler::fiber_count(), 0);
    }

    #[test]
    fn panicking_fiber_terminates_without_tearing_down_the_scheduler() {
        let survivor_ran = Rc::new(Cell::new(false));
        let survivor_clone = survivor_ran.clone();

        Fiber::spawn(|| panic!("boom"));
        Fiber::spawn(move || survivor_clone.set(true));
        Scheduler::run();

        assert!(survivor_ran.get());
        assert_eq!(Scheduler::fiber_count(), 0);
    }
}
