//! Counting semaphore for fibers.

use crate::fiber::{Fiber, FiberHandle};
use std::cell::RefCell;
use std::collections::VecDeque;

/// A counting semaphore with FIFO wakeup.
///
/// `wait` takes a permit or parks the caller; `post` hands its permit
/// directly to the first parked waiter instead of crediting the counter, so
/// permits are delivered in arrival order. Not `Send` or `Sync`.
pub struct Semaphore {
    state: RefCell<SemaphoreState>,
}

struct SemaphoreState {
    /// Available permits. Zero whenever the wait list is non-empty.
    permits: u32,
    /// FIFO of fibers parked on the semaphore.
    wait_list: VecDeque<FiberHandle>,
}

impl Semaphore {
    /// Creates a semaphore with no permits.
    pub fn new() -> Self {
        Semaphore::with_permits(0)
    }

    /// Creates a semaphore holding `permits` initial permits.
    pub fn with_permits(permits: u32) -> Self {
        Semaphore {
            state: RefCell::new(SemaphoreState {
                permits,
                wait_list: VecDeque::new(),
            }),
        }
    }

    /// Takes one permit, parking the calling fiber until a `post` provides
    /// one.
    pub fn wait(&self) {
        let mut state = self.state.borrow_mut();

        if state.permits > 0 {
            state.permits -= 1;
            return;
        }

        state.wait_list.push_back(Fiber::current());
        // The borrow cannot be held across the switch away. On resumption
        // the permit has already been consumed on our behalf by post().
        drop(state);
        Fiber::park();
    }

    /// Adds one permit. If a fiber is parked waiting, the permit goes to it
    /// directly and the counter is left untouched.
    pub fn post(&self) {
        let mut state = self.state.borrow_mut();

        let Some(waiter) = state.wait_list.pop_front() else {
            state.permits += 1;
            return;
        };

        drop(state);
        waiter.unpark();
    }

    /// Currently available permits.
    pub fn permits(&self) -> u32 {
        self.state.borrow().permits
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Semaphore::new()
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // Residual permits are fine; stranded waiters are not.
        assert!(
            self.state.borrow().wait_list.is_empty(),
            "semaphore dropped with parked waiters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Scheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn wait_consumes_available_permits_without_parking() {
        let sem = Rc::new(Semaphore::with_permits(2));
        let sem_clone = sem.clone();

        Fiber::spawn(move || {
            sem_clone.wait();
            sem_clone.wait();
            assert_eq!(sem_clone.permits(), 0);
        });
        Scheduler::run();
    }

    #[test]
    fn post_without_waiters_credits_the_counter() {
        let sem = Semaphore::new();
        sem.post();
        sem.post();
        assert_eq!(sem.permits(), 2);
        // Residual permits are legal at drop.
    }

    #[test]
    fn waiters_are_woken_in_fifo_order() {
        let sem = Rc::new(Semaphore::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        for name in ["first", "second"] {
            let sem = sem.clone();
            let order = order.clone();
            Fiber::spawn(move || {
                sem.wait();
                order.borrow_mut().push(name);
            });
        }

        let sem_clone = sem.clone();
        Fiber::spawn(move || {
            sem_clone.post();
            sem_clone.post();
        });

        Scheduler::run();
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn handed_off_permit_is_not_credited() {
        let sem = Rc::new(Semaphore::new());

        let waiter_sem = sem.clone();
        Fiber::spawn(move || {
            waiter_sem.wait();
            // The permit that woke us was consumed, not banked.
            assert_eq!(waiter_sem.permits(), 0);
        });

        let poster_sem = sem.clone();
        Fiber::spawn(move || {
            poster_sem.post();
            assert_eq!(poster_sem.permits(), 0);
        });

        Scheduler::run();
        assert_eq!(sem.permits(), 0);
    }
}
