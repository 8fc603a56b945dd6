//! Recursive mutex for fibers.

use crate::fiber::{Fiber, FiberHandle};
use std::cell::RefCell;
use std::collections::VecDeque;

/// A recursive mutual-exclusion lock owned by at most one fiber.
///
/// Contended acquisition parks the caller on a FIFO wait list; a release
/// that finds waiters hands ownership directly to the first of them, so a
/// woken fiber never re-contends. Not `Send` or `Sync`: the runtime is
/// single-threaded and so is the lock.
///
/// Like everything in the runtime, the state machine relies on the
/// suspension-point contract: nothing runs between mutating the lock state
/// and the park or unpark that pairs with it.
pub struct Mutex {
    state: RefCell<MutexState>,
}

struct MutexState {
    /// The owning fiber. Null iff `recursion` is zero.
    owner: FiberHandle,
    /// Matched acquire/release depth of the owner.
    recursion: u32,
    /// FIFO of fibers parked on the lock.
    wait_list: VecDeque<FiberHandle>,
}

impl Mutex {
    /// Creates a free mutex.
    pub fn new() -> Self {
        Mutex {
            state: RefCell::new(MutexState {
                owner: FiberHandle::null(),
                recursion: 0,
                wait_list: VecDeque::new(),
            }),
        }
    }

    /// Acquires the mutex, parking the calling fiber if another fiber owns
    /// it. Reentrant: the owner may acquire again and must release as many
    /// times.
    pub fn acquire(&self) {
        let current = Fiber::current();
        let mut state = self.state.borrow_mut();

        if state.owner == current {
            state.recursion += 1;
            return;
        }

        if state.owner.is_null() {
            state.owner = current;
            state.recursion = 1;
            return;
        }

        state.wait_list.push_back(current);
        // The borrow cannot be held across the switch away.
        drop(state);
        Fiber::park();

        // Ownership was transferred to us by the releasing fiber.
        let state = self.state.borrow();
        assert!(state.owner == current && state.recursion == 1);
    }

    /// Releases the mutex. Once the recursion count drains, ownership moves
    /// to the first parked waiter, or the mutex becomes free.
    ///
    /// Calling this from a fiber that is not the owner is a contract
    /// violation.
    pub fn release(&self) {
        let current = Fiber::current();
        let mut state = self.state.borrow_mut();

        assert!(
            state.owner == current,
            "mutex released by fiber {} which does not own it",
            current.id()
        );

        state.recursion -= 1;
        if state.recursion > 0 {
            return;
        }

        let Some(waiter) = state.wait_list.pop_front() else {
            state.owner = FiberHandle::null();
            return;
        };

        // Direct handoff: the waiter owns the lock before it even runs.
        state.owner = waiter;
        state.recursion = 1;
        drop(state);
        waiter.unpark();
    }

    /// Whether the calling fiber currently owns the mutex.
    pub fn is_held_by_current(&self) -> bool {
        self.state.borrow().owner == Fiber::current()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        let state = self.state.borrow();
        assert!(state.owner.is_null(), "mutex dropped while held");
        assert!(
            state.wait_list.is_empty(),
            "mutex dropped with parked waiters"
        );
    }
}
