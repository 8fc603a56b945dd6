//! # Cofiber - Cooperative User-Space Fiber Runtime
//!
//! A cooperative threading runtime multiplexing lightweight user threads
//! (fibers) onto a single host OS thread, with a recursive mutex and a
//! counting semaphore built on the scheduler's park/unpark contract.
//!
//! ## Architecture
//!
//! The system follows a 1:N model: N fibers share one OS thread and hand the
//! processor to each other explicitly. Key components include:
//!
//! - **Context switch**: naked-assembly register save/restore that moves the
//!   CPU between fiber stacks
//! - **Fibers**: execution contexts owning a fixed 64 KiB stack, created
//!   with a starting closure
//! - **Scheduler**: per-thread singleton with a FIFO ready queue; its `run`
//!   entry point returns once every fiber has exited or parked
//! - **Synchronizers**: a recursive mutex and a counting semaphore whose
//!   wait lists wake fibers in arrival order
//!
//! There is no preemption and no parallelism: exactly one fiber runs at any
//! instant, and control moves only at yield, park and exit. That contract is
//! what lets the synchronizers mutate their state and then park or unpark
//! without any interleaving in between.
//!
//! ## Example
//!
//! ```
//! use cofiber::{Fiber, Scheduler};
//!
//! Fiber::spawn(|| {
//!     println!("hello from a fiber!");
//!     Fiber::yield_now();
//!     println!("and goodbye");
//! });
//!
//! Scheduler::run();
//! ```

pub mod arch;
pub mod fiber;
pub mod metrics;
pub mod mutex;
pub mod sched;
pub mod semaphore;
#[cfg(feature = "trace")]
pub mod trace;

pub use fiber::{Fiber, FiberHandle, STACK_SIZE};
pub use mutex::Mutex;
pub use sched::Scheduler;
pub use semaphore::Semaphore;
