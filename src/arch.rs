//! Architecture-specific context switching primitives.
//!
//! A suspended fiber keeps its execution state on its own stack: the switch
//! routine pushes the callee-saved register set below the return address that
//! the call itself pushed, records the resulting stack pointer, and resumes
//! the target fiber by reloading its recorded stack pointer and popping the
//! mirror set. The only per-fiber state the runtime stores outside the stack
//! is that single recorded pointer.

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::{seed_frame, switch, switch_and_destroy};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::{seed_frame, switch, switch_and_destroy};

#[cfg(not(any(
    all(target_arch = "x86_64", not(windows)),
    target_arch = "aarch64"
)))]
compile_error!("cofiber only supports x86_64 (System V) and aarch64 targets");

/// A fiber's recorded stack pointer: the address of the saved register frame
/// on the fiber's own stack. Stale while the fiber is running.
pub type StackPointer = *mut u8;
