//! x86_64 (System V AMD64) implementation of context switching.
//!
//! Callee-saved registers preserved across a switch: rbp, rbx, r12-r15.
//! The saved frame lives on the suspended fiber's stack, lowest address
//! first:
//!
//! ```text
//! sp -> +-------+
//!       |  r15  |
//!       |  r14  |
//!       |  r13  |
//!       |  r12  |
//!       |  rbx  |
//!       |  rbp  |
//!       |  ret  |  <- resume address, pushed by the call into switch()
//!       +-------+
//! ```

use super::StackPointer;
use std::arch::naked_asm;
use std::ptr;

/// Registers pushed by `switch` on top of the return address.
const SAVED_REGISTERS: usize = 6;

/// Total size of a saved frame, return address included.
const FRAME_SIZE: usize = (SAVED_REGISTERS + 1) * 8;

/// Writes the synthetic initial frame for a fresh fiber at the top of its
/// stack and returns the stack pointer to record for it.
///
/// The register slots are zeroed (a zero frame pointer terminates stack
/// walks) and the resume-address slot receives `entry`. The frame is placed
/// so that the `ret` resuming the fiber leaves rsp ≡ 8 (mod 16), the System
/// V alignment at function entry.
///
/// # Safety
///
/// `stack_top` must be the one-past-the-end address of a stack at least
/// `FRAME_SIZE + 8` bytes large, writable below `stack_top`.
pub unsafe fn seed_frame(stack_top: *mut u8, entry: usize) -> StackPointer {
    let top = (stack_top as usize) & !0xF;
    let frame = (top - 8 - FRAME_SIZE) as *mut u64;
    unsafe {
        ptr::write_bytes(frame, 0, SAVED_REGISTERS);
        ptr::write(frame.add(SAVED_REGISTERS), entry as u64);
    }
    frame as StackPointer
}

/// Switches from the fiber whose recorded-stack-pointer slot is `_from` to
/// the fiber whose slot is `_to`.
///
/// Returns, in the caller's view, when some other fiber switches back into
/// `_from`; caller locals and callee-saved registers are intact, scratch
/// registers are clobbered per the ABI.
///
/// # Safety
///
/// `_to` must hold a stack pointer produced by `seed_frame` or by a previous
/// switch out, and the stack it points into must still be live.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(_from: *mut StackPointer, _to: *const StackPointer) {
    naked_asm!(
        // Save the outgoing fiber's state on its own stack; the resume
        // address is already there, pushed by the call.
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        // Adopt the incoming fiber's stack and restore its state.
        "mov rsp, [rsi]",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        // Lands on the trampoline for a fresh fiber, or just after the
        // switch call that suspended a resumed one.
        "ret",
    )
}

/// Switches to the fiber whose recorded-stack-pointer slot is `_to` and,
/// already on the target's stack, invokes `_destroy(_dying)` before the
/// target's registers are restored.
///
/// The stack pointer is retargeted first: freeing the dying fiber's stack
/// while still executing on it would be unsound. `_dying` stays in the
/// argument register across the retarget, untouched until the call.
///
/// # Safety
///
/// Same as [`switch`]; additionally `_destroy` must not switch fibers and
/// must tolerate running before the target fiber's registers are restored.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_and_destroy(
    _dying: *mut u8,
    _to: *const StackPointer,
    _destroy: extern "C" fn(*mut u8),
) -> ! {
    naked_asm!(
        // Adopt the successor's stack, then free the dying fiber from there.
        // rbx may be clobbered freely: it is reloaded from the frame below.
        "mov rbx, [rsi]",
        "mov rsp, rbx",
        // The saved frame may sit at either 16-byte phase depending on
        // whether the successor is fresh or suspended; realign for the call.
        "and rsp, -16",
        "call rdx",
        "mov rsp, rbx",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    )
}
