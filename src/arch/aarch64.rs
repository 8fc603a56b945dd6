//! aarch64 (AAPCS64) implementation of context switching.
//!
//! Callee-saved registers preserved across a switch: x19-x28, the frame
//! pointer (x29), the link register (x30) and the lower 64 bits of v8-v15
//! (d8-d15). The resume address is the saved x30; `ret` jumps through it.
//! The frame is stored on the suspended fiber's stack, x19 at the lowest
//! address, d15 at the highest.

use super::StackPointer;
use std::arch::naked_asm;
use std::ptr;

/// Slots in a saved frame: x19-x28, x29, x30, d8-d15.
const SAVED_SLOTS: usize = 20;

/// Index of the x30 slot, the address `ret` resumes at.
const RESUME_SLOT: usize = 11;

/// Writes the synthetic initial frame for a fresh fiber at the top of its
/// stack and returns the stack pointer to record for it.
///
/// All register slots are zeroed (a zero x29 terminates stack walks) except
/// the x30 slot, which receives `entry`. sp stays 16-byte aligned, as the
/// architecture requires whenever sp is used for addressing.
///
/// # Safety
///
/// `stack_top` must be the one-past-the-end address of a stack at least
/// `SAVED_SLOTS * 8` bytes large, writable below `stack_top`.
pub unsafe fn seed_frame(stack_top: *mut u8, entry: usize) -> StackPointer {
    let top = (stack_top as usize) & !0xF;
    let frame = (top - SAVED_SLOTS * 8) as *mut u64;
    unsafe {
        ptr::write_bytes(frame, 0, SAVED_SLOTS);
        ptr::write(frame.add(RESUME_SLOT), entry as u64);
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
        // Save the outgoing fiber's state on its own stack.
        "sub sp, sp, #160",
        "stp x19, x20, [sp, #0x00]",
        "stp x21, x22, [sp, #0x10]",
        "stp x23, x24, [sp, #0x20]",
        "stp x25, x26, [sp, #0x30]",
        "stp x27, x28, [sp, #0x40]",
        "stp x29, x30, [sp, #0x50]",
        "stp d8,  d9,  [sp, #0x60]",
        "stp d10, d11, [sp, #0x70]",
        "stp d12, d13, [sp, #0x80]",
        "stp d14, d15, [sp, #0x90]",
        "mov x9, sp",
        "str x9, [x0]",
        // Adopt the incoming fiber's stack and restore its state.
        "ldr x9, [x1]",
        "mov sp, x9",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8,  d9,  [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #160",
        // Jumps through the restored x30: the trampoline for a fresh fiber,
        // or just after the switch call that suspended a resumed one.
        "ret",
    )
}

/// Switches to the fiber whose recorded-stack-pointer slot is `_to` and,
/// already on the target's stack, invokes `_destroy(_dying)` before the
/// target's registers are restored.
///
/// The stack pointer is retargeted first: freeing the dying fiber's stack
/// while still executing on it would be unsound. `_dying` stays in x0 across
/// the retarget, untouched until the call.
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
        // x19 may be clobbered freely: it is reloaded from the frame below,
        // and the callee preserves it across the destroy call.
        "ldr x19, [x1]",
        "mov sp, x19",
        "blr x2",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8,  d9,  [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #160",
        "ret",
    )
}
