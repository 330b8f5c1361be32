//! Interrupt-flag save/restore helpers
//!
//! Grounded on the original's `save_clear_if()`/`restore_if()` pair used
//! throughout `kern/mm.c` and the scheduler to make short critical
//! sections atomic with respect to the timer and keyboard interrupt
//! handlers, without needing a full spinlock when only the current CPU's
//! interrupts matter.

use core::arch::asm;
use core::sync::atomic::{AtomicBool, Ordering};

/// Returns true if the interrupt flag was set before this call, and
/// clears it.
pub fn save_clear_if() -> bool {
    let flags: u32;
    // SAFETY: `pushfd`/`pop` only reads EFLAGS; `cli` only affects IF.
    unsafe {
        asm!(
            "pushfd",
            "pop {0}",
            "cli",
            out(reg) flags,
            options(nomem, preserves_flags)
        );
    }
    flags & (1 << 9) != 0
}

/// Restore IF to the state returned by a prior [`save_clear_if`].
pub fn restore_if(was_set: bool) {
    if was_set {
        // SAFETY: `sti` only affects IF, re-enabling interrupts this CPU
        // already had enabled before the matching `save_clear_if`.
        unsafe { asm!("sti", options(nomem, nostack, preserves_flags)) };
    }
}

/// Run `f` with interrupts disabled on this CPU, restoring the prior IF
/// state afterwards regardless of how `f` returns.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let was_set = save_clear_if();
    let r = f();
    restore_if(was_set);
    r
}

/// Set once the idle loop and scheduler are ready to take interrupts;
/// guards against spurious timer ticks arriving during early boot.
pub static INTERRUPTS_READY: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() {
    INTERRUPTS_READY.store(true, Ordering::Release);
}

pub fn is_ready() -> bool {
    INTERRUPTS_READY.load(Ordering::Acquire)
}
