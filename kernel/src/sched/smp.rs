//! Per-CPU state
//!
//! AP bring-up itself (the trampoline, LAPIC register I/O) is imported
//! per scope; this module only holds the per-CPU array the rest of the
//! scheduler indexes into (spec.md §9: "modeled as an array indexed by
//! CPU id, each entry owned by exactly that CPU"). Without the `smp`
//! feature the array is pinned to a single entry.

use core::sync::atomic::{AtomicU32, Ordering};

use super::task::ThreadId;

#[cfg(feature = "smp")]
pub const MAX_CPUS: usize = 8;
#[cfg(not(feature = "smp"))]
pub const MAX_CPUS: usize = 1;

pub struct PerCpu {
    pub current: AtomicU32,
    pub idle: AtomicU32,
}

impl PerCpu {
    const fn new() -> Self {
        Self { current: AtomicU32::new(0), idle: AtomicU32::new(0) }
    }
}

static CPUS: [PerCpu; MAX_CPUS] = [const { PerCpu::new() }; MAX_CPUS];

/// This CPU's index. On a single-CPU build this is always 0; on an `smp`
/// build it is read from a dedicated per-CPU segment base set up during
/// AP bring-up (imported, not reimplemented here).
pub fn cpu_id() -> usize {
    #[cfg(feature = "smp")]
    {
        // SAFETY: reads a per-CPU GS-relative slot the (imported) AP
        // bring-up code initializes before this CPU runs any scheduler
        // code.
        unsafe {
            let id: u32;
            core::arch::asm!("mov {0:e}, gs:[0]", out(reg) id, options(nomem, nostack, preserves_flags));
            id as usize
        }
    }
    #[cfg(not(feature = "smp"))]
    {
        0
    }
}

pub fn current() -> ThreadId {
    CPUS[cpu_id()].current.load(Ordering::Acquire)
}

pub fn set_current(tid: ThreadId) {
    CPUS[cpu_id()].current.store(tid, Ordering::Release);
}

pub fn idle() -> ThreadId {
    CPUS[cpu_id()].idle.load(Ordering::Acquire)
}

pub fn set_idle(tid: ThreadId) {
    CPUS[cpu_id()].idle.store(tid, Ordering::Release);
}

pub fn num_cpus() -> usize {
    MAX_CPUS
}
