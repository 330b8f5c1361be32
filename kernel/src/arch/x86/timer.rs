//! Timer tick source
//!
//! Drives the scheduler's tick counter (spec.md §4.E: sleeping threads are
//! woken by comparing their wake-tick against a monotonically increasing
//! counter advanced here). One tick fires per PIT channel-0 interrupt.

use core::sync::atomic::{AtomicU64, Ordering};

use super::legacy;

/// Scheduler quantum in Hz. Matches the original's 100 Hz tick.
pub const TICK_HZ: u32 = 100;

static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    legacy::set_pit_frequency(TICK_HZ);
}

pub fn current_tick() -> u64 {
    TICKS.load(Ordering::Acquire)
}

/// Called from the IRQ0 trampoline on every tick.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::AcqRel);
    crate::sched::on_timer_tick();
}
