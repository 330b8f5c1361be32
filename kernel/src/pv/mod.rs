//! Paravirtualization core (spec.md component J, §4.J)
//!
//! A PV "process" is an ordinary process whose sole thread runs ring 3
//! code at a dedicated, non-flat code segment (base `USER_MEM_START`,
//! limit shrunk to leave room above `PV_VM_LIMIT` for the guest kernel
//! region — see [`crate::arch::x86::gdt::append_pv_segments`]). Guest
//! "kernel mode" vs "guest user mode" is modeled by which of two shadow
//! page directories is loaded in CR3; this module builds and caches
//! those shadows, maintains the virtual IDT/IF, and dispatches the
//! hypercall vocabulary and interrupt/fault/syscall reflection.

extern crate alloc;

pub mod hypercall;
pub mod inject;
pub mod shadow;
pub mod vidt;

use alloc::boxed::Box;
use alloc::collections::VecDeque;

use crate::mm::paging::PhysicalAddress;

pub use shadow::ShadowPd;
pub use vidt::{VirtualIdt, VirtualIrq};

/// `~(USER_MEM_START - 1)`: guest addresses at or above this are the
/// guest-kernel region; below it is guest-user.
pub const PV_VM_LIMIT: u32 = !(crate::mm::USER_MEM_START - 1);

pub const PV_DEFAULT_SIZE_MB: u32 = 24;
pub const PV_MINIMUM_SIZE_MB: u32 = 20;

/// Per-process PV control block (spec.md §3 "PV control block").
pub struct PvBlock {
    pub n_pages: u32,
    pub mem_base: PhysicalAddress,
    /// Virtual interrupt-flag: guest's `disable`/`enable` hypercalls
    /// toggle this, and injection consults it before delivering.
    pub vif: bool,
    pub active_shadow: Option<Box<ShadowPd>>,
    /// Cached shadow pairs keyed by guest PD physical address, reused by
    /// `loadpd` without re-translation.
    pub shadow_pds: VecDeque<Box<ShadowPd>>,
    pub vidt: VirtualIdt,
    /// Guest's kernel-mode esp, used as the injection target stack when
    /// the guest is currently in user mode.
    pub vesp0: u32,
    /// Redirect target for any guest frame number translated outside
    /// `mem_base..mem_base + n_pages`, allocated once and zeroed so a
    /// buggy or hostile guest can neither touch another process's frames
    /// nor read stale data left in a recycled one.
    pub sentinel: PhysicalAddress,
}

impl PvBlock {
    pub fn new(mem_base: PhysicalAddress, n_pages: u32) -> Result<Self, crate::error::KernelError> {
        let sentinel = shadow::alloc_table_frame()?;
        Ok(Self {
            n_pages,
            mem_base,
            vif: false,
            active_shadow: None,
            shadow_pds: VecDeque::new(),
            vidt: VirtualIdt::new(),
            vesp0: 0,
            sentinel,
        })
    }

    pub fn mask_interrupt(&mut self) {
        self.vif = false;
    }

    pub fn unmask_interrupt(&mut self) {
        self.vif = true;
    }

    /// Find (or build, or reuse from cache) the shadow pair for guest PD
    /// `guest_pd`, make it active, and return its two real CR3s.
    pub fn select_pd(&mut self, guest_pd: PhysicalAddress, wp: bool) -> (PhysicalAddress, PhysicalAddress) {
        shadow::select_or_build(self, guest_pd, wp)
    }
}

/// Kill the current thread's PV guest, logging `reason` the way a
/// classifying fault message does for ordinary user threads.
pub fn pv_die(reason: &str) {
    let tid = crate::sched::current_tid();
    log::warn!(target: "pv", "guest on thread {} killed: {}", tid, reason);
    crate::process::exit::task_vanish_current(-2);
}

pub fn init() {
    log::info!(target: "pv", "paravirtualization core initialized");
}
