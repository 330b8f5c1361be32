//! Process control block (component F's PCB)
//!
//! Fields exactly as spec.md §3 enumerates: pid, exit value, parent,
//! sibling links in the parent's live/dead-child lists, refcount (=
//! live-thread count), live-thread list, children counters, a wait
//! mutex+condvar, cr3, region vector, a `mm_lock`, and an optional PV
//! control block.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::mm::paging::PhysicalAddress;
use crate::process::memory::MemoryRegion;
use crate::pv::PvBlock;
use crate::sched::ThreadId;
use crate::sync::{CondVar, Mutex};

pub type ProcessId = u32;

pub struct WaitState {
    pub dead_children: Vec<(ProcessId, i32)>,
    pub live_children: Vec<ProcessId>,
    pub nchildren: u32,
    pub nwaiters: u32,
}

pub struct Process {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub exit_value: i32,
    /// Live-thread count; the last thread to leave this count to zero
    /// triggers `vanish`'s teardown.
    pub refcount: Mutex<u32>,
    pub live_threads: Mutex<Vec<ThreadId>>,
    pub wait: Mutex<WaitState>,
    pub wait_cv: CondVar,
    pub cr3: PhysicalAddress,
    pub regions: Mutex<Vec<MemoryRegion>>,
    pub pv: Mutex<Option<Box<PvBlock>>>,
    pub pts_id: u32,
}

impl Process {
    pub fn new(pid: ProcessId, parent: Option<ProcessId>, cr3: PhysicalAddress, pts_id: u32) -> Self {
        Self {
            pid,
            parent,
            exit_value: 0,
            refcount: Mutex::new(0),
            live_threads: Mutex::new(Vec::new()),
            wait: Mutex::new(WaitState {
                dead_children: Vec::new(),
                live_children: Vec::new(),
                nchildren: 0,
                nwaiters: 0,
            }),
            wait_cv: CondVar::new(),
            cr3,
            regions: Mutex::new(Vec::new()),
            pv: Mutex::new(None),
            pts_id,
        }
    }
}

extern crate alloc;
