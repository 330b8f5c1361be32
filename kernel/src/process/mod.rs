//! Process and thread management (component F)
//!
//! [`pcb`] is the process control block, [`table`] the global process
//! and thread tables, [`memory`] per-process region bookkeeping,
//! [`loader`] ELF loading, [`lifecycle`] `fork`/`exec`/process creation,
//! [`exit`] `vanish`/`task_vanish`, and [`wait`] the `WAIT` syscall's
//! blocking collection of dead children.

extern crate alloc;

pub mod exit;
pub mod lifecycle;
pub mod loader;
pub mod memory;
pub mod pcb;
pub mod table;
pub mod wait;

pub use pcb::{Process, ProcessId};

/// Program image for the very first process, embedded at build time.
/// A real build points this at a linked init binary; until one is wired
/// in, boot falls back to an empty image and `init()` panics loudly
/// rather than silently running nothing.
const INIT_IMAGE: &[u8] = &[];

/// Bring up process management: the global tables, then pid 1.
pub fn init() {
    table::init();

    if INIT_IMAGE.is_empty() {
        log::warn!(target: "process", "no init image embedded, skipping pid 1 creation");
        return;
    }

    let init_args = [alloc::string::String::from("init")];
    match lifecycle::create_process(INIT_IMAGE, &init_args, None, 0) {
        Ok(pid) => log::info!(target: "process", "created init process, pid {pid}"),
        Err(e) => panic!("failed to create init process: {e:?}"),
    }
}
