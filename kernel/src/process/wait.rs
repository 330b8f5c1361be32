//! `WAIT` syscall: block until a child exits (spec.md §6 `WAIT`)
//!
//! Every process keeps its own dead-child list (`Process.wait`) plus a
//! condvar a parent blocks on; [`crate::process::exit`]'s teardown pushes
//! onto it and notifies. No `waitpid`-style pid filtering — `wait`
//! collects whichever child exited first, matching the original's single
//! `wait()` call.

use crate::error::{KernelError, SyscallFailure};
use crate::process::pcb::ProcessId;
use crate::process::table;

/// Block the calling process until some child has exited, then return its
/// pid and exit status. Fails immediately if the process has no children
/// at all, live or dead.
pub fn wait_for_child(pid: ProcessId) -> Result<(ProcessId, i32), KernelError> {
    let process = table::process_ptr(pid).ok_or(KernelError::ProcessNotFound { pid })?.as_ref();

    let mut guard = process.wait.lock();
    loop {
        if let Some((child, status)) = guard.dead_children.pop() {
            return Ok((child, status));
        }
        if guard.live_children.is_empty() {
            return Err(SyscallFailure::NoChildren.into());
        }
        guard = process.wait_cv.wait(&process.wait, guard);
    }
}
