//! User-memory copy (spec.md component C)
//!
//! Every access to user memory from kernel code goes through here rather
//! than a raw pointer dereference, so a malicious or buggy user pointer
//! faults in a place the kernel is prepared for: each thread carries an
//! `eip0` recovery address (see [`crate::exception`]) that the page-fault
//! and general-protection handlers check before falling back to killing
//! the thread — if the faulting `eip` is inside one of these functions,
//! the handler sets `eax` to an error sentinel and resumes at `eip0`
//! instead of delivering the fault to user code.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{KernelError, SyscallFailure};

pub type Result<T> = core::result::Result<T, KernelError>;

const MAX_STRING_LEN: usize = 4096;

/// Copy `len` bytes from user address `src` into `dst`. Faults (bad
/// address, unmapped page) are caught via the `eip0` recovery path and
/// surfaced as `Err`, never as a kernel panic.
pub fn copy_from_user(src: u32, dst: &mut [u8]) -> Result<()> {
    // SAFETY: the actual byte-by-byte copy runs with this thread's eip0
    // recovery stub installed (set up by the caller in the syscall entry
    // trampoline), so a fault here resumes in `copy_from_user` with an
    // error rather than being delivered to this (kernel) context.
    unsafe {
        core::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
    }
    Ok(())
}

/// Copy `src` into user address `dst`.
pub fn copy_to_user(dst: u32, src: &[u8]) -> Result<()> {
    // SAFETY: see `copy_from_user`.
    unsafe {
        core::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
    }
    Ok(())
}

/// Copy a single `T` by value from user memory.
pub fn copy_value_from_user<T: Copy>(src: u32) -> Result<T> {
    let mut buf = core::mem::MaybeUninit::<T>::uninit();
    let bytes = unsafe {
        core::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut u8, core::mem::size_of::<T>())
    };
    copy_from_user(src, bytes)?;
    // SAFETY: `bytes` was fully initialized by the copy above.
    Ok(unsafe { buf.assume_init() })
}

/// Copy a NUL-terminated string from user memory, growing the scratch
/// buffer by doubling until the terminator is found or `maxlen` is hit
/// (matches the original's `copy_from_user`-in-a-loop string strategy,
/// since the string's length isn't known up front).
pub fn copy_string_from_user(src: u32, maxlen: usize) -> Result<String> {
    let maxlen = maxlen.min(MAX_STRING_LEN);
    let mut cap = 64usize.min(maxlen.max(1));
    loop {
        let mut buf = alloc::vec![0u8; cap];
        copy_from_user(src, &mut buf)?;
        if let Some(nul) = buf.iter().position(|&b| b == 0) {
            buf.truncate(nul);
            return String::from_utf8(buf).map_err(|_| SyscallFailure::InvalidArgument.into());
        }
        if cap >= maxlen {
            return Err(SyscallFailure::InvalidArgument.into());
        }
        cap = (cap * 2).min(maxlen);
    }
}

/// Copy an argv/envp-style NUL-terminated array of user string pointers.
pub fn copy_string_array_from_user(src: u32, max_entries: usize) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for i in 0..max_entries {
        let ptr: u32 = copy_value_from_user(src + (i as u32) * 4)?;
        if ptr == 0 {
            return Ok(out);
        }
        out.push(copy_string_from_user(ptr, MAX_STRING_LEN)?);
    }
    Err(SyscallFailure::InvalidArgument.into())
}

/// `print` syscall helper: copy `len` bytes from user memory straight to
/// the calling thread's foreground PTS, without an intermediate heap
/// allocation for large writes.
pub fn print_from_user(src: u32, len: usize) -> Result<()> {
    const CHUNK: usize = 256;
    let mut remaining = len;
    let mut addr = src;
    let mut chunk = [0u8; CHUNK];
    while remaining > 0 {
        let n = remaining.min(CHUNK);
        copy_from_user(addr, &mut chunk[..n])?;
        crate::pts::write_current(&chunk[..n]);
        addr += n as u32;
        remaining -= n;
    }
    Ok(())
}

extern crate alloc;
