//! Kernel-wide error type
//!
//! A single enum with struct-like variants carrying diagnostic payloads,
//! `#[must_use]` so a dropped error can't go silently unhandled.
//! Subsystems with narrower failure modes (the frame allocator, PV
//! hypercall validation) define their own local enum with a `From` impl
//! into this one.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled or translated to a syscall return code"]
pub enum KernelError {
    OutOfMemory { requested: u32, available: u32, reason: &'static str },
    InvalidAddress { addr: u32 },
    BadAlignment { addr: u32 },
    ProcessNotFound { pid: u32 },
    ThreadNotFound { tid: u32 },
    InvalidState { expected: &'static str, actual: &'static str },
    SchedulerError(&'static str),
    SyscallError(SyscallFailure),
    PtsError(&'static str),
    PvError(&'static str),
    InvalidArgument,
    ResourceExhausted,
    PermissionDenied,
    NotFound,
    WouldBlock,
    NotImplemented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallFailure {
    InvalidSyscall,
    InvalidArgument,
    Fault,
    NoSuchProcess,
    NoSuchThread,
    NoChildren,
    Interrupted,
}

impl From<SyscallFailure> for KernelError {
    fn from(e: SyscallFailure) -> Self {
        KernelError::SyscallError(e)
    }
}

/// Translate a kernel error into the `i32` return code convention of
/// spec.md §6/§7: 0 on success, a small negative integer on failure. Never
/// propagate a raw `KernelError` across the syscall boundary.
impl KernelError {
    pub fn to_syscall_errno(self) -> i32 {
        match self {
            KernelError::OutOfMemory { .. } => -2,
            KernelError::InvalidAddress { .. } | KernelError::BadAlignment { .. } => -3,
            KernelError::ProcessNotFound { .. } | KernelError::ThreadNotFound { .. } => -4,
            KernelError::InvalidState { .. } => -5,
            KernelError::SchedulerError(_) => -6,
            KernelError::SyscallError(SyscallFailure::InvalidSyscall) => -1,
            KernelError::SyscallError(SyscallFailure::InvalidArgument) => -3,
            KernelError::SyscallError(SyscallFailure::Fault) => -3,
            KernelError::SyscallError(SyscallFailure::NoSuchProcess) => -4,
            KernelError::SyscallError(SyscallFailure::NoSuchThread) => -4,
            KernelError::SyscallError(SyscallFailure::NoChildren) => -2,
            KernelError::SyscallError(SyscallFailure::Interrupted) => -7,
            KernelError::PtsError(_) => -8,
            KernelError::PvError(_) => -9,
            KernelError::InvalidArgument => -3,
            KernelError::ResourceExhausted => -2,
            KernelError::PermissionDenied => -10,
            KernelError::NotFound => -4,
            KernelError::WouldBlock => -11,
            KernelError::NotImplemented => -38,
        }
    }
}

pub type Result<T> = core::result::Result<T, KernelError>;
