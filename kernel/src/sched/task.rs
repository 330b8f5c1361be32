//! Thread control block (component F's TCB, scheduler-owned fields)
//!
//! Holds exactly the fields spec.md §3 names for a TCB. The scheduler
//! owns `status`/`status_lock`/the ready-queue link/the sleep-heap link;
//! [`crate::process`] owns everything about *what* the thread is running
//! (its process back-pointer, registers, user exception registration).

use alloc::boxed::Box;

use crate::arch::x86::context::Context;
use crate::sync::Spinlock;

pub type ThreadId = u32;
pub type ProcessId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Ready,
    Blocked,
    Sleeping,
    Descheduled,
    Dead,
}

/// User-mode software-exception registration (`swexn`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionRegistration {
    pub esp3: u32,
    pub eip3: u32,
    pub arg: u32,
    pub in_handler: bool,
}

/// Per-thread testing-mode toggle, the `misbehave` syscall's target
/// (spec.md §6 `MISBEHAVE`; semantics from `kern/syscall_misc.c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MisbehaveMode {
    #[default]
    Normal,
    /// Force the eip0 kernel-fault recovery path even on otherwise
    /// recoverable user-memory accesses, exercising fault plumbing.
    ForceKernelFault,
}

const KERNEL_STACK_SIZE: usize = 4096;

pub struct Task {
    pub tid: ThreadId,
    pub pid: ProcessId,
    pub status: Spinlock<ThreadStatus>,
    /// Saved kernel stack pointer, valid only while not `Running`.
    pub context: Context,
    /// Owned kernel stack; `esp0` for ring3->ring0 traps is the top of
    /// this allocation.
    kernel_stack: Box<[u8; KERNEL_STACK_SIZE]>,
    pub esp0: u32,
    /// Kernel-fault recovery address installed by `copy_from_user` et al.
    pub eip0: u32,
    pub exception: ExceptionRegistration,
    pub misbehave: MisbehaveMode,
    pub pending_exit: bool,
    /// PTS this thread's console I/O is bound to.
    pub pts_id: u32,
    /// Wake tick, valid only while `status == Sleeping`.
    pub wake_tick: u64,
    /// First ring-3 entry point, consumed once by
    /// [`enter_user_thread`] the first time this thread is scheduled.
    pub user_entry: Option<crate::arch::x86::usermode::UserFrame>,
    /// General-purpose registers to restore alongside `user_entry`
    /// (nonzero only for a `fork`ed child resuming its parent's state).
    pub user_regs: crate::arch::x86::usermode::GpRegs,
}

impl Task {
    pub fn new_kernel_thread(
        tid: ThreadId,
        pid: ProcessId,
        entry: extern "C" fn() -> !,
        pts_id: u32,
    ) -> Self {
        let mut kernel_stack = Box::new([0u8; KERNEL_STACK_SIZE]);
        let stack_top = kernel_stack.as_mut_ptr() as u32 + KERNEL_STACK_SIZE as u32;
        Self {
            tid,
            pid,
            status: Spinlock::new(ThreadStatus::Ready),
            context: Context::new_kernel_thread(stack_top, entry),
            kernel_stack,
            esp0: stack_top,
            eip0: 0,
            exception: ExceptionRegistration::default(),
            misbehave: MisbehaveMode::default(),
            pending_exit: false,
            pts_id,
            wake_tick: 0,
            user_entry: None,
            user_regs: crate::arch::x86::usermode::GpRegs::default(),
        }
    }

    /// A thread whose first "kernel" entry immediately drops to ring 3
    /// at `eip`/`esp` (a freshly `exec`'d or `thread_fork`ed thread).
    pub fn new_user_thread(tid: ThreadId, pid: ProcessId, eip: u32, esp: u32, pts_id: u32) -> Self {
        let mut task = Self::new_kernel_thread(tid, pid, enter_user_thread, pts_id);
        task.user_entry = Some(crate::arch::x86::usermode::UserFrame::new(eip, esp));
        task
    }

    /// A `fork`ed child: resumes exactly where the parent's syscall trap
    /// frame left off, registers included, except `eax` (the fork return
    /// value convention: 0 in the child).
    pub fn new_forked_thread(
        tid: ThreadId,
        pid: ProcessId,
        parent_frame: &crate::arch::x86::trap::TrapFrame,
        pts_id: u32,
    ) -> Self {
        let mut task = Self::new_kernel_thread(tid, pid, enter_user_thread, pts_id);
        task.user_entry = Some(crate::arch::x86::usermode::UserFrame {
            eip: parent_frame.eip,
            cs: parent_frame.cs,
            eflags: parent_frame.eflags,
            esp: parent_frame.esp,
            ss: parent_frame.ss,
        });
        task.user_regs = crate::arch::x86::usermode::GpRegs {
            edi: parent_frame.edi,
            esi: parent_frame.esi,
            ebp: parent_frame.ebp,
            ebx: parent_frame.ebx,
            edx: parent_frame.edx,
            ecx: parent_frame.ecx,
            eax: 0,
        };
        task
    }

    pub fn kernel_stack_top(&self) -> u32 {
        self.kernel_stack.as_ptr() as u32 + KERNEL_STACK_SIZE as u32
    }
}

/// The "kernel thread entry" every fresh user thread's `Context` points
/// at: read back the frame `new_user_thread` stashed and `iretd` into
/// it. Never returns.
extern "C" fn enter_user_thread() -> ! {
    let tid = crate::sched::current_tid();
    let (frame, regs) = crate::process::table::with_task(tid, |t| (t.user_entry, t.user_regs))
        .ok()
        .and_then(|(f, r)| f.map(|f| (f, r)))
        .expect("enter_user_thread scheduled without a user_entry frame");
    // SAFETY: `new_user_thread`/`new_forked_thread`'s caller is
    // responsible for the address space already being loaded (the
    // scheduler's `switch_address_space` runs before a thread's context
    // is ever entered) and for eip/esp both being mapped and present.
    unsafe { crate::arch::x86::usermode::enter_user_mode_with_regs(&regs, &frame) }
}

extern crate alloc;
