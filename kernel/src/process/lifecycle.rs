//! Process creation, `fork`, and `exec` (component F)
//!
//! `create_process` builds the very first process (loaded straight from
//! an ELF image, no parent); everything after that is `fork` (copy an
//! address space, same program counter) or `exec` (replace the calling
//! process's address space with a new program, same pid).

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use crate::arch::x86::irq::without_interrupts;
use crate::arch::x86::trap::TrapFrame;
use crate::arch::x86::usermode::DEFAULT_EFLAGS;
use crate::error::{KernelError, SyscallFailure};
use crate::mm::paging::{self, PageFlags, PhysicalAddress, Pte, VirtualAddress, PAGE_SIZE};
use crate::mm::STACK_TOP;
use crate::process::loader;
use crate::process::memory::MemoryRegion;
use crate::process::pcb::{Process, ProcessId};
use crate::process::table;
use crate::sched::task::Task;

const STACK_PAGES: u32 = 4;

/// Build a fresh process from an ELF image with no parent: its own page
/// directory, a loaded program, a guard-mapped stack carrying `argv`,
/// and one thread ready to run at the entry point. Used once at boot
/// for the init process and by `exec` to replace the calling process's
/// image.
pub fn create_process(
    image: &[u8],
    args: &[String],
    parent: Option<ProcessId>,
    pts_id: u32,
) -> Result<ProcessId, KernelError> {
    let pd_phys = paging::new_page_directory()?;
    let loaded = loader::load_program(pd_phys, image)?;
    let (stack_region, initial_esp) = map_stack(pd_phys, args)?;

    let pid = table::alloc_pid();
    let mut process = Process::new(pid, parent, pd_phys, pts_id);
    let mut regions: Vec<MemoryRegion> = loaded.regions;
    regions.push(stack_region);
    *process.regions.lock() = regions;

    let tid = table::alloc_tid();
    process.live_threads.lock().push(tid);
    *process.refcount.lock() = 1;
    table::insert_process(process);

    let task = Task::new_user_thread(tid, pid, loaded.entry_point, initial_esp, pts_id);
    table::insert_task(task);
    crate::sched::wake_thread(tid);

    Ok(pid)
}

/// `FORK` syscall: duplicate the calling process's entire address space
/// (segment-by-segment physical copy, no copy-on-write) into a new
/// process whose one thread resumes exactly where `parent_frame` left
/// off, with `eax` forced to 0.
pub fn fork_process(parent_frame: &TrapFrame) -> Result<ProcessId, KernelError> {
    let parent_tid = crate::sched::current_tid();
    let parent_pid = table::with_task(parent_tid, |t| t.pid)?;

    let is_sole_thread = table::with_process(parent_pid, |p| p.live_threads.lock().len() == 1)?;
    if !is_sole_thread {
        return Err(SyscallFailure::InvalidArgument.into());
    }

    let (parent_regions, parent_pts, parent_pd) =
        table::with_process(parent_pid, |p| (p.regions.lock().clone(), p.pts_id, p.cr3))?;

    let child_pd = paging::new_page_directory()?;
    let mut child_regions = Vec::with_capacity(parent_regions.len());
    for region in &parent_regions {
        child_regions.push(copy_region(parent_pd, child_pd, region)?);
    }
    let child_pid = table::alloc_pid();
    let mut process = Process::new(child_pid, Some(parent_pid), child_pd, parent_pts);
    *process.regions.lock() = child_regions;

    let child_tid = table::alloc_tid();
    process.live_threads.lock().push(child_tid);
    *process.refcount.lock() = 1;
    table::insert_process(process);

    let _ = table::with_process(parent_pid, |parent| {
        parent.wait.lock().live_children.push(child_pid);
        *parent.refcount.lock() += 0; // parent's own refcount is thread-count, unaffected by children
    });

    let task = Task::new_forked_thread(child_tid, child_pid, parent_frame, parent_pts);
    table::insert_task(task);
    crate::sched::wake_thread(child_tid);

    Ok(child_pid)
}

/// `EXEC` syscall: replace the calling process's address space with a
/// freshly loaded program, keeping its pid, parent, and pts binding.
/// Only valid when the calling thread is its process's sole thread
/// (multithreaded `exec` is rejected — see `DESIGN.md`). Redirects the
/// calling thread's own resume state by mutating `frame` in place: this
/// thread is already past its first scheduling pass, so the stashed
/// `Task::user_entry` the trampoline reads is never consulted again —
/// the only thing that matters on return is what `frame` holds, the
/// same reasoning `exception::try_deliver_swexn` uses to redirect a
/// trap's resume point.
pub fn exec_process(path: &str, image: &[u8], args: &[String], frame: &mut TrapFrame) -> Result<(), KernelError> {
    let _ = path;
    let tid = crate::sched::current_tid();
    let pid = table::with_task(tid, |t| t.pid)?;

    let is_sole_thread = table::with_process(pid, |p| p.live_threads.lock().len() == 1)?;
    if !is_sole_thread {
        return Err(SyscallFailure::InvalidArgument.into());
    }

    let old_cr3 = table::with_process(pid, |p| p.cr3)?;
    let old_regions = table::with_process(pid, |p| core::mem::take(&mut *p.regions.lock()))?;
    for region in &old_regions {
        let _ = crate::process::memory::release_region(region);
    }

    let new_pd = paging::new_page_directory()?;
    let loaded = loader::load_program(new_pd, image)?;
    let (stack_region, initial_esp) = map_stack(new_pd, args)?;
    let mut regions = loaded.regions;
    regions.push(stack_region);

    table::with_process_mut(pid, |p| {
        p.cr3 = new_pd;
        *p.regions.lock() = regions;
    })?;
    paging::free_page_directory(old_cr3);

    table::with_task_mut(tid, |t| {
        t.user_entry = None;
        t.user_regs = crate::arch::x86::usermode::GpRegs::default();
        t.eip0 = 0;
        t.exception = Default::default();
    })?;

    // SAFETY: `new_pd` is the address space just built for this same
    // process; the calling thread keeps running on its own kernel stack
    // throughout, only user-space mappings change.
    unsafe { crate::arch::x86::load_cr3(new_pd.0) };

    frame.edi = 0;
    frame.esi = 0;
    frame.ebp = 0;
    frame.ebx = 0;
    frame.edx = 0;
    frame.ecx = 0;
    frame.eax = 0;
    frame.eip = loaded.entry_point;
    frame.eflags = DEFAULT_EFLAGS;
    frame.esp = initial_esp;
    frame.cs = crate::arch::x86::gdt::SEGSEL_USER_CS as u32;
    frame.ss = crate::arch::x86::gdt::SEGSEL_USER_DS as u32;
    Ok(())
}

/// Map a zeroed, present, writable stack just below `STACK_TOP` and lay
/// out `argv` on it the way a freshly loaded program expects to find
/// it: argument strings packed down from the top, a null-terminated
/// array of pointers to them below that, then a five-word block
/// `[0, argc, argv, stack_hi, stack_lo]` with the returned `esp`
/// pointing at its first (dummy return address) word.
fn map_stack(pd_phys: PhysicalAddress, args: &[String]) -> Result<(MemoryRegion, u32), KernelError> {
    use crate::mm::frame_allocator;

    let first_frame = frame_allocator::alloc_user_frames(STACK_PAGES)?;
    let virt_start = STACK_TOP - STACK_PAGES * PAGE_SIZE as u32;

    without_interrupts(|| {
        for page in 0..STACK_PAGES {
            let frame_phys = first_frame.addr() + page * PAGE_SIZE as u32;
            let vaddr = paging::map_phys_page(frame_phys);
            // SAFETY: `vaddr` is a freshly mapped scratch page.
            unsafe { core::ptr::write_bytes(vaddr as *mut u8, 0, PAGE_SIZE) };
            let va = VirtualAddress(virt_start + page * PAGE_SIZE as u32);
            let pte = Pte::new(frame_phys, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER);
            paging::install_pte(pd_phys.0, va, pte)?;
        }
        Ok(())
    })?;

    let region = MemoryRegion {
        virt_start,
        size_bytes: STACK_PAGES * PAGE_SIZE as u32,
        phys_start: first_frame.addr(),
        writable: true,
    };

    let esp = layout_argv(&region, args)?;
    Ok((region, esp))
}

/// Write `bytes` at virtual address `va` inside `region`, hopping
/// between its backing frames through the scratch slot one page at a
/// time (the way `loader::populate_segment` copies ELF segment data).
fn write_stack_bytes(region: &MemoryRegion, va: u32, bytes: &[u8]) -> Result<(), KernelError> {
    without_interrupts(|| {
        let mut offset = va - region.virt_start;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let page_index = offset / PAGE_SIZE as u32;
            let page_offset = offset % PAGE_SIZE as u32;
            let frame_phys = region.phys_start + page_index * PAGE_SIZE as u32;
            let vaddr = paging::map_phys_page(frame_phys);
            let chunk = remaining.len().min(PAGE_SIZE - page_offset as usize);
            // SAFETY: `vaddr` is the scratch mapping of one of this
            // stack's own freshly allocated frames.
            unsafe {
                core::ptr::copy_nonoverlapping(remaining.as_ptr(), (vaddr + page_offset) as *mut u8, chunk);
            }
            remaining = &remaining[chunk..];
            offset += chunk as u32;
        }
    });
    Ok(())
}

fn write_stack_u32(region: &MemoryRegion, va: u32, value: u32) -> Result<(), KernelError> {
    write_stack_bytes(region, va, &value.to_le_bytes())
}

/// Pack `args` onto the just-mapped stack and return the initial `esp`.
fn layout_argv(region: &MemoryRegion, args: &[String]) -> Result<u32, KernelError> {
    let mut cursor = STACK_TOP;
    let mut argv_addrs: Vec<u32> = Vec::with_capacity(args.len());

    for arg in args.iter().rev() {
        cursor -= arg.len() as u32 + 1;
        write_stack_bytes(region, cursor, arg.as_bytes())?;
        write_stack_bytes(region, cursor + arg.len() as u32, &[0u8])?;
        argv_addrs.push(cursor);
    }
    argv_addrs.reverse();

    cursor &= !0x3;
    cursor -= 4;
    write_stack_u32(region, cursor, 0)?; // argv[argc] = NULL
    for addr in argv_addrs.iter().rev() {
        cursor -= 4;
        write_stack_u32(region, cursor, *addr)?;
    }
    let argv_ptr = cursor;

    cursor -= 5 * 4;
    write_stack_u32(region, cursor, 0)?; // dummy return address
    write_stack_u32(region, cursor + 4, args.len() as u32)?; // argc
    write_stack_u32(region, cursor + 8, argv_ptr)?; // argv
    write_stack_u32(region, cursor + 12, STACK_TOP)?; // stack_hi
    write_stack_u32(region, cursor + 16, region.virt_start)?; // stack_lo

    Ok(cursor)
}

/// Physically duplicate `region` into a fresh set of frames mapped at
/// the same virtual range in `child_pd` (no copy-on-write). A page the
/// parent has only ever seen as zero-fill-on-demand (present-bit clear)
/// stays that way in the child, backed by its own freshly zeroed frame,
/// rather than being eagerly copied and marked present.
fn copy_region(
    parent_pd: PhysicalAddress,
    child_pd: PhysicalAddress,
    region: &MemoryRegion,
) -> Result<MemoryRegion, KernelError> {
    use crate::mm::frame_allocator::{self, FrameNumber};

    let num_pages = region.num_pages();
    let child_first = frame_allocator::alloc_user_frames(num_pages)?;

    without_interrupts(|| {
        for page in 0..num_pages {
            let src_phys = region.phys_start + page * PAGE_SIZE as u32;
            let dst_phys = child_first.addr() + page * PAGE_SIZE as u32;
            let va = VirtualAddress(region.virt_start + page * PAGE_SIZE as u32);
            let dst_frame = FrameNumber(dst_phys / PAGE_SIZE as u32);

            let mut flags = PageFlags::USER;
            if region.writable {
                flags |= PageFlags::WRITABLE;
            }

            let parent_present = paging::get_pte(parent_pd.0, va).is_some_and(|pte| pte.is_present());

            if parent_present {
                let src_vaddr = paging::map_phys_page(src_phys);
                let mut buf = [0u8; PAGE_SIZE];
                // SAFETY: `src_vaddr` maps exactly one present page.
                unsafe { core::ptr::copy_nonoverlapping(src_vaddr as *const u8, buf.as_mut_ptr(), PAGE_SIZE) };

                let dst_vaddr = paging::map_phys_page(dst_phys);
                // SAFETY: `dst_vaddr` maps exactly one freshly allocated page.
                unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), dst_vaddr as *mut u8, PAGE_SIZE) };

                flags |= PageFlags::PRESENT;
                paging::install_pte(child_pd.0, va, Pte::new(dst_frame.addr(), flags))?;
            } else {
                let dst_vaddr = paging::map_phys_page(dst_phys);
                // SAFETY: `dst_vaddr` maps exactly one freshly allocated page.
                unsafe { core::ptr::write_bytes(dst_vaddr as *mut u8, 0, PAGE_SIZE) };

                paging::install_pte(child_pd.0, va, Pte::zfod(dst_frame.addr(), flags | PageFlags::PRESENT))?;
            }
        }
        Ok(())
    })?;

    Ok(MemoryRegion {
        virt_start: region.virt_start,
        size_bytes: region.size_bytes,
        phys_start: child_first.addr(),
        writable: region.writable,
    })
}
