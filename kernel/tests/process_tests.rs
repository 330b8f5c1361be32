//! On-target tests for process/thread lifecycle (component F) and its
//! memory-region bookkeeping.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use alloc::vec::Vec;

use veridian_kernel::arch::x86::trap::TrapFrame;
use veridian_kernel::error::KernelError;
use veridian_kernel::mm::paging;
use veridian_kernel::mm::{frame_allocator, PAGE_SIZE, STACK_TOP, USER_MEM_START};
use veridian_kernel::process::memory::{self, MemoryRegion};
use veridian_kernel::process::pcb::Process;
use veridian_kernel::process::{lifecycle, table};
use veridian_kernel::sched::{smp, task::Task};
use veridian_kernel::{kernel_assert, kernel_assert_eq, kernel_assert_ne};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    veridian_kernel::mm::init(64 * 1024 * 1024);
    veridian_kernel::mm::heap::init();
    table::init();
    test_main();
    loop {
        veridian_kernel::arch::x86::hlt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    veridian_kernel::test_framework::test_panic_handler(info)
}

fn blank_frame() -> TrapFrame {
    TrapFrame {
        edi: 0,
        esi: 0,
        ebp: 0,
        esp_dummy: 0,
        ebx: 0,
        edx: 0,
        ecx: 0,
        eax: 0,
        vector: 0,
        error_code: 0,
        eip: 0x1000,
        cs: 0,
        eflags: 0,
        esp: STACK_TOP - 4,
        ss: 0,
    }
}

#[test_case]
fn zfod_region_add_consumes_frames_and_is_recorded() -> Result<(), KernelError> {
    let pd_phys = paging::new_page_directory()?;
    let before = frame_allocator::FRAME_ALLOCATOR.lock().free_frame_count();

    let mut regions: Vec<MemoryRegion> = Vec::new();
    memory::add_zfod_region(&mut regions, pd_phys.0, USER_MEM_START, 4, true)?;

    let after = frame_allocator::FRAME_ALLOCATOR.lock().free_frame_count();
    kernel_assert_eq!(before - after, 4);
    kernel_assert_eq!(regions.len(), 1);
    kernel_assert_eq!(regions[0].virt_start, USER_MEM_START);
    kernel_assert_eq!(regions[0].num_pages(), 4);

    paging::free_page_directory(pd_phys);
    Ok(())
}

#[test_case]
fn removing_a_region_returns_its_frames_to_the_pool() -> Result<(), KernelError> {
    let pd_phys = paging::new_page_directory()?;
    let mut regions: Vec<MemoryRegion> = Vec::new();
    memory::add_zfod_region(&mut regions, pd_phys.0, USER_MEM_START, 4, true)?;

    let mid = frame_allocator::FRAME_ALLOCATOR.lock().free_frame_count();
    memory::remove_region(&mut regions, pd_phys.0, USER_MEM_START)?;
    let after = frame_allocator::FRAME_ALLOCATOR.lock().free_frame_count();

    kernel_assert_eq!(after - mid, 4);
    kernel_assert!(regions.is_empty());

    paging::free_page_directory(pd_phys);
    Ok(())
}

#[test_case]
fn overlapping_regions_are_rejected() -> Result<(), KernelError> {
    let pd_phys = paging::new_page_directory()?;
    let mut regions: Vec<MemoryRegion> = Vec::new();
    memory::add_zfod_region(&mut regions, pd_phys.0, USER_MEM_START, 4, true)?;

    let overlapping = memory::add_zfod_region(
        &mut regions,
        pd_phys.0,
        USER_MEM_START + 2 * PAGE_SIZE as u32,
        4,
        true,
    );
    kernel_assert!(overlapping.is_err());
    kernel_assert_eq!(regions.len(), 1);

    paging::free_page_directory(pd_phys);
    Ok(())
}

/// Fork equivalence: the child's regions cover the same virtual ranges
/// as the parent's, backed by distinct physical frames, and the child's
/// sole thread resumes with `eax` forced to 0.
#[test_case]
fn fork_copies_regions_into_a_distinct_address_space() -> Result<(), KernelError> {
    let parent_pd = paging::new_page_directory()?;
    let mut parent_regions: Vec<MemoryRegion> = Vec::new();
    memory::add_zfod_region(&mut parent_regions, parent_pd.0, USER_MEM_START, 2, true)?;

    let parent_pid = table::alloc_pid();
    let mut parent = Process::new(parent_pid, None, parent_pd, 0);
    *parent.regions.lock() = parent_regions;
    let parent_tid = table::alloc_tid();
    parent.live_threads.lock().push(parent_tid);
    *parent.refcount.lock() = 1;
    table::insert_process(parent);

    let task = Task::new_user_thread(parent_tid, parent_pid, 0x1000, STACK_TOP - 4, 0);
    table::insert_task(task);
    smp::set_current(parent_tid);

    let frame = blank_frame();
    let child_pid = lifecycle::fork_process(&frame)?;

    let parent_regions = table::with_process(parent_pid, |p| p.regions.lock().clone())?;
    let child_regions = table::with_process(child_pid, |p| p.regions.lock().clone())?;

    kernel_assert_eq!(parent_regions.len(), child_regions.len());
    for (p, c) in parent_regions.iter().zip(child_regions.iter()) {
        kernel_assert_eq!(p.virt_start, c.virt_start);
        kernel_assert_eq!(p.size_bytes, c.size_bytes);
        kernel_assert_ne!(p.phys_start, c.phys_start);
    }

    let child_live_threads = table::with_process(child_pid, |p| p.live_threads.lock().clone())?;
    kernel_assert_eq!(child_live_threads.len(), 1);
    let child_tid = child_live_threads[0];
    let child_eax = table::with_task(child_tid, |t| t.user_regs.eax)?;
    kernel_assert_eq!(child_eax, 0);

    let parent_wait_children = table::with_process(parent_pid, |p| p.wait.lock().live_children.clone())?;
    kernel_assert_eq!(parent_wait_children, alloc::vec![child_pid]);

    Ok(())
}

/// A process whose calling thread is not its sole live thread must
/// reject `fork` outright.
#[test_case]
fn fork_rejects_a_multithreaded_caller() -> Result<(), KernelError> {
    let pd_phys = paging::new_page_directory()?;
    let pid = table::alloc_pid();
    let mut process = Process::new(pid, None, pd_phys, 0);
    let tid_a = table::alloc_tid();
    let tid_b = table::alloc_tid();
    process.live_threads.lock().push(tid_a);
    process.live_threads.lock().push(tid_b);
    *process.refcount.lock() = 2;
    table::insert_process(process);

    let task_a = Task::new_user_thread(tid_a, pid, 0x1000, STACK_TOP - 4, 0);
    table::insert_task(task_a);
    let task_b = Task::new_user_thread(tid_b, pid, 0x1000, STACK_TOP - 4, 0);
    table::insert_task(task_b);
    smp::set_current(tid_a);

    let frame = blank_frame();
    let result = lifecycle::fork_process(&frame);
    kernel_assert!(result.is_err());

    Ok(())
}
