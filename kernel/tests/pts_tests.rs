//! On-target tests for the console/keyboard multiplexer (component I).

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::error::KernelError;
use veridian_kernel::pts;
use veridian_kernel::{kernel_assert, kernel_assert_eq};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    veridian_kernel::mm::init(64 * 1024 * 1024);
    veridian_kernel::mm::heap::init();
    pts::init();
    test_main();
    loop {
        veridian_kernel::arch::x86::hlt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    veridian_kernel::test_framework::test_panic_handler(info)
}

/// "Hello world": printing a 12-byte line to a fresh foreground PTS
/// moves the cursor to the start of the next row.
#[test_case]
fn printing_hello_world_advances_the_cursor_to_the_next_line() -> Result<(), KernelError> {
    let id = pts::new_console();
    let before = pts::get_cursor(id);
    kernel_assert_eq!((before.row, before.col), (0, 0));

    pts::write(id, b"Hello World\n");

    let after = pts::get_cursor(id);
    kernel_assert_eq!((after.row, after.col), (1, 0));
    Ok(())
}

#[test_case]
fn new_console_allocates_a_distinct_pts_and_foregrounds_it() -> Result<(), KernelError> {
    let first = pts::active_id();
    let second = pts::new_console();
    kernel_assert!(second != first);
    kernel_assert_eq!(pts::active_id(), second);
    Ok(())
}

#[test_case]
fn switching_pts_repaints_without_disturbing_the_other_vts_state() -> Result<(), KernelError> {
    let a = pts::new_console();
    pts::write(a, b"abc");
    let a_cursor_before_switch = pts::get_cursor(a);

    let b = pts::new_console();
    kernel_assert_eq!(pts::active_id(), b);

    pts::switch_pts(a);
    kernel_assert_eq!(pts::active_id(), a);
    kernel_assert_eq!((pts::get_cursor(a).row, pts::get_cursor(a).col), (a_cursor_before_switch.row, a_cursor_before_switch.col));
    Ok(())
}

#[test_case]
fn cursor_set_rejects_out_of_bounds_positions() -> Result<(), KernelError> {
    let id = pts::new_console();
    kernel_assert!(pts::set_cursor(id, 0, 0).is_ok());
    kernel_assert!(pts::set_cursor(id, pts::CONSOLE_HEIGHT as i32, 0).is_err());
    kernel_assert!(pts::set_cursor(id, 0, pts::CONSOLE_WIDTH as i32).is_err());
    Ok(())
}

#[test_case]
fn color_round_trips_through_set_and_get() -> Result<(), KernelError> {
    let id = pts::new_console();
    pts::set_color(id, 0x1f).map_err(|_| KernelError::PtsError("set_color failed"))?;
    kernel_assert_eq!(pts::get_color(id), 0x1f);
    Ok(())
}
