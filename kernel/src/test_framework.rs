//! On-target test harness
//!
//! Unit tests that need real hardware (a live IDT, a running scheduler, an
//! actual page directory) run here under `custom_test_frameworks`, reporting
//! over the serial port and exiting QEMU with a status byte on the debug-exit
//! I/O port. Pure-logic tests that don't need any of that run as ordinary
//! `#[cfg(test)]` modules on the host instead.

use core::panic::PanicInfo;

use crate::error::KernelError;
use crate::{serial_print, serial_println};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Anything `#[test_case]` can run: plain `fn()` tests that panic on
/// failure, or a fallible closure returning `KernelError`.
pub trait Testable {
    fn run(&self) -> Result<(), KernelError>;
}

impl<T> Testable for T
where
    T: Fn() -> Result<(), KernelError>,
{
    fn run(&self) -> Result<(), KernelError> {
        serial_print!("{}...\t", core::any::type_name::<T>());
        match self() {
            Ok(()) => {
                serial_println!("[ok]");
                Ok(())
            }
            Err(e) => {
                serial_println!("[failed]: {:?}", e);
                Err(e)
            }
        }
    }
}

pub fn test_runner(tests: &[&dyn Testable]) -> ! {
    serial_println!("running {} tests", tests.len());
    let mut passed = 0;
    let mut failed = 0;

    for test in tests {
        match test.run() {
            Ok(()) => passed += 1,
            Err(_) => failed += 1,
        }
    }

    serial_println!("\ntest result: {} passed, {} failed", passed, failed);
    exit_qemu(if failed == 0 { QemuExitCode::Success } else { QemuExitCode::Failed });
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed);
}

/// Write the exit code to QEMU's `isa-debug-exit` device (port 0xf4),
/// configured in the test runner's QEMU invocation. Never returns: QEMU
/// terminates the process before the write instruction retires.
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    // SAFETY: port 0xf4 is only ever the debug-exit device when the test
    // binary's QEMU invocation maps it there; regular boot never calls this.
    unsafe { x86::io::outl(0xf4, exit_code as u32) };
    loop {
        crate::arch::x86::hlt();
    }
}

/// Defines a `#[test_case]` test from a fallible body, so on-target
/// tests read like the host-side `#[test]` ones.
#[macro_export]
macro_rules! kernel_test {
    ($name:ident, $test:expr) => {
        #[test_case]
        const $name: &dyn $crate::test_framework::Testable =
            &|| -> Result<(), $crate::error::KernelError> { $test };
    };
}

#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr) => {
        if !$cond {
            serial_println!("assertion failed: {}", stringify!($cond));
            panic!("assertion failed");
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            serial_println!($($arg)*);
            panic!("assertion failed");
        }
    };
}

#[macro_export]
macro_rules! kernel_assert_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            serial_println!(
                "assertion failed: {} != {}\n  left: {:?}\n right: {:?}",
                stringify!($left),
                stringify!($right),
                $left,
                $right
            );
            panic!("assertion failed: not equal");
        }
    };
}

#[macro_export]
macro_rules! kernel_assert_ne {
    ($left:expr, $right:expr) => {
        if $left == $right {
            serial_println!(
                "assertion failed: {} == {}\n  left: {:?}\n right: {:?}",
                stringify!($left),
                stringify!($right),
                $left,
                $right
            );
            panic!("assertion failed: equal");
        }
    };
}
