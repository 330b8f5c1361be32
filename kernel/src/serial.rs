//! Serial port output
//!
//! Thin wrapper around `uart_16550`, kept at a single fixed COM1 port
//! since this kernel has only one target.

use core::fmt;

use spin::Mutex;
use uart_16550::SerialPort;

lazy_static::lazy_static! {
    static ref COM1: Mutex<SerialPort> = {
        // SAFETY: 0x3F8 is the standard COM1 I/O base; nothing else on a
        // bare-metal boot has touched it yet.
        let mut port = unsafe { SerialPort::new(0x3F8) };
        port.init();
        Mutex::new(port)
    };
}

pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    COM1.lock().write_fmt(args).ok();
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(concat!($fmt, "\n"), $($arg)*));
}
