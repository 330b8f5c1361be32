//! Structured, heap-free circular log buffer
//!
//! A fixed-capacity ring of
//! tagged entries behind a `spin::Mutex`, kept as the kernel-internal
//! record of recent events for post-mortem dumps after a panic or a guest
//! kill (`pv_die`). `log::Log` is implemented on top of it so the usual
//! `log::info!`/`warn!`/`error!` call sites also land here and on the
//! serial port.

use core::fmt::Write;

use log::{Level, Log, Metadata, Record};
use spin::Mutex;

pub const LOG_BUFFER_CAPACITY: usize = 256;
pub const LOG_MESSAGE_MAX_LEN: usize = 128;
pub const LOG_SUBSYSTEM_MAX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Level> for LogLevel {
    fn from(l: Level) -> Self {
        match l {
            Level::Error => LogLevel::Error,
            Level::Warn => LogLevel::Warn,
            Level::Info => LogLevel::Info,
            Level::Debug => LogLevel::Debug,
            Level::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Clone, Copy)]
pub struct LogEntry {
    pub level: LogLevel,
    pub tick: u64,
    pub subsystem: [u8; LOG_SUBSYSTEM_MAX_LEN],
    pub subsystem_len: u8,
    pub message: [u8; LOG_MESSAGE_MAX_LEN],
    pub message_len: u8,
}

impl LogEntry {
    const fn empty() -> Self {
        Self {
            level: LogLevel::Trace,
            tick: 0,
            subsystem: [0; LOG_SUBSYSTEM_MAX_LEN],
            subsystem_len: 0,
            message: [0; LOG_MESSAGE_MAX_LEN],
            message_len: 0,
        }
    }

    pub fn subsystem(&self) -> &str {
        core::str::from_utf8(&self.subsystem[..self.subsystem_len as usize]).unwrap_or("?")
    }

    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.message[..self.message_len as usize]).unwrap_or("?")
    }
}

struct RingBuffer {
    entries: [LogEntry; LOG_BUFFER_CAPACITY],
    next: usize,
    count: usize,
}

static LOG_RING: Mutex<RingBuffer> = Mutex::new(RingBuffer {
    entries: [LogEntry::empty(); LOG_BUFFER_CAPACITY],
    next: 0,
    count: 0,
});

struct FixedWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> Write for FixedWriter<'a> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let remaining = self.buf.len() - self.len;
        let n = s.len().min(remaining);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

pub fn klog(level: LogLevel, subsystem: &str, args: core::fmt::Arguments) {
    let mut entry = LogEntry::empty();
    entry.level = level;
    entry.tick = crate::arch::x86::timer::current_tick();

    let mut w = FixedWriter { buf: &mut entry.subsystem, len: 0 };
    let _ = w.write_str(subsystem);
    entry.subsystem_len = w.len as u8;

    let mut w = FixedWriter { buf: &mut entry.message, len: 0 };
    let _ = core::fmt::write(&mut w, args);
    entry.message_len = w.len as u8;

    let mut ring = LOG_RING.lock();
    let idx = ring.next;
    ring.entries[idx] = entry;
    ring.next = (ring.next + 1) % LOG_BUFFER_CAPACITY;
    ring.count = (ring.count + 1).min(LOG_BUFFER_CAPACITY);
}

pub fn log_count() -> usize {
    LOG_RING.lock().count
}

/// Snapshot the `n` most recent entries, oldest first, for a panic dump.
pub fn recent(n: usize) -> alloc::vec::Vec<LogEntry> {
    let ring = LOG_RING.lock();
    let n = n.min(ring.count);
    let mut out = alloc::vec::Vec::with_capacity(n);
    for i in 0..n {
        let idx = (ring.next + LOG_BUFFER_CAPACITY - n + i) % LOG_BUFFER_CAPACITY;
        out.push(ring.entries[idx]);
    }
    out
}

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        klog(record.level().into(), record.target(), *record.args());
        crate::serial_println!("[{:>5}][{}] {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

pub fn init() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .ok();
}

extern crate alloc;
