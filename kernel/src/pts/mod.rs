//! Console/keyboard multiplexer (spec.md component I)
//!
//! Each virtual terminal owns a per-VT character-cell back-buffer,
//! cursor, a scancode ring fed by the keyboard IRQ, and a cooked-
//! character ring line discipline feeds. Only the foreground VT's
//! back-buffer is mirrored to real video memory, under the global
//! `pts_lock` spinlock; everything else about a PTS (its own buffer,
//! cursor, rings) is serialized by its own [`crate::sync::Mutex`].

extern crate alloc;

pub mod line_discipline;
pub mod ring;
pub mod vt;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::collections::VecDeque;

use pc_keyboard::{layouts::Us104Key, DecodedKey, HandleControl, Keyboard, ScancodeSet1};

use crate::sync::Spinlock;

pub use vt::{CursorPos, Pts, CONSOLE_HEIGHT, CONSOLE_WIDTH};

static REGISTRY: Spinlock<BTreeMap<u32, Box<Pts>>> = Spinlock::new(BTreeMap::new());
static NEXT_PTS_ID: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);

/// Single hardware keyboard's scancode-to-character state machine
/// (shift/caps/multi-byte sequences); shared across VTs since there is
/// only one real keyboard, unlike the per-VT back-buffers.
static DECODER: Spinlock<Keyboard<Us104Key, ScancodeSet1>> =
    Spinlock::new(Keyboard::new(ScancodeSet1::new(), Us104Key, HandleControl::MapLettersToUnicode));

/// Id of the VT currently mirrored to real video memory, and the
/// spinlock guarding both that selection and the video-memory writes
/// themselves (spec.md §5 "global `pts_lock`").
static ACTIVE_PTS: Spinlock<u32> = Spinlock::new(0);

pub fn init() {
    let id = create();
    *ACTIVE_PTS.lock() = id;
    log::info!(target: "pts", "console multiplexer initialized, pts {} foregrounded", id);
}

/// Allocate and register a fresh virtual terminal, returning its id.
pub fn create() -> u32 {
    let id = NEXT_PTS_ID.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
    REGISTRY.lock().insert(id, Box::new(Pts::new(id)));
    id
}

fn with_pts<R>(id: u32, f: impl FnOnce(&Pts) -> R) -> Option<R> {
    let table = REGISTRY.lock();
    table.get(&id).map(|pts| f(pts))
}

pub fn active_id() -> u32 {
    *ACTIVE_PTS.lock()
}

/// `NEW_CONSOLE` syscall: allocate a new VT and foreground it.
pub fn new_console() -> u32 {
    let id = create();
    switch_pts(id);
    id
}

/// Repaint real video memory from `id`'s back-buffer and make it the
/// foreground VT. Held across the whole repaint so a keyboard IRQ or a
/// write from the previous foreground can't interleave a torn frame.
pub fn switch_pts(id: u32) {
    let mut active = ACTIVE_PTS.lock();
    *active = id;
    with_pts(id, |pts| pts.repaint_to_hardware());
}

/// Write bytes to `id`'s back-buffer, and to real video memory too if
/// `id` is currently foreground.
pub fn write(id: u32, bytes: &[u8]) {
    let is_foreground = *ACTIVE_PTS.lock() == id;
    with_pts(id, |pts| pts.put_bytes(bytes, is_foreground));
}

/// Used by the kernel's own `print!`/`serial_println!`-style output:
/// always goes to the currently foregrounded VT.
pub fn write_foreground(bytes: &[u8]) {
    write(active_id(), bytes);
}

/// Used by user-thread output when the thread hasn't otherwise named a
/// PTS: its own bound pts (spec.md §3's per-thread `pts_id`).
pub fn write_current(bytes: &[u8]) {
    let pts_id = current_pts_id();
    write(pts_id, bytes);
}

pub fn current_pts_id() -> u32 {
    crate::process::table::with_task(crate::sched::current_tid(), |t| t.pts_id).unwrap_or(0)
}

pub fn set_color(id: u32, color: u8) -> Result<(), ()> {
    with_pts(id, |pts| pts.set_color(color)).unwrap_or(Err(()))
}

pub fn get_color(id: u32) -> u8 {
    with_pts(id, |pts| pts.color()).unwrap_or(0)
}

pub fn set_cursor(id: u32, row: i32, col: i32) -> Result<(), ()> {
    with_pts(id, |pts| pts.set_cursor(row, col)).unwrap_or(Err(()))
}

pub fn get_cursor(id: u32) -> CursorPos {
    with_pts(id, |pts| pts.cursor()).unwrap_or(CursorPos { row: 0, col: 0 })
}

/// Keyboard IRQ handler feeds raw scancodes here; cooks them into
/// characters and line-buffers them for `readline`/`getchar` (spec.md
/// §4.I). Only reached for scancodes not delivered to a PV guest as a
/// virtual IRQ (see [`crate::pv`]).
pub fn on_scancode(scancode: u8) {
    let active = active_id();
    with_pts(active, |pts| pts.record_scancode(scancode));

    let event = DECODER.lock().add_byte(scancode).ok().flatten();
    let decoded = event.and_then(|ev| DECODER.lock().process_keyevent(ev));
    let ch = match decoded {
        Some(DecodedKey::Unicode(c)) if c.is_ascii() => Some(c as u8),
        Some(DecodedKey::RawKey(_)) | None => None,
        _ => None,
    };
    if let Some(ch) = ch {
        line_discipline::wake_waiters(active, ch);
    }
}

/// `GETCHAR` syscall.
pub fn getchar() -> u8 {
    line_discipline::getchar(current_pts_id())
}

/// `READLINE` syscall: returns the number of bytes placed in `user_buf`.
pub fn readline(user_buf: &mut [u8]) -> usize {
    line_discipline::readline(current_pts_id(), user_buf)
}

pub struct PtsWaiters {
    pub queue: VecDeque<crate::sched::ThreadId>,
}
