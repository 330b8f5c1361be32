//! Cooked-character line discipline (spec.md §4.I `GETCHAR`/`READLINE`)
//!
//! Each PTS owns a cooked-character ring and a condvar; `on_scancode`
//! pushes one cooked byte and notifies, `getchar`/`readline` pop.
//! `readline` additionally echoes each consumed byte back to the PTS
//! and assembles a full line (terminated by `\n`) before returning,
//! matching `do_readline`'s behavior of only releasing a line at a time.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use crate::sync::{CondVar, Mutex, Spinlock};

use super::ring::ByteRing;

const MAX_READLINE: usize = 4096;

struct Discipline {
    cooked: Mutex<ByteRing>,
    ready: CondVar,
}

impl Discipline {
    fn new() -> Self {
        Self { cooked: Mutex::new(ByteRing::new()), ready: CondVar::new() }
    }
}

static DISCIPLINES: Spinlock<BTreeMap<u32, Box<Discipline>>> = Spinlock::new(BTreeMap::new());

fn with_discipline<R>(pts_id: u32, f: impl FnOnce(&Discipline) -> R) -> R {
    let mut table = DISCIPLINES.lock();
    let entry = table.entry(pts_id).or_insert_with(|| Box::new(Discipline::new()));
    f(entry)
}

/// Called from [`super::on_scancode`] once a scancode cooks into a
/// character: buffers it and wakes the oldest blocked reader, if any.
pub fn wake_waiters(pts_id: u32, ch: u8) {
    with_discipline(pts_id, |d| {
        let mut guard = d.cooked.lock();
        guard.push(ch);
        d.ready.notify_one();
    });
}

/// `GETCHAR`: block until one cooked character is available.
pub fn getchar(pts_id: u32) -> u8 {
    with_discipline(pts_id, |d| loop {
        let mut guard = d.cooked.lock();
        if let Some(ch) = guard.pop() {
            return ch;
        }
        d.ready.wait(&d.cooked, guard);
    })
}

/// `READLINE`: block until a full `\n`-terminated line is available,
/// echo each character as it's consumed, and copy up to `user_buf.len()`
/// bytes (including the trailing newline) into `user_buf`. Returns the
/// number of bytes written.
pub fn readline(pts_id: u32, user_buf: &mut [u8]) -> usize {
    let mut line = alloc::vec::Vec::with_capacity(64);
    loop {
        let ch = getchar(pts_id);
        if ch == 0x08 {
            if line.pop().is_some() {
                super::write(pts_id, &[ch]);
            }
            continue;
        }
        super::write(pts_id, &[ch]);
        if line.len() < MAX_READLINE {
            line.push(ch);
        }
        if ch == b'\n' || line.len() >= user_buf.len() {
            break;
        }
    }
    let n = core::cmp::min(line.len(), user_buf.len());
    user_buf[..n].copy_from_slice(&line[..n]);
    n
}
