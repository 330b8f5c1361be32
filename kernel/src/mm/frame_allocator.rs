//! User physical-frame allocator
//!
//! A bitmap-plus-boundary-tag free-list allocator: a single global
//! mutex, sentinel bitmap
//! entries on both ends of the pool, and free-list metadata stored *in
//! the free frames themselves* (headers at the first page, footers at the
//! last), reached only through the per-CPU scratch mapping slot of
//! [`super::paging`] because free frames are never permanently mapped in
//! the kernel's address space.
//!
//! Allocation picks the smallest non-empty bin whose run length suffices,
//! splits the tail back into the bins if the run is larger than requested,
//! and free() coalesces with both neighbors using the bitmap's "is this
//! frame in use" bit to detect whether a neighboring run exists at all.

use spin::Mutex;

use super::{
    paging::map_phys_page,
    PAGE_SIZE,
};
use crate::arch::x86::irq::without_interrupts;

/// Physical frame number (frame index within the whole machine, not just
/// the user pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(pub u32);

impl FrameNumber {
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    pub const fn addr(self) -> u32 {
        self.0 * PAGE_SIZE as u32
    }
}

pub type Result<T> = core::result::Result<T, FrameAllocatorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAllocatorError {
    OutOfMemory,
    InvalidSize,
    DoubleFree,
}

impl From<FrameAllocatorError> for crate::error::KernelError {
    fn from(e: FrameAllocatorError) -> Self {
        crate::error::KernelError::OutOfMemory {
            requested: 0,
            available: 0,
            reason: match e {
                FrameAllocatorError::OutOfMemory => "out_of_frames",
                FrameAllocatorError::InvalidSize => "invalid_size",
                FrameAllocatorError::DoubleFree => "double_free",
            },
        }
    }
}

/// Number of size-class bins. Bin `k` (for `k < NUM_BINS - 1`) holds runs
/// whose length has bit `k` as its highest set bit; the last bin holds
/// "`>= 2^(NUM_BINS-1)` pages". Matches the original kernel's bin count.
const NUM_BINS: usize = 9;
const LAST_BIN_SIZE: u32 = 1 << (NUM_BINS - 1);

/// Header written at the first page of a free run.
#[repr(C)]
struct RunHeader {
    size: u32,
    prev: u32,
    next: u32,
}

/// Footer written at the last page of a free run, used to coalesce
/// backwards in O(1) without walking the whole bin.
#[repr(C)]
struct RunFooter {
    size: u32,
}

fn bin_for_size(size: u32) -> usize {
    if size >= LAST_BIN_SIZE {
        return NUM_BINS - 1;
    }
    for bit in (1..NUM_BINS - 1).rev() {
        if size & (1 << bit) != 0 {
            return bit;
        }
    }
    0
}

/// Bitmap-backed, boundary-tagged physical frame pool.
pub struct FrameAllocator {
    /// `bitmap[pn + 1]` tracks frame `pn`; slot 0 and the final slot are
    /// permanent sentinels so coalescing never reads past the ends of the
    /// pool (see spec.md §4.A / the original's `set_page_inuse(-1)` and
    /// `set_page_inuse(num_user_pages)`).
    bitmap: alloc::vec::Vec<bool>,
    start_frame: u32,
    num_frames: u32,
    bins: [u32; NUM_BINS],
    free_frames: u32,
}

const NO_RUN: u32 = u32::MAX;

impl FrameAllocator {
    const fn empty() -> Self {
        Self {
            bitmap: alloc::vec::Vec::new(),
            start_frame: 0,
            num_frames: 0,
            bins: [NO_RUN; NUM_BINS],
            free_frames: 0,
        }
    }

    fn pa_to_pn(&self, pa: u32) -> u32 {
        (pa - super::USER_MEM_START) / PAGE_SIZE as u32 + self.start_frame
    }

    fn pn_to_pa(&self, pn: u32) -> u32 {
        (pn - self.start_frame) * PAGE_SIZE as u32 + super::USER_MEM_START
    }

    fn is_inuse(&self, pn: u32) -> bool {
        self.bitmap[(pn + 1 - self.start_frame) as usize]
    }

    fn set_inuse(&mut self, pn: u32, inuse: bool) {
        self.bitmap[(pn + 1 - self.start_frame) as usize] = inuse;
    }

    fn read_header(pa: u32) -> (u32, u32, u32) {
        without_interrupts(|| {
            let ptr = map_phys_page(pa) as *const RunHeader;
            // SAFETY: `map_phys_page` just installed a present mapping for `pa`
            // in the per-CPU scratch slot, sized to hold a whole page, so a
            // `RunHeader` read from its start is in-bounds.
            unsafe { ((*ptr).size, (*ptr).prev, (*ptr).next) }
        })
    }

    fn write_header(pa: u32, size: u32, prev: u32, next: u32) {
        without_interrupts(|| {
            let ptr = map_phys_page(pa) as *mut RunHeader;
            // SAFETY: see `read_header`.
            unsafe { *ptr = RunHeader { size, prev, next } };
        })
    }

    fn write_footer(pa_last_page: u32, size: u32) {
        without_interrupts(|| {
            let ptr = map_phys_page(pa_last_page) as *mut RunFooter;
            // SAFETY: see `read_header`.
            unsafe { *ptr = RunFooter { size } };
        })
    }

    fn read_footer_size(pa_last_page: u32) -> u32 {
        without_interrupts(|| {
            let ptr = map_phys_page(pa_last_page) as *const RunFooter;
            // SAFETY: see `read_header`.
            unsafe { (*ptr).size }
        })
    }

    fn bin_insert(&mut self, bin: usize, chunk_pn: u32, size: u32) {
        let chunk_pa = self.pn_to_pa(chunk_pn);
        if self.bins[bin] == NO_RUN {
            Self::write_header(chunk_pa, size, chunk_pn, chunk_pn);
        } else {
            let head_pn = self.bins[bin];
            let head_pa = self.pn_to_pa(head_pn);
            let (head_size, head_prev, head_next) = Self::read_header(head_pa);
            let tail_pn = head_prev;
            let tail_pa = self.pn_to_pa(tail_pn);
            let (tail_size, tail_prev, _tail_next) = Self::read_header(tail_pa);
            Self::write_header(head_pa, head_size, chunk_pn, head_next);
            Self::write_header(chunk_pa, size, tail_pn, head_pn);
            Self::write_header(tail_pa, tail_size, tail_prev, chunk_pn);
        }
        self.bins[bin] = chunk_pn;
        let last_pn = chunk_pn + size - 1;
        Self::write_footer(self.pn_to_pa(last_pn), size);
    }

    fn bin_delete(&mut self, bin: usize, chunk_pn: u32) {
        let chunk_pa = self.pn_to_pa(chunk_pn);
        let (size, prev_pn, next_pn) = Self::read_header(chunk_pa);
        if self.bins[bin] == chunk_pn {
            self.bins[bin] = if next_pn == chunk_pn { NO_RUN } else { next_pn };
        }
        if next_pn != chunk_pn {
            let next_pa = self.pn_to_pa(next_pn);
            let (next_size, _np, next_next) = Self::read_header(next_pa);
            Self::write_header(next_pa, next_size, prev_pn, next_next);
            let prev_pa = self.pn_to_pa(prev_pn);
            let (prev_size, prev_prev, _pn2) = Self::read_header(prev_pa);
            Self::write_header(prev_pa, prev_size, prev_prev, next_pn);
        }
        let _ = size;
    }

    fn add_run(&mut self, pn: u32, size: u32) {
        self.set_inuse(pn, false);
        self.set_inuse(pn + size - 1, false);
        let bin = bin_for_size(size);
        self.bin_insert(bin, pn, size);
        self.free_frames += size;
    }

    fn remove_run(&mut self, pn: u32) {
        let (size, ..) = Self::read_header(self.pn_to_pa(pn));
        let bin = bin_for_size(size);
        self.bin_delete(bin, pn);
        self.free_frames -= size;
    }

    fn alloc_from_bin(&mut self, bin: usize, count: u32) -> Option<u32> {
        let start = self.bins[bin];
        if start == NO_RUN {
            return None;
        }
        let mut cur = start;
        loop {
            let (size, _prev, next) = Self::read_header(self.pn_to_pa(cur));
            if size >= count {
                self.bin_delete(bin, cur);
                self.set_inuse(cur, true);
                self.set_inuse(cur + count - 1, true);
                self.free_frames -= count;
                if size > count {
                    self.add_run(cur + count, size - count);
                }
                return Some(cur);
            }
            cur = next;
            if cur == start {
                return None;
            }
        }
    }

    /// Allocate `count` contiguous user frames.
    pub fn allocate(&mut self, count: u32) -> Result<FrameNumber> {
        if count == 0 {
            return Err(FrameAllocatorError::InvalidSize);
        }
        let mut bin = bin_for_size(count);
        while bin < NUM_BINS {
            if let Some(pn) = self.alloc_from_bin(bin, count) {
                return Ok(FrameNumber::new(self.pn_to_pa(pn) / PAGE_SIZE as u32));
            }
            bin += 1;
        }
        Err(FrameAllocatorError::OutOfMemory)
    }

    /// Return `count` frames starting at `frame` to the pool, coalescing
    /// with free neighbors on both sides.
    pub fn free(&mut self, frame: FrameNumber, count: u32) -> Result<()> {
        let pn = self.pa_to_pn(frame.addr());
        if self.is_inuse(pn) == false {
            return Err(FrameAllocatorError::DoubleFree);
        }
        let mut final_pn = pn;
        let mut final_size = count;

        if !self.is_inuse(pn - 1) {
            let prev_size = Self::read_footer_size(self.pn_to_pa(pn - 1));
            let prev_pn = pn - prev_size;
            self.remove_run(prev_pn);
            final_pn = prev_pn;
            final_size += prev_size;
        }

        let next_pn = pn + count;
        if !self.is_inuse(next_pn) {
            let (next_size, ..) = Self::read_header(self.pn_to_pa(next_pn));
            self.remove_run(next_pn);
            final_size += next_size;
        }

        self.add_run(final_pn, final_size);
        Ok(())
    }

    pub fn free_frame_count(&self) -> u32 {
        self.free_frames
    }

    pub fn total_frame_count(&self) -> u32 {
        self.num_frames
    }
}

lazy_static::lazy_static! {
    pub static ref FRAME_ALLOCATOR: Mutex<FrameAllocator> = Mutex::new(FrameAllocator::empty());
}

/// Build the bitmap and seed the single initial free run spanning the
/// whole user pool. Called once at boot after the RAM size is known.
pub fn init(total_phys_bytes: u32) {
    let mut fa = FRAME_ALLOCATOR.lock();
    let num_user_frames = (total_phys_bytes - super::USER_MEM_START) / PAGE_SIZE as u32;
    fa.start_frame = super::USER_MEM_START / PAGE_SIZE as u32;
    fa.num_frames = num_user_frames;
    fa.bitmap = alloc::vec![false; (num_user_frames + 2) as usize];
    fa.bitmap[0] = true; // sentinel before index 0
    let last = (num_user_frames + 1) as usize;
    fa.bitmap[last] = true; // sentinel after the last frame
    fa.add_run(fa.start_frame, num_user_frames);
}

/// Convenience wrapper used by process/region code.
pub fn alloc_user_frames(count: u32) -> Result<FrameNumber> {
    FRAME_ALLOCATOR.lock().allocate(count)
}

pub fn free_user_frames(frame: FrameNumber, count: u32) -> Result<()> {
    FRAME_ALLOCATOR.lock().free(frame, count)
}

extern crate alloc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_selection_matches_highest_set_bit() {
        assert_eq!(bin_for_size(1), 0);
        assert_eq!(bin_for_size(2), 1);
        assert_eq!(bin_for_size(3), 1);
        assert_eq!(bin_for_size(4), 2);
        assert_eq!(bin_for_size(255), 7);
        assert_eq!(bin_for_size(256), NUM_BINS - 1);
        assert_eq!(bin_for_size(100_000), NUM_BINS - 1);
    }
}
