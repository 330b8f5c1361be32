//! Interrupt Descriptor Table
//!
//! Fills in the CPU exception vectors (0-31), the timer and keyboard
//! lines remapped behind the legacy PIC (see [`super::legacy`]), and the
//! syscall trap gate. Dispatch itself lives in [`crate::exception`]; this
//! module only wires raw vectors to the asm trampolines that build a
//! [`crate::exception::TrapFrame`] and call into it.

use lazy_static::lazy_static;
use spin::Mutex;
use x86::dtables::DescriptorTablePointer;
use x86::segmentation::SegmentSelector;
use x86::Ring;

pub const VEC_DIVIDE_ERROR: u8 = 0;
pub const VEC_DEBUG: u8 = 1;
pub const VEC_NMI: u8 = 2;
pub const VEC_BREAKPOINT: u8 = 3;
pub const VEC_OVERFLOW: u8 = 4;
pub const VEC_BOUND_RANGE: u8 = 5;
pub const VEC_INVALID_OPCODE: u8 = 6;
pub const VEC_DEVICE_NOT_AVAILABLE: u8 = 7;
pub const VEC_DOUBLE_FAULT: u8 = 8;
pub const VEC_INVALID_TSS: u8 = 10;
pub const VEC_SEGMENT_NOT_PRESENT: u8 = 11;
pub const VEC_STACK_SEGMENT: u8 = 12;
pub const VEC_GENERAL_PROTECTION: u8 = 13;
pub const VEC_PAGE_FAULT: u8 = 14;
pub const VEC_FPU: u8 = 16;
pub const VEC_ALIGNMENT_CHECK: u8 = 17;
pub const VEC_SIMD_FP: u8 = 19;

pub const VEC_TIMER: u8 = 0x20;
pub const VEC_KEYBOARD: u8 = 0x21;

const IDT_ENTRIES: usize = 256;

#[derive(Clone, Copy)]
struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    zero: u8,
    flags: u8,
    offset_high: u16,
}

impl GateDescriptor {
    const fn missing() -> Self {
        Self { offset_low: 0, selector: 0, zero: 0, flags: 0, offset_high: 0 }
    }

    fn new(handler: u32, dpl: Ring) -> Self {
        let flags = 0b1000_1110 | ((dpl as u8) << 5);
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: SegmentSelector::new(1, Ring::Ring0).bits(),
            zero: 0,
            flags,
            offset_high: (handler >> 16) as u16,
        }
    }
}

struct Idt {
    entries: [GateDescriptor; IDT_ENTRIES],
}

lazy_static! {
    static ref IDT: Mutex<Idt> = Mutex::new(Idt { entries: [GateDescriptor::missing(); IDT_ENTRIES] });
}

/// Install `handler` (the address of an asm trampoline, not a Rust `fn`
/// pointer with the wrong ABI) at `vector`.
pub fn set_gate(vector: u8, handler: u32, dpl: Ring) {
    IDT.lock().entries[vector as usize] = GateDescriptor::new(handler, dpl);
}

pub fn init() {
    super::legacy::remap_pic(0x20, 0x28);

    for (vector, handler) in super::trap::fault_and_irq_gates() {
        set_gate(vector, handler, Ring::Ring0);
    }
    for (vector, handler) in super::trap::syscall_gates() {
        set_gate(vector, handler, Ring::Ring3);
    }
    let (hv_vector, hv_handler) = super::trap::hypercall_gate();
    set_gate(hv_vector, hv_handler, Ring::Ring3);

    let idt = IDT.lock();
    let ptr = DescriptorTablePointer::new(&idt.entries);
    // SAFETY: `ptr` points at a `'static` table kept alive for the life of
    // the kernel; every gate installed via `set_gate` targets a valid asm
    // trampoline registered before interrupts are unmasked.
    unsafe { x86::dtables::lidt(&ptr) };
}
