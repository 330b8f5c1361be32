//! Trap entry trampolines
//!
//! One tiny asm stub per vector normalizes the CPU's own frame (some
//! faults push an error code, most don't) by pushing a dummy error code
//! when the hardware doesn't supply one, then pushes the vector number
//! and falls into a single shared `pushad` + dispatch + `popad` + `iretd`
//! path. `iretd` itself pops 3 or 5 words depending on whether the
//! restored CS crosses a privilege level, so nothing here needs to know
//! whether a given trap came from ring 0 or ring 3.

use super::idt::{VEC_KEYBOARD, VEC_TIMER};

/// First syscall vector; 26 consecutive vectors from here cover the
/// whole user syscall surface (spec.md §6).
pub const SYSCALL_VEC_BASE: u8 = 0x40;
pub const SYSCALL_VEC_COUNT: u8 = 26;
/// Dedicated hypercall trap gate (spec.md §4.J `HV_INT`).
pub const HYPERCALL_VEC: u8 = 0x60;

/// Register + frame layout left on the kernel stack by a trap stub,
/// matching `pushad`'s push order (low to high address) followed by the
/// vector/error-code pair we normalize, then whatever the CPU pushed.
/// `esp`/`ss` are only meaningful when `cs` names a ring-3 selector.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

/// True if this frame trapped out of ring-3 code (the only case where
/// `esp`/`ss` above are valid).
pub fn from_user_mode(frame: &TrapFrame) -> bool {
    frame.cs & 0x3 == 3
}

macro_rules! stub_no_error_code {
    ($name:ident, $vector:expr) => {
        core::arch::global_asm!(concat!(
            ".global ", stringify!($name), "\n",
            stringify!($name), ":\n",
            "push 0\n",
            "push ", stringify!($vector), "\n",
            "jmp trap_common\n",
        ));
    };
}

macro_rules! stub_with_error_code {
    ($name:ident, $vector:expr) => {
        core::arch::global_asm!(concat!(
            ".global ", stringify!($name), "\n",
            stringify!($name), ":\n",
            "push ", stringify!($vector), "\n",
            "jmp trap_common\n",
        ));
    };
}

core::arch::global_asm!(
    r#"
.global trap_common
trap_common:
    pushad
    mov eax, esp
    push eax
    call trap_dispatch
    add esp, 4
    popad
    add esp, 8
    iretd
"#
);

stub_no_error_code!(trap_stub_0, 0);
stub_no_error_code!(trap_stub_1, 1);
stub_no_error_code!(trap_stub_2, 2);
stub_no_error_code!(trap_stub_3, 3);
stub_no_error_code!(trap_stub_4, 4);
stub_no_error_code!(trap_stub_5, 5);
stub_no_error_code!(trap_stub_6, 6);
stub_no_error_code!(trap_stub_7, 7);
stub_with_error_code!(trap_stub_8, 8);
stub_no_error_code!(trap_stub_9, 9);
stub_with_error_code!(trap_stub_10, 10);
stub_with_error_code!(trap_stub_11, 11);
stub_with_error_code!(trap_stub_12, 12);
stub_with_error_code!(trap_stub_13, 13);
stub_with_error_code!(trap_stub_14, 14);
stub_no_error_code!(trap_stub_15, 15);
stub_no_error_code!(trap_stub_16, 16);
stub_with_error_code!(trap_stub_17, 17);
stub_no_error_code!(trap_stub_18, 18);
stub_no_error_code!(trap_stub_19, 19);

stub_no_error_code!(trap_stub_timer, 0x20);
stub_no_error_code!(trap_stub_keyboard, 0x21);
stub_no_error_code!(trap_stub_hypercall, 0x60);

stub_no_error_code!(trap_stub_sys_0, 0x40);
stub_no_error_code!(trap_stub_sys_1, 0x41);
stub_no_error_code!(trap_stub_sys_2, 0x42);
stub_no_error_code!(trap_stub_sys_3, 0x43);
stub_no_error_code!(trap_stub_sys_4, 0x44);
stub_no_error_code!(trap_stub_sys_5, 0x45);
stub_no_error_code!(trap_stub_sys_6, 0x46);
stub_no_error_code!(trap_stub_sys_7, 0x47);
stub_no_error_code!(trap_stub_sys_8, 0x48);
stub_no_error_code!(trap_stub_sys_9, 0x49);
stub_no_error_code!(trap_stub_sys_10, 0x4a);
stub_no_error_code!(trap_stub_sys_11, 0x4b);
stub_no_error_code!(trap_stub_sys_12, 0x4c);
stub_no_error_code!(trap_stub_sys_13, 0x4d);
stub_no_error_code!(trap_stub_sys_14, 0x4e);
stub_no_error_code!(trap_stub_sys_15, 0x4f);
stub_no_error_code!(trap_stub_sys_16, 0x50);
stub_no_error_code!(trap_stub_sys_17, 0x51);
stub_no_error_code!(trap_stub_sys_18, 0x52);
stub_no_error_code!(trap_stub_sys_19, 0x53);
stub_no_error_code!(trap_stub_sys_20, 0x54);
stub_no_error_code!(trap_stub_sys_21, 0x55);
stub_no_error_code!(trap_stub_sys_22, 0x56);
stub_no_error_code!(trap_stub_sys_23, 0x57);
stub_no_error_code!(trap_stub_sys_24, 0x58);
stub_no_error_code!(trap_stub_sys_25, 0x59);

extern "C" {
    fn trap_stub_0();
    fn trap_stub_1();
    fn trap_stub_2();
    fn trap_stub_3();
    fn trap_stub_4();
    fn trap_stub_5();
    fn trap_stub_6();
    fn trap_stub_7();
    fn trap_stub_8();
    fn trap_stub_9();
    fn trap_stub_10();
    fn trap_stub_11();
    fn trap_stub_12();
    fn trap_stub_13();
    fn trap_stub_14();
    fn trap_stub_15();
    fn trap_stub_16();
    fn trap_stub_17();
    fn trap_stub_18();
    fn trap_stub_19();
    fn trap_stub_timer();
    fn trap_stub_keyboard();
    fn trap_stub_hypercall();
    fn trap_stub_sys_0();
    fn trap_stub_sys_1();
    fn trap_stub_sys_2();
    fn trap_stub_sys_3();
    fn trap_stub_sys_4();
    fn trap_stub_sys_5();
    fn trap_stub_sys_6();
    fn trap_stub_sys_7();
    fn trap_stub_sys_8();
    fn trap_stub_sys_9();
    fn trap_stub_sys_10();
    fn trap_stub_sys_11();
    fn trap_stub_sys_12();
    fn trap_stub_sys_13();
    fn trap_stub_sys_14();
    fn trap_stub_sys_15();
    fn trap_stub_sys_16();
    fn trap_stub_sys_17();
    fn trap_stub_sys_18();
    fn trap_stub_sys_19();
    fn trap_stub_sys_20();
    fn trap_stub_sys_21();
    fn trap_stub_sys_22();
    fn trap_stub_sys_23();
    fn trap_stub_sys_24();
    fn trap_stub_sys_25();
}

/// `(vector, handler address)` pairs for every gate [`super::idt::init`]
/// installs.
pub fn fault_and_irq_gates() -> [(u8, u32); 22] {
    [
        (0, trap_stub_0 as u32),
        (1, trap_stub_1 as u32),
        (2, trap_stub_2 as u32),
        (3, trap_stub_3 as u32),
        (4, trap_stub_4 as u32),
        (5, trap_stub_5 as u32),
        (6, trap_stub_6 as u32),
        (7, trap_stub_7 as u32),
        (8, trap_stub_8 as u32),
        (9, trap_stub_9 as u32),
        (10, trap_stub_10 as u32),
        (11, trap_stub_11 as u32),
        (12, trap_stub_12 as u32),
        (13, trap_stub_13 as u32),
        (14, trap_stub_14 as u32),
        (15, trap_stub_15 as u32),
        (16, trap_stub_16 as u32),
        (17, trap_stub_17 as u32),
        (18, trap_stub_18 as u32),
        (19, trap_stub_19 as u32),
        (VEC_TIMER, trap_stub_timer as u32),
        (VEC_KEYBOARD, trap_stub_keyboard as u32),
    ]
}

pub fn hypercall_gate() -> (u8, u32) {
    (HYPERCALL_VEC, trap_stub_hypercall as u32)
}

/// `(vector, handler address)` pairs for the 26 syscall trap gates,
/// `SYSCALL_VEC_BASE + i` in spec.md §6 table order.
pub fn syscall_gates() -> [(u8, u32); SYSCALL_VEC_COUNT as usize] {
    [
        (SYSCALL_VEC_BASE, trap_stub_sys_0 as u32),
        (SYSCALL_VEC_BASE + 1, trap_stub_sys_1 as u32),
        (SYSCALL_VEC_BASE + 2, trap_stub_sys_2 as u32),
        (SYSCALL_VEC_BASE + 3, trap_stub_sys_3 as u32),
        (SYSCALL_VEC_BASE + 4, trap_stub_sys_4 as u32),
        (SYSCALL_VEC_BASE + 5, trap_stub_sys_5 as u32),
        (SYSCALL_VEC_BASE + 6, trap_stub_sys_6 as u32),
        (SYSCALL_VEC_BASE + 7, trap_stub_sys_7 as u32),
        (SYSCALL_VEC_BASE + 8, trap_stub_sys_8 as u32),
        (SYSCALL_VEC_BASE + 9, trap_stub_sys_9 as u32),
        (SYSCALL_VEC_BASE + 10, trap_stub_sys_10 as u32),
        (SYSCALL_VEC_BASE + 11, trap_stub_sys_11 as u32),
        (SYSCALL_VEC_BASE + 12, trap_stub_sys_12 as u32),
        (SYSCALL_VEC_BASE + 13, trap_stub_sys_13 as u32),
        (SYSCALL_VEC_BASE + 14, trap_stub_sys_14 as u32),
        (SYSCALL_VEC_BASE + 15, trap_stub_sys_15 as u32),
        (SYSCALL_VEC_BASE + 16, trap_stub_sys_16 as u32),
        (SYSCALL_VEC_BASE + 17, trap_stub_sys_17 as u32),
        (SYSCALL_VEC_BASE + 18, trap_stub_sys_18 as u32),
        (SYSCALL_VEC_BASE + 19, trap_stub_sys_19 as u32),
        (SYSCALL_VEC_BASE + 20, trap_stub_sys_20 as u32),
        (SYSCALL_VEC_BASE + 21, trap_stub_sys_21 as u32),
        (SYSCALL_VEC_BASE + 22, trap_stub_sys_22 as u32),
        (SYSCALL_VEC_BASE + 23, trap_stub_sys_23 as u32),
        (SYSCALL_VEC_BASE + 24, trap_stub_sys_24 as u32),
        (SYSCALL_VEC_BASE + 25, trap_stub_sys_25 as u32),
    ]
}

/// Entered from `trap_common` with `esp` pointing at the just-built
/// [`TrapFrame`]. Never unwinds back into asm via Rust panic machinery;
/// every path either returns (letting the stub `popad`/`iretd`) or the
/// thread is killed and this CPU is handed to the scheduler instead.
#[no_mangle]
extern "C" fn trap_dispatch(frame: *mut TrapFrame) {
    // SAFETY: `frame` was just built by `trap_common` on this CPU's own
    // kernel stack and is valid for the duration of this call.
    let frame = unsafe { &mut *frame };
    crate::exception::dispatch(frame);
}
