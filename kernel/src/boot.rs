//! Multiboot2 header and the `_start` trampoline
//!
//! Declared only by the `veridian-kernel` binary, never by the
//! `veridian_kernel` library: this is the one piece of the kernel that must
//! not exist when linking against the lib (every `kernel/tests/*.rs`
//! integration test defines its own `_start` and has no `kernel_main` to
//! trampoline into). The boot loader itself is external per scope; this is
//! only the thinnest shim needed to be recognized as a multiboot2 image and
//! to hand off to [`crate::kernel_main`] with a real stack: a multiboot2
//! header declaring `architecture = 0` (i386) and a flat 32-bit entry.

core::arch::global_asm!(
    r#"
.section .multiboot_header
.align 8
header_start:
    .long 0xe85250d6        // multiboot2 magic
    .long 0                 // architecture = 0 (i386)
    .long header_end - header_start
    .long -(0xe85250d6 + 0 + (header_end - header_start))
    // end tag
    .word 0
    .word 0
    .long 8
header_end:

.section .bss
.align 16
stack_bottom:
    .skip 65536
stack_top:

.section .text
.global _start
_start:
    mov esp, offset stack_top
    push ebx                 // multiboot info address
    push eax                 // multiboot magic
    call kernel_main_trampoline
.hang:
    hlt
    jmp .hang
"#
);

#[no_mangle]
extern "C" fn kernel_main_trampoline(magic: u32, mbinfo_addr: u32) -> ! {
    crate::kernel_main(magic, mbinfo_addr)
}
