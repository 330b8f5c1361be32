//! Architecture-specific glue
//!
//! Single target: 32-bit protected-mode x86. Everything here is the thin
//! layer the rest of the kernel calls through; the legacy PIC/PIT/CRTC
//! register layouts themselves are treated as an imported black box (see
//! [`x86::legacy`]) rather than re-derived.

pub mod x86;

pub use x86 as current;
