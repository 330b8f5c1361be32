//! Compiled-in read-only executable archive and boot-info parsing
//!
//! Everything beyond the archive (a real filesystem, writable storage) is
//! out of scope per spec.md §1. `multiboot` only extracts the handful of
//! fields the kernel needs at boot (RAM size, archive location);
//! `archive` is the flat `(name, start, length)` table component H's
//! `exec`/`"."` listing read from.

pub mod archive;
pub mod multiboot;
