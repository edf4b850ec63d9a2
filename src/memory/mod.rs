//! Memory management: paging (C1).
//!
//! The teacher never leaves long mode, so its `memory.rs`/`allocator.rs`
//! drive the `x86_64` crate's 4-level paging types and a heap allocator.
//! Neither applies here: this kernel has no heap (no `alloc` dependency)
//! and uses 32-bit two-level paging with 4 MiB super-pages (PSE), built by
//! hand in the style of `other_examples`' Maestro `vmem/x86.rs` (raw
//! `u32` entries, explicit present/write/user/page-size bits, `register_*`
//! control-register helpers — here [`crate::cpu`]).

pub mod paging;
