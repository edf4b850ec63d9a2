//! Low-level CPU control: control registers, interrupt flag, halting.
//!
//! `x86_64`'s register wrappers only compile for long mode, so the control
//! register and flag primitives the rest of the kernel needs are hand-rolled
//! here, following the raw-bitflag / inline-asm idiom used for 32-bit
//! protected mode paging code elsewhere in the wild (see `Table`/register
//! access in Maestro's `vmem/x86.rs`).

use core::arch::asm;

bitflags::bitflags! {
    /// Bits of CR0 relevant to this kernel.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Cr0Flags: u32 {
        /// Protected Mode Enable.
        const PROTECTED_MODE = 1 << 0;
        /// Paging.
        const PAGING = 1 << 31;
    }
}

bitflags::bitflags! {
    /// Bits of CR4 relevant to this kernel.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Cr4Flags: u32 {
        /// Page Size Extension: enables 4 MiB super-pages in 32-bit paging.
        const PAGE_SIZE_EXTENSION = 1 << 4;
    }
}

/// Read CR0.
#[must_use]
pub fn read_cr0() -> Cr0Flags {
    let value: u32;
    // SAFETY: CR0 is always readable from ring 0.
    unsafe {
        asm!("mov {}, cr0", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    Cr0Flags::from_bits_truncate(value)
}

/// Write CR0.
///
/// # Safety
/// The caller must guarantee the new flags leave the CPU in a state the
/// kernel can keep running in (e.g. paging must not be enabled before CR3
/// points at a valid page directory).
pub unsafe fn write_cr0(flags: Cr0Flags) {
    // SAFETY: caller guarantees `flags` is a valid CR0 value for the current state.
    unsafe {
        asm!("mov cr0, {}", in(reg) flags.bits(), options(nomem, nostack, preserves_flags));
    }
}

/// Read CR3 (the page directory base register).
#[must_use]
pub fn read_cr3() -> u32 {
    let value: u32;
    // SAFETY: CR3 is always readable from ring 0.
    unsafe {
        asm!("mov {}, cr3", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    value
}

/// Write CR3 with the physical address of a page directory.
///
/// # Safety
/// `page_directory_phys` must point at a valid, 4096-byte-aligned page
/// directory that remains valid for as long as it is installed.
pub unsafe fn write_cr3(page_directory_phys: u32) {
    // SAFETY: caller guarantees the address is a valid page directory.
    unsafe {
        asm!("mov cr3, {}", in(reg) page_directory_phys, options(nomem, nostack, preserves_flags));
    }
}

/// Read CR4.
#[must_use]
pub fn read_cr4() -> Cr4Flags {
    let value: u32;
    // SAFETY: CR4 is always readable from ring 0.
    unsafe {
        asm!("mov {}, cr4", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    Cr4Flags::from_bits_truncate(value)
}

/// Write CR4.
///
/// # Safety
/// The caller must guarantee the new flags are compatible with the running
/// kernel's expectations (e.g. PSE must only be set once the page directory
/// is built to use 4 MiB entries).
pub unsafe fn write_cr4(flags: Cr4Flags) {
    // SAFETY: caller guarantees `flags` is a valid CR4 value for the current state.
    unsafe {
        asm!("mov cr4, {}", in(reg) flags.bits(), options(nomem, nostack, preserves_flags));
    }
}

/// Enable maskable interrupts (`sti`).
///
/// # Safety
/// The IDT must already be loaded and valid; enabling interrupts before
/// that will fault on the first external interrupt.
pub unsafe fn enable_interrupts() {
    // SAFETY: caller guarantees the IDT is installed.
    unsafe {
        asm!("sti", options(nomem, nostack));
    }
}

/// Disable maskable interrupts (`cli`).
pub fn disable_interrupts() {
    // SAFETY: `cli` is always safe; it only narrows what can run concurrently.
    unsafe {
        asm!("cli", options(nomem, nostack));
    }
}

/// Halt the CPU until the next interrupt (`hlt`).
pub fn halt() {
    // SAFETY: `hlt` is always safe to issue from ring 0.
    unsafe {
        asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}

/// Spin forever, halting between interrupts. Used as the tail of panic
/// handlers and of `halt()`'s idle fallback.
pub fn halt_loop() -> ! {
    loop {
        halt();
    }
}
