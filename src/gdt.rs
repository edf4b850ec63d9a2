//! GDT and TSS initialization for 32-bit protected mode.
//!
//! A 32-bit kernel has to lay out 8-byte segment descriptors and the
//! 32-bit TSS (`esp0`/`ss0`, not a long-mode privilege stack table) by
//! hand, built once behind `lazy_static` selectors and installed by
//! [`init`], following the conventional flat-model layout (null, kernel
//! code, kernel data, user code, user data, TSS).

use core::arch::asm;
use core::mem::size_of;

use lazy_static::lazy_static;

/// Selector for the kernel code segment (ring 0).
pub const KERNEL_CODE_SELECTOR: u16 = 0x10;
/// Selector for the kernel data segment (ring 0).
pub const KERNEL_DATA_SELECTOR: u16 = 0x18;
/// Selector for the user code segment (ring 3, RPL 3).
pub const USER_CODE_SELECTOR: u16 = 0x23;
/// Selector for the user data segment (ring 3, RPL 3).
pub const USER_DATA_SELECTOR: u16 = 0x2B;
/// Selector for the TSS descriptor.
pub const TSS_SELECTOR: u16 = 0x30;

const GDT_ENTRY_COUNT: usize = 6;

/// A single 8-byte GDT segment descriptor.
#[derive(Clone, Copy)]
#[repr(C)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    limit_high_flags: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            limit_high_flags: 0,
            base_high: 0,
        }
    }

    /// Build a flat (base 0, limit 4 GiB) segment descriptor.
    ///
    /// `access` is the 8-bit access byte; `flags` occupies the top nibble of
    /// the limit-high byte (granularity + default operation size).
    const fn flat(access: u8, flags: u8) -> Self {
        Self {
            limit_low: 0xFFFF,
            base_low: 0,
            base_mid: 0,
            access,
            limit_high_flags: 0x0F | (flags << 4),
            base_high: 0,
        }
    }

    const fn tss(base: u32, limit: u32) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access: 0x89,
            limit_high_flags: (((limit >> 16) & 0x0F) as u8) | 0x00,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// Access byte: present, ring 0, code, executable, readable.
const ACCESS_KERNEL_CODE: u8 = 0x9A;
/// Access byte: present, ring 0, data, writable.
const ACCESS_KERNEL_DATA: u8 = 0x92;
/// Access byte: present, ring 3, code, executable, readable.
const ACCESS_USER_CODE: u8 = 0xFA;
/// Access byte: present, ring 3, data, writable.
const ACCESS_USER_DATA: u8 = 0xF2;
/// Flags: 4 KiB granularity, 32-bit default operand size.
const FLAGS_32BIT_PAGE_GRANULAR: u8 = 0b1100;

/// The 32-bit Task State Segment.
///
/// Only `ss0`/`esp0` (the ring-0 stack loaded on a ring 3 -> ring 0
/// transition) and the I/O map base are meaningful to this kernel; the rest
/// of the fields exist because the CPU reads the whole structure.
#[derive(Clone, Copy, Default)]
#[repr(C)]
pub struct TaskStateSegment {
    prev_task_link: u16,
    reserved0: u16,
    /// Ring-0 stack pointer, reloaded by the CPU on every privilege change.
    pub esp0: u32,
    /// Ring-0 stack segment.
    pub ss0: u16,
    reserved1: u16,
    esp1: u32,
    ss1: u16,
    reserved2: u16,
    esp2: u32,
    ss2: u16,
    reserved3: u16,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u16,
    reserved4: u16,
    cs: u16,
    reserved5: u16,
    ss: u16,
    reserved6: u16,
    ds: u16,
    reserved7: u16,
    fs: u16,
    reserved8: u16,
    gs: u16,
    reserved9: u16,
    ldt_selector: u16,
    reserved10: u16,
    trap: u16,
    io_map_base: u16,
}

impl TaskStateSegment {
    /// A zeroed TSS with only the I/O map base pointing past the segment
    /// limit, disabling the I/O permission bitmap.
    const fn new() -> Self {
        Self {
            prev_task_link: 0,
            reserved0: 0,
            esp0: 0,
            ss0: 0,
            reserved1: 0,
            esp1: 0,
            ss1: 0,
            reserved2: 0,
            esp2: 0,
            ss2: 0,
            reserved3: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            reserved4: 0,
            cs: 0,
            reserved5: 0,
            ss: 0,
            reserved6: 0,
            ds: 0,
            reserved7: 0,
            fs: 0,
            reserved8: 0,
            gs: 0,
            reserved9: 0,
            ldt_selector: 0,
            reserved10: 0,
            trap: 0,
            io_map_base: size_of::<Self>() as u16,
        }
    }
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    /// The kernel's TSS, exposed so `process::exec` can rewrite `esp0` on
    /// every process switch.
    pub static ref TSS: spin::Mutex<TaskStateSegment> = spin::Mutex::new(TaskStateSegment::new());
}

lazy_static! {
    static ref GDT: spin::Mutex<[GdtEntry; GDT_ENTRY_COUNT]> = spin::Mutex::new([
        GdtEntry::null(),
        GdtEntry::flat(ACCESS_KERNEL_CODE, FLAGS_32BIT_PAGE_GRANULAR),
        GdtEntry::flat(ACCESS_KERNEL_DATA, FLAGS_32BIT_PAGE_GRANULAR),
        GdtEntry::flat(ACCESS_USER_CODE, FLAGS_32BIT_PAGE_GRANULAR),
        GdtEntry::flat(ACCESS_USER_DATA, FLAGS_32BIT_PAGE_GRANULAR),
        // The TSS descriptor's base/limit are patched in at `init()` time
        // once `TSS`'s address is known; this placeholder reserves the slot.
        GdtEntry::null(),
    ]);
}

/// Install the GDT, reload segment registers, and load the task register.
///
/// # Safety
/// Must run exactly once, before any interrupt can fire and before any
/// ring-3 transition is attempted.
pub unsafe fn init() {
    // SAFETY: `TSS` is a 'static lazy_static, so its address is stable for
    // the life of the kernel.
    let tss_addr = {
        let guard = TSS.lock();
        core::ptr::addr_of!(*guard) as u32
    };
    let tss_limit = (size_of::<TaskStateSegment>() - 1) as u32;

    let gdt_base = {
        let mut guard = GDT.lock();
        guard[5] = GdtEntry::tss(tss_addr, tss_limit);
        core::ptr::addr_of!(guard[0]) as u32
    };

    let pointer = DescriptorTablePointer {
        limit: (size_of::<[GdtEntry; GDT_ENTRY_COUNT]>() - 1) as u16,
        base: gdt_base,
    };

    // SAFETY: `pointer` describes the freshly built, 'static GDT; the
    // segment reloads below select descriptors that table defines.
    unsafe {
        asm!("lgdt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
        reload_segments();
        asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack, preserves_flags));
    }
}

/// Reload CS via a far jump and the data segment registers directly.
///
/// # Safety
/// Must only run immediately after `lgdt` with the selectors this module
/// defines.
unsafe fn reload_segments() {
    // SAFETY: caller just loaded a GDT containing these selectors. The far
    // jump to a local numeric label reloads CS; AT&T syntax is used here
    // because a far jump to an immediate segment:offset has no portable
    // Intel-syntax spelling in LLVM's inline assembler.
    unsafe {
        asm!(
            "ljmp $0x10, $1f",
            "1:",
            "mov $0x18, %ax",
            "mov %ax, %ds",
            "mov %ax, %es",
            "mov %ax, %fs",
            "mov %ax, %gs",
            "mov %ax, %ss",
            options(att_syntax, preserves_flags, nostack),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn tss_default_disables_io_bitmap() {
        let tss = TaskStateSegment::new();
        assert_eq!(tss.io_map_base as usize, size_of::<TaskStateSegment>());
    }

    #[test_case]
    fn user_selectors_carry_ring3_rpl() {
        assert_eq!(USER_CODE_SELECTOR & 0x3, 3);
        assert_eq!(USER_DATA_SELECTOR & 0x3, 3);
        assert_eq!(KERNEL_CODE_SELECTOR & 0x3, 0);
    }
}
