//! Page directory management.
//!
//! One global page directory, mutated in place by [`init`], [`map_user`]
//! and [`map_video`]. Layout:
//!
//! - slot 0: identity maps the first 4 MiB at 4 KiB granularity (needed so
//!   the VGA text buffer and low kernel code/data stay addressable).
//! - slot 1: a 4 MiB supervisor super-page covering the kernel proper,
//!   marked global so it survives a CR3 reload.
//! - slot U (virtual 128 MiB): a 4 MiB super-page mapped to physical
//!   `8 MiB + pid*4 MiB`, reinstalled by [`map_user`] on every exec and
//!   context switch.
//! - slot V (virtual 132 MiB): a 4 KiB page table whose single populated
//!   entry targets either the live VGA buffer or the scheduled terminal's
//!   backing page, reinstalled by [`map_video`].
//! - all other slots: absent.

use core::mem::size_of;

use spin::Mutex;

use crate::cpu::{self, Cr0Flags, Cr4Flags};

/// Number of entries in a page directory or page table.
const ENTRIES: usize = 1024;

/// Page-directory index of the identity-mapped first 4 MiB.
const SLOT_LOW: usize = 0;
/// Page-directory index of the kernel's own 4 MiB super-page.
const SLOT_KERNEL: usize = 1;
/// Page-directory index of the per-process user super-page (128 MiB / 4 MiB).
const SLOT_USER: usize = 32;
/// Page-directory index of the per-process video page table (132 MiB / 4 MiB).
const SLOT_VIDEO: usize = 33;

/// Virtual base address of the user super-page.
pub const USER_VIRT_BASE: u32 = 128 * 1024 * 1024;
/// Virtual base address of the per-process video page.
pub const VIDEO_VIRT_BASE: u32 = 132 * 1024 * 1024;
/// Physical base of the first process's image frame; process `pid` lives at
/// `USER_PHYS_BASE + pid * 4 MiB`.
pub const USER_PHYS_BASE: u32 = 8 * 1024 * 1024;
/// Size of one process's physical image frame.
pub const USER_FRAME_SIZE: u32 = 4 * 1024 * 1024;

/// Physical address of the live VGA text buffer.
pub const VGA_PHYS_ADDR: u32 = 0x000B_8000;
/// Size of one terminal's off-screen video backing page.
pub const VIDEO_PAGE_SIZE: u32 = 4096;

/// Physical address of terminal `tid`'s backing page, immediately after the
/// live VGA buffer.
#[must_use]
pub const fn terminal_backing_phys(tid: usize) -> u32 {
    VGA_PHYS_ADDR + VIDEO_PAGE_SIZE * (tid as u32 + 1)
}

bitflags::bitflags! {
    /// Bits common to both page-directory and page-table entries.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        /// The mapping is valid.
        const PRESENT = 1 << 0;
        /// Writable; absent means read-only.
        const WRITABLE = 1 << 1;
        /// Accessible from ring 3; absent restricts to ring 0.
        const USER = 1 << 2;
        /// For a directory entry, targets a 4 MiB page instead of a table.
        const PAGE_SIZE = 1 << 7;
        /// Survives a CR3 reload (requires CR4.PGE and `PAGE_SIZE`).
        const GLOBAL = 1 << 8;
        /// Disable caching (used for memory-mapped VGA pages).
        const CACHE_DISABLE = 1 << 4;
    }
}

/// A raw page-directory or page-table entry: a physical frame address plus
/// flag bits, exactly as the hardware reads it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    const fn absent() -> Self {
        Self(0)
    }

    fn new(phys_addr: u32, flags: EntryFlags) -> Self {
        debug_assert!(
            phys_addr.trailing_zeros() >= 12,
            "physical address must be 4 KiB aligned"
        );
        Self(phys_addr | flags.bits())
    }
}

/// A 4 KiB, 4096-byte-aligned table of 1024 entries — a page directory or a
/// page table, they share a representation.
#[repr(C, align(4096))]
pub struct Table {
    entries: [Entry; ENTRIES],
}

impl Table {
    const fn empty() -> Self {
        Self {
            entries: [Entry::absent(); ENTRIES],
        }
    }

    fn phys_addr(&self) -> u32 {
        core::ptr::addr_of!(*self) as u32
    }
}

/// Process-wide paging state, owned by [`crate::kernel::Kernel`] and
/// touched only from execute/halt/scheduler/terminal-switch critical
/// sections, per the concurrency model's shared-resource list.
pub struct PageDirectory {
    directory: Mutex<Table>,
    low_table: Mutex<Table>,
    video_table: Mutex<Table>,
}

impl PageDirectory {
    /// An empty, not-yet-initialized page directory.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            directory: Mutex::new(Table::empty()),
            low_table: Mutex::new(Table::empty()),
            video_table: Mutex::new(Table::empty()),
        }
    }

    /// Build the page directory once at boot: identity-map the first 4 MiB,
    /// super-page the kernel's own 4 MiB, point slot V at the (still empty)
    /// video page table, enable PSE, then turn on paging and global pages.
    ///
    /// # Safety
    /// Must run exactly once, before any other paging operation, while
    /// running from identity-mapped (or otherwise still-valid) memory.
    pub unsafe fn init(&self) {
        {
            let vga_page = VGA_PHYS_ADDR as usize / 4096;
            let mut low_table = self.low_table.lock();
            for (index, entry) in low_table.entries.iter_mut().enumerate() {
                let mut flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
                if index == vga_page {
                    flags |= EntryFlags::CACHE_DISABLE;
                }
                *entry = Entry::new((index * 4096) as u32, flags);
            }
            let low_table_addr = low_table.phys_addr();
            drop(low_table);

            let mut directory = self.directory.lock();
            directory.entries[SLOT_LOW] =
                Entry::new(low_table_addr, EntryFlags::PRESENT | EntryFlags::WRITABLE);
            directory.entries[SLOT_KERNEL] = Entry::new(
                USER_PHYS_BASE - USER_FRAME_SIZE,
                EntryFlags::PRESENT
                    | EntryFlags::WRITABLE
                    | EntryFlags::PAGE_SIZE
                    | EntryFlags::GLOBAL,
            );

            let video_table_addr = self.video_table.lock().phys_addr();
            directory.entries[SLOT_VIDEO] =
                Entry::new(video_table_addr, EntryFlags::PRESENT | EntryFlags::WRITABLE);
        }

        let directory_addr = self.directory.lock().phys_addr();

        // SAFETY: PSE must be enabled before any `PAGE_SIZE` directory entry
        // is consulted by the MMU, and paging must be enabled only after
        // CR3 points at a fully built directory; both hold here.
        unsafe {
            let mut cr4 = cpu::read_cr4();
            cr4.insert(Cr4Flags::PAGE_SIZE_EXTENSION);
            cpu::write_cr4(cr4);

            cpu::write_cr3(directory_addr);

            let mut cr0 = cpu::read_cr0();
            cr0.insert(Cr0Flags::PAGING | Cr0Flags::PROTECTED_MODE);
            cpu::write_cr0(cr0);
        }
    }

    /// Install slot U for `pid` and flush the TLB.
    ///
    /// # Safety
    /// `pid` must be a valid, currently-claimed process id (`< MAX_PROCESSES`).
    pub unsafe fn map_user(&self, pid: u8) {
        let phys = USER_PHYS_BASE + u32::from(pid) * USER_FRAME_SIZE;
        let mut directory = self.directory.lock();
        directory.entries[SLOT_USER] = Entry::new(
            phys,
            EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER | EntryFlags::PAGE_SIZE,
        );
        drop(directory);
        // SAFETY: a full TLB flush is always valid from ring 0.
        unsafe {
            self.flush_tlb();
        }
    }

    /// Install slot V so it targets the live VGA buffer when `is_displayed`,
    /// otherwise the scheduled terminal's off-screen backing page, then
    /// flush the TLB.
    ///
    /// # Safety
    /// The caller must be in a critical section with respect to the
    /// scheduler and terminal switch (both also touch slot V).
    pub unsafe fn map_video(&self, is_displayed: bool, tid: usize) {
        let phys = if is_displayed {
            VGA_PHYS_ADDR
        } else {
            terminal_backing_phys(tid)
        };

        let mut video_table = self.video_table.lock();
        video_table.entries[0] = Entry::new(
            phys,
            EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER,
        );
        drop(video_table);
        // SAFETY: a full TLB flush is always valid from ring 0.
        unsafe {
            self.flush_tlb();
        }
    }

    /// Reload CR3 with its own current value, flushing all non-global TLB
    /// entries. Invariant: callers always call this after mutating slot U
    /// or slot V.
    ///
    /// # Safety
    /// Paging must already be enabled.
    unsafe fn flush_tlb(&self) {
        let phys = self.directory.lock().phys_addr();
        // SAFETY: `phys` is this directory's own, already-installed address.
        unsafe {
            cpu::write_cr3(phys);
        }
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn entry_packs_address_and_flags_into_one_word() {
        let entry = Entry::new(0x0040_0000, EntryFlags::PRESENT | EntryFlags::WRITABLE);
        assert_eq!(entry.0, 0x0040_0003);
    }

    #[test_case]
    fn terminal_backing_addresses_are_distinct_and_after_vga() {
        let a = terminal_backing_phys(0);
        let b = terminal_backing_phys(1);
        let c = terminal_backing_phys(2);
        assert!(a > VGA_PHYS_ADDR);
        assert!(b > a);
        assert!(c > b);
    }

    #[test_case]
    fn user_frame_addresses_do_not_overlap_across_pids() {
        for pid in 0..6u8 {
            let phys = USER_PHYS_BASE + u32::from(pid) * USER_FRAME_SIZE;
            assert_eq!((phys - USER_PHYS_BASE) % USER_FRAME_SIZE, 0);
        }
    }
}
