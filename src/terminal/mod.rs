//! Terminal multiplexer: line discipline, cursor, and video backing state.
//!
//! Three terminals share one physical display and keyboard; at most one is
//! "displayed" ([`crate::kernel::Kernel::display_terminal`]) while the
//! scheduler rotates which one is "current" (scheduled on the CPU).

pub mod keyboard;

use crate::kernel::KERNEL;
use crate::memory::paging::terminal_backing_phys;
use crate::process::Pid;
use crate::vga_buffer::buffer::Buffer;
use crate::vga_buffer::writer::VGA_PHYS_ADDR;
use crate::vga_buffer::{self, WRITER};

/// Size of a terminal's line-discipline buffer.
pub const LINE_BUFFER_SIZE: usize = 128;

/// Per-terminal state: a line buffer, cursor, process accounting, and an
/// off-screen video backing page.
pub struct Terminal {
    id: usize,
    /// Currently-running pid in this terminal, `None` if it has never
    /// launched a process.
    pub pid: Option<Pid>,
    /// Number of processes currently alive in this terminal (nested execs
    /// push this above 1; it returns to 0 only right before the terminal's
    /// root shell is about to be respawned).
    pub running_processes: u8,
    line_buffer: [u8; LINE_BUFFER_SIZE],
    line_len: usize,
    /// Set by the keyboard ISR on an Enter edge, consumed (and cleared) by
    /// `keyboard::terminal_read`.
    enter_seen: bool,
    saved_column: usize,
    saved_row: usize,
}

impl Terminal {
    /// An empty terminal that has never launched a process.
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self {
            id,
            pid: None,
            running_processes: 0,
            line_buffer: [0; LINE_BUFFER_SIZE],
            line_len: 0,
            enter_seen: false,
            saved_column: 0,
            saved_row: 0,
        }
    }

    /// This terminal's id.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Physical address of this terminal's off-screen video backing page.
    #[must_use]
    pub fn backing_phys(&self) -> u32 {
        terminal_backing_phys(self.id)
    }
}

/// Foreground switch triggered by the keyboard ISR on an ALT+F1..F3 edge.
pub fn switch_to(tid: usize) {
    if tid == KERNEL.display_terminal() {
        return;
    }

    let target_has_no_room = {
        let terminals = KERNEL.terminals.lock();
        terminals[tid].running_processes == 0 && !KERNEL.pids.lock().has_available()
    };
    if target_has_no_room {
        crate::println!("Too many processes running! Cannot launch new terminal.");
        return;
    }

    crate::cpu::disable_interrupts();

    let outgoing = KERNEL.display_terminal();
    blit_and_save(outgoing);

    KERNEL.set_display_terminal(tid);
    // SAFETY: we are in a critical section (interrupts disabled); slot V
    // may be touched concurrently only by the scheduler, which is also
    // excluded while interrupts are off.
    unsafe {
        KERNEL
            .paging
            .map_video(KERNEL.is_cur_terminal_displayed(), KERNEL.cur_terminal());
    }

    let first_launch = restore_and_blit(tid);

    if first_launch {
        // SAFETY: the display page is currently VGA-visible for `tid`
        // because `map_video` was just reprogrammed above (or will be
        // again once `cur_terminal` flips); save-then-switch-then-exec
        // all runs under the same lock.
        unsafe {
            crate::sched::save_stack(KERNEL.running_pid(KERNEL.cur_terminal()));
        }
        KERNEL.set_cur_terminal(tid);
        // SAFETY: see above; this is the terminal's first-ever exec, so no
        // parent process in `tid` can be disturbed by the remap.
        unsafe {
            KERNEL
                .paging
                .map_video(KERNEL.is_cur_terminal_displayed(), KERNEL.cur_terminal());
        }
        // SAFETY: interrupts are re-enabled before the nested exec, which
        // is itself a critical-section-protected call.
        unsafe {
            crate::cpu::enable_interrupts();
        }
        if crate::process::exec::execute(b"shell").is_err() {
            // The invariant that the shell image always exists makes this
            // branch unreachable in practice; there is no recovery path.
            crate::serial_println!("[kernel] fatal: failed to respawn shell");
        }
        return;
    }

    // SAFETY: re-enables interrupts before returning to the caller.
    unsafe {
        crate::cpu::enable_interrupts();
    }
}

/// Save the outgoing displayed terminal's cursor, line buffer, and a
/// full-screen blit of VGA into its backing page.
fn blit_and_save(tid: usize) {
    let mut terminals = KERNEL.terminals.lock();
    let terminal = &mut terminals[tid];

    let mut writer = WRITER.lock();
    let (column, row) = writer.cursor();
    terminal.saved_column = column;
    terminal.saved_row = row;

    // SAFETY: the live VGA page is always valid, and `backing_phys` names a
    // fixed, reserved physical page for this terminal.
    unsafe {
        let mut backing = vga_buffer::writer::Writer::new(terminal.backing_phys() as *mut Buffer);
        writer.blit_into(&mut backing);
    }
}

/// Restore the incoming displayed terminal's cursor and blit its backing
/// page back into VGA. Returns whether this is the terminal's first-ever
/// display (it has never launched a process).
fn restore_and_blit(tid: usize) -> bool {
    let mut terminals = KERNEL.terminals.lock();
    let terminal = &mut terminals[tid];

    let mut writer = WRITER.lock();
    // SAFETY: `backing_phys` names this terminal's own reserved page.
    unsafe {
        let mut backing = vga_buffer::writer::Writer::new(terminal.backing_phys() as *mut Buffer);
        backing.blit_into(&mut writer);
    }
    writer.set_cursor(terminal.saved_column, terminal.saved_row);
    drop(writer);
    // SAFETY: 0xB8000 is the fixed physical VGA buffer address.
    unsafe {
        vga_buffer::rebind(VGA_PHYS_ADDR as *mut Buffer);
    }

    terminal.running_processes == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn terminal_backing_pages_are_distinct_per_id() {
        let t0 = Terminal::new(0);
        let t1 = Terminal::new(1);
        assert_ne!(t0.backing_phys(), t1.backing_phys());
    }

    #[test_case]
    fn fresh_terminal_has_never_launched() {
        let terminal = Terminal::new(0);
        assert!(terminal.pid.is_none());
        assert_eq!(terminal.running_processes, 0);
    }
}
