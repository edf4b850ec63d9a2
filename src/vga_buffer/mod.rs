//! VGA buffer management module.
//!
//! Kernel diagnostics (`print!`/`println!`, panic messages, boot banners)
//! always target the live 0xB8000 page directly through the single global
//! [`WRITER`]. Per-terminal output for the
//! `write` syscall on stdout is different: `terminal::keyboard::terminal_write`
//! builds a throwaway [`writer::Writer`] over either the live VGA page or
//! the scheduled terminal's off-screen backing page (see
//! `terminal::Terminal::backing_phys`), chosen by whether that terminal is
//! currently displayed, and persists the cursor it leaves behind on the
//! `Terminal` record itself.

#![allow(unused_imports, reason = "Imports are used in test cases.")]

use lazy_static::lazy_static;
use spin::Mutex;

use buffer::Buffer;
use writer::Writer;

pub mod buffer;
mod colors;
#[macro_use]
pub mod macros;
pub mod writer;

lazy_static! {
    /// Global instance of the kernel-diagnostics VGA buffer writer.
    pub static ref WRITER: Mutex<Writer> = {
        // SAFETY: 0xB8000 is the fixed physical VGA text buffer address.
        Mutex::new(unsafe { Writer::new(writer::VGA_PHYS_ADDR as *mut Buffer) })
    };
}

/// Repoint the global diagnostics writer at a different physical page.
///
/// Used by `terminal::switch_to` to hand the live VGA page back and forth
/// between the kernel's single `Writer` and whichever terminal is displayed.
///
/// # Safety
/// `buffer` must point at a valid `Buffer`-shaped region for as long as it
/// stays installed.
pub unsafe fn rebind(buffer: *mut Buffer) {
    WRITER.lock().rebind(buffer);
}

#[cfg(test)]
mod tests {
    use core::fmt::Write as _;

    use super::*;

    #[test_case]
    fn test_when_printing_many_lines_should_not_panic() {
        for _ in 0..200 {
            println!("test many print output.");
        }
    }

    #[test_case]
    fn test_writing_a_line_advances_the_cursor_column() {
        let line = "Some line that fits on a single line";
        let mut writer = WRITER.lock();
        writer.set_cursor(0, 0);

        write!(writer, "{line}").expect("Failed to write line to vga buffer.");
        let (column, _row) = writer.cursor();
        assert_eq!(
            column,
            line.len(),
            "cursor should advance by one per character"
        );
    }
}
