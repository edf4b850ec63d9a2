//! Process-wide kernel state.
//!
//! The page directory, `cur_terminal`, `display_terminal`, the pid bitmap,
//! and the terminal array are mutated from execute, halt, the scheduler,
//! and the terminal switch ISR. They're encapsulated here behind one
//! `Kernel` value, built once at boot and reached from interrupt handlers
//! through the single well-known static [`KERNEL`] — still process-wide
//! and single-threaded by construction, but an explicit value instead of
//! ambient statics.

use core::sync::atomic::{AtomicUsize, Ordering};

use lazy_static::lazy_static;
use spin::{Mutex, Once};

use crate::fs::FileSystem;
use crate::memory::paging::PageDirectory;
use crate::process::{Pid, PidBitmap};
use crate::terminal::Terminal;

/// Number of independent terminals multiplexed over the one display.
pub const NUM_TERMINALS: usize = 3;

/// Process-wide kernel state.
pub struct Kernel {
    /// The six-slot pid bitmap, claimed by `execute` and released by `halt`.
    pub pids: Mutex<PidBitmap>,
    /// The three terminal records.
    pub terminals: Mutex<[Terminal; NUM_TERMINALS]>,
    /// The terminal whose process is currently scheduled on the CPU.
    cur_terminal: AtomicUsize,
    /// The terminal whose video page is physically visible.
    display_terminal: AtomicUsize,
    /// The single global page directory.
    pub paging: PageDirectory,
    /// The read-only filesystem image, installed once at boot.
    fs: Once<FileSystem>,
}

impl Kernel {
    const fn new() -> Self {
        Self {
            pids: Mutex::new(PidBitmap::new()),
            terminals: Mutex::new([Terminal::new(0), Terminal::new(1), Terminal::new(2)]),
            cur_terminal: AtomicUsize::new(0),
            display_terminal: AtomicUsize::new(0),
            paging: PageDirectory::new(),
            fs: Once::new(),
        }
    }

    /// Install the filesystem image. Must be called exactly once at boot,
    /// before any `execute`.
    ///
    /// # Safety
    /// See [`FileSystem::new`].
    pub unsafe fn install_filesystem(&self, image_base: *const u8) {
        self.fs.call_once(|| {
            // SAFETY: caller upholds `FileSystem::new`'s preconditions.
            unsafe { FileSystem::new(image_base) }
        });
    }

    /// The installed filesystem image.
    ///
    /// # Panics
    /// Panics if called before [`Self::install_filesystem`]; every syscall
    /// and `execute` path runs after boot has installed the image.
    #[must_use]
    pub fn filesystem(&self) -> &FileSystem {
        #[expect(
            clippy::expect_used,
            reason = "the filesystem is installed once during boot, before any caller can run"
        )]
        self.fs.get().expect("filesystem not yet installed")
    }

    /// The terminal id currently scheduled on the CPU.
    #[must_use]
    pub fn cur_terminal(&self) -> usize {
        self.cur_terminal.load(Ordering::SeqCst)
    }

    /// Set the terminal id currently scheduled on the CPU.
    pub fn set_cur_terminal(&self, tid: usize) {
        debug_assert!(tid < NUM_TERMINALS);
        self.cur_terminal.store(tid, Ordering::SeqCst);
    }

    /// The terminal id currently displayed on the physical VGA page.
    #[must_use]
    pub fn display_terminal(&self) -> usize {
        self.display_terminal.load(Ordering::SeqCst)
    }

    /// Set the terminal id currently displayed on the physical VGA page.
    pub fn set_display_terminal(&self, tid: usize) {
        debug_assert!(tid < NUM_TERMINALS);
        self.display_terminal.store(tid, Ordering::SeqCst);
    }

    /// `true` if the currently-scheduled terminal is also the displayed one.
    #[must_use]
    pub fn is_cur_terminal_displayed(&self) -> bool {
        self.cur_terminal() == self.display_terminal()
    }

    /// The PCB for the process currently running in `tid`, if any.
    #[must_use]
    pub fn running_pid(&self, tid: usize) -> Option<Pid> {
        self.terminals.lock()[tid].pid
    }
}

lazy_static! {
    /// The single well-known kernel state, reached by interrupt handlers
    /// and syscall dispatch alike.
    pub static ref KERNEL: Kernel = Kernel::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn cur_and_display_terminal_default_to_zero() {
        assert_eq!(KERNEL.cur_terminal(), 0);
        assert_eq!(KERNEL.display_terminal(), 0);
        assert!(KERNEL.is_cur_terminal_displayed());
    }
}
