//! Process lifecycle: PCB layout and execute/halt.

pub mod exec;
pub mod pcb;

pub use pcb::{OpenFile, Pcb, Pid, FD_STDIN, FD_STDOUT, FD_TABLE_SIZE, MAX_ARG_SIZE, MAX_PROCESSES};

/// Physical address marking the top of the kernel's own memory region;
/// process kernel stacks grow down from here.
const KERNEL_MEMORY_TOP: u32 = 8 * 1024 * 1024;
/// Size of each process's kernel-mode stack, with the PCB living at its base.
const KERNEL_STACK_SIZE: u32 = 8 * 1024;

/// Address of the top of `pid`'s 8 KiB kernel stack (`esp0` target).
#[must_use]
pub const fn kernel_stack_top(pid: Pid) -> u32 {
    KERNEL_MEMORY_TOP - (pid as u32) * KERNEL_STACK_SIZE
}

/// Address of `pid`'s PCB, at the base of its kernel stack.
#[must_use]
pub const fn pcb_addr(pid: Pid) -> u32 {
    kernel_stack_top(pid) - KERNEL_STACK_SIZE
}

/// A mutable reference to `pid`'s PCB.
///
/// # Safety
/// `pid` must be currently claimed (its kernel stack, and therefore its
/// PCB, must have been written by a prior `execute`), and the caller must
/// not alias this reference (single-threaded kernel, one call site active
/// at a time per pid).
#[must_use]
pub unsafe fn pcb_mut(pid: Pid) -> &'static mut Pcb {
    // SAFETY: caller guarantees `pid` names a live PCB and no aliasing.
    unsafe { &mut *(pcb_addr(pid) as *mut Pcb) }
}

/// A fixed-size bitmap over the six process id slots.
///
/// Mutated by `execute` (claim) and `halt` (release) inside their
/// respective critical sections, per the concurrency model's shared
/// resource list.
pub struct PidBitmap {
    claimed: [bool; MAX_PROCESSES],
}

impl PidBitmap {
    /// An empty bitmap (no pid claimed).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            claimed: [false; MAX_PROCESSES],
        }
    }

    /// Find and claim the lowest-numbered free pid.
    #[must_use]
    pub fn claim(&mut self) -> Option<Pid> {
        let index = self.claimed.iter().position(|&used| !used)?;
        self.claimed[index] = true;
        Some(index as Pid)
    }

    /// `true` if at least one pid slot is free, without claiming it.
    #[must_use]
    pub fn has_available(&self) -> bool {
        self.claimed.iter().any(|&used| !used)
    }

    /// Release `pid` back to the pool.
    pub fn release(&mut self, pid: Pid) {
        self.claimed[pid as usize] = false;
    }
}

impl Default for PidBitmap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn kernel_stacks_do_not_overlap() {
        for pid in 0..MAX_PROCESSES as Pid {
            let top = kernel_stack_top(pid);
            let base = pcb_addr(pid);
            assert_eq!(top - base, KERNEL_STACK_SIZE);
        }
    }

    #[test_case]
    fn pid_bitmap_claims_lowest_free_slot() {
        let mut bitmap = PidBitmap::new();
        assert_eq!(bitmap.claim(), Some(0));
        assert_eq!(bitmap.claim(), Some(1));
        bitmap.release(0);
        assert_eq!(bitmap.claim(), Some(0));
    }

    #[test_case]
    fn pid_bitmap_exhausts_after_max_processes() {
        let mut bitmap = PidBitmap::new();
        for _ in 0..MAX_PROCESSES {
            assert!(bitmap.claim().is_some());
        }
        assert_eq!(bitmap.claim(), None);
    }

    #[test_case]
    fn has_available_does_not_claim() {
        let mut bitmap = PidBitmap::new();
        assert!(bitmap.has_available());
        assert!(bitmap.has_available(), "checking availability must not claim a slot");
        for _ in 0..MAX_PROCESSES {
            assert!(bitmap.claim().is_some());
        }
        assert!(!bitmap.has_available());
    }
}
