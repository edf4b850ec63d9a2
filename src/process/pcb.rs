//! Process control block layout.
//!
//! A pure data layout, consumed by `process::exec`, `sched`, and `syscall`,
//! none of which this module depends on. Only the first three fields are
//! read by the assembly glue in `sched`/`syscall::trap`, so only their
//! offsets are pinned by compile-time assertions — the rest of the struct
//! is free to evolve.
//!
//! `parent`/`child` are `Option<Pid>` indices into the fixed pid table
//! rather than raw cross-pointers, so a PCB never needs to reason about
//! another PCB's lifetime.

use crate::fs::FileType;

/// Number of process id slots (the pid bitmap has this many bits).
pub const MAX_PROCESSES: usize = 6;
/// Number of file descriptor slots per process.
pub const FD_TABLE_SIZE: usize = 8;
/// Size of the PCB's raw argument buffer: up to 100 bytes of parsed argument
/// tail plus a terminating NUL, matching `execute`'s own parse cap.
pub const MAX_ARG_SIZE: usize = 101;

/// A claimed process id, always `< MAX_PROCESSES`.
pub type Pid = u8;

/// An open file descriptor's state, unified across the four backing
/// devices as a tagged variant: the absence of a `write` implementation on
/// stdin is simply a variant that never matches in `write`'s dispatch,
/// rather than a null function pointer that must be checked before every
/// call.
#[derive(Clone, Copy, Debug)]
pub enum OpenFile {
    /// A regular file, tracking its inode and current read position.
    RegularFile {
        /// Inode number backing this file's data.
        inode: u32,
        /// Byte offset of the next read.
        position: u32,
    },
    /// The flat directory, tracking which dentry index is read next.
    ///
    /// Tracked per-`OpenFile` rather than as one shared cursor, so two
    /// directory fds opened concurrently (e.g. by two processes, or twice
    /// by one) don't stomp each other's traversal position.
    Directory {
        /// Index of the next directory entry `read` will return.
        next_index: u32,
    },
    /// The real-time clock device. Frequency state lives in [`crate::rtc`];
    /// this variant only distinguishes "this fd is the RTC" for dispatch.
    Rtc,
    /// Terminal standard input.
    TerminalIn,
    /// Terminal standard output.
    TerminalOut,
}

impl OpenFile {
    /// Build the `OpenFile` for `filetype`, as produced by a successful
    /// `open` on a non-device file.
    #[must_use]
    pub const fn for_filetype(filetype: FileType, inode: u32) -> Self {
        match filetype {
            FileType::Directory => Self::Directory { next_index: 0 },
            FileType::Regular => Self::RegularFile { inode, position: 0 },
            FileType::Rtc => Self::Rtc,
        }
    }
}

/// A single file-descriptor table slot: `None` when unused, so "FD `n` is
/// in use" is exactly "slot `n` is `Some`".
pub type FdSlot = Option<OpenFile>;

/// Lives at offset 0 of the 8 KiB kernel stack whose top is
/// `8 MiB - pid * 8 KiB` (see `process::kernel_stack_top`).
#[repr(C)]
pub struct Pcb {
    /// Saved kernel stack pointer; read/written only by `sched`/`syscall::trap`.
    pub saved_esp: u32,
    /// Saved kernel base pointer; read/written only by `sched`/`syscall::trap`.
    pub saved_ebp: u32,
    /// The user program's entry point, read from the ELF header at exec time.
    pub saved_eip: u32,
    /// Open file table; index is the syscall-visible file descriptor.
    pub fds: [FdSlot; FD_TABLE_SIZE],
    /// The PCB that was foreground in this process's terminal when
    /// `execute` ran. `None` for a terminal's root process.
    pub parent: Option<Pid>,
    /// The PCB most recently launched by this process via `execute`, if any.
    pub child: Option<Pid>,
    /// Raw argument tail copied from the command line at exec time,
    /// NUL-terminated.
    pub args: [u8; MAX_ARG_SIZE],
    /// This process's own pid.
    pub pid: Pid,
    /// The terminal this process runs in.
    pub tid: usize,
}

/// File descriptor index bound to terminal stdin on every exec.
pub const FD_STDIN: usize = 0;
/// File descriptor index bound to terminal stdout on every exec.
pub const FD_STDOUT: usize = 1;

impl Pcb {
    /// Reinitialize this PCB in place for a freshly claimed `pid` running
    /// in terminal `tid`: zero the FD table, bind stdin/stdout, clear the
    /// argument buffer and parent/child links.
    pub fn reset_for_exec(&mut self, pid: Pid, tid: usize) {
        self.fds = [const { None }; FD_TABLE_SIZE];
        self.fds[FD_STDIN] = Some(OpenFile::TerminalIn);
        self.fds[FD_STDOUT] = Some(OpenFile::TerminalOut);
        self.parent = None;
        self.child = None;
        self.args = [0; MAX_ARG_SIZE];
        self.pid = pid;
        self.tid = tid;
        self.saved_esp = 0;
        self.saved_ebp = 0;
        self.saved_eip = 0;
    }
}

const _: () = assert!(core::mem::offset_of!(Pcb, saved_esp) == 0);
const _: () = assert!(core::mem::offset_of!(Pcb, saved_ebp) == 4);
const _: () = assert!(core::mem::offset_of!(Pcb, saved_eip) == 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn open_file_for_filetype_binds_inode_only_for_regular_files() {
        let regular = OpenFile::for_filetype(FileType::Regular, 7);
        match regular {
            OpenFile::RegularFile { inode, position } => {
                assert_eq!(inode, 7);
                assert_eq!(position, 0);
            }
            _ => unreachable!("Regular filetype should produce OpenFile::RegularFile"),
        }

        assert!(matches!(
            OpenFile::for_filetype(FileType::Directory, 0),
            OpenFile::Directory { next_index: 0 }
        ));
    }

    #[test_case]
    fn reset_for_exec_binds_stdin_and_stdout() {
        let mut pcb = Pcb {
            saved_esp: 0xDEAD_BEEF,
            saved_ebp: 0xDEAD_BEEF,
            saved_eip: 0xDEAD_BEEF,
            fds: [const { None }; FD_TABLE_SIZE],
            parent: Some(0),
            child: Some(1),
            args: [1; MAX_ARG_SIZE],
            pid: 0,
            tid: 0,
        };

        pcb.reset_for_exec(3, 1);

        assert!(matches!(pcb.fds[FD_STDIN], Some(OpenFile::TerminalIn)));
        assert!(matches!(pcb.fds[FD_STDOUT], Some(OpenFile::TerminalOut)));
        assert!(pcb.fds[2..].iter().all(Option::is_none));
        assert_eq!(pcb.pid, 3);
        assert_eq!(pcb.tid, 1);
        assert!(pcb.parent.is_none());
        assert!(pcb.child.is_none());
    }
}
