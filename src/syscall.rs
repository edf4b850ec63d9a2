//! Syscall dispatcher: the ten syscalls reachable from ring 3 via
//! `int 0x80`.
//!
//! Wired to [`crate::idt`]'s `stub_syscall` naked trampoline, which forwards
//! EAX/EBX/ECX/EDX as ordinary cdecl arguments and patches the return value
//! back into the saved EAX slot.

use crate::errors::SyscallError;
use crate::fs::{self, FileType};
use crate::kernel::KERNEL;
use crate::memory::paging;
use crate::process::{self, OpenFile, Pid, FD_TABLE_SIZE, MAX_ARG_SIZE};
use crate::rtc;
use crate::terminal::keyboard;

const SYS_HALT: u32 = 1;
const SYS_EXECUTE: u32 = 2;
const SYS_READ: u32 = 3;
const SYS_WRITE: u32 = 4;
const SYS_OPEN: u32 = 5;
const SYS_CLOSE: u32 = 6;
const SYS_GETARGS: u32 = 7;
const SYS_VIDMAP: u32 = 8;
const SYS_SET_HANDLER: u32 = 9;
const SYS_SIGRETURN: u32 = 10;

/// `-1` on the syscall ABI, the uniform failure return for every syscall
/// but `halt` (which never returns).
const FAIL: u32 = u32::MAX;

/// Maximum bytes read from a user-supplied command-line pointer.
const MAX_COMMAND_LINE: usize = fs::MAX_FILENAME_SIZE + MAX_ARG_SIZE;

/// Entry point called from [`crate::idt`]'s `int 0x80` trampoline. `number`
/// is the syscall index (1..=10); `arg1`/`arg2`/`arg3` are
/// EBX/ECX/EDX at trap time. Never panics: every failure path returns
/// [`FAIL`].
pub extern "C" fn dispatch_from_registers(number: u32, arg1: u32, arg2: u32, arg3: u32) -> u32 {
    match number {
        SYS_HALT => process::exec::halt(arg1),
        SYS_EXECUTE => execute(arg1),
        SYS_READ => dispatch_result(read(arg1, arg2, arg3)),
        SYS_WRITE => dispatch_result(write(arg1, arg2, arg3)),
        SYS_OPEN => dispatch_result(open(arg1)),
        SYS_CLOSE => dispatch_result(close(arg1)),
        SYS_GETARGS => dispatch_result(getargs(arg1, arg2)),
        SYS_VIDMAP => dispatch_result(vidmap(arg1)),
        SYS_SET_HANDLER | SYS_SIGRETURN => FAIL,
        _ => FAIL,
    }
}

fn dispatch_result(result: Result<u32, SyscallError>) -> u32 {
    match result {
        Ok(value) => value,
        Err(err) => {
            crate::serial_println!("[kernel] syscall failed: {err}");
            FAIL
        }
    }
}

/// The pid currently scheduled on the CPU. Every syscall trap fires from a
/// running ring-3 process, so this always resolves.
fn current_pid() -> Pid {
    #[expect(
        clippy::expect_used,
        reason = "a syscall trap only fires from a running user process"
    )]
    KERNEL
        .running_pid(KERNEL.cur_terminal())
        .expect("syscall dispatched with no running process")
}

/// The current process's PCB.
///
/// # Safety
/// Relies on [`current_pid`] always naming the live, currently-running
/// process, as guaranteed by the syscall trap's own invariant.
fn current_pcb() -> &'static mut process::Pcb {
    unsafe { process::pcb_mut(current_pid()) }
}

/// Read a NUL-terminated string out of user memory at `ptr` into `buf`,
/// stopping at the first NUL or `buf.len()`. Returns the copied length.
///
/// The original kernel performs no cross-address-space validation of user
/// pointers beyond a null check; this matches that rather than inventing a
/// bounds check the reference implementation never had.
fn read_user_cstr(ptr: u32, buf: &mut [u8]) -> Option<usize> {
    if ptr == 0 {
        return None;
    }
    let mut len = 0;
    while len < buf.len() {
        // SAFETY: see the module-level note above; `ptr` is trusted modulo
        // the null check just performed.
        let byte = unsafe { core::ptr::read((ptr as usize + len) as *const u8) };
        if byte == 0 {
            break;
        }
        buf[len] = byte;
        len += 1;
    }
    Some(len)
}

fn user_slice(ptr: u32, len: usize) -> Result<&'static [u8], SyscallError> {
    if ptr == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    // SAFETY: see `read_user_cstr`'s note; no further validation is
    // performed on read/write buffer pointers.
    Ok(unsafe { core::slice::from_raw_parts(ptr as *const u8, len) })
}

fn user_slice_mut(ptr: u32, len: usize) -> Result<&'static mut [u8], SyscallError> {
    if ptr == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    // SAFETY: see `read_user_cstr`'s note.
    Ok(unsafe { core::slice::from_raw_parts_mut(ptr as *mut u8, len) })
}

/// Syscall arguments carry a signed length; reinterpret and reject negative
/// values (their bit pattern would otherwise look like a huge `usize`).
fn validate_len(n: u32) -> Result<usize, SyscallError> {
    let n = n as i32;
    if n < 0 {
        return Err(SyscallError::InvalidArgument);
    }
    Ok(n as usize)
}

fn validate_fd(fd: u32) -> Result<usize, SyscallError> {
    let fd = fd as i32;
    if !(0..FD_TABLE_SIZE as i32).contains(&fd) {
        return Err(SyscallError::InvalidArgument);
    }
    Ok(fd as usize)
}

fn execute(command_ptr: u32) -> u32 {
    let mut buf = [0u8; MAX_COMMAND_LINE];
    let Some(len) = read_user_cstr(command_ptr, &mut buf) else {
        return FAIL;
    };
    match process::exec::execute(&buf[..len]) {
        Ok(status) => status,
        Err(_) => FAIL,
    }
}

fn read(fd: u32, buf_ptr: u32, n: u32) -> Result<u32, SyscallError> {
    let fd = validate_fd(fd)?;
    let n = validate_len(n)?;
    let pcb = current_pcb();
    let tid = pcb.tid;
    let open_file = pcb.fds[fd].ok_or(SyscallError::BadFileDescriptor)?;

    match open_file {
        OpenFile::TerminalIn => {
            let buf = user_slice_mut(buf_ptr, n)?;
            Ok(keyboard::terminal_read(tid, buf) as u32)
        }
        OpenFile::TerminalOut => Err(SyscallError::Unsupported),
        OpenFile::Rtc => {
            rtc::wait_for_tick(tid);
            Ok(0)
        }
        OpenFile::Directory { next_index } => {
            let buf = user_slice_mut(buf_ptr, n)?;
            match KERNEL.filesystem().read_dentry_by_index(next_index) {
                Ok(dentry) => {
                    let name = dentry.name();
                    let copy_len = name.len().min(buf.len());
                    buf[..copy_len].copy_from_slice(&name[..copy_len]);
                    pcb.fds[fd] = Some(OpenFile::Directory {
                        next_index: next_index + 1,
                    });
                    Ok(copy_len as u32)
                }
                Err(_) => Ok(0),
            }
        }
        OpenFile::RegularFile { inode, position } => {
            let buf = user_slice_mut(buf_ptr, n)?;
            let read = KERNEL.filesystem().read_data(inode, position, buf)?;
            pcb.fds[fd] = Some(OpenFile::RegularFile {
                inode,
                position: position + read as u32,
            });
            Ok(read as u32)
        }
    }
}

fn write(fd: u32, buf_ptr: u32, n: u32) -> Result<u32, SyscallError> {
    let fd = validate_fd(fd)?;
    let n = validate_len(n)?;
    let pcb = current_pcb();
    let tid = pcb.tid;
    let open_file = pcb.fds[fd].ok_or(SyscallError::BadFileDescriptor)?;

    match open_file {
        OpenFile::TerminalOut => {
            let buf = user_slice(buf_ptr, n)?;
            Ok(keyboard::terminal_write(tid, buf) as u32)
        }
        OpenFile::TerminalIn | OpenFile::Directory { .. } | OpenFile::RegularFile { .. } => {
            Err(SyscallError::Unsupported)
        }
        OpenFile::Rtc => {
            if n != 4 {
                return Err(SyscallError::InvalidArgument);
            }
            let buf = user_slice(buf_ptr, n)?;
            let freq = i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
            if freq < 0 {
                return Err(SyscallError::InvalidArgument);
            }
            rtc::set_frequency(freq as u32).map_err(|()| SyscallError::InvalidArgument)?;
            Ok(0)
        }
    }
}

fn open(name_ptr: u32) -> Result<u32, SyscallError> {
    let mut name_buf = [0u8; fs::MAX_FILENAME_SIZE];
    let name_len = read_user_cstr(name_ptr, &mut name_buf).ok_or(SyscallError::InvalidArgument)?;
    let name = &name_buf[..name_len];

    let dentry = KERNEL.filesystem().read_dentry_by_name(name)?;

    let pcb = current_pcb();
    let fd = (2..FD_TABLE_SIZE)
        .find(|&fd| pcb.fds[fd].is_none())
        .ok_or(SyscallError::ResourceExhausted)?;

    if dentry.filetype == FileType::Rtc {
        let _ = rtc::set_frequency(2);
    }
    pcb.fds[fd] = Some(OpenFile::for_filetype(dentry.filetype, dentry.inode_num));
    Ok(fd as u32)
}

fn close(fd: u32) -> Result<u32, SyscallError> {
    let fd = fd as i32;
    if !(2..FD_TABLE_SIZE as i32).contains(&fd) {
        return Err(SyscallError::InvalidArgument);
    }
    let fd = fd as usize;
    let pcb = current_pcb();
    if pcb.fds[fd].is_none() {
        return Err(SyscallError::BadFileDescriptor);
    }
    pcb.fds[fd] = None;
    Ok(0)
}

fn getargs(buf_ptr: u32, n: u32) -> Result<u32, SyscallError> {
    let n = validate_len(n)?;
    let pcb = current_pcb();
    if pcb.args[0] == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    let buf = user_slice_mut(buf_ptr, n)?;

    let args_len = pcb.args.iter().position(|&b| b == 0).unwrap_or(MAX_ARG_SIZE);
    let copy_len = args_len.min(buf.len().saturating_sub(1));
    buf[..copy_len].copy_from_slice(&pcb.args[..copy_len]);
    if copy_len < buf.len() {
        buf[copy_len] = 0;
    }
    Ok(copy_len as u32)
}

fn vidmap(out_ptr: u32) -> Result<u32, SyscallError> {
    if !(paging::USER_VIRT_BASE..paging::VIDEO_VIRT_BASE).contains(&out_ptr) {
        return Err(SyscallError::InvalidArgument);
    }
    let tid = current_pcb().tid;

    crate::cpu::disable_interrupts();
    // SAFETY: interrupts are disabled for the duration of the slot V remap,
    // matching every other `map_video` call site's critical section.
    unsafe {
        KERNEL
            .paging
            .map_video(KERNEL.is_cur_terminal_displayed(), tid);
    }
    crate::cpu::enable_interrupts();

    // SAFETY: `out_ptr` was just checked to lie within the mapped user
    // super-page.
    unsafe {
        core::ptr::write(out_ptr as *mut u32, paging::VIDEO_VIRT_BASE);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn validate_len_rejects_negative_bit_pattern() {
        assert_eq!(validate_len(u32::MAX), Err(SyscallError::InvalidArgument));
        assert_eq!(validate_len(0), Ok(0));
        assert_eq!(validate_len(10), Ok(10));
    }

    #[test_case]
    fn validate_fd_accepts_only_the_eight_slots() {
        assert!(validate_fd(0).is_ok());
        assert!(validate_fd(7).is_ok());
        assert_eq!(validate_fd(8), Err(SyscallError::InvalidArgument));
    }

    #[test_case]
    fn vidmap_rejects_pointers_outside_the_user_video_range() {
        assert_eq!(vidmap(0), Err(SyscallError::InvalidArgument));
        assert_eq!(
            vidmap(paging::VIDEO_VIRT_BASE),
            Err(SyscallError::InvalidArgument)
        );
    }
}
