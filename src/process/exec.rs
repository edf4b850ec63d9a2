//! Process creation and teardown.
//!
//! A user program is launched by building an `iret` frame by hand on the
//! new process's kernel stack and falling into it; on `halt`, control jumps
//! straight back into the parent's suspended `execute` call by restoring
//! the `esp`/`ebp` captured just before that `iret`. Neither trick has a
//! safe surface in Rust, so both trampolines are written in raw assembly
//! here.

use crate::errors::ExecError;
use crate::fs;
use crate::gdt;
use crate::kernel::KERNEL;
use crate::memory::paging;
use crate::process::{self, Pcb, Pid, MAX_ARG_SIZE};

/// Offset of `e_entry` within a 32-bit ELF header.
const ELF_ENTRY_OFFSET: usize = 24;
/// Byte offset the user image is loaded at within its 4 MiB frame, matching
/// the conventional ELF default load address (`0x08048000`) relative to this
/// kernel's `USER_VIRT_BASE` (`0x08000000`).
const IMAGE_LOAD_OFFSET: u32 = 0x0004_8000;

#[derive(Debug, PartialEq, Eq)]
struct ParsedCommand {
    filename: [u8; fs::MAX_FILENAME_SIZE],
    filename_len: usize,
    args: [u8; MAX_ARG_SIZE],
    args_len: usize,
}

/// Split a command line into a filename (up to [`fs::MAX_FILENAME_SIZE`]
/// bytes) and an argument tail (up to `MAX_ARG_SIZE - 1` bytes), skipping
/// leading and inter-word spaces. Interior spaces within the argument tail
/// are preserved.
fn parse_command(command: &[u8]) -> Result<ParsedCommand, ExecError> {
    let mut i = 0;
    while i < command.len() && command[i] == b' ' {
        i += 1;
    }

    let mut filename = [0u8; fs::MAX_FILENAME_SIZE];
    let mut filename_len = 0;
    while i < command.len() && command[i] != 0 && command[i] != b' ' && command[i] != b'\n' {
        if filename_len >= fs::MAX_FILENAME_SIZE {
            return Err(ExecError::InvalidArgument);
        }
        filename[filename_len] = command[i];
        filename_len += 1;
        i += 1;
    }
    if filename_len == 0 {
        return Err(ExecError::InvalidArgument);
    }

    while i < command.len() && command[i] == b' ' {
        i += 1;
    }

    let mut args = [0u8; MAX_ARG_SIZE];
    let mut args_len = 0;
    while i < command.len() && command[i] != 0 && command[i] != b'\n' {
        if args_len >= MAX_ARG_SIZE - 1 {
            return Err(ExecError::InvalidArgument);
        }
        args[args_len] = command[i];
        args_len += 1;
        i += 1;
    }

    Ok(ParsedCommand {
        filename,
        filename_len,
        args,
        args_len,
    })
}

/// Load and launch `command` as a new process in the calling terminal,
/// blocking until it halts.
///
/// Returns the status the child passed to `halt`, or an `ExecError` if the
/// process never started.
pub fn execute(command: &[u8]) -> Result<u32, ExecError> {
    let parsed = parse_command(command)?;
    let filename = &parsed.filename[..parsed.filename_len];

    let filesystem = KERNEL.filesystem();
    if !filesystem.is_executable(filename).map_err(|_| ExecError::NotFound)? {
        return Err(ExecError::NotExecutable);
    }

    let pid = KERNEL.pids.lock().claim().ok_or(ExecError::ResourceExhausted)?;

    let tid = KERNEL.cur_terminal();
    let parent_pid = KERNEL.running_pid(tid);

    crate::cpu::disable_interrupts();

    // SAFETY: `pid` was just claimed and is not mapped or running anywhere
    // else.
    unsafe {
        KERNEL.paging.map_user(pid);
    }

    let image_base = paging::USER_VIRT_BASE + IMAGE_LOAD_OFFSET;
    // SAFETY: `map_user` just installed a writable, present 4 MiB user frame
    // covering `image_base` for `paging::USER_FRAME_SIZE` bytes.
    let copy_result = unsafe {
        filesystem.copy_image_to(
            filename,
            image_base as *mut u8,
            paging::USER_FRAME_SIZE as usize,
        )
    };
    let copied = match copy_result {
        Ok(n) if n > ELF_ENTRY_OFFSET + 4 => n,
        _ => {
            KERNEL.pids.lock().release(pid);
            // SAFETY: exits the critical section entered above.
            unsafe {
                crate::cpu::enable_interrupts();
            }
            return Err(ExecError::CorruptImage);
        }
    };
    let _ = copied;

    // SAFETY: `pid` is freshly claimed and exclusively owned by this call.
    let pcb = unsafe { process::pcb_mut(pid) };
    pcb.reset_for_exec(pid, tid);
    pcb.args[..parsed.args_len].copy_from_slice(&parsed.args[..parsed.args_len]);

    let entry_point = u32::from_le_bytes(
        // SAFETY: `copied > ELF_ENTRY_OFFSET + 4` guarantees these four
        // bytes were written by `copy_image_to` above.
        unsafe { core::ptr::read_unaligned((image_base as usize + ELF_ENTRY_OFFSET) as *const [u8; 4]) },
    );
    pcb.saved_eip = entry_point;

    let parent_pcb_ptr: *mut Pcb = match parent_pid {
        // SAFETY: `parent_pid` is the terminal's own currently running
        // process.
        Some(parent_pid) => unsafe { process::pcb_mut(parent_pid) as *mut Pcb },
        None => core::ptr::null_mut(),
    };
    if let Some(parent_pid) = parent_pid {
        pcb.parent = Some(parent_pid);
        // SAFETY: see above.
        unsafe {
            process::pcb_mut(parent_pid).child = Some(pid);
        }
    }

    {
        let mut terminals = KERNEL.terminals.lock();
        let terminal = &mut terminals[tid];
        terminal.pid = Some(pid);
        terminal.running_processes += 1;
    }

    {
        let mut tss = gdt::TSS.lock();
        tss.ss0 = gdt::KERNEL_DATA_SELECTOR;
        tss.esp0 = process::kernel_stack_top(pid) - 4;
    }

    let user_stack_top = paging::VIDEO_VIRT_BASE - 4;

    // SAFETY: the TSS, slot U, and the PCB are all set up for `pid`'s first
    // run; `parent_pcb_ptr` is either null (a terminal's root shell) or the
    // still-live parent this process's `execute` call is blocking inside.
    let status = unsafe {
        enter_user_mode(
            parent_pcb_ptr,
            entry_point,
            user_stack_top,
            u32::from(gdt::USER_CODE_SELECTOR),
            u32::from(gdt::USER_DATA_SELECTOR),
        )
    };

    Ok(status)
}

/// Tear down the calling process and resume its parent's suspended
/// `execute` call with `status`. If the terminal's last process is halting,
/// respawns the shell instead of returning to any parent.
///
/// # Panics
/// Panics if called with no process running in the current terminal — every
/// call to `halt` originates from a syscall made by a running process.
pub fn halt(status: u32) -> ! {
    let tid = KERNEL.cur_terminal();
    #[expect(
        clippy::expect_used,
        reason = "halt only runs on a syscall path from a running process"
    )]
    let pid = KERNEL
        .running_pid(tid)
        .expect("halt called with no running process in this terminal");

    // SAFETY: `pid` is this terminal's own live process, about to be
    // retired.
    let pcb = unsafe { process::pcb_mut(pid) };
    let parent = pcb.parent;

    KERNEL.pids.lock().release(pid);
    for fd in pcb.fds.iter_mut() {
        *fd = None;
    }
    pcb.args = [0; MAX_ARG_SIZE];

    let running_processes = {
        let mut terminals = KERNEL.terminals.lock();
        let terminal = &mut terminals[tid];
        terminal.running_processes -= 1;
        terminal.running_processes
    };

    if running_processes == 0 {
        // Clear the terminal's pid before respawning "shell": otherwise the
        // new shell's execute would see the just-destroyed pid as its own
        // parent.
        KERNEL.terminals.lock()[tid].pid = None;

        match execute(b"shell") {
            Ok(_) => unreachable!("a terminal's root shell never returns through halt"),
            Err(_) => {
                crate::serial_println!("[kernel] fatal: failed to respawn shell in terminal {tid}");
                crate::cpu::halt_loop();
            }
        }
    }

    #[expect(
        clippy::expect_used,
        reason = "running_processes > 0 after this halt implies a parent is still alive"
    )]
    let parent_pid = parent.expect("a terminal with a surviving process always has a parent link");
    // SAFETY: `parent_pid` names the surviving parent process.
    let parent_pcb = unsafe { process::pcb_mut(parent_pid) };
    parent_pcb.child = None;

    KERNEL.terminals.lock()[tid].pid = Some(parent_pid);

    // SAFETY: `parent_pid`'s user frame was installed by its own earlier
    // `execute` call and has not been touched since; reinstalling it is
    // required before resuming it in ring 3.
    unsafe {
        KERNEL.paging.map_user(parent_pid);
    }

    {
        let mut tss = gdt::TSS.lock();
        tss.ss0 = gdt::KERNEL_DATA_SELECTOR;
        tss.esp0 = process::kernel_stack_top(parent_pid) - 4;
    }

    let parent_esp = parent_pcb.saved_esp;

    // SAFETY: `parent_esp` was captured by `enter_user_mode` when this same
    // parent process launched the now-halting child, and is resumed exactly
    // once, here.
    unsafe {
        resume_parent(status, parent_esp);
    }
}

/// Snapshot the caller's `esp`/`ebp` into `parent_pcb` (skipped if null),
/// re-enable interrupts, then build an `iret` frame from `entry`/`user_stack`
/// /`user_cs`/`user_ds` and jump to ring 3.
///
/// Never "returns" in the normal sense: its eventual return value (in
/// `eax`, per the cdecl convention) is supplied later, out of band, by
/// [`resume_parent`] unwinding back into this exact call frame.
///
/// # Safety
/// The TSS and slot U must already be set up for the process about to run;
/// `entry` must be a valid ring-3 instruction pointer within that mapping;
/// `user_stack` must be 0 mod 4 and point at valid, present user-writable
/// memory; `user_cs`/`user_ds` must be this kernel's ring-3 selectors.
#[unsafe(naked)]
unsafe extern "C" fn enter_user_mode(
    parent_pcb: *mut Pcb,
    entry: u32,
    user_stack: u32,
    user_cs: u32,
    user_ds: u32,
) -> u32 {
    core::arch::naked_asm!(
        "push ebp",
        "mov ebp, esp",
        "mov eax, [ebp + 8]",
        "test eax, eax",
        "jz 2f",
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "2:",
        "sti",
        "mov eax, [ebp + 12]",
        "mov ebx, [ebp + 16]",
        "mov ecx, [ebp + 20]",
        "mov edx, [ebp + 24]",
        "mov ds, dx",
        "mov es, dx",
        "mov fs, dx",
        "mov gs, dx",
        "push edx",
        "push ebx",
        "pushfd",
        "pop edi",
        "or edi, 0x200",
        "push edi",
        "push ecx",
        "push eax",
        "iretd",
    );
}

/// Resume a parent's suspended [`enter_user_mode`] call, delivering `status`
/// as its cdecl return value.
///
/// # Safety
/// `parent_esp` must be the `esp` [`enter_user_mode`] captured into a PCB
/// for a call frame that is still suspended and has not already been
/// resumed.
unsafe fn resume_parent(status: u32, parent_esp: u32) -> ! {
    // SAFETY: caller guarantees `parent_esp` names a live, once-only
    // suspended `enter_user_mode` frame; loading it and `ret`-ing unwinds
    // straight back into the `execute` call that is waiting on it, with
    // `status` in `eax` as that call's cdecl return value.
    unsafe {
        core::arch::asm!(
            "mov esp, {esp}",
            "pop ebp",
            "ret",
            esp = in(reg) parent_esp,
            in("eax") status,
            options(noreturn),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn parse_command_splits_filename_and_args() {
        let parsed = parse_command(b"  cat  frame0.txt extra  ").expect("should parse");
        assert_eq!(&parsed.filename[..parsed.filename_len], b"cat");
        assert_eq!(&parsed.args[..parsed.args_len], b"frame0.txt extra  ");
    }

    #[test_case]
    fn parse_command_rejects_empty_command() {
        assert_eq!(parse_command(b"   "), Err(ExecError::InvalidArgument));
        assert_eq!(parse_command(b""), Err(ExecError::InvalidArgument));
    }

    #[test_case]
    fn parse_command_with_filename_only_has_no_args() {
        let parsed = parse_command(b"shell").expect("should parse");
        assert_eq!(&parsed.filename[..parsed.filename_len], b"shell");
        assert_eq!(parsed.args_len, 0);
    }

    #[test_case]
    fn parse_command_rejects_oversize_filename() {
        let long_name = [b'a'; fs::MAX_FILENAME_SIZE + 1];
        assert_eq!(parse_command(&long_name), Err(ExecError::InvalidArgument));
    }
}
