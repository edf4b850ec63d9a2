//! Round-robin scheduler over terminals.
//!
//! The PIT fires at ~50 Hz ([`crate::pit`]); each tick, [`scheduler`]
//! rotates the CPU to the next terminal with a live process, saving the
//! outgoing process's kernel stack pointers into its PCB and restoring the
//! incoming one's.
//!
//! [`save_stack`]/[`restore_stack`] only work because every process is
//! always suspended and resumed through this exact same call chain (an
//! interrupt's raw stub, [`crate::pit::handler`], [`scheduler`]): the
//! compiler-generated epilogues that unwind back out to `iretd` see the same
//! shape of call frames every time, so swapping `esp`/`ebp` underneath them
//! lands control back in the right place. [`restore_stack`] never returns to
//! its caller in the usual sense — it resumes a different, previously
//! suspended call to itself.

use crate::kernel::{KERNEL, NUM_TERMINALS};
use crate::process::{self, Pid};

/// Run one scheduling tick. Called from [`crate::pit::handler`].
///
/// If the current terminal has not yet launched a process (the very first
/// PIT tick, before the boot terminal's shell has exec'd), does nothing.
/// Otherwise rotates to the next terminal with a running process, or does
/// nothing if no other terminal has one.
pub fn scheduler() {
    let cur_tid = KERNEL.cur_terminal();
    let Some(cur_pid) = KERNEL.running_pid(cur_tid) else {
        return;
    };

    let mut next_tid = (cur_tid + 1) % NUM_TERMINALS;
    loop {
        let ready = {
            let terminals = KERNEL.terminals.lock();
            terminals[next_tid].running_processes > 0 && terminals[next_tid].pid.is_some()
        };
        if ready {
            break;
        }
        next_tid = (next_tid + 1) % NUM_TERMINALS;
        if next_tid == cur_tid {
            return;
        }
    }

    crate::cpu::disable_interrupts();

    // SAFETY: `cur_pid` is `cur_tid`'s own running process, suspended right
    // here by the interrupt that is running this handler.
    unsafe {
        save_stack(Some(cur_pid));
    }

    KERNEL.set_cur_terminal(next_tid);
    #[expect(
        clippy::expect_used,
        reason = "the loop above only breaks once next_tid's pid is confirmed Some"
    )]
    let next_pid = KERNEL
        .running_pid(next_tid)
        .expect("next_tid was just confirmed to have a running pid");

    // SAFETY: interrupts are disabled; no other code touches slot U/V or the
    // TSS concurrently.
    unsafe {
        KERNEL
            .paging
            .map_video(KERNEL.is_cur_terminal_displayed(), next_tid);
        KERNEL.paging.map_user(next_pid);
        restore_stack(next_pid);
    }
}

/// Save `pid`'s current `esp`/`ebp` into its PCB. A no-op if `pid` is `None`
/// (the terminal has never launched a process).
///
/// # Safety
/// `pid` must name the process currently executing at this exact call site
/// (i.e. this call is itself running on that process's kernel stack).
pub unsafe fn save_stack(pid: Option<Pid>) {
    let Some(pid) = pid else {
        return;
    };

    // SAFETY: caller guarantees `pid` is live and is the process suspended
    // here.
    let pcb = unsafe { process::pcb_mut(pid) };
    let esp: u32;
    let ebp: u32;
    // SAFETY: reading esp/ebp never faults and does not touch memory.
    unsafe {
        core::arch::asm!(
            "mov {esp}, esp",
            "mov {ebp}, ebp",
            esp = out(reg) esp,
            ebp = out(reg) ebp,
            options(nomem, nostack, preserves_flags),
        );
    }
    pcb.saved_esp = esp;
    pcb.saved_ebp = ebp;
}

/// Reprogram the TSS for `pid` and jump back into its previously saved
/// `esp`/`ebp`, resuming whatever call to [`save_stack`] last suspended it.
///
/// # Safety
/// `pid` must have been suspended by a prior call to [`save_stack`] from
/// this same call chain, and slot U/V must already be mapped for `pid`.
pub unsafe fn restore_stack(pid: Pid) -> ! {
    // SAFETY: caller guarantees `pid` names a live, previously-saved PCB.
    let pcb = unsafe { process::pcb_mut(pid) };

    {
        let mut tss = crate::gdt::TSS.lock();
        tss.ss0 = crate::gdt::KERNEL_DATA_SELECTOR;
        tss.esp0 = process::kernel_stack_top(pid) - 4;
    }

    let esp = pcb.saved_esp;
    let ebp = pcb.saved_ebp;

    // SAFETY: `esp`/`ebp` were captured by this same pid's own prior call
    // into `save_stack`, on a call chain identical in shape to this one; the
    // `ret` resumes that suspended frame instead of returning here.
    unsafe {
        crate::cpu::enable_interrupts();
        core::arch::asm!(
            "mov esp, {esp}",
            "mov ebp, {ebp}",
            "ret",
            esp = in(reg) esp,
            ebp = in(reg) ebp,
            options(noreturn),
        );
    }
}
