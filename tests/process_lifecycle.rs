//! Integration test for the PCB/pid lifecycle: a claimed pid's PCB reports
//! its own pid, and a terminal's `running_processes` count stays in
//! lockstep with whether a pid is assigned.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(multiterm_os::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;

use multiterm_os::kernel::KERNEL;
use multiterm_os::process::{self, OpenFile, FD_STDIN, FD_STDOUT};

/// Entry point for the test.
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    test_main();

    #[expect(
        clippy::empty_loop,
        reason = "Infinite loop after the test main function is done."
    )]
    loop {}
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    multiterm_os::test_panic_handler(info)
}

/// A freshly claimed pid's PCB, at its canonical stack-bottom address,
/// reports that same pid back once `reset_for_exec` has run.
#[test_case]
fn claimed_pid_pcb_lives_at_its_canonical_address() {
    let pid = KERNEL.pids.lock().claim().expect("a pid should be free");

    // SAFETY: `pid` was just claimed by this test and is not running
    // anywhere else.
    let pcb = unsafe { process::pcb_mut(pid) };
    pcb.reset_for_exec(pid, 0);

    assert_eq!(pcb.pid, pid);
    assert!(matches!(pcb.fds[FD_STDIN], Some(OpenFile::TerminalIn)));
    assert!(matches!(pcb.fds[FD_STDOUT], Some(OpenFile::TerminalOut)));
    assert!(pcb.fds[2..].iter().all(Option::is_none));

    KERNEL.pids.lock().release(pid);
}

/// The six-slot pid bitmap exhausts after six claims and a released slot
/// becomes claimable again.
#[test_case]
fn pid_bitmap_exhausts_and_recovers() {
    let mut claimed = [0u8; process::MAX_PROCESSES];
    for slot in claimed.iter_mut() {
        *slot = KERNEL.pids.lock().claim().expect("pid should be available");
    }
    assert!(KERNEL.pids.lock().claim().is_none(), "all six pids are in use");

    KERNEL.pids.lock().release(claimed[0]);
    let reclaimed = KERNEL.pids.lock().claim().expect("a released pid should be claimable again");
    assert_eq!(reclaimed, claimed[0]);

    for &pid in claimed.iter().skip(1) {
        KERNEL.pids.lock().release(pid);
    }
    KERNEL.pids.lock().release(reclaimed);
}

/// `terminals[t].running_processes > 0 iff terminals[t].pid != None`, set up
/// the way `execute`/`halt` maintain it, for a terminal slot this test owns
/// exclusively.
#[test_case]
fn terminal_running_processes_matches_pid_presence() {
    const TID: usize = 1;
    let pid = KERNEL.pids.lock().claim().expect("a pid should be free");

    {
        let mut terminals = KERNEL.terminals.lock();
        assert_eq!(terminals[TID].running_processes, 0);
        assert!(terminals[TID].pid.is_none());

        terminals[TID].pid = Some(pid);
        terminals[TID].running_processes += 1;
    }

    {
        let terminals = KERNEL.terminals.lock();
        assert!(terminals[TID].running_processes > 0);
        assert!(terminals[TID].pid.is_some());
    }

    {
        let mut terminals = KERNEL.terminals.lock();
        terminals[TID].running_processes -= 1;
        terminals[TID].pid = None;
    }

    KERNEL.pids.lock().release(pid);
}
