//! Entry point for `multiterm_os`.

#![feature(custom_test_frameworks)]
#![test_runner(multiterm_os::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![no_std]
#![no_main]

use core::panic::PanicInfo;

use multiterm_os::{gdt, idt, kernel::KERNEL, pic, pit, process, rtc, serial_println};

/// Physical address the boot loader leaves the filesystem image module at.
/// Loading the module itself (multiboot, or whatever protocol a given build
/// is chained from) is outside this kernel's scope; this is the fixed
/// contract the loader and this kernel agree on.
const FILESYSTEM_IMAGE_BASE: usize = 0x0040_0000;

/// Entry point: the bootstrap assembly this kernel is linked against (not
/// part of this crate) jumps here after leaving the CPU in 32-bit protected
/// mode with interrupts off and a valid stack.
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    #[cfg(test)]
    {
        test_main();
        #[expect(clippy::empty_loop, reason = "test harness has nothing left to do")]
        loop {}
    }

    #[cfg(not(test))]
    {
        boot();

        #[expect(
            clippy::empty_loop,
            reason = "terminal 0's shell takes over via enter_user_mode and never returns here"
        )]
        loop {}
    }
}

/// Bring up every subsystem in dependency order, install the filesystem
/// image, and launch terminal 0's shell.
///
/// Paging and the descriptor tables must be live before any interrupt can
/// fire or any ring-3 transition can be attempted; the PIC, PIT and RTC
/// only need to be programmed before their first tick; the filesystem
/// image must be installed before the first `execute`. Only
/// terminal 0 ever launches a shell at boot — terminals 1 and 2 get theirs
/// lazily, the first time something switches to them
/// ([`multiterm_os::terminal::switch_to`]).
#[cfg(not(test))]
fn boot() -> ! {
    serial_println!("[boot] multiterm_os starting");

    // SAFETY: this is the very first thing that runs, before any interrupt
    // source is armed and before any other code touches the GDT/TSS.
    unsafe {
        gdt::init();
    }
    // SAFETY: the GDT is live, so the gates' kernel code selector resolves;
    // interrupts are still off at the CPU.
    unsafe {
        idt::init();
    }
    // SAFETY: the IDT is built and loaded; interrupts are still off.
    unsafe {
        pic::init();
    }
    // SAFETY: `KERNEL.paging` has not been touched yet and this runs from
    // identity-mapped low memory.
    unsafe {
        KERNEL.paging.init();
    }
    // SAFETY: the PIC has been remapped and masked; interrupts are off.
    unsafe {
        pit::init();
    }
    // SAFETY: the PIC has been remapped and masked; interrupts are off.
    unsafe {
        rtc::init();
    }

    // SAFETY: the boot loader contract places a valid filesystem image at
    // `FILESYSTEM_IMAGE_BASE`, and paging now identity-maps that address.
    unsafe {
        KERNEL.install_filesystem(FILESYSTEM_IMAGE_BASE as *const u8);
    }

    serial_println!("[boot] launching terminal 0 shell");

    match process::exec::execute(b"shell") {
        Ok(_) => unreachable!("a terminal's root shell never returns through halt"),
        Err(_) => {
            serial_println!("[boot] fatal: failed to launch terminal 0's shell");
            multiterm_os::cpu::halt_loop();
        }
    }
}

/// This function is called on panic.
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[panic] {}", info);
    multiterm_os::cpu::halt_loop();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    multiterm_os::test_panic_handler(info)
}
