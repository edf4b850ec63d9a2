//! Real-time clock driver.
//!
//! `read` on an RTC file descriptor blocks until the next tick flag for the
//! caller's terminal; one physical interrupt sets all three per-terminal
//! flags, and each terminal's own virtualized frequency just governs how
//! many ticks it waits out per `read`.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::kernel::NUM_TERMINALS;
use crate::port::Port;

const NMI_PORT: u16 = 0x70;
const CMOS_PORT: u16 = 0x71;
const RTC_REG_A: u8 = 0x8A;
const RTC_REG_B: u8 = 0x8B;
const RTC_REG_C: u8 = 0x0C;
const REG_B_PERIODIC_INTERRUPT: u8 = 0x40;
const REG_A_RATE_MASK: u8 = 0xF0;
const RTC_IRQ_NUM: u32 = 8;

/// One flag per terminal, set by the ISR and cleared by that terminal's
/// `read`. All three are set on every physical tick regardless of each
/// terminal's own virtualized rate (the original hardware only supports one
/// global rate; per-terminal "frequency" is just how often each reader
/// chooses to poll its flag).
static INT_FLAGS: [AtomicBool; NUM_TERMINALS] = [const { AtomicBool::new(false) }; NUM_TERMINALS];

/// Map a requested frequency in Hz to the register A rate-select nibble.
/// `32768 >> (rate - 1) == freq`, valid for `2 <= rate <= 15`.
fn rate_for_freq(freq: u32) -> Option<u8> {
    match freq {
        2 => Some(15),
        4 => Some(14),
        8 => Some(13),
        16 => Some(12),
        32 => Some(11),
        64 => Some(10),
        128 => Some(9),
        256 => Some(8),
        512 => Some(7),
        1024 => Some(6),
        _ => None,
    }
}

/// Enable register B's periodic-interrupt bit, set the default 2 Hz rate,
/// and unmask the RTC's IRQ line.
///
/// # Safety
/// Must run after [`crate::pic::init`].
pub unsafe fn init() {
    // SAFETY: fixed CMOS port addresses, written in the documented
    // select-then-read-modify-write sequence.
    unsafe {
        let mut nmi: Port<u8> = Port::new(NMI_PORT);
        let mut cmos: Port<u8> = Port::new(CMOS_PORT);

        nmi.write(RTC_REG_B);
        let prev = cmos.read();
        nmi.write(RTC_REG_B);
        cmos.write(prev | REG_B_PERIODIC_INTERRUPT);
    }

    crate::pic::enable_irq(RTC_IRQ_NUM);
    set_frequency(2);

    for flag in &INT_FLAGS {
        flag.store(false, Ordering::SeqCst);
    }
}

/// Reprogram register A's rate-select nibble. Fails if `freq` is not one of
/// the RTC's supported powers of two between 2 and 1024 Hz.
pub fn set_frequency(freq: u32) -> Result<(), ()> {
    let rate = rate_for_freq(freq).ok_or(())?;
    // SAFETY: fixed CMOS port addresses, written in the documented
    // select-then-read-modify-write sequence.
    unsafe {
        let mut nmi: Port<u8> = Port::new(NMI_PORT);
        let mut cmos: Port<u8> = Port::new(CMOS_PORT);

        nmi.write(RTC_REG_A);
        let prev = cmos.read();
        nmi.write(RTC_REG_A);
        cmos.write((prev & REG_A_RATE_MASK) | rate);
    }
    Ok(())
}

/// Interrupt handler for vector [`crate::pic::RTC_VECTOR`]: acknowledge the
/// interrupt, fan the tick out to every terminal's flag, then read register
/// C to re-arm the next interrupt.
pub extern "C" fn handler() {
    crate::pic::send_eoi(RTC_IRQ_NUM);

    for flag in &INT_FLAGS {
        flag.store(true, Ordering::SeqCst);
    }

    // SAFETY: reading register C after an RTC interrupt is required to let
    // the next one fire.
    unsafe {
        let mut nmi: Port<u8> = Port::new(NMI_PORT);
        let mut cmos: Port<u8> = Port::new(CMOS_PORT);
        nmi.write(RTC_REG_C);
        cmos.read();
    }
}

/// Block until `tid`'s flag is set (by the next physical tick), then clear
/// it. This kernel has no other way to sleep a ring-3 caller.
pub fn wait_for_tick(tid: usize) {
    INT_FLAGS[tid].store(false, Ordering::SeqCst);
    while !INT_FLAGS[tid].load(Ordering::SeqCst) {
        core::hint::spin_loop();
    }
    INT_FLAGS[tid].store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn rate_for_freq_matches_known_table() {
        assert_eq!(rate_for_freq(2), Some(15));
        assert_eq!(rate_for_freq(1024), Some(6));
        assert_eq!(rate_for_freq(1000), None);
        assert_eq!(rate_for_freq(0), None);
    }
}
