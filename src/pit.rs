//! Programmable Interval Timer: the scheduler's heartbeat.
//!
//! Channel 0, mode 3 (square wave), reprogrammed to a ~50 Hz tick so
//! [`crate::sched::scheduler`] gets a chance to rotate terminals roughly
//! every 20 ms.

use crate::port::Port;

const PIT_IRQ: u32 = 0;
const CHANNEL0: u16 = 0x40;
const MODE_REG: u16 = 0x43;
const MODE_SQUARE_WAVE: u8 = 0x36;
const RELOAD_VAL: u16 = 23864;

/// Program channel 0 for a ~50 Hz tick and unmask its IRQ line.
///
/// # Safety
/// Must run after [`crate::pic::init`].
pub unsafe fn init() {
    // SAFETY: fixed PIT port addresses, written in the documented order.
    unsafe {
        let mut mode_reg: Port<u8> = Port::new(MODE_REG);
        mode_reg.write(MODE_SQUARE_WAVE);

        let mut channel0: Port<u8> = Port::new(CHANNEL0);
        channel0.write((RELOAD_VAL & 0xFF) as u8);
        channel0.write((RELOAD_VAL >> 8) as u8);
    }
    crate::pic::enable_irq(PIT_IRQ);
}

/// Interrupt handler for vector [`crate::pic::PIT_VECTOR`]: acknowledge the
/// interrupt, then let the scheduler run.
pub extern "C" fn handler() {
    crate::pic::send_eoi(PIT_IRQ);
    crate::sched::scheduler();
}
