//! 8259 Programmable Interrupt Controller driver.
//!
//! A two-controller master/slave cascade hand-rolled over
//! [`crate::port::Port`], remapped so the master's eight IRQ lines land at
//! vectors 32-39 and the slave's at 40-47 (keeping them clear of the CPU
//! exception vectors 0-31).

use spin::Mutex;

use crate::port::Port;

const MASTER_8259_COMMAND: u16 = 0x20;
const MASTER_8259_DATA: u16 = 0x21;
const SLAVE_8259_COMMAND: u16 = 0xA0;
const SLAVE_8259_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x11;
const ICW2_MASTER_OFFSET: u8 = 0x20;
const ICW2_SLAVE_OFFSET: u8 = 0x28;
const ICW3_MASTER: u8 = 0x04;
const ICW3_SLAVE: u8 = 0x02;
const ICW4_8086_MODE: u8 = 0x01;

const MASTER_MASK_INIT: u8 = 0xFB;
const SLAVE_MASK_INIT: u8 = 0xFF;

const MASTER_SLAVE_OFFSET: u32 = 8;
const SLAVE_IRQ_NUM: u32 = 2;
const EOI: u8 = 0x60;

/// Interrupt vector the master PIC's IRQ 0 (the PIT) is remapped to.
pub const PIT_VECTOR: u8 = ICW2_MASTER_OFFSET;
/// Interrupt vector the master PIC's IRQ 1 (the keyboard) is remapped to.
pub const KEYBOARD_VECTOR: u8 = ICW2_MASTER_OFFSET + 1;
/// Interrupt vector the slave PIC's IRQ 8 (the RTC) is remapped to.
pub const RTC_VECTOR: u8 = ICW2_SLAVE_OFFSET;

struct Pic {
    master_command: Port<u8>,
    master_data: Port<u8>,
    slave_command: Port<u8>,
    slave_data: Port<u8>,
    master_mask: u8,
    slave_mask: u8,
}

impl Pic {
    const fn new() -> Self {
        // SAFETY: these are the fixed, well-known 8259 port addresses.
        unsafe {
            Self {
                master_command: Port::new(MASTER_8259_COMMAND),
                master_data: Port::new(MASTER_8259_DATA),
                slave_command: Port::new(SLAVE_8259_COMMAND),
                slave_data: Port::new(SLAVE_8259_DATA),
                master_mask: MASTER_MASK_INIT,
                slave_mask: SLAVE_MASK_INIT,
            }
        }
    }
}

static PIC: Mutex<Pic> = Mutex::new(Pic::new());

/// Remap both PICs past the CPU exception vectors and mask every line
/// except the slave cascade input.
///
/// # Safety
/// Must run exactly once, before [`crate::idt::init`] enables interrupts.
pub unsafe fn init() {
    let mut pic = PIC.lock();
    // SAFETY: these are the documented 8259 ICW sequences.
    unsafe {
        pic.master_command.write(ICW1_INIT);
        pic.slave_command.write(ICW1_INIT);

        pic.master_data.write(ICW2_MASTER_OFFSET);
        pic.slave_data.write(ICW2_SLAVE_OFFSET);

        pic.master_data.write(ICW3_MASTER);
        pic.slave_data.write(ICW3_SLAVE);

        pic.master_data.write(ICW4_8086_MODE);
        pic.slave_data.write(ICW4_8086_MODE);

        pic.master_mask = MASTER_MASK_INIT;
        pic.slave_mask = SLAVE_MASK_INIT;
        pic.master_data.write(pic.master_mask);
        pic.slave_data.write(pic.slave_mask);
    }
}

/// Unmask the given IRQ line (0-15).
pub fn enable_irq(irq_num: u32) {
    let mut pic = PIC.lock();
    if irq_num < MASTER_SLAVE_OFFSET {
        pic.master_mask &= !(1 << irq_num);
        // SAFETY: `master_data` is the PIC's own data port.
        unsafe {
            pic.master_data.write(pic.master_mask);
        }
    } else if irq_num < MASTER_SLAVE_OFFSET * 2 {
        pic.slave_mask &= !(1 << (irq_num - MASTER_SLAVE_OFFSET));
        // SAFETY: `slave_data` is the PIC's own data port.
        unsafe {
            pic.slave_data.write(pic.slave_mask);
        }
    }
}

/// Acknowledge the given IRQ line, letting the PIC deliver further
/// interrupts on it (and, if it came from the slave, on the cascade line).
pub fn send_eoi(irq_num: u32) {
    let mut pic = PIC.lock();
    if irq_num < MASTER_SLAVE_OFFSET {
        // SAFETY: EOI is always a valid command to issue to the PIC.
        unsafe {
            pic.master_command.write(EOI | irq_num as u8);
        }
    } else if irq_num < MASTER_SLAVE_OFFSET * 2 {
        // SAFETY: EOI is always a valid command to issue to the PIC.
        unsafe {
            pic.master_command.write(EOI | SLAVE_IRQ_NUM as u8);
            pic.slave_command.write(EOI | (irq_num - MASTER_SLAVE_OFFSET) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn remapped_vectors_stay_clear_of_cpu_exceptions() {
        assert!(PIT_VECTOR >= 32);
        assert!(KEYBOARD_VECTOR >= 32);
        assert!(RTC_VECTOR >= 32);
    }

    #[test_case]
    fn keyboard_follows_pit_by_one_vector() {
        assert_eq!(KEYBOARD_VECTOR, PIT_VECTOR + 1);
    }
}
