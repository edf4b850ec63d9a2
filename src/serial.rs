//! Serial port output for host-visible logging.
//!
//! Drives the 16550 UART directly through [`crate::port::Port`], behind a
//! lazy-static mutex and `serial_print!`/`serial_println!` macros.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::port::Port;

/// Minimal 16550 UART driver over COM1 (0x3F8), polling-only (no FIFO IRQ).
pub struct SerialPort {
    data: Port<u8>,
    interrupt_enable: Port<u8>,
    fifo_control: Port<u8>,
    line_control: Port<u8>,
    modem_control: Port<u8>,
    line_status: Port<u8>,
}

impl SerialPort {
    /// Construct a driver for the UART at `base`.
    ///
    /// # Safety
    /// `base` must be a valid 16550-compatible UART base port, and no other
    /// code may concurrently access it.
    const unsafe fn new(base: u16) -> Self {
        // SAFETY: caller guarantees `base` is a valid UART base port.
        unsafe {
            Self {
                data: Port::new(base),
                interrupt_enable: Port::new(base + 1),
                fifo_control: Port::new(base + 2),
                line_control: Port::new(base + 3),
                modem_control: Port::new(base + 4),
                line_status: Port::new(base + 5),
            }
        }
    }

    /// Program the UART for 38400 baud, 8N1, with FIFO enabled.
    fn init(&mut self) {
        // SAFETY: ports were constructed for a valid UART base and are only
        // accessed through this struct, serialized by the caller's mutex.
        unsafe {
            self.interrupt_enable.write(0x00);
            self.line_control.write(0x80);
            self.data.write(0x03);
            self.interrupt_enable.write(0x00);
            self.line_control.write(0x03);
            self.fifo_control.write(0xC7);
            self.modem_control.write(0x0B);
        }
    }

    fn line_status(&mut self) -> u8 {
        // SAFETY: the line status register is always readable.
        unsafe { self.line_status.read() }
    }

    /// Write a single byte, spinning until the transmit holding register is empty.
    pub fn send(&mut self, byte: u8) {
        while self.line_status() & 0x20 == 0 {
            core::hint::spin_loop();
        }
        // SAFETY: we just confirmed the transmit holding register is empty.
        unsafe {
            self.data.write(byte);
        }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

lazy_static! {
    /// The host-visible serial console (QEMU `-serial stdio`).
    pub static ref SERIAL1: Mutex<SerialPort> = {
        // SAFETY: 0x3F8 is the standard COM1 base port, and this is the
        // only place that constructs a `SerialPort` over it.
        let mut serial_port = unsafe { SerialPort::new(0x3F8) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;

    #[expect(
        clippy::expect_used,
        reason = "Serial port should be correctly initialized."
    )]
    SERIAL1
        .lock()
        .write_fmt(args)
        .expect("Failed to print on serial port.");
}

/// Print to host machine through serial port interface.
#[macro_export]
macro_rules! serial_print {
    ($($args:tt)*) => {
        $crate::serial::_print(format_args!($($args)*));
    };
}

/// Print to host machine through serial port interface a line.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(
        concat!($fmt, "\n"), $($arg)*));
}
