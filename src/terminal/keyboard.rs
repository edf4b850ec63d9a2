//! Keyboard line discipline.
//!
//! Scancode classification tables and a modifier state machine turn raw
//! scancodes into buffered, echoed characters. The ISR mutates the
//! displayed [`crate::terminal::Terminal`]'s own buffer fields directly,
//! since those are already persistent per-terminal storage rather than
//! transient scratch space swapped in and out on every
//! [`crate::terminal::switch_to`].

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::kernel::KERNEL;
use crate::port::Port;
use crate::terminal::LINE_BUFFER_SIZE;
use crate::vga_buffer::buffer::Buffer;
use crate::vga_buffer::writer::{Writer, VGA_PHYS_ADDR};
use crate::vga_buffer::WRITER;

const DATA_PORT: u16 = 0x60;

/// Scancodes at or above this are never printable (function keys, etc).
const LIMIT: u8 = 58;
const SPACE: u8 = 57;

const LSHIFT_ON: u8 = 0x2A;
const LSHIFT_OFF: u8 = 0xAA;
const RSHIFT_ON: u8 = 0x36;
const RSHIFT_OFF: u8 = 0xB6;
const CAPSLOCK: u8 = 0x3A;
const L_CTRL_ON: u8 = 0x1D;
const L_CTRL_OFF: u8 = 0x9D;
const ALT_ON: u8 = 0x38;
const ALT_OFF: u8 = 0xB8;
const ENTER_ON: u8 = 0x1C;
const BACKSPACE: u8 = 0x0E;
const TAB: u8 = 0x0F;
const F1_ON: u8 = 0x3B;
const F2_ON: u8 = 0x3C;
const F3_ON: u8 = 0x3D;
const F1_OFF: u8 = 0xBB;
const F2_OFF: u8 = 0xBC;
const F3_OFF: u8 = 0xBD;

const Q: u8 = 16;
const P: u8 = 25;
const A: u8 = 30;
const L: u8 = 38;
const Z: u8 = 44;
const M: u8 = 50;
const CHAR1: u8 = 2;
const CHAR2: u8 = 13;
const CHAR3: u8 = 16;
const CHAR4: u8 = 53;
const LETTER_L: u8 = 38;

/// Unshifted scancode-to-ASCII table, index = scancode.
#[rustfmt::skip]
const LOWER: [u8; 58] = [
    0,    0,    b'1', b'2', b'3', b'4', b'5', b'6',
    b'7', b'8', b'9', b'0', b'-', b'=', 0,    0,
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i',
    b'o', b'p', b'[', b']', b'\n', 0,   b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';',
    b'\'', b'`', 0,   b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0,    0,
    0,    b' ',
];

/// Shifted/capitalized scancode-to-ASCII table, index = scancode.
#[rustfmt::skip]
const UPPER: [u8; 58] = [
    0,    0,    b'!', b'@', b'#', b'$', b'%', b'^',
    b'&', b'*', b'(', b')', b'_', b'+', 0,    0,
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I',
    b'O', b'P', b'{', b'}', b'\n', 0,   b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':',
    b'"', b'~', 0,   b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0,    0,
    0,    b' ',
];

static SHIFT: AtomicBool = AtomicBool::new(false);
static CAPS: AtomicBool = AtomicBool::new(false);
static CTRL: AtomicBool = AtomicBool::new(false);
static ALT: AtomicBool = AtomicBool::new(false);
/// 0 when no function key is held, otherwise 1..=3 for F1..F3.
static FN_KEY: AtomicU8 = AtomicU8::new(0);

fn is_char(scancode: u8) -> bool {
    if scancode == LSHIFT_ON || scancode == L_CTRL_ON {
        return false;
    }
    (CHAR1..=CHAR2).contains(&scancode) || (CHAR3..=CHAR4).contains(&scancode) || scancode == SPACE
}

fn is_letter(scancode: u8) -> bool {
    (Q..=P).contains(&scancode)
        || (A..=L).contains(&scancode)
        || (Z..=M).contains(&scancode)
        || scancode == SPACE
}

/// Classify a scancode into its current-case ASCII value. `0` means "no
/// printable mapping".
fn classify(scancode: u8) -> u8 {
    let caps = CAPS.load(Ordering::SeqCst);
    let shift = SHIFT.load(Ordering::SeqCst);
    let table = match (caps, shift) {
        (false, true) => &UPPER,
        (false, false) => &LOWER,
        (true, false) => {
            if is_letter(scancode) {
                &UPPER
            } else {
                &LOWER
            }
        }
        (true, true) => {
            if is_letter(scancode) {
                &LOWER
            } else {
                &UPPER
            }
        }
    };
    table[scancode as usize]
}

/// Update the modifier state machine for one scancode.
fn update_modifiers(scancode: u8) {
    match scancode {
        CAPSLOCK => {
            CAPS.fetch_xor(true, Ordering::SeqCst);
        }
        LSHIFT_ON | RSHIFT_ON => SHIFT.store(true, Ordering::SeqCst),
        LSHIFT_OFF | RSHIFT_OFF => SHIFT.store(false, Ordering::SeqCst),
        L_CTRL_ON => CTRL.store(true, Ordering::SeqCst),
        L_CTRL_OFF => CTRL.store(false, Ordering::SeqCst),
        ALT_ON => ALT.store(true, Ordering::SeqCst),
        ALT_OFF => ALT.store(false, Ordering::SeqCst),
        F1_ON => FN_KEY.store(1, Ordering::SeqCst),
        F2_ON => FN_KEY.store(2, Ordering::SeqCst),
        F3_ON => FN_KEY.store(3, Ordering::SeqCst),
        F1_OFF | F2_OFF | F3_OFF => FN_KEY.store(0, Ordering::SeqCst),
        ENTER_ON => {
            KERNEL.terminals.lock()[KERNEL.display_terminal()].enter_seen = true;
        }
        BACKSPACE => backspace(),
        _ => {}
    }
}

/// Append `byte` to the displayed terminal's line buffer, silently dropping
/// it if the 127-character cap (one slot reserved for a forced trailing
/// newline) has already been reached. Returns whether it was appended.
fn push_char(byte: u8) -> bool {
    let mut terminals = KERNEL.terminals.lock();
    let terminal = &mut terminals[KERNEL.display_terminal()];
    if terminal.line_len >= LINE_BUFFER_SIZE - 1 {
        return false;
    }
    terminal.line_buffer[terminal.line_len] = byte;
    terminal.line_len += 1;
    true
}

fn echo(byte: u8) {
    WRITER.lock().write_byte(byte);
}

/// Keyboard ISR, installed at vector 33 by [`crate::idt::init`]. Reads one
/// scancode, updates modifier state, and for the ordinary-character case,
/// buffers and echoes it to the currently displayed terminal.
///
/// Sends exactly one EOI per interrupt, even when an ALT+Fn chord triggers
/// a terminal switch partway through handling it.
pub extern "C" fn interrupt_handler() {
    // SAFETY: 0x60 is the fixed keyboard data port.
    let scancode = unsafe {
        let mut port: Port<u8> = Port::new(DATA_PORT);
        port.read()
    };

    update_modifiers(scancode);

    if ALT.load(Ordering::SeqCst) {
        let fn_key = FN_KEY.load(Ordering::SeqCst);
        if fn_key != 0 {
            crate::terminal::switch_to((fn_key - 1) as usize);
        }
    }

    let ctrl_l = CTRL.load(Ordering::SeqCst) && scancode == LETTER_L;
    if ctrl_l {
        WRITER.lock().clear_screen();
    } else if scancode < LIMIT {
        if scancode == TAB {
            for _ in 0..4 {
                if push_char(b' ') {
                    echo(b' ');
                }
            }
        } else if is_char(scancode) {
            let keyval = classify(scancode);
            if keyval != 0 && push_char(keyval) {
                echo(keyval);
            }
        }
    }

    crate::pic::send_eoi(1);
}

fn backspace() {
    let mut terminals = KERNEL.terminals.lock();
    let terminal = &mut terminals[KERNEL.display_terminal()];
    if terminal.line_len == 0 {
        return;
    }
    terminal.line_len -= 1;
    drop(terminals);
    WRITER.lock().backspace();
}

/// Block until `tid`'s line buffer has seen an Enter and is the displayed
/// terminal, then copy at most `min(buf.len(), 127)` bytes out of it into
/// `buf`, clearing the buffer. If the buffer filled to its 127-character cap
/// without an embedded newline, appends one. Always returns at least 1 once
/// it returns.
pub fn terminal_read(tid: usize, buf: &mut [u8]) -> usize {
    loop {
        let ready = {
            let terminals = KERNEL.terminals.lock();
            terminals[tid].enter_seen && tid == KERNEL.display_terminal()
        };
        if ready {
            break;
        }
        core::hint::spin_loop();
    }

    let mut terminals = KERNEL.terminals.lock();
    let terminal = &mut terminals[tid];
    terminal.enter_seen = false;

    let cap = (LINE_BUFFER_SIZE - 1).min(buf.len());
    let mut copied = 0;
    let mut found_newline = false;
    while copied < cap {
        let byte = terminal.line_buffer[copied];
        buf[copied] = byte;
        copied += 1;
        if byte == b'\n' {
            found_newline = true;
            break;
        }
    }
    if copied == LINE_BUFFER_SIZE - 1 && !found_newline && copied < buf.len() {
        buf[copied] = b'\n';
        copied += 1;
    }

    terminal.line_buffer = [0; LINE_BUFFER_SIZE];
    terminal.line_len = 0;
    copied.max(1)
}

/// Write `buf` verbatim to `tid`'s video page: the live VGA page if `tid` is
/// displayed, otherwise its off-screen backing page. Tracks `tid`'s own
/// cursor via its `saved_column`/`saved_row` fields, per the design note in
/// [`crate::vga_buffer`].
pub fn terminal_write(tid: usize, buf: &[u8]) -> usize {
    let mut terminals = KERNEL.terminals.lock();
    let terminal = &mut terminals[tid];
    let is_displayed = tid == KERNEL.display_terminal();
    let phys = if is_displayed {
        VGA_PHYS_ADDR as u32
    } else {
        terminal.backing_phys()
    };

    // SAFETY: `phys` names either the live VGA page or this terminal's own
    // reserved backing page, both valid for the kernel's lifetime.
    let mut writer = unsafe { Writer::new(phys as *mut Buffer) };
    writer.set_cursor(terminal.saved_column, terminal.saved_row);
    for &byte in buf {
        writer.write_byte(byte);
    }
    let (column, row) = writer.cursor();
    terminal.saved_column = column;
    terminal.saved_row = row;

    if is_displayed {
        WRITER.lock().set_cursor(column, row);
    }

    buf.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn lower_and_upper_tables_map_enter_to_newline() {
        assert_eq!(LOWER[28], b'\n');
        assert_eq!(UPPER[28], b'\n');
    }

    #[test_case]
    fn is_char_excludes_shift_and_ctrl_despite_range() {
        assert!(!is_char(LSHIFT_ON));
        assert!(!is_char(L_CTRL_ON));
    }

    #[test_case]
    fn space_counts_as_a_letter() {
        assert!(is_letter(SPACE));
    }
}
