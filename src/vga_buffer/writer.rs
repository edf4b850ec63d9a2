use core::fmt;

use super::{
    buffer::{Buffer, ScreenChar, BUFFER_HEIGHT, BUFFER_WIDTH},
    colors::{Color, ColorCode},
};

/// The physical address of the VGA text-mode buffer.
pub const VGA_PHYS_ADDR: usize = 0xB_8000;

/// A cursor-tracking writer over a VGA-shaped character buffer.
///
/// Unlike a plain scrolling console, each terminal keeps its own cursor
/// (`column`, `row`) so that switching which physical buffer a `Writer`
/// targets (live VGA vs. an off-screen backing page) and switching which
/// cursor state it tracks can happen independently; `terminal::switch`
/// does both when it blits a backing page back to 0xB8000.
pub struct Writer {
    column: usize,
    row: usize,
    color_code: ColorCode,
    buffer: *mut Buffer,
}

// SAFETY: a `Writer` is always held behind a `spin::Mutex`, which serializes
// access; the raw pointer itself only ever points at 'static memory (either
// the VGA buffer or a terminal's backing page, both owned for the kernel's
// lifetime).
unsafe impl Send for Writer {}

impl Writer {
    /// Build a writer targeting the given buffer, cursor at the top-left.
    ///
    /// # Safety
    /// `buffer` must point at a valid, live `Buffer`-shaped region of memory
    /// for as long as this `Writer` is used.
    #[must_use]
    pub const unsafe fn new(buffer: *mut Buffer) -> Self {
        Self {
            column: 0,
            row: 0,
            color_code: ColorCode::new(Color::Yellow, Color::Black),
            buffer,
        }
    }

    /// Repoint this writer at a different backing buffer, keeping its
    /// cursor position. Used when a terminal switch blits video memory
    /// between the live VGA page and an off-screen backing page.
    ///
    /// # Safety
    /// `buffer` must point at a valid `Buffer`-shaped region for as long as
    /// it remains installed.
    pub unsafe fn rebind(&mut self, buffer: *mut Buffer) {
        self.buffer = buffer;
    }

    /// Current cursor position as `(column, row)`.
    #[must_use]
    pub const fn cursor(&self) -> (usize, usize) {
        (self.column, self.row)
    }

    /// Force the cursor to a specific position, clamped to the buffer bounds.
    pub fn set_cursor(&mut self, column: usize, row: usize) {
        self.column = column.min(BUFFER_WIDTH - 1);
        self.row = row.min(BUFFER_HEIGHT - 1);
    }

    fn buffer_mut(&mut self) -> &mut Buffer {
        // SAFETY: constructors and `rebind` uphold the invariant that
        // `buffer` points at a live `Buffer`.
        unsafe { &mut *self.buffer }
    }

    /// Write a single byte, honoring `\n` and wrapping/scrolling as needed.
    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            character => {
                if self.column >= BUFFER_WIDTH {
                    self.new_line();
                }

                let row = self.row;
                let col = self.column;
                let color_code = self.color_code;
                self.buffer_mut().chars[row][col].write(ScreenChar {
                    ascii_character: character,
                    color_code,
                });
                self.column += 1;
            }
        }
    }

    /// Write an ASCII string, substituting `0xfe` for non-printable bytes.
    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' => self.write_byte(byte),
                _ => self.write_byte(0xfe),
            }
        }
    }

    /// Advance to the next row, scrolling the whole buffer up when already
    /// on the last row.
    fn new_line(&mut self) {
        if self.row + 1 < BUFFER_HEIGHT {
            self.row += 1;
            self.column = 0;
            return;
        }

        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                let character = self.buffer_mut().chars[row][col].read();
                self.buffer_mut().chars[row - 1][col].write(character);
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
        self.column = 0;
    }

    /// Clear a row by filling it with blank characters.
    fn clear_row(&mut self, row: usize) {
        let blank = ScreenChar {
            ascii_character: b' ',
            color_code: self.color_code,
        };
        for col in 0..BUFFER_WIDTH {
            self.buffer_mut().chars[row][col].write(blank);
        }
    }

    /// Clear every row and move the cursor back to the top-left, as CTRL+L
    /// does. Leaves any line-discipline buffer untouched — this only
    /// touches the visible screen.
    pub fn clear_screen(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        self.column = 0;
        self.row = 0;
    }

    /// Erase the character immediately before the cursor and move the
    /// cursor back onto it. A no-op at the top-left corner.
    pub fn backspace(&mut self) {
        if self.column > 0 {
            self.column -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.column = BUFFER_WIDTH - 1;
        } else {
            return;
        }
        let blank = ScreenChar {
            ascii_character: b' ',
            color_code: self.color_code,
        };
        let row = self.row;
        let col = self.column;
        self.buffer_mut().chars[row][col].write(blank);
    }

    /// Blit every character from `self` into `other`, preserving contents
    /// across a terminal switch.
    pub fn blit_into(&mut self, other: &mut Self) {
        for row in 0..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                let character = self.buffer_mut().chars[row][col].read();
                other.buffer_mut().chars[row][col].write(character);
            }
        }
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}
