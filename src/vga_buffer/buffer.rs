use volatile::Volatile;

use super::colors::ColorCode;

/// Number of text columns in VGA text mode.
pub const BUFFER_WIDTH: usize = 80;
/// Number of text rows in VGA text mode.
pub const BUFFER_HEIGHT: usize = 25;

/// Represent the VGA buffer.
#[repr(transparent)]
pub struct Buffer {
    pub chars: [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

/// Represent a character on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenChar {
    pub ascii_character: u8,
    pub color_code: ColorCode,
}
