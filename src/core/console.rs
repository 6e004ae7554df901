//! Native console capability
//!
//! The console API surface the driver is built on, expressed as a trait so
//! the event source, writers and ANSI translator can run against the real
//! Win32 console or an in-memory stand-in.

use std::time::Duration;

use bitflags::bitflags;

use crate::error::Result;

/// Character cell coordinate (column, row), matching the Win32 `COORD`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Coord {
    pub x: i16,
    pub y: i16,
}

impl Coord {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Inclusive rectangle, matching the Win32 `SMALL_RECT`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SmallRect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl SmallRect {
    pub const fn new(left: i16, top: i16, right: i16, bottom: i16) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        i32::from(self.right) - i32::from(self.left) + 1
    }

    pub fn height(&self) -> i32 {
        i32::from(self.bottom) - i32::from(self.top) + 1
    }
}

/// Snapshot of the output screen buffer.
///
/// Always queried fresh before use; the console can change underneath us
/// (resize, other writers) between two operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenBufferInfo {
    /// Buffer size in cells.
    pub size: Coord,
    /// Absolute cursor position inside the buffer.
    pub cursor: Coord,
    /// Attribute word applied to newly written characters.
    pub attributes: u16,
    /// Visible window, in buffer coordinates.
    pub window: SmallRect,
    pub max_window_size: Coord,
}

/// Fill cell used when scrolling exposes new rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharInfo {
    pub ch: char,
    pub attributes: u16,
}

bitflags! {
    /// `dwControlKeyState` of key and mouse records.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ControlKeyState: u32 {
        const RIGHT_ALT_PRESSED  = 0x0001;
        const LEFT_ALT_PRESSED   = 0x0002;
        const RIGHT_CTRL_PRESSED = 0x0004;
        const LEFT_CTRL_PRESSED  = 0x0008;
        const SHIFT_PRESSED      = 0x0010;
        const NUMLOCK_ON         = 0x0020;
        const SCROLLLOCK_ON      = 0x0040;
        const CAPSLOCK_ON        = 0x0080;
        const ENHANCED_KEY       = 0x0100;
    }
}

impl ControlKeyState {
    pub fn alt(&self) -> bool {
        self.intersects(Self::LEFT_ALT_PRESSED | Self::RIGHT_ALT_PRESSED)
    }

    pub fn ctrl(&self) -> bool {
        self.intersects(Self::LEFT_CTRL_PRESSED | Self::RIGHT_CTRL_PRESSED)
    }

    pub fn shift(&self) -> bool {
        self.contains(Self::SHIFT_PRESSED)
    }
}

bitflags! {
    /// Low word of `dwButtonState`. The high word carries the signed wheel delta.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MouseButtons: u32 {
        const FROM_LEFT_1ST_BUTTON_PRESSED = 0x0001;
        const RIGHTMOST_BUTTON_PRESSED     = 0x0002;
        const FROM_LEFT_2ND_BUTTON_PRESSED = 0x0004;
        const FROM_LEFT_3RD_BUTTON_PRESSED = 0x0008;
        const FROM_LEFT_4TH_BUTTON_PRESSED = 0x0010;
    }
}

bitflags! {
    /// `dwEventFlags` of mouse records. Empty means press or release.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MouseEventFlags: u32 {
        const MOUSE_MOVED    = 0x0001;
        const DOUBLE_CLICK   = 0x0002;
        const MOUSE_WHEELED  = 0x0004;
        const MOUSE_HWHEELED = 0x0008;
    }
}

bitflags! {
    /// Console mode of the input handle.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ConsoleInputMode: u32 {
        const ENABLE_PROCESSED_INPUT        = 0x0001;
        const ENABLE_LINE_INPUT             = 0x0002;
        const ENABLE_ECHO_INPUT             = 0x0004;
        const ENABLE_WINDOW_INPUT           = 0x0008;
        const ENABLE_MOUSE_INPUT            = 0x0010;
        const ENABLE_INSERT_MODE            = 0x0020;
        const ENABLE_QUICK_EDIT_MODE        = 0x0040;
        const ENABLE_EXTENDED_FLAGS         = 0x0080;
        const ENABLE_VIRTUAL_TERMINAL_INPUT = 0x0200;
    }
}

bitflags! {
    /// Console mode of the output handle.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ConsoleOutputMode: u32 {
        const ENABLE_PROCESSED_OUTPUT            = 0x0001;
        const ENABLE_WRAP_AT_EOL_OUTPUT          = 0x0002;
        const ENABLE_VIRTUAL_TERMINAL_PROCESSING = 0x0004;
        const DISABLE_NEWLINE_AUTO_RETURN        = 0x0008;
        const ENABLE_LVB_GRID_WORLDWIDE          = 0x0010;
    }
}

/// Key record payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyRecord {
    pub key_down: bool,
    pub repeat_count: u16,
    pub virtual_key: u16,
    /// UTF-16 code unit; 0 when the key has no character.
    pub unicode_char: u16,
    pub control_state: ControlKeyState,
}

/// Mouse record payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseRecord {
    pub position: Coord,
    /// Raw button state: `MouseButtons` in the low word, wheel delta in the high word.
    pub button_state: u32,
    pub control_state: ControlKeyState,
    pub event_flags: MouseEventFlags,
}

impl MouseRecord {
    pub fn buttons(&self) -> MouseButtons {
        MouseButtons::from_bits_truncate(self.button_state & 0xFFFF)
    }

    /// The high word is a signed wheel delta; negative means rotated towards the user.
    pub fn wheel_towards_user(&self) -> bool {
        (self.button_state as i32) < 0
    }
}

/// One decoded native input record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleEvent {
    Key(KeyRecord),
    Mouse(MouseRecord),
    /// Screen buffer was resized; carries the new buffer size.
    Resize(Coord),
    /// Focus gained (`true`) or lost.
    Focus(bool),
    /// Menu command, only used internally by the console host.
    Menu(u32),
    /// Record with an unrecognized event type tag.
    Unknown(u16),
}

/// The console API calls the driver needs.
///
/// Errors are reported as [`crate::ConsoleError::Native`]; a wait that times
/// out is not an error.
pub trait ConsoleApi: Send + Sync {
    /// Wait until the input handle is signaled. Returns `false` on timeout.
    fn wait_for_input(&self, timeout: Duration) -> Result<bool>;

    /// Read one input record. `None` when no record was available.
    fn read_input(&self) -> Result<Option<ConsoleEvent>>;

    fn input_mode(&self) -> Result<ConsoleInputMode>;
    fn set_input_mode(&self, mode: ConsoleInputMode) -> Result<()>;
    fn output_mode(&self) -> Result<ConsoleOutputMode>;
    fn set_output_mode(&self, mode: ConsoleOutputMode) -> Result<()>;

    fn output_code_page(&self) -> u32;

    fn screen_buffer_info(&self) -> Result<ScreenBufferInfo>;
    fn set_cursor_position(&self, position: Coord) -> Result<()>;
    fn set_text_attribute(&self, attributes: u16) -> Result<()>;

    /// Fill `len` cells starting at `origin` with `ch`; returns cells written.
    fn fill_output_character(&self, ch: char, len: u32, origin: Coord) -> Result<u32>;
    /// Fill `len` cells starting at `origin` with `attributes`; returns cells written.
    fn fill_output_attribute(&self, attributes: u16, len: u32, origin: Coord) -> Result<u32>;

    fn scroll_screen_buffer(
        &self,
        scroll: SmallRect,
        clip: Option<SmallRect>,
        destination: Coord,
        fill: CharInfo,
    ) -> Result<()>;

    /// Write UTF-16 units; returns how many the console accepted.
    fn write_console(&self, units: &[u16]) -> Result<usize>;

    fn set_title(&self, title: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_dimensions() {
        let rect = SmallRect::new(0, 10, 79, 34);
        assert_eq!(rect.width(), 80);
        assert_eq!(rect.height(), 25);
    }

    #[test]
    fn test_control_key_state() {
        let state = ControlKeyState::RIGHT_ALT_PRESSED | ControlKeyState::SHIFT_PRESSED;
        assert!(state.alt());
        assert!(state.shift());
        assert!(!state.ctrl());
    }

    #[test]
    fn test_wheel_direction_from_high_word() {
        let mut record = MouseRecord {
            position: Coord::new(0, 0),
            button_state: 0x0078_0000,
            control_state: ControlKeyState::empty(),
            event_flags: MouseEventFlags::MOUSE_WHEELED,
        };
        assert!(!record.wheel_towards_user());

        record.button_state = 0xFF88_0000;
        assert!(record.wheel_towards_user());
        assert!(record.buttons().is_empty());
    }
}
