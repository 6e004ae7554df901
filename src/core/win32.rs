//! Win32 console backend
//!
//! [`ConsoleApi`] over the process's standard input and output console
//! handles.

use std::io;
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{HANDLE, WAIT_FAILED, WAIT_OBJECT_0};
use windows::Win32::System::Console::{
    FillConsoleOutputAttribute, FillConsoleOutputCharacterW, GetConsoleMode, GetConsoleOutputCP,
    GetConsoleScreenBufferInfo, GetStdHandle, ReadConsoleInputW, ScrollConsoleScreenBufferW,
    SetConsoleCursorPosition, SetConsoleMode, SetConsoleTextAttribute, SetConsoleTitleW,
    WriteConsoleW, CHAR_INFO, CHAR_INFO_0, CONSOLE_CHARACTER_ATTRIBUTES, CONSOLE_MODE,
    CONSOLE_SCREEN_BUFFER_INFO, COORD, INPUT_RECORD, SMALL_RECT, STD_INPUT_HANDLE,
    STD_OUTPUT_HANDLE,
};
use windows::Win32::System::Threading::WaitForSingleObject;

use super::console::{
    CharInfo, ConsoleApi, ConsoleEvent, ConsoleInputMode, ConsoleOutputMode, ControlKeyState, Coord,
    KeyRecord, MouseEventFlags, MouseRecord, ScreenBufferInfo, SmallRect,
};
use crate::error::{ConsoleError, Result};

// INPUT_RECORD.EventType
const KEY_EVENT: u16 = 0x0001;
const MOUSE_EVENT: u16 = 0x0002;
const WINDOW_BUFFER_SIZE_EVENT: u16 = 0x0004;
const MENU_EVENT: u16 = 0x0008;
const FOCUS_EVENT: u16 = 0x0010;

fn native(call: &'static str) -> impl FnOnce(windows::core::Error) -> ConsoleError {
    move |e| ConsoleError::native(call, io::Error::new(io::ErrorKind::Other, e))
}

/// The process console.
pub struct Win32Console {
    input: HANDLE,
    output: HANDLE,
}

// The standard handles are process-wide and the console API serializes calls on them
unsafe impl Send for Win32Console {}
unsafe impl Sync for Win32Console {}

impl Win32Console {
    pub fn new() -> Result<Self> {
        unsafe {
            let input = GetStdHandle(STD_INPUT_HANDLE).map_err(native("GetStdHandle"))?;
            let output = GetStdHandle(STD_OUTPUT_HANDLE).map_err(native("GetStdHandle"))?;
            if input.is_invalid() || output.is_invalid() {
                return Err(ConsoleError::native(
                    "GetStdHandle",
                    io::Error::new(io::ErrorKind::NotFound, "no console attached"),
                ));
            }
            Ok(Self { input, output })
        }
    }

    fn mode(handle: HANDLE) -> Result<u32> {
        let mut mode = CONSOLE_MODE(0);
        unsafe { GetConsoleMode(handle, &mut mode) }.map_err(native("GetConsoleMode"))?;
        Ok(mode.0)
    }

    fn set_mode(handle: HANDLE, mode: u32) -> Result<()> {
        unsafe { SetConsoleMode(handle, CONSOLE_MODE(mode)) }.map_err(native("SetConsoleMode"))
    }
}

fn coord(c: COORD) -> Coord {
    Coord::new(c.X, c.Y)
}

fn to_coord(c: Coord) -> COORD {
    COORD { X: c.x, Y: c.y }
}

fn to_rect(r: SmallRect) -> SMALL_RECT {
    SMALL_RECT { Left: r.left, Top: r.top, Right: r.right, Bottom: r.bottom }
}

/// First UTF-16 unit of `ch`; fills are single-unit.
fn utf16_unit(ch: char) -> u16 {
    let mut buf = [0u16; 2];
    ch.encode_utf16(&mut buf)[0]
}

fn convert_record(record: &INPUT_RECORD) -> ConsoleEvent {
    unsafe {
        match record.EventType {
            KEY_EVENT => {
                let key = record.Event.KeyEvent;
                ConsoleEvent::Key(KeyRecord {
                    key_down: key.bKeyDown.as_bool(),
                    repeat_count: key.wRepeatCount,
                    virtual_key: key.wVirtualKeyCode,
                    unicode_char: key.uChar.UnicodeChar,
                    control_state: ControlKeyState::from_bits_retain(key.dwControlKeyState),
                })
            }
            MOUSE_EVENT => {
                let mouse = record.Event.MouseEvent;
                ConsoleEvent::Mouse(MouseRecord {
                    position: coord(mouse.dwMousePosition),
                    button_state: mouse.dwButtonState,
                    control_state: ControlKeyState::from_bits_retain(mouse.dwControlKeyState),
                    event_flags: MouseEventFlags::from_bits_retain(mouse.dwEventFlags),
                })
            }
            WINDOW_BUFFER_SIZE_EVENT => {
                ConsoleEvent::Resize(coord(record.Event.WindowBufferSizeEvent.dwSize))
            }
            FOCUS_EVENT => ConsoleEvent::Focus(record.Event.FocusEvent.bSetFocus.as_bool()),
            MENU_EVENT => ConsoleEvent::Menu(record.Event.MenuEvent.dwCommandId),
            other => ConsoleEvent::Unknown(other),
        }
    }
}

impl ConsoleApi for Win32Console {
    fn wait_for_input(&self, timeout: Duration) -> Result<bool> {
        let millis = timeout.as_millis().min(u128::from(u32::MAX - 1)) as u32;
        let result = unsafe { WaitForSingleObject(self.input, millis) };
        if result == WAIT_OBJECT_0 {
            Ok(true)
        } else if result == WAIT_FAILED {
            Err(ConsoleError::native("WaitForSingleObject", io::Error::last_os_error()))
        } else {
            Ok(false)
        }
    }

    fn read_input(&self) -> Result<Option<ConsoleEvent>> {
        let mut records = [INPUT_RECORD::default(); 1];
        let mut read = 0u32;
        unsafe { ReadConsoleInputW(self.input, &mut records, &mut read) }
            .map_err(native("ReadConsoleInputW"))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(convert_record(&records[0])))
    }

    fn input_mode(&self) -> Result<ConsoleInputMode> {
        Self::mode(self.input).map(ConsoleInputMode::from_bits_retain)
    }

    fn set_input_mode(&self, mode: ConsoleInputMode) -> Result<()> {
        Self::set_mode(self.input, mode.bits())
    }

    fn output_mode(&self) -> Result<ConsoleOutputMode> {
        Self::mode(self.output).map(ConsoleOutputMode::from_bits_retain)
    }

    fn set_output_mode(&self, mode: ConsoleOutputMode) -> Result<()> {
        Self::set_mode(self.output, mode.bits())
    }

    fn output_code_page(&self) -> u32 {
        unsafe { GetConsoleOutputCP() }
    }

    fn screen_buffer_info(&self) -> Result<ScreenBufferInfo> {
        let mut info = CONSOLE_SCREEN_BUFFER_INFO::default();
        unsafe { GetConsoleScreenBufferInfo(self.output, &mut info) }
            .map_err(native("GetConsoleScreenBufferInfo"))?;
        let w = info.srWindow;
        Ok(ScreenBufferInfo {
            size: coord(info.dwSize),
            cursor: coord(info.dwCursorPosition),
            attributes: info.wAttributes.0,
            window: SmallRect::new(w.Left, w.Top, w.Right, w.Bottom),
            max_window_size: coord(info.dwMaximumWindowSize),
        })
    }

    fn set_cursor_position(&self, position: Coord) -> Result<()> {
        unsafe { SetConsoleCursorPosition(self.output, to_coord(position)) }
            .map_err(native("SetConsoleCursorPosition"))
    }

    fn set_text_attribute(&self, attributes: u16) -> Result<()> {
        unsafe { SetConsoleTextAttribute(self.output, CONSOLE_CHARACTER_ATTRIBUTES(attributes)) }
            .map_err(native("SetConsoleTextAttribute"))
    }

    fn fill_output_character(&self, ch: char, len: u32, origin: Coord) -> Result<u32> {
        let mut written = 0u32;
        let (unit, origin) = (utf16_unit(ch), to_coord(origin));
        unsafe { FillConsoleOutputCharacterW(self.output, unit, len, origin, &mut written) }
            .map_err(native("FillConsoleOutputCharacterW"))?;
        Ok(written)
    }

    fn fill_output_attribute(&self, attributes: u16, len: u32, origin: Coord) -> Result<u32> {
        let mut written = 0u32;
        let origin = to_coord(origin);
        unsafe { FillConsoleOutputAttribute(self.output, attributes, len, origin, &mut written) }
            .map_err(native("FillConsoleOutputAttribute"))?;
        Ok(written)
    }

    fn scroll_screen_buffer(
        &self,
        scroll: SmallRect,
        clip: Option<SmallRect>,
        destination: Coord,
        fill: CharInfo,
    ) -> Result<()> {
        let scroll = to_rect(scroll);
        let clip = clip.map(to_rect);
        let fill = CHAR_INFO {
            Char: CHAR_INFO_0 { UnicodeChar: utf16_unit(fill.ch) },
            Attributes: fill.attributes,
        };
        unsafe {
            ScrollConsoleScreenBufferW(
                self.output,
                &scroll,
                clip.as_ref().map(|c| c as *const SMALL_RECT),
                to_coord(destination),
                &fill,
            )
        }
        .map_err(native("ScrollConsoleScreenBufferW"))
    }

    fn write_console(&self, units: &[u16]) -> Result<usize> {
        let mut written = 0u32;
        unsafe { WriteConsoleW(self.output, units, Some(&mut written), None) }
            .map_err(native("WriteConsoleW"))?;
        Ok(written as usize)
    }

    fn set_title(&self, title: &str) -> Result<()> {
        let wide: Vec<u16> = title.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe { SetConsoleTitleW(PCWSTR(wide.as_ptr())) }.map_err(native("SetConsoleTitleW"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_unit() {
        assert_eq!(utf16_unit(' '), 0x20);
        assert_eq!(utf16_unit('é'), 0xE9);
    }

    #[test]
    fn test_convert_focus_record() {
        let mut record = INPUT_RECORD::default();
        record.EventType = FOCUS_EVENT;
        record.Event.FocusEvent.bSetFocus = true.into();
        assert_eq!(convert_record(&record), ConsoleEvent::Focus(true));
    }

    #[test]
    fn test_convert_unknown_record() {
        let mut record = INPUT_RECORD::default();
        record.EventType = 0x0040;
        assert_eq!(convert_record(&record), ConsoleEvent::Unknown(0x0040));
    }
}
