//! In-memory console used by unit tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::console::{
    CharInfo, ConsoleApi, ConsoleEvent, ConsoleInputMode, ConsoleOutputMode, Coord,
    ScreenBufferInfo, SmallRect,
};
use crate::error::{ConsoleError, Result};

/// A console call observed by [`ScriptedConsole`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    SetInputMode(ConsoleInputMode),
    SetOutputMode(ConsoleOutputMode),
    SetCursor(Coord),
    SetAttribute(u16),
    FillChar { ch: char, len: u32, origin: Coord },
    FillAttr { attributes: u16, len: u32, origin: Coord },
    Scroll { scroll: SmallRect, clip: Option<SmallRect>, destination: Coord, fill: CharInfo },
    Write(String),
    Title(String),
}

pub(crate) struct Script {
    pub info: ScreenBufferInfo,
    /// `None` entries are waits that time out.
    pub input: VecDeque<Option<ConsoleEvent>>,
    pub input_mode: ConsoleInputMode,
    pub output_mode: ConsoleOutputMode,
    pub vt_supported: bool,
    /// Maximum UTF-16 units accepted per write call.
    pub write_limit: Option<usize>,
    /// Name of a native call that should fail. `SetConsoleMode` only fails
    /// input mode changes.
    pub fail: Option<&'static str>,
    pub calls: Vec<Call>,
}

pub(crate) struct ScriptedConsole {
    script: Mutex<Script>,
}

impl ScriptedConsole {
    /// Console with a `width` x `height` buffer whose window shows all of it.
    pub fn new(width: i16, height: i16) -> Self {
        Self::with_window(width, height, SmallRect::new(0, 0, width - 1, height - 1))
    }

    pub fn with_window(width: i16, height: i16, window: SmallRect) -> Self {
        Self {
            script: Mutex::new(Script {
                info: ScreenBufferInfo {
                    size: Coord::new(width, height),
                    cursor: Coord::new(0, window.top),
                    attributes: 0x0007,
                    window,
                    max_window_size: Coord::new(width, window.height() as i16),
                },
                input: VecDeque::new(),
                input_mode: ConsoleInputMode::ENABLE_PROCESSED_INPUT
                    | ConsoleInputMode::ENABLE_LINE_INPUT
                    | ConsoleInputMode::ENABLE_ECHO_INPUT
                    | ConsoleInputMode::ENABLE_QUICK_EDIT_MODE,
                output_mode: ConsoleOutputMode::ENABLE_PROCESSED_OUTPUT
                    | ConsoleOutputMode::ENABLE_WRAP_AT_EOL_OUTPUT,
                vt_supported: false,
                write_limit: None,
                fail: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn set_cursor(&self, x: i16, y: i16) {
        self.script().info.cursor = Coord::new(x, y);
    }

    pub fn push_event(&self, event: ConsoleEvent) {
        self.script().input.push_back(Some(event));
    }

    pub fn push_timeout(&self) {
        self.script().input.push_back(None);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.script().calls.clear();
    }

    pub fn written(&self) -> String {
        self.script()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Write(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn check(&self, script: &Script, call: &'static str) -> Result<()> {
        if script.fail == Some(call) {
            return Err(ConsoleError::native(call, io::Error::from_raw_os_error(6)));
        }
        Ok(())
    }
}

impl ConsoleApi for ScriptedConsole {
    fn wait_for_input(&self, timeout: Duration) -> Result<bool> {
        {
            let mut script = self.script();
            self.check(&script, "WaitForSingleObject")?;
            match script.input.front().map(Option::is_some) {
                Some(true) => return Ok(true),
                Some(false) => {
                    script.input.pop_front();
                    return Ok(false);
                }
                None => {}
            }
        }
        thread::sleep(timeout.min(Duration::from_millis(2)));
        Ok(false)
    }

    fn read_input(&self) -> Result<Option<ConsoleEvent>> {
        let mut script = self.script();
        self.check(&script, "ReadConsoleInputW")?;
        Ok(script.input.pop_front().flatten())
    }

    fn input_mode(&self) -> Result<ConsoleInputMode> {
        Ok(self.script().input_mode)
    }

    fn set_input_mode(&self, mode: ConsoleInputMode) -> Result<()> {
        let mut script = self.script();
        self.check(&script, "SetConsoleMode")?;
        script.input_mode = mode;
        script.calls.push(Call::SetInputMode(mode));
        Ok(())
    }

    fn output_mode(&self) -> Result<ConsoleOutputMode> {
        Ok(self.script().output_mode)
    }

    fn set_output_mode(&self, mode: ConsoleOutputMode) -> Result<()> {
        let mut script = self.script();
        let vt = mode.contains(ConsoleOutputMode::ENABLE_VIRTUAL_TERMINAL_PROCESSING);
        if vt && !script.vt_supported {
            return Err(ConsoleError::native(
                "SetConsoleMode",
                io::Error::from_raw_os_error(87),
            ));
        }
        script.output_mode = mode;
        script.calls.push(Call::SetOutputMode(mode));
        Ok(())
    }

    fn output_code_page(&self) -> u32 {
        65001
    }

    fn screen_buffer_info(&self) -> Result<ScreenBufferInfo> {
        let script = self.script();
        self.check(&script, "GetConsoleScreenBufferInfo")?;
        Ok(script.info)
    }

    fn set_cursor_position(&self, position: Coord) -> Result<()> {
        let mut script = self.script();
        self.check(&script, "SetConsoleCursorPosition")?;
        script.info.cursor = position;
        script.calls.push(Call::SetCursor(position));
        Ok(())
    }

    fn set_text_attribute(&self, attributes: u16) -> Result<()> {
        let mut script = self.script();
        self.check(&script, "SetConsoleTextAttribute")?;
        script.info.attributes = attributes;
        script.calls.push(Call::SetAttribute(attributes));
        Ok(())
    }

    fn fill_output_character(&self, ch: char, len: u32, origin: Coord) -> Result<u32> {
        let mut script = self.script();
        self.check(&script, "FillConsoleOutputCharacterW")?;
        script.calls.push(Call::FillChar { ch, len, origin });
        Ok(len)
    }

    fn fill_output_attribute(&self, attributes: u16, len: u32, origin: Coord) -> Result<u32> {
        let mut script = self.script();
        self.check(&script, "FillConsoleOutputAttribute")?;
        script.calls.push(Call::FillAttr { attributes, len, origin });
        Ok(len)
    }

    fn scroll_screen_buffer(
        &self,
        scroll: SmallRect,
        clip: Option<SmallRect>,
        destination: Coord,
        fill: CharInfo,
    ) -> Result<()> {
        let mut script = self.script();
        self.check(&script, "ScrollConsoleScreenBufferW")?;
        script.calls.push(Call::Scroll { scroll, clip, destination, fill });
        Ok(())
    }

    fn write_console(&self, units: &[u16]) -> Result<usize> {
        let mut script = self.script();
        self.check(&script, "WriteConsoleW")?;
        let accepted = script.write_limit.map_or(units.len(), |limit| units.len().min(limit));
        let text = String::from_utf16_lossy(&units[..accepted]);
        script.calls.push(Call::Write(text));
        Ok(accepted)
    }

    fn set_title(&self, title: &str) -> Result<()> {
        let mut script = self.script();
        self.check(&script, "SetConsoleTitleW")?;
        script.calls.push(Call::Title(title.to_string()));
        Ok(())
    }
}
