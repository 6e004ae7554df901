//! Input event decoding
//!
//! Turns native console records into the bytes a line editor reads from the
//! pseudo-input channel: characters and key sequences, X10 mouse reports and
//! focus reports. Resize records raise a signal instead of producing input.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::console::{
    ConsoleEvent, ConsoleInputMode, ControlKeyState, KeyRecord, MouseButtons, MouseEventFlags,
    MouseRecord,
};
use super::keys::{vk, KeyMapper, Modifiers};
use super::signal::Signal;

/// Mouse reporting level requested by the application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseTracking {
    /// No mouse reports
    #[default]
    Off,
    /// Presses, releases and wheel
    Normal,
    /// Also motion while a button is held
    Button,
    /// All motion
    Any,
}

/// Line-discipline settings applied to decoded characters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputAttributes {
    /// Interrupt, quit, suspend and status characters raise signals
    pub isig: bool,
    /// Canonical (line) input
    pub icanon: bool,
    pub echo: bool,
    /// Translate CR to LF
    pub icrnl: bool,
    /// Ignore CR
    pub igncr: bool,
    /// Translate LF to CR
    pub inlcr: bool,
    pub intr: Option<char>,
    pub quit: Option<char>,
    pub susp: Option<char>,
    /// Status request character, unset by default
    pub status: Option<char>,
}

impl Default for InputAttributes {
    fn default() -> Self {
        Self {
            isig: true,
            icanon: true,
            echo: true,
            icrnl: true,
            igncr: false,
            inlcr: false,
            intr: Some('\x03'),
            quit: Some('\x1c'),
            susp: Some('\x1a'),
            status: None,
        }
    }
}

impl InputAttributes {
    /// Raw mode: no line editing, no echo, no signal characters, no CR mapping.
    pub fn raw() -> Self {
        Self {
            isig: false,
            icanon: false,
            echo: false,
            icrnl: false,
            ..Self::default()
        }
    }

    /// Console input mode matching these attributes.
    pub fn console_mode(&self, tracking: MouseTracking) -> ConsoleInputMode {
        let mut mode = ConsoleInputMode::ENABLE_WINDOW_INPUT;
        if self.isig {
            mode |= ConsoleInputMode::ENABLE_PROCESSED_INPUT;
        }
        if self.echo {
            mode |= ConsoleInputMode::ENABLE_ECHO_INPUT;
        }
        if self.icanon {
            mode |= ConsoleInputMode::ENABLE_LINE_INPUT;
        }
        if tracking != MouseTracking::Off {
            // EXTENDED_FLAGS without QUICK_EDIT turns off selection so clicks reach us
            mode |= ConsoleInputMode::ENABLE_MOUSE_INPUT | ConsoleInputMode::ENABLE_EXTENDED_FLAGS;
        }
        mode
    }
}

/// Result of decoding one record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Bytes for the pseudo-input channel, written as one unit
    pub bytes: Vec<u8>,
    pub signals: Vec<Signal>,
}

impl Decoded {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() && self.signals.is_empty()
    }
}

/// X10 coordinates are single bytes offset by 32.
const X10_MAX_COORD: i32 = 255 - 32;

/// Stateful decoder for native input records.
#[derive(Debug, Default)]
pub struct InputDecoder {
    mouse_tracking: MouseTracking,
    focus_tracking: bool,
    attributes: InputAttributes,
    /// Leading surrogate waiting for its pair.
    high_surrogate: Option<u16>,
}

impl InputDecoder {
    pub fn new(attributes: InputAttributes) -> Self {
        Self { attributes, ..Self::default() }
    }

    pub fn mouse_tracking(&self) -> MouseTracking {
        self.mouse_tracking
    }

    pub fn set_mouse_tracking(&mut self, tracking: MouseTracking) {
        self.mouse_tracking = tracking;
    }

    pub fn focus_tracking(&self) -> bool {
        self.focus_tracking
    }

    pub fn set_focus_tracking(&mut self, enabled: bool) {
        self.focus_tracking = enabled;
    }

    pub fn attributes(&self) -> &InputAttributes {
        &self.attributes
    }

    pub fn set_attributes(&mut self, attributes: InputAttributes) {
        self.attributes = attributes;
    }

    pub fn decode(&mut self, event: &ConsoleEvent) -> Decoded {
        let mut out = Decoded::default();
        match event {
            ConsoleEvent::Key(key) => {
                for _ in 0..key.repeat_count.max(1) {
                    self.key_event(key, &mut out);
                }
            }
            ConsoleEvent::Resize(_) => out.signals.push(Signal::Winch),
            ConsoleEvent::Mouse(mouse) => {
                if let Some(report) = self.mouse_report(mouse) {
                    out.bytes.extend_from_slice(&report);
                }
            }
            ConsoleEvent::Focus(gained) => {
                if self.focus_tracking {
                    out.bytes.extend_from_slice(if *gained { b"\x1b[I" } else { b"\x1b[O" });
                }
            }
            ConsoleEvent::Menu(_) | ConsoleEvent::Unknown(_) => {}
        }
        trace!(?event, bytes = out.bytes.len(), "decoded");
        out
    }

    fn key_event(&mut self, key: &KeyRecord, out: &mut Decoded) {
        let state = key.control_state;
        let ch = key.unicode_char;
        let is_ctrl = state.ctrl();
        let is_alt = state.alt();

        if !key.key_down {
            // Alt+numpad entry delivers the character on Alt release
            if key.virtual_key == vk::MENU && ch != 0 {
                self.input_unit(ch, out);
            }
            return;
        }

        if ch == 0x03 {
            self.input_unit(ch, out);
            return;
        }

        // AltGr arrives as RightAlt+LeftCtrl; the character is already composed
        let altgr = ControlKeyState::RIGHT_ALT_PRESSED | ControlKeyState::LEFT_CTRL_PRESSED;
        let chord = ControlKeyState::RIGHT_ALT_PRESSED
            | ControlKeyState::LEFT_ALT_PRESSED
            | ControlKeyState::RIGHT_CTRL_PRESSED
            | ControlKeyState::LEFT_CTRL_PRESSED
            | ControlKeyState::SHIFT_PRESSED;
        if ch != 0 && state.intersection(chord) == altgr {
            self.input_unit(ch, out);
            return;
        }

        if let Some(seq) = KeyMapper::map(key.virtual_key, Modifiers::from(state)) {
            for b in seq {
                self.input_unit(u16::from(b), out);
            }
            return;
        }

        if ch != 0 {
            if is_alt {
                self.input_unit(0x1B, out);
            }
            let unit = if is_ctrl && ch != u16::from(b' ') && ch != u16::from(b'\n') && ch != 0x7F {
                if ch == u16::from(b'?') {
                    0x7F
                } else {
                    ascii_upper(ch) & 0x1F
                }
            } else {
                ch
            };
            self.input_unit(unit, out);
        } else if is_ctrl {
            let unit = match key.virtual_key {
                k @ 0x41..=0x5A => k - 0x40,
                vk::OEM_2 => 0x7F,
                _ => 0,
            };
            if unit != 0 {
                if is_alt {
                    self.input_unit(0x1B, out);
                }
                self.input_unit(unit, out);
            }
        }
    }

    /// Feed one UTF-16 unit through the line discipline.
    fn input_unit(&mut self, unit: u16, out: &mut Decoded) {
        let c = match (self.high_surrogate.take(), unit) {
            (None, 0xD800..=0xDBFF) => {
                self.high_surrogate = Some(unit);
                return;
            }
            (Some(high), 0xDC00..=0xDFFF) => {
                match char::decode_utf16([high, unit]).next() {
                    Some(Ok(c)) => c,
                    _ => char::REPLACEMENT_CHARACTER,
                }
            }
            (_, unit) => char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER),
        };
        self.input_char(c, out);
    }

    fn input_char(&mut self, c: char, out: &mut Decoded) {
        let attrs = &self.attributes;
        if attrs.isig {
            let signal = if Some(c) == attrs.intr {
                Some(Signal::Int)
            } else if Some(c) == attrs.quit {
                Some(Signal::Quit)
            } else if Some(c) == attrs.susp {
                Some(Signal::Tstp)
            } else if Some(c) == attrs.status {
                Some(Signal::Info)
            } else {
                None
            };
            if let Some(signal) = signal {
                out.signals.push(signal);
                return;
            }
        }

        let c = match c {
            '\r' if attrs.igncr => return,
            '\r' if attrs.icrnl => '\n',
            '\n' if attrs.inlcr => '\r',
            c => c,
        };
        let mut buf = [0u8; 4];
        out.bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    /// X10 report `ESC [ M cb cx cy`, or `None` when the event is filtered.
    fn mouse_report(&self, mouse: &MouseRecord) -> Option<[u8; 6]> {
        let flags = mouse.event_flags;
        let moved = flags == MouseEventFlags::MOUSE_MOVED;
        let filtered = match self.mouse_tracking {
            MouseTracking::Off => true,
            MouseTracking::Normal => moved,
            MouseTracking::Button => moved && mouse.buttons().is_empty(),
            MouseTracking::Any => false,
        };
        if filtered {
            return None;
        }

        // Double clicks are reported like ordinary presses
        let flags = flags - MouseEventFlags::DOUBLE_CLICK;
        let buttons = mouse.buttons();
        let cb: u8 = if flags == MouseEventFlags::MOUSE_WHEELED {
            if mouse.wheel_towards_user() {
                0x41
            } else {
                0x40
            }
        } else if flags == MouseEventFlags::MOUSE_HWHEELED {
            return None;
        } else if buttons.contains(MouseButtons::FROM_LEFT_1ST_BUTTON_PRESSED) {
            0x00
        } else if buttons.contains(MouseButtons::RIGHTMOST_BUTTON_PRESSED) {
            0x01
        } else if buttons.contains(MouseButtons::FROM_LEFT_2ND_BUTTON_PRESSED) {
            0x02
        } else {
            0x03
        };

        let cx = i32::from(mouse.position.x) + 1;
        let cy = i32::from(mouse.position.y) + 1;
        if !(1..=X10_MAX_COORD).contains(&cx) || !(1..=X10_MAX_COORD).contains(&cy) {
            trace!(cx, cy, "mouse position outside X10 range");
            return None;
        }

        Some([0x1B, b'[', b'M', 32 + cb, 32 + cx as u8, 32 + cy as u8])
    }
}

fn ascii_upper(unit: u16) -> u16 {
    if (u16::from(b'a')..=u16::from(b'z')).contains(&unit) {
        unit - 0x20
    } else {
        unit
    }
}
