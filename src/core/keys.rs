//! Key mapping for console key events
//!
//! Converts Windows virtual-key codes to the xterm sequences a line editor
//! expects on its input.

use bitflags::bitflags;
use crossterm::event::KeyCode;

use super::console::ControlKeyState;

/// Virtual-key codes the mapper understands.
pub mod vk {
    pub const BACK: u16 = 0x08;
    pub const TAB: u16 = 0x09;
    pub const MENU: u16 = 0x12;
    pub const PRIOR: u16 = 0x21;
    pub const NEXT: u16 = 0x22;
    pub const END: u16 = 0x23;
    pub const HOME: u16 = 0x24;
    pub const LEFT: u16 = 0x25;
    pub const UP: u16 = 0x26;
    pub const RIGHT: u16 = 0x27;
    pub const DOWN: u16 = 0x28;
    pub const INSERT: u16 = 0x2D;
    pub const DELETE: u16 = 0x2E;
    pub const F1: u16 = 0x70;
    pub const F12: u16 = 0x7B;
    /// `/?` key on US layouts
    pub const OEM_2: u16 = 0xBF;
}

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
    }
}

impl From<ControlKeyState> for Modifiers {
    fn from(state: ControlKeyState) -> Self {
        let mut result = Modifiers::empty();
        if state.shift() {
            result |= Modifiers::SHIFT;
        }
        if state.alt() {
            result |= Modifiers::ALT;
        }
        if state.ctrl() {
            result |= Modifiers::CTRL;
        }
        result
    }
}

/// Key mapper for converting virtual keys to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Sequence for a special key, or `None` when the key should be handled
    /// through its character.
    pub fn map(virtual_key: u16, mods: Modifiers) -> Option<Vec<u8>> {
        let code = Self::key_code(virtual_key, mods)?;

        match code {
            KeyCode::Backspace => {
                if mods.contains(Modifiers::ALT) {
                    Some(vec![0x1B, 0x08])
                } else {
                    Some(vec![0x08])
                }
            }

            KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),

            KeyCode::Up => Some(Self::special_key(b'A', mods)),
            KeyCode::Down => Some(Self::special_key(b'B', mods)),
            KeyCode::Right => Some(Self::special_key(b'C', mods)),
            KeyCode::Left => Some(Self::special_key(b'D', mods)),
            KeyCode::Home => Some(Self::special_key(b'H', mods)),
            KeyCode::End => Some(Self::special_key(b'F', mods)),

            KeyCode::PageUp => Some(Self::tilde_key(5, mods)),
            KeyCode::PageDown => Some(Self::tilde_key(6, mods)),
            KeyCode::Insert => Some(Self::tilde_key(2, mods)),
            KeyCode::Delete => Some(Self::tilde_key(3, mods)),

            KeyCode::F(n) => Some(Self::function_key(n, mods)),

            _ => None,
        }
    }

    /// Classify a virtual key. Plain Tab is left to its character.
    fn key_code(virtual_key: u16, mods: Modifiers) -> Option<KeyCode> {
        match virtual_key {
            vk::BACK => Some(KeyCode::Backspace),
            vk::TAB if mods.contains(Modifiers::SHIFT) => Some(KeyCode::BackTab),
            vk::PRIOR => Some(KeyCode::PageUp),
            vk::NEXT => Some(KeyCode::PageDown),
            vk::END => Some(KeyCode::End),
            vk::HOME => Some(KeyCode::Home),
            vk::LEFT => Some(KeyCode::Left),
            vk::UP => Some(KeyCode::Up),
            vk::RIGHT => Some(KeyCode::Right),
            vk::DOWN => Some(KeyCode::Down),
            vk::INSERT => Some(KeyCode::Insert),
            vk::DELETE => Some(KeyCode::Delete),
            vk::F1..=vk::F12 => Some(KeyCode::F((virtual_key - vk::F1 + 1) as u8)),
            _ => None,
        }
    }

    /// Cursor and Home/End sequence
    fn special_key(key: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            vec![0x1B, b'[', key]
        } else {
            let mod_code = Self::modifier_code(mods);
            format!("\x1b[1;{}{}", mod_code, key as char).into_bytes()
        }
    }

    /// Tilde key sequence (PageUp, PageDown, Insert, Delete)
    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            let mod_code = Self::modifier_code(mods);
            format!("\x1b[{};{}~", code, mod_code).into_bytes()
        }
    }

    /// Function key sequence
    fn function_key(n: u8, mods: Modifiers) -> Vec<u8> {
        let base = match n {
            1 => b"\x1bOP".to_vec(),
            2 => b"\x1bOQ".to_vec(),
            3 => b"\x1bOR".to_vec(),
            4 => b"\x1bOS".to_vec(),
            5 => b"\x1b[15~".to_vec(),
            6 => b"\x1b[17~".to_vec(),
            7 => b"\x1b[18~".to_vec(),
            8 => b"\x1b[19~".to_vec(),
            9 => b"\x1b[20~".to_vec(),
            10 => b"\x1b[21~".to_vec(),
            11 => b"\x1b[23~".to_vec(),
            12 => b"\x1b[24~".to_vec(),
            _ => return vec![],
        };

        if mods.is_empty() {
            return base;
        }

        let mod_code = Self::modifier_code(mods);
        match n {
            1..=4 => {
                // ESC O X -> ESC [ 1 ; mod X
                let key = base[2];
                format!("\x1b[1;{}{}", mod_code, key as char).into_bytes()
            }
            _ => {
                // ESC [ n ~ -> ESC [ n ; mod ~
                let code_str = String::from_utf8_lossy(&base[2..base.len() - 1]);
                format!("\x1b[{};{}~", code_str, mod_code).into_bytes()
            }
        }
    }

    /// xterm modifier parameter
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + mods.bits()
    }
}
