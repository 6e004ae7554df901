//! Console output writer
//!
//! Sends text to the console with the native wide-character write call.

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Arc;

use super::console::ConsoleApi;
use crate::error::{ConsoleError, Result};

/// Writes text to the console output handle.
pub struct ConsoleWriter<C: ConsoleApi> {
    console: Arc<C>,
    utf8: Utf8Accumulator,
}

impl<C: ConsoleApi> ConsoleWriter<C> {
    pub fn new(console: Arc<C>) -> Self {
        Self { console, utf8: Utf8Accumulator::new() }
    }

    /// Write `text`, repeating the native call until the console has taken
    /// every UTF-16 unit.
    pub fn write_str(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let units: Vec<u16> = text.encode_utf16().collect();
        self.write_units(&units)
    }

    pub fn write_units(&self, units: &[u16]) -> Result<()> {
        let mut offset = 0;
        while offset < units.len() {
            let written = self.console.write_console(&units[offset..])?;
            if written == 0 {
                return Err(ConsoleError::WriteZero);
            }
            offset += written;
        }
        Ok(())
    }
}

impl<C: ConsoleApi> Write for ConsoleWriter<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = self.utf8.accumulate(buf);
        self.write_str(&text)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Maximum number of bytes in an incomplete UTF-8 sequence.
const MAX_PARTIAL: usize = 4;

/// Buffers incomplete trailing UTF-8 bytes across successive writes.
pub struct Utf8Accumulator {
    partial: [u8; MAX_PARTIAL],
    partial_len: usize,
}

impl Default for Utf8Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Accumulator {
    pub fn new() -> Self {
        Self { partial: [0; MAX_PARTIAL], partial_len: 0 }
    }

    /// Return the decodable text of `data`, holding back a trailing
    /// incomplete sequence for the next call. Invalid bytes become U+FFFD.
    pub fn accumulate<'a>(&mut self, data: &'a [u8]) -> Cow<'a, str> {
        if self.partial_len == 0 {
            if let Ok(s) = std::str::from_utf8(data) {
                return Cow::Borrowed(s);
            }
        }

        let mut combined = Vec::with_capacity(self.partial_len + data.len());
        combined.extend_from_slice(&self.partial[..self.partial_len]);
        combined.extend_from_slice(data);
        self.partial_len = 0;

        let (text, rest) = combined.split_at(incomplete_tail(&combined));
        self.partial[..rest.len()].copy_from_slice(rest);
        self.partial_len = rest.len();
        Cow::Owned(String::from_utf8_lossy(text).into_owned())
    }
}

/// Start of a truncated sequence at the end of `bytes`, or `bytes.len()`.
fn incomplete_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(MAX_PARTIAL - 1);
    for i in (start..bytes.len()).rev() {
        if !is_continuation(bytes[i]) {
            return if is_incomplete_start(&bytes[i..]) { i } else { bytes.len() };
        }
    }
    bytes.len()
}

fn is_continuation(b: u8) -> bool {
    (0x80..=0xBF).contains(&b)
}

/// Whether `bytes` is a truncated (not malformed) multi-byte sequence.
fn is_incomplete_start(bytes: &[u8]) -> bool {
    let expected_len = match bytes[0] {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return false,
    };
    bytes.len() < expected_len && bytes[1..].iter().all(|&b| is_continuation(b))
}
