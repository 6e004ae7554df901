//! Core console driver components.
//!
//! - **console**: native console capability trait and data model
//! - **win32**: the capability over the Win32 console (Windows only)
//! - **events** / **input** / **keys**: input polling and decoding
//! - **pipe**: pseudo-input channel between the pump and the reader
//! - **writer** / **ansi**: output, passthrough or emulated
//! - **session**: terminal session tying it all together
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── input pump thread
//! │   └── EventSource → InputDecoder → InputSender ─┐
//! ├── InputReader  ◄──────────────────────────────────┘
//! ├── SignalHandlers (Winch, Int, ...)
//! └── SessionOutput
//!     ├── ConsoleWriter             (VT / ConEmu)
//!     └── AnsiWriter → Translator   (emulated)
//! ```

pub mod ansi;
pub mod console;
pub mod events;
pub mod input;
pub mod keys;
pub mod pipe;
pub mod session;
pub mod signal;
#[cfg(windows)]
pub mod win32;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;
