//! conterm - terminal driver for the Windows console
//!
//! Gives a line editor a Unix-style terminal on top of the Windows console:
//! console input records become bytes on a pipe (keys, X10 mouse reports,
//! focus reports, resize signals), and ANSI output is either passed through
//! to a console that understands it or emulated with console API calls.
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn demo() -> conterm::Result<()> {
//! use std::io::Write;
//! use conterm::{Session, SessionOptions};
//!
//! let mut session = Session::open(SessionOptions::default())?;
//! write!(session.output(), "\x1b[1mhello\x1b[0m\r\n").ok();
//! session.close()
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;

pub use crate::core::input::{InputAttributes, MouseTracking};
pub use crate::core::session::{OutputMode, Session, SessionOptions, TerminalHost};
pub use crate::core::signal::{Signal, SignalHandler};
pub use error::{ConsoleError, Result};
