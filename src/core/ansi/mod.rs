//! ANSI output emulation
//!
//! Used when the console cannot interpret escape sequences itself.

pub mod attr;
pub mod colors;
pub mod parser;
pub mod translator;

pub use parser::{AnsiHandler, AnsiParser, Attribute, Color, Erase};
pub use translator::{AnsiWriter, ConsoleTranslator, CursorMotion, FillRegion};
