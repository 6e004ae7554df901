//! Error types shared by the console layers.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    /// A native console call reported failure.
    #[error("{call} failed: {source}")]
    Native {
        call: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("console accepted no characters")]
    WriteZero,

    #[error("terminal session is closed")]
    Closed,

    #[error("failed to spawn input pump: {0}")]
    Spawn(#[source] io::Error),
}

impl ConsoleError {
    /// Wrap an OS error for the named native call.
    pub fn native(call: &'static str, source: io::Error) -> Self {
        ConsoleError::Native { call, source }
    }
}

impl From<ConsoleError> for io::Error {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::WriteZero => io::Error::new(io::ErrorKind::WriteZero, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_converts_to_io() {
        let err = ConsoleError::native("SetConsoleCursorPosition", io::Error::from_raw_os_error(6));
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::Other);
        assert!(io_err.to_string().starts_with("SetConsoleCursorPosition failed"));
    }

    #[test]
    fn test_write_zero_kind() {
        let io_err: io::Error = ConsoleError::WriteZero.into();
        assert_eq!(io_err.kind(), io::ErrorKind::WriteZero);
    }
}
