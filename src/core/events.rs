//! Console event source
//!
//! Blocks on the input handle for a bounded time and hands back at most one
//! native record per call.

use std::sync::Arc;
use std::time::Duration;

use super::console::{ConsoleApi, ConsoleEvent};
use crate::error::Result;

/// Poll timeout used by the input pump between checks for pause and close.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Reads native input records one at a time.
pub struct EventSource<C: ConsoleApi> {
    console: Arc<C>,
}

impl<C: ConsoleApi> Clone for EventSource<C> {
    fn clone(&self) -> Self {
        Self { console: Arc::clone(&self.console) }
    }
}

impl<C: ConsoleApi> EventSource<C> {
    pub fn new(console: Arc<C>) -> Self {
        Self { console }
    }

    /// Wait up to `timeout` for the next record.
    ///
    /// `Ok(None)` means nothing arrived this cycle: the wait timed out, or the
    /// handle was signaled but another reader drained it first.
    pub fn poll_event(&self, timeout: Duration) -> Result<Option<ConsoleEvent>> {
        if !self.console.wait_for_input(timeout)? {
            return Ok(None);
        }
        self.console.read_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ScriptedConsole;

    #[test]
    fn test_timeout_is_not_an_error() {
        let console = Arc::new(ScriptedConsole::new(80, 25));
        console.push_timeout();
        let source = EventSource::new(console);
        assert_eq!(source.poll_event(Duration::from_millis(1)).unwrap(), None);
    }

    #[test]
    fn test_returns_one_record_per_poll() {
        let console = Arc::new(ScriptedConsole::new(80, 25));
        console.push_event(ConsoleEvent::Focus(true));
        console.push_event(ConsoleEvent::Focus(false));
        let source = EventSource::new(console);

        let first = source.poll_event(DEFAULT_POLL_TIMEOUT).unwrap();
        assert_eq!(first, Some(ConsoleEvent::Focus(true)));
        let second = source.poll_event(DEFAULT_POLL_TIMEOUT).unwrap();
        assert_eq!(second, Some(ConsoleEvent::Focus(false)));
        assert_eq!(source.poll_event(Duration::from_millis(1)).unwrap(), None);
    }

    #[test]
    fn test_native_failure_is_surfaced() {
        let console = Arc::new(ScriptedConsole::new(80, 25));
        console.push_event(ConsoleEvent::Focus(true));
        console.script().fail = Some("ReadConsoleInputW");
        let source = EventSource::new(console);
        assert!(source.poll_event(DEFAULT_POLL_TIMEOUT).is_err());
    }
}
