//! Terminal signals
//!
//! Signals raised by the input pump (interrupt keys, window resize) and the
//! handlers a consumer installs for them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Interrupt character (Ctrl+C)
    Int,
    /// Quit character (Ctrl+\)
    Quit,
    /// Suspend character (Ctrl+Z)
    Tstp,
    /// Status character (VSTATUS)
    Info,
    /// Window size changed
    Winch,
}

/// What happens when a signal is raised.
#[derive(Clone)]
pub enum SignalHandler {
    Default,
    Ignore,
    Custom(Arc<dyn Fn(Signal) + Send + Sync>),
}

impl SignalHandler {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        SignalHandler::Custom(Arc::new(f))
    }
}

impl fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalHandler::Default => f.write_str("Default"),
            SignalHandler::Ignore => f.write_str("Ignore"),
            SignalHandler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Handler table shared between the session and its pump thread.
#[derive(Default)]
pub struct SignalHandlers {
    handlers: Mutex<HashMap<Signal, SignalHandler>>,
}

impl SignalHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler`, returning the one it replaces.
    pub fn handle(&self, signal: Signal, handler: SignalHandler) -> SignalHandler {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.insert(signal, handler).unwrap_or(SignalHandler::Default)
    }

    pub fn raise(&self, signal: Signal) {
        // Clone out so the callback runs without the table locked.
        let handler = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.get(&signal).cloned().unwrap_or(SignalHandler::Default)
        };
        debug!(?signal, ?handler, "raise");
        if let SignalHandler::Custom(f) = handler {
            f(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_custom_handler_invoked() {
        let handlers = SignalHandlers::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        handlers.handle(Signal::Winch, SignalHandler::custom(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        handlers.raise(Signal::Winch);
        handlers.raise(Signal::Int);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_returns_previous() {
        let handlers = SignalHandlers::new();
        let previous = handlers.handle(Signal::Int, SignalHandler::Ignore);
        assert!(matches!(previous, SignalHandler::Default));
        let previous = handlers.handle(Signal::Int, SignalHandler::Default);
        assert!(matches!(previous, SignalHandler::Ignore));
    }
}
