//! Terminal session
//!
//! Ties the console, the input pump and the output writer together:
//!
//! - picks how output reaches the screen (native VT processing, a ConEmu
//!   host, or ANSI emulation)
//! - runs a pump thread that polls console input, decodes it and feeds the
//!   pseudo-input channel
//! - restores the console modes it changed when closed

use std::env;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::ansi::{AnsiWriter, ConsoleTranslator};
use super::console::{ConsoleApi, ConsoleInputMode, ConsoleOutputMode, Coord};
use super::events::{EventSource, DEFAULT_POLL_TIMEOUT};
use super::input::{InputAttributes, InputDecoder, MouseTracking};
use super::pipe::{pipe, InputReader, InputSender};
use super::signal::{Signal, SignalHandler, SignalHandlers};
use super::writer::ConsoleWriter;
use crate::error::{ConsoleError, Result};

/// How output bytes reach the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// The console interprets escape sequences itself
    VirtualTerminal,
    /// ConEmu-style host that interprets escape sequences written to the console
    ConEmu,
    /// Escape sequences are translated into console API calls
    Emulated,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputMode::VirtualTerminal => "virtual-terminal",
            OutputMode::ConEmu => "conemu",
            OutputMode::Emulated => "emulated",
        })
    }
}

/// Terminal program hosting the console, as far as the environment tells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalHost {
    WindowsTerminal,
    VsCode,
    ConEmu,
    Cmder,
    Hyper,
    Alacritty,
    Msys,
    Console,
}

impl TerminalHost {
    /// Detect the host from the process environment.
    pub fn detect() -> Self {
        Self::detect_with(|name| env::var(name).ok())
    }

    pub fn detect_with<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_set = |name: &str| var(name).is_some();
        let term_program = var("TERM_PROGRAM");

        if is_set("WT_SESSION") {
            return TerminalHost::WindowsTerminal;
        }
        if is_set("VSCODE_INJECTION") || term_program.as_deref() == Some("vscode") {
            return TerminalHost::VsCode;
        }
        if is_set("ConEmuPID") {
            return TerminalHost::ConEmu;
        }
        if is_set("CMDER_ROOT") {
            return TerminalHost::Cmder;
        }
        if term_program.as_deref() == Some("Hyper") {
            return TerminalHost::Hyper;
        }
        if is_set("ALACRITTY_LOG") || is_set("ALACRITTY_SOCKET") {
            return TerminalHost::Alacritty;
        }
        if is_set("MSYSTEM") {
            return TerminalHost::Msys;
        }
        TerminalHost::Console
    }

    /// Cmder ships ConEmu as its terminal.
    pub fn is_conemu(self) -> bool {
        matches!(self, TerminalHost::ConEmu | TerminalHost::Cmder)
    }

    pub fn name(self) -> &'static str {
        match self {
            TerminalHost::WindowsTerminal => "Windows Terminal",
            TerminalHost::VsCode => "VSCode Terminal",
            TerminalHost::ConEmu => "ConEmu",
            TerminalHost::Cmder => "Cmder",
            TerminalHost::Hyper => "Hyper",
            TerminalHost::Alacritty => "Alacritty",
            TerminalHost::Msys => "MSYS2/MinGW",
            TerminalHost::Console => "Windows Console",
        }
    }
}

/// Session settings
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Skip probing and use this output mode
    pub output_mode: Option<OutputMode>,
    pub poll_timeout: Duration,
    pub mouse_tracking: MouseTracking,
    pub focus_tracking: bool,
    pub attributes: InputAttributes,
    /// Open without starting the input pump
    pub paused: bool,
    pub host: TerminalHost,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            output_mode: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            mouse_tracking: MouseTracking::Off,
            focus_tracking: false,
            attributes: InputAttributes::default(),
            paused: false,
            host: TerminalHost::detect(),
        }
    }
}

/// Inputs to output mode selection
struct ProbeContext<'a, C: ConsoleApi> {
    console: &'a C,
    forced: Option<OutputMode>,
    output_mode: ConsoleOutputMode,
    host: TerminalHost,
}

/// One capability check; `None` falls through to the next.
type Probe<C> = fn(&ProbeContext<'_, C>) -> Option<OutputMode>;

fn forced_probe<C: ConsoleApi>(ctx: &ProbeContext<'_, C>) -> Option<OutputMode> {
    ctx.forced
}

fn virtual_terminal_probe<C: ConsoleApi>(ctx: &ProbeContext<'_, C>) -> Option<OutputMode> {
    let mode = ctx.output_mode | ConsoleOutputMode::ENABLE_VIRTUAL_TERMINAL_PROCESSING;
    match ctx.console.set_output_mode(mode) {
        Ok(()) => Some(OutputMode::VirtualTerminal),
        Err(e) => {
            debug!("virtual terminal processing unavailable: {}", e);
            None
        }
    }
}

fn conemu_probe<C: ConsoleApi>(ctx: &ProbeContext<'_, C>) -> Option<OutputMode> {
    ctx.host.is_conemu().then_some(OutputMode::ConEmu)
}

fn emulated_probe<C: ConsoleApi>(_ctx: &ProbeContext<'_, C>) -> Option<OutputMode> {
    Some(OutputMode::Emulated)
}

fn select_output_mode<C: ConsoleApi>(ctx: &ProbeContext<'_, C>) -> OutputMode {
    let probes: [(&str, Probe<C>); 4] = [
        ("forced", forced_probe::<C>),
        ("virtual-terminal", virtual_terminal_probe::<C>),
        ("conemu", conemu_probe::<C>),
        ("emulated", emulated_probe::<C>),
    ];
    for (name, probe) in probes {
        if let Some(mode) = probe(ctx) {
            debug!("output mode {} selected by {} probe", mode, name);
            return mode;
        }
    }
    OutputMode::Emulated
}

/// Session output: passthrough or emulated.
pub enum SessionOutput<C: ConsoleApi> {
    Direct(ConsoleWriter<C>),
    Emulated(AnsiWriter<C>),
}

impl<C: ConsoleApi> Write for SessionOutput<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SessionOutput::Direct(w) => w.write(buf),
            SessionOutput::Emulated(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SessionOutput::Direct(w) => w.flush(),
            SessionOutput::Emulated(w) => w.flush(),
        }
    }
}

#[derive(Debug, Default)]
struct PumpState {
    paused: bool,
    /// A pump thread is live
    running: bool,
    /// The last pump stopped on an error
    failed: bool,
    closing: bool,
}

/// State shared with the pump thread
struct Shared {
    state: Mutex<PumpState>,
    decoder: Mutex<InputDecoder>,
    signals: SignalHandlers,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, PumpState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn decoder(&self) -> MutexGuard<'_, InputDecoder> {
        self.decoder.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Input pump: poll, decode, forward, until paused or closed.
fn pump<C: ConsoleApi>(
    shared: Arc<Shared>,
    events: EventSource<C>,
    sender: InputSender,
    timeout: Duration,
) {
    debug!("input pump started");
    loop {
        {
            let mut state = shared.state();
            if state.paused || state.closing {
                state.running = false;
                break;
            }
        }

        match events.poll_event(timeout) {
            Ok(Some(event)) => {
                let decoded = shared.decoder().decode(&event);
                sender.send(decoded.bytes);
                for signal in decoded.signals {
                    shared.signals.raise(signal);
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("input pump stopped: {}", e);
                {
                    let mut state = shared.state();
                    state.running = false;
                    state.paused = true;
                    state.failed = true;
                }
                // resume() joins this thread before reopening the reader
                sender.fail(e.into());
                break;
            }
        }
    }
    debug!("input pump stopped");
}

/// A terminal session over a console.
pub struct Session<C: ConsoleApi> {
    console: Arc<C>,
    output_mode: OutputMode,
    output: SessionOutput<C>,
    reader: InputReader,
    sender: InputSender,
    shared: Arc<Shared>,
    pump_thread: Option<JoinHandle<()>>,
    poll_timeout: Duration,
    original_input_mode: ConsoleInputMode,
    original_output_mode: ConsoleOutputMode,
    closed: bool,
}

#[cfg(windows)]
impl Session<super::win32::Win32Console> {
    /// Open a session on the process console.
    pub fn open(options: SessionOptions) -> Result<Self> {
        let console = super::win32::Win32Console::new()?;
        Self::new(Arc::new(console), options)
    }
}

impl<C: ConsoleApi + 'static> Session<C> {
    pub fn new(console: Arc<C>, options: SessionOptions) -> Result<Self> {
        let original_input_mode = console.input_mode()?;
        let original_output_mode = console.output_mode()?;
        let info = console.screen_buffer_info()?;

        let output_mode = select_output_mode(&ProbeContext {
            console: &*console,
            forced: options.output_mode,
            output_mode: original_output_mode,
            host: options.host,
        });
        let output = match output_mode {
            OutputMode::VirtualTerminal | OutputMode::ConEmu => {
                SessionOutput::Direct(ConsoleWriter::new(console.clone()))
            }
            OutputMode::Emulated => SessionOutput::Emulated(AnsiWriter::with_translator(
                ConsoleTranslator::with_original_attributes(console.clone(), info.attributes),
            )),
        };

        let mut decoder = InputDecoder::new(options.attributes.clone());
        decoder.set_mouse_tracking(options.mouse_tracking);
        decoder.set_focus_tracking(options.focus_tracking);

        let (sender, reader) = pipe();
        let mut session = Self {
            console,
            output_mode,
            output,
            reader,
            sender,
            shared: Arc::new(Shared {
                state: Mutex::new(PumpState { paused: true, ..PumpState::default() }),
                decoder: Mutex::new(decoder),
                signals: SignalHandlers::new(),
            }),
            pump_thread: None,
            poll_timeout: options.poll_timeout,
            original_input_mode,
            original_output_mode,
            closed: false,
        };

        // From here on a failure drops the session, which restores both modes
        session.apply_input_mode(&options.attributes, options.mouse_tracking)?;
        info!(
            "session opened: host={}, output={}, code page={}",
            options.host.name(),
            output_mode,
            session.console.output_code_page()
        );

        if !options.paused {
            session.resume()?;
        }
        Ok(session)
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Writer for terminal output.
    pub fn output(&mut self) -> &mut dyn Write {
        &mut self.output
    }

    /// Reader for decoded terminal input.
    pub fn reader(&mut self) -> &mut InputReader {
        &mut self.reader
    }

    pub fn paused(&self) -> bool {
        self.shared.state().paused
    }

    /// Stop the input pump. With `wait`, block until the thread has exited.
    pub fn pause(&mut self, wait: bool) {
        self.shared.state().paused = true;
        debug!("pause requested");
        if wait {
            self.join_pump();
        }
    }

    /// Start the input pump unless one is already running. After a pump
    /// failure this starts a fresh pump and the reader sees input again.
    pub fn resume(&mut self) -> Result<()> {
        self.ensure_open()?;
        let reopen = {
            let mut state = self.shared.state();
            state.paused = false;
            if state.running {
                return Ok(());
            }
            state.running = true;
            std::mem::take(&mut state.failed)
        };
        // Any previous thread has already left its loop
        self.join_pump();
        if reopen {
            debug!("restarting input pump after failure");
            self.sender.reopen();
        }

        let shared = self.shared.clone();
        let events = EventSource::new(self.console.clone());
        let sender = self.sender.clone();
        let timeout = self.poll_timeout;
        let spawned = thread::Builder::new()
            .name("conterm-input".to_string())
            .spawn(move || pump(shared, events, sender, timeout));

        match spawned {
            Ok(handle) => {
                self.pump_thread = Some(handle);
                debug!("input pump resumed");
                Ok(())
            }
            Err(e) => {
                let mut state = self.shared.state();
                state.running = false;
                state.paused = true;
                Err(ConsoleError::Spawn(e))
            }
        }
    }
}

impl<C: ConsoleApi> Session<C> {
    fn join_pump(&mut self) {
        if let Some(handle) = self.pump_thread.take() {
            if handle.join().is_err() {
                warn!("input pump panicked");
            }
        }
    }

    /// Visible window size as (columns, rows).
    pub fn size(&self) -> Result<(u16, u16)> {
        let info = self.console.screen_buffer_info()?;
        Ok((info.window.width().max(0) as u16, info.window.height().max(0) as u16))
    }

    /// Screen buffer size as (columns, rows).
    pub fn buffer_size(&self) -> Result<(u16, u16)> {
        let info = self.console.screen_buffer_info()?;
        Ok((info.size.x.max(0) as u16, info.size.y.max(0) as u16))
    }

    /// Cursor position relative to the visible window.
    pub fn cursor_position(&self) -> Result<Coord> {
        let info = self.console.screen_buffer_info()?;
        Ok(Coord::new(info.cursor.x - info.window.left, info.cursor.y - info.window.top))
    }

    pub fn mouse_tracking(&self) -> MouseTracking {
        self.shared.decoder().mouse_tracking()
    }

    pub fn track_mouse(&mut self, tracking: MouseTracking) -> Result<()> {
        self.ensure_open()?;
        let attributes = {
            let mut decoder = self.shared.decoder();
            decoder.set_mouse_tracking(tracking);
            decoder.attributes().clone()
        };
        self.apply_input_mode(&attributes, tracking)
    }

    pub fn focus_tracking(&self) -> bool {
        self.shared.decoder().focus_tracking()
    }

    pub fn track_focus(&mut self, enabled: bool) {
        self.shared.decoder().set_focus_tracking(enabled);
    }

    pub fn attributes(&self) -> InputAttributes {
        self.shared.decoder().attributes().clone()
    }

    pub fn set_attributes(&mut self, attributes: InputAttributes) -> Result<()> {
        self.ensure_open()?;
        let tracking = {
            let mut decoder = self.shared.decoder();
            decoder.set_attributes(attributes.clone());
            decoder.mouse_tracking()
        };
        self.apply_input_mode(&attributes, tracking)
    }

    fn apply_input_mode(
        &self,
        attributes: &InputAttributes,
        tracking: MouseTracking,
    ) -> Result<()> {
        let mode = attributes.console_mode(tracking);
        debug!("console input mode {:?}", mode);
        self.console.set_input_mode(mode)
    }

    /// Install a signal handler, returning the previous one.
    pub fn handle(&self, signal: Signal, handler: SignalHandler) -> SignalHandler {
        self.shared.signals.handle(signal, handler)
    }

    pub fn raise(&self, signal: Signal) {
        self.shared.signals.raise(signal);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop the pump and restore the console modes found at open.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        {
            let mut state = self.shared.state();
            state.closing = true;
            state.paused = true;
        }
        self.join_pump();

        if let Err(e) = self.output.flush() {
            warn!("failed to flush output on close: {}", e);
        }
        let input = self.console.set_input_mode(self.original_input_mode);
        let output = self.console.set_output_mode(self.original_output_mode);
        input.and(output)?;
        info!("session closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(ConsoleError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<C: ConsoleApi> Drop for Session<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to restore console modes: {}", e);
        }
    }
}
