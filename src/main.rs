//! conterm - console terminal driver demo
//!
//! Opens a terminal session on the current console and echoes what the
//! input pump decodes, using the session output for colored text so the
//! selected output mode (VT, ConEmu or emulated) is exercised.
//!
//! ```text
//! conterm                    # Keys only
//! conterm -m normal -f       # Also mouse clicks/wheel and focus reports
//! conterm -o emulated        # Force ANSI emulation
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use conterm::config::{self, Config, OutputModeSetting};
use conterm::MouseTracking;

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("conterm {}", VERSION);
}

fn print_help() {
    eprintln!("conterm {} - terminal driver for the Windows console", VERSION);
    eprintln!();
    eprintln!("Usage: conterm [OPTIONS]");
    eprintln!();
    eprintln!("Echoes decoded terminal input until 'q' or Ctrl+C.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <MODE>   auto, virtual-terminal, conemu, emulated");
    eprintln!("  -m, --mouse <MODE>    off, normal, button, any");
    eprintln!("  -f, --focus           Report focus changes");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Defaults come from ~/.conterm/config.toml.");
}

/// Apply command line arguments on top of the loaded config.
fn parse_args(config: &mut Config) -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-o" | "--output" => {
                i += 1;
                let value = args.get(i).ok_or("Missing output mode")?;
                config.output_mode = match value.as_str() {
                    "auto" => OutputModeSetting::Auto,
                    "virtual-terminal" | "vt" => OutputModeSetting::VirtualTerminal,
                    "conemu" => OutputModeSetting::ConEmu,
                    "emulated" => OutputModeSetting::Emulated,
                    other => return Err(format!("Unknown output mode: {}", other)),
                };
            }
            "-m" | "--mouse" => {
                i += 1;
                let value = args.get(i).ok_or("Missing mouse mode")?;
                config.mouse_tracking = match value.as_str() {
                    "off" => MouseTracking::Off,
                    "normal" => MouseTracking::Normal,
                    "button" => MouseTracking::Button,
                    "any" => MouseTracking::Any,
                    other => return Err(format!("Unknown mouse mode: {}", other)),
                };
            }
            "-f" | "--focus" => {
                config.focus_tracking = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(())
}

/// Log to `~/.conterm/conterm.log`; `RUST_LOG` wins over the configured level.
fn init_logging(config: &Config) {
    let log_path = config::config_dir()
        .map(|dir| dir.join("conterm.log"))
        .unwrap_or_else(|| PathBuf::from("conterm.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Printable rendering of an input chunk: `ESC [ A`, `^C`, `x`.
fn describe(bytes: &[u8]) -> String {
    let parts: Vec<String> = String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| match c {
            '\x1b' => "ESC".to_string(),
            '\x7f' => "DEL".to_string(),
            c if (c as u32) < 0x20 => format!("^{}", ((c as u8) + b'@') as char),
            ' ' => "SP".to_string(),
            c => c.to_string(),
        })
        .collect();
    parts.join(" ")
}

fn main() -> anyhow::Result<()> {
    let mut config = Config::load();
    if let Err(e) = parse_args(&mut config) {
        eprintln!("Error: {}", e);
        eprintln!("Use --help for usage information");
        std::process::exit(1);
    }

    init_logging(&config);
    info!("conterm {} starting", VERSION);

    #[cfg(not(windows))]
    {
        eprintln!("conterm drives the Windows console and has nothing to do on this platform.");
        return Ok(());
    }

    #[cfg(windows)]
    {
        run(&config)?;
    }

    Ok(())
}

/// Echo loop (Windows only)
#[cfg(windows)]
fn run(config: &Config) -> anyhow::Result<()> {
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use conterm::{Session, Signal, SignalHandler};

    // Character at a time without echo; the rest comes from [input]
    let mut options = config.session_options();
    options.attributes.icanon = false;
    options.attributes.echo = false;
    let mut session = Session::open(options)?;

    let resized = Arc::new(AtomicBool::new(false));
    {
        let resized = resized.clone();
        session.handle(
            Signal::Winch,
            SignalHandler::custom(move |_| resized.store(true, Ordering::SeqCst)),
        );
    }
    // With isig on, Ctrl+C arrives as a signal instead of a byte
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        session.handle(
            Signal::Int,
            SignalHandler::custom(move |_| interrupted.store(true, Ordering::SeqCst)),
        );
    }

    let (cols, rows) = session.size()?;
    let mode = session.output_mode();
    let out = session.output();
    write!(out, "\x1b]0;conterm\x07")?;
    write!(
        out,
        "\x1b[1;36mconterm\x1b[0m {} ({}x{}, output: {})\r\n",
        VERSION, cols, rows, mode
    )?;
    write!(out, "Press keys to see their encoding; \x1b[1mq\x1b[0m or Ctrl+C quits.\r\n\r\n")?;
    out.flush()?;

    let mut buf = [0u8; 64];
    while !interrupted.load(Ordering::SeqCst) {
        if resized.swap(false, Ordering::SeqCst) {
            let (cols, rows) = session.size()?;
            write!(session.output(), "\x1b[33mresize\x1b[39m {}x{}\r\n", cols, rows)?;
        }

        let n = match session.reader().read_timeout(&mut buf, Duration::from_millis(200))? {
            None => continue,
            Some(0) => break,
            Some(n) => n,
        };
        let bytes = &buf[..n];
        if bytes == b"q" || bytes == b"\x03" {
            break;
        }
        write!(session.output(), "\x1b[32m{:>2}\x1b[39m  {}\r\n", n, describe(bytes))?;
    }

    session.close()?;
    info!("conterm exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(describe(b"\x1b[A"), "ESC [ A");
        assert_eq!(describe(b"\x03"), "^C");
        assert_eq!(describe(b"a b\x7f"), "a SP b DEL");
    }
}
