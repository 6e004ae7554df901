//! Configuration for conterm.
//!
//! Loaded from `~/.conterm/config.toml`; every field is optional.
//!
//! ```toml
//! # auto, virtual-terminal, conemu, emulated
//! output_mode = "auto"
//!
//! # Input pump wait between pause/close checks
//! poll_timeout_ms = 100
//!
//! # off, normal, button, any
//! mouse_tracking = "off"
//! focus_tracking = false
//! start_paused = false
//!
//! # Overridden by RUST_LOG
//! log_level = "info"
//!
//! [input]
//! isig = true
//! icanon = true
//! echo = true
//! icrnl = true
//! igncr = false
//! inlcr = false
//! # Signal characters; omitted keys keep their defaults
//! intr = "\u0003"
//! status = "\u0014"
//! ```

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::input::{InputAttributes, MouseTracking};
use crate::core::session::{OutputMode, SessionOptions};

/// Output mode as written in the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputModeSetting {
    /// Probe the console
    #[default]
    Auto,
    VirtualTerminal,
    #[serde(rename = "conemu")]
    ConEmu,
    Emulated,
}

impl OutputModeSetting {
    /// Mode to force, or `None` to probe.
    pub fn forced(self) -> Option<OutputMode> {
        match self {
            OutputModeSetting::Auto => None,
            OutputModeSetting::VirtualTerminal => Some(OutputMode::VirtualTerminal),
            OutputModeSetting::ConEmu => Some(OutputMode::ConEmu),
            OutputModeSetting::Emulated => Some(OutputMode::Emulated),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_mode: OutputModeSetting,
    pub poll_timeout_ms: u64,
    pub mouse_tracking: MouseTracking,
    pub focus_tracking: bool,
    pub start_paused: bool,
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Line discipline
    pub input: InputAttributes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_mode: OutputModeSetting::Auto,
            poll_timeout_ms: 100,
            mouse_tracking: MouseTracking::Off,
            focus_tracking: false,
            start_paused: false,
            log_level: "info".to_string(),
            input: InputAttributes::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, or return defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content).unwrap_or_else(|e| {
                warn!("Invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `~/.conterm/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            output_mode: self.output_mode.forced(),
            poll_timeout: self.poll_timeout(),
            mouse_tracking: self.mouse_tracking,
            focus_tracking: self.focus_tracking,
            attributes: self.input.clone(),
            paused: self.start_paused,
            ..SessionOptions::default()
        }
    }
}

/// `~/.conterm`, also home of the log file
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".conterm"))
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
