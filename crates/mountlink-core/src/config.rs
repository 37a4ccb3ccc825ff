//! Driver settings
//!
//! Read-only view of the per-device driver configuration. Persisting settings
//! is the host application's job; this module only reads a JSON document and
//! fills in defaults for anything missing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::{DispatcherConfig, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Device identity used when none is configured
pub const DEFAULT_DEVICE_ID: &str = "mountlink.Telescope";

/// Per-device driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Device identity; scopes the session lock shared by all driver instances
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Serial port name
    #[serde(default)]
    pub port_name: String,

    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Bound for session acquisition and for each receive, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Pause after the legacy tracking command, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Guide with timed manual moves instead of guide pulses
    #[serde(default)]
    pub legacy_pulse_guide: bool,

    /// Directory holding session lock files (machine-wide default if unset)
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
}

fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_command_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_settle_delay_ms() -> u64 {
    1000
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            port_name: String::new(),
            baud_rate: default_baud_rate(),
            command_timeout_ms: default_command_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            legacy_pulse_guide: false,
            lock_dir: None,
        }
    }
}

impl DriverSettings {
    /// Parse settings from a JSON document
    pub fn from_json_str(content: &str) -> io::Result<Self> {
        let settings: DriverSettings = serde_json::from_str(content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    fn validate(&self) -> io::Result<()> {
        if self.command_timeout_ms == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "command_timeout_ms must be greater than zero",
            ));
        }
        if self.device_id.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "device_id must not be empty",
            ));
        }
        Ok(())
    }

    /// Directory for session lock files
    pub fn resolved_lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(default_lock_dir)
    }

    /// Dispatcher tuning derived from these settings
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

/// Machine-wide lock directory, the same for every user account
pub fn default_lock_dir() -> PathBuf {
    shared_root().join("mountlink")
}

#[cfg(unix)]
fn shared_root() -> PathBuf {
    PathBuf::from("/tmp")
}

#[cfg(windows)]
fn shared_root() -> PathBuf {
    dirs::public_dir().unwrap_or_else(std::env::temp_dir)
}

#[cfg(not(any(unix, windows)))]
fn shared_root() -> PathBuf {
    std::env::temp_dir()
}
