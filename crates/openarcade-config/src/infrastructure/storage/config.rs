//! TOML-based settings for the configuration tool.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\OpenArcade\config.toml`
//! - Linux:    `~/.config/openarcade/config.toml`
//! - macOS:    `~/Library/Application Support/OpenArcade/config.toml`
//!
//! Example file:
//!
//! ```toml
//! [client]
//! backend = "serial"      # or "local" / "emulated"
//!
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//! request_timeout_ms = 2000
//! max_pending = 32
//!
//! [local]
//! default_device_id = "OA-001"
//! simulated_latency_ms = 150
//!
//! [logging]
//! log_level = "info"
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a file that sets only
//! `serial.port` is valid and a missing file is simply the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use openarcade_core::protocol::DEFAULT_BAUD_RATE;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Which implementation of the configuration contract to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A controller on a serial port.
    #[default]
    Serial,
    /// The on-disk device store, for working without hardware.
    Local,
    /// The serial protocol spoken to an in-process device emulator backed
    /// by the on-disk store.
    Emulated,
}

/// Top-level settings stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    #[serde(default)]
    pub backend: Backend,
}

/// Settings for the hardware backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// Port path such as `/dev/ttyACM0` or `COM3`.  When absent the first
    /// USB serial port found is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// How long a command may wait for its response.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum number of commands awaiting a response at once.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

/// Settings for the local (no hardware) backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalConfig {
    /// Device store file.  Defaults to `devices.json` next to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_device_id")]
    pub default_device_id: String,
    /// Delay added to every call to mimic a serial round trip.
    #[serde(default = "default_simulated_latency_ms")]
    pub simulated_latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_request_timeout_ms() -> u64 {
    2000
}
fn default_max_pending() -> usize {
    32
}
fn default_device_id() -> String {
    "OA-001".to_string()
}
fn default_simulated_latency_ms() -> u64 {
    150
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            request_timeout_ms: default_request_timeout_ms(),
            max_pending: default_max_pending(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            default_device_id: default_device_id(),
            simulated_latency_ms: default_simulated_latency_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl SerialConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl LocalConfig {
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    /// The configured store path, or `devices.json` in the config directory.
    pub fn resolved_store_path(&self) -> Result<PathBuf, ConfigFileError> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("devices.json")),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigFileError::NoPlatformConfigDir`] when the platform config
/// base directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigFileError> {
    platform_config_dir().ok_or(ConfigFileError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigFileError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`AppConfig`] from the default location.
pub fn load_config() -> Result<AppConfig, ConfigFileError> {
    load_config_from(&config_file_path()?)
}

/// Loads [`AppConfig`] from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] for file-system errors other than "not
/// found", and [`ConfigFileError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigFileError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigFileError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigFileError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigFileError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `openarcade`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("OpenArcade"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("openarcade"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("OpenArcade")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
