//! The configuration contract the UI programs against.
//!
//! [`ConfigClient`] is implemented twice:
//!
//! - `SerialConfigClient` talks to a real controller over a byte stream.
//! - `LocalConfigClient` answers from an on-disk device store, for working
//!   without hardware.
//!
//! Callers pick one explicitly and hold it as `Arc<dyn ConfigClient>`; nothing
//! below the contract leaks into the caller.
//!
//! # Errors
//!
//! Every call returns [`ConfigError`].  Transport problems
//! (`UnsupportedTransport`, `OpenFailed`, `Io`, `ConnectionClosed`) come from
//! the link itself.  A device that answers `{"ok":false,"error":code}` yields
//! [`ConfigError::Command`] carrying exactly that code.  Nothing in this crate
//! retries; the caller decides whether to try again.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use openarcade_core::{Device, MappingEntry};
use serde_json::Value;
use thiserror::Error;

/// Error type for every configuration contract call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No byte-stream primitive is available for the requested transport.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// The device could not be opened (permission denied, busy, none selected).
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// The link broke while reading or writing.
    #[error("I/O error: {0}")]
    Io(String),

    /// The link closed while the request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// The response line could not be parsed.
    #[error("device sent an unparseable response")]
    InvalidJson,

    /// The device rejected the command with an error code.
    #[error("command failed: {code}")]
    Command { code: String },

    /// A command was issued before `connect()` or after `disconnect()`.
    #[error("not connected")]
    NotConnected,

    /// No response arrived within the request timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Too many requests are already awaiting a response.
    #[error("too many outstanding requests (limit {limit})")]
    QueueFull { limit: usize },

    /// The local store could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// The button name is not in the device's layout.
    #[error("unknown button: {0}")]
    UnknownButton(String),

    /// The UI input has no device-side equivalent.
    #[error("unknown input: {0}")]
    UnknownInput(String),
}

impl ConfigError {
    /// Builds a command error from a device-supplied code.
    pub fn command(code: impl Into<String>) -> Self {
        ConfigError::Command { code: code.into() }
    }

    /// The wire error code, for errors that came from the device.
    pub fn code(&self) -> Option<&str> {
        match self {
            ConfigError::Command { code } => Some(code),
            ConfigError::InvalidJson => Some(openarcade_core::protocol::messages::INVALID_JSON),
            _ => None,
        }
    }
}

/// The capability set shared by every backend.
#[async_trait]
pub trait ConfigClient: Send + Sync {
    /// Makes the client ready for commands.  Transport failures surface here.
    async fn connect(&self) -> Result<(), ConfigError>;

    /// Releases the link.  Safe to call when not connected.
    async fn disconnect(&self) -> Result<(), ConfigError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), ConfigError>;

    /// Every device the backend knows, keyed by device ID.
    async fn list_devices(&self) -> Result<BTreeMap<String, Device>, ConfigError>;

    /// One device, or `None` if the backend does not know it.
    async fn get_device(&self, device_id: &str) -> Result<Option<Device>, ConfigError>;

    /// Stores `entry` for `control_id` in `mode` of `device_id`.
    async fn set_mapping(
        &self,
        device_id: &str,
        mode: &str,
        control_id: &str,
        entry: MappingEntry,
    ) -> Result<(), ConfigError>;

    /// Makes `mode` the active mode of `device_id`.
    async fn set_active_mode(&self, device_id: &str, mode: &str) -> Result<(), ConfigError>;

    /// Refreshes the device's `last_seen`.
    async fn touch(&self, device_id: &str) -> Result<(), ConfigError>;

    /// Stores the device's opaque self-description.
    async fn set_descriptor(&self, device_id: &str, descriptor: Value) -> Result<(), ConfigError>;
}
