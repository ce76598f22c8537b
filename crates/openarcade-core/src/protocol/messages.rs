//! Typed messages of the configuration line protocol.
//!
//! Each request is a JSON object whose `cmd` field names the command; the
//! remaining fields are the command's arguments.  Each response is a JSON
//! object with an `ok` flag, an `error` code when `ok` is false, and any
//! command-specific result fields (`devices`, `device`, `reply`).
//!
//! ```text
//! → {"cmd":"set_mapping","device_id":"OA-001","mode":"keyboard","control_id":"1","mapping":{"keycode":"HID_KEY_A"},"id":7}
//! ← {"id":7,"ok":true}
//! ```
//!
//! The `id` field is optional in both directions.  Firmware that does not
//! echo it is answered by position instead (see the correlator in the
//! client crate).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::device::MappingEntry;

/// Error code used when an inbound line is not a JSON object.
pub const INVALID_JSON: &str = "invalid_json";

// ── Requests ──────────────────────────────────────────────────────────────────

/// A command the client can send to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Liveness probe; answered with `{"ok":true,"reply":"pong"}`.
    Ping,
    /// Returns every known device under `devices`.
    ListDevices,
    /// Returns one device under `device`.
    GetDevice { device_id: String },
    SetMapping {
        device_id: String,
        mode: String,
        control_id: String,
        mapping: MappingEntry,
    },
    SetActiveMode { device_id: String, mode: String },
    /// Refreshes the device's `last_seen` timestamp.
    SetLastSeen { device_id: String },
    /// Stores the device's self-description, which this crate treats as opaque.
    SetDescriptor { device_id: String, descriptor: Value },
}

impl Command {
    /// The wire name of the command, as sent in the `cmd` field.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::ListDevices => "list_devices",
            Command::GetDevice { .. } => "get_device",
            Command::SetMapping { .. } => "set_mapping",
            Command::SetActiveMode { .. } => "set_active_mode",
            Command::SetLastSeen { .. } => "set_last_seen",
            Command::SetDescriptor { .. } => "set_descriptor",
        }
    }

    /// Error code reported when a failure response carries no `error` field.
    pub fn failure_code(&self) -> String {
        format!("{}_failed", self.name())
    }
}

/// A command plus the optional request ID used for correlation.
///
/// The command's fields are flattened into the top-level object so the wire
/// form stays `{"cmd":...,"id":N}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(flatten)]
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self { command, id: None }
    }

    pub fn with_id(command: Command, id: u64) -> Self {
        Self {
            command,
            id: Some(id),
        }
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// A decoded response line.
///
/// `body` holds every field other than `id`, `ok` and `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Response {
    /// `{"ok":true}`
    pub fn ack() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    /// `{"ok":false,"error":code}`
    pub fn failure(code: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(code.into()),
            ..Self::default()
        }
    }

    /// The stand-in for a line that could not be parsed.
    pub fn invalid_json() -> Self {
        Self::failure(INVALID_JSON)
    }

    /// Adds a result field, e.g. `devices` or `reply`.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.body.insert(key.into(), value);
        self
    }

    pub fn with_id(mut self, id: Option<u64>) -> Self {
        self.id = id;
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Removes and deserializes a result field.
    ///
    /// A missing field and an explicit `null` both yield `Ok(None)`.
    pub fn take_field<T: DeserializeOwned>(&mut self, key: &str) -> serde_json::Result<Option<T>> {
        match self.body.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some),
        }
    }
}
