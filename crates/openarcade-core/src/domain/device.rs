//! Device, mode and mapping entities.
//!
//! # Shape of a device record
//!
//! ```text
//! Device "OA-001"
//!  ├─ active_mode: "keyboard"
//!  ├─ modes
//!  │   ├─ "keyboard"  output: hid_keyboard   mapping: { "14": {keycode: HID_KEY_ENTER} }
//!  │   └─ "gamepad"   output: hid_gamepad    mapping: {}
//!  └─ ui.layout: { "start": "14", "button_1": "1", ... }
//! ```
//!
//! A *control ID* names a physical input on the controller board.  A mode's
//! `mapping` says what each control emits while that mode is active.  The
//! layout names the controls the way the UI draws them.
//!
//! The same structs are used on the wire, in the persisted store, and in
//! memory, so every field tolerates being absent when deserializing: older
//! firmware and older store files omit fields this crate has since grown.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::layout::LayoutIndex;
use crate::keymap;

/// Version written into the persisted store.
pub const SCHEMA_VERSION: u32 = 1;

/// Mode a freshly synthesized device starts in.
pub const DEFAULT_ACTIVE_MODE: &str = "keyboard";

/// Second mode every synthesized device carries.
pub const GAMEPAD_MODE: &str = "gamepad";

/// UI button name → control ID.
pub type Layout = BTreeMap<String, String>;

/// Controller buttons in firmware bit order, with the control ID each one
/// reports as.
const DEFAULT_LAYOUT: [(&str, &str); 15] = [
    ("button_1", "1"),
    ("button_2", "2"),
    ("button_3", "3"),
    ("button_4", "4"),
    ("button_5", "5"),
    ("button_6", "6"),
    ("button_7", "7"),
    ("button_8", "8"),
    ("joystick_left", "9"),
    ("joystick_right", "10"),
    ("joystick_up", "11"),
    ("joystick_down", "12"),
    ("select", "13"),
    ("start", "14"),
    ("pair", "15"),
];

/// The layout used when a device does not supply one.
pub fn default_layout() -> Layout {
    DEFAULT_LAYOUT
        .iter()
        .map(|(button, control)| (button.to_string(), control.to_string()))
        .collect()
}

fn default_active_mode() -> String {
    DEFAULT_ACTIVE_MODE.to_string()
}

/// Rule violations when mutating a [`Device`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The requested mode is not among the device's modes.
    #[error("unknown mode: {0}")]
    UnknownMode(String),
}

impl DeviceError {
    /// Wire error code for this violation.
    pub fn code(&self) -> &'static str {
        match self {
            DeviceError::UnknownMode(_) => "unknown_mode",
        }
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

/// One physical or emulated controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default = "default_active_mode")]
    pub active_mode: String,
    #[serde(default)]
    pub modes: BTreeMap<String, Mode>,
    #[serde(default)]
    pub ui: DeviceUi,
    /// The device's self-description.  Stored and returned verbatim.
    #[serde(default)]
    pub descriptor: Option<Value>,
}

impl Device {
    /// Builds the default record for a device seen for the first time.
    ///
    /// The result has a `keyboard` and a `gamepad` mode with empty mappings,
    /// `keyboard` active, and a copy of the default layout.  Apart from
    /// `last_seen = now`, it depends only on `device_id`.
    pub fn synthesize(device_id: &str, now: DateTime<Utc>) -> Self {
        let mut modes = BTreeMap::new();
        modes.insert(DEFAULT_ACTIVE_MODE.to_string(), Mode::new("hid_keyboard"));
        modes.insert(GAMEPAD_MODE.to_string(), Mode::new("hid_gamepad"));

        Self {
            device_id: device_id.to_string(),
            name: format!("OpenArcade {device_id}"),
            connected: true,
            last_seen: Some(now),
            active_mode: default_active_mode(),
            modes,
            ui: DeviceUi {
                layout: default_layout(),
            },
            descriptor: None,
        }
    }

    /// The mode named by `active_mode`, if it exists.
    pub fn active(&self) -> Option<&Mode> {
        self.modes.get(&self.active_mode)
    }

    /// The device's layout, or the default layout when it supplied none.
    pub fn effective_layout(&self) -> Layout {
        if self.ui.layout.is_empty() {
            default_layout()
        } else {
            self.ui.layout.clone()
        }
    }

    /// Builds the two-way button ↔ control index for this device.
    pub fn layout_index(&self) -> LayoutIndex {
        LayoutIndex::new(&self.effective_layout())
    }

    /// Stores `entry` for `control_id` in `mode`, creating the mode (with no
    /// output) if the device does not have it yet.  Replaces any previous
    /// entry for that control.
    pub fn set_mapping(&mut self, mode: &str, control_id: &str, entry: MappingEntry) {
        self.modes
            .entry(mode.to_string())
            .or_default()
            .mapping
            .insert(control_id.to_string(), entry);
    }

    /// Makes `mode` the active mode.
    ///
    /// # Errors
    ///
    /// [`DeviceError::UnknownMode`] if the device has no such mode; the
    /// active mode is left unchanged.
    pub fn set_active_mode(&mut self, mode: &str) -> Result<(), DeviceError> {
        if !self.modes.contains_key(mode) {
            return Err(DeviceError::UnknownMode(mode.to_string()));
        }
        self.active_mode = mode.to_string();
        Ok(())
    }

    /// Records activity at `now`.  `last_seen` never moves backwards, even if
    /// the wall clock does.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = Some(match self.last_seen {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }

    /// Resolves every mapping of the active mode to a numeric HID usage.
    ///
    /// Controls whose entry names no resolvable keycode (gamepad and analog
    /// bindings, unknown names) are omitted.
    pub fn active_keycodes(&self) -> BTreeMap<String, u16> {
        self.active()
            .map(|mode| {
                mode.mapping
                    .iter()
                    .filter_map(|(control, entry)| {
                        keymap::resolve_keycode(entry).map(|code| (control.clone(), code))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// UI-side metadata carried on a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUi {
    #[serde(default)]
    pub layout: Layout,
}

// ── Modes and mappings ────────────────────────────────────────────────────────

/// One output profile of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    /// What the device emulates in this mode, e.g. `"hid_keyboard"`.
    #[serde(default)]
    pub output: Option<String>,
    /// Control ID → what that control emits.
    #[serde(default)]
    pub mapping: BTreeMap<String, MappingEntry>,
}

impl Mode {
    pub fn new(output: &str) -> Self {
        Self {
            output: Some(output.to_string()),
            mapping: BTreeMap::new(),
        }
    }
}

/// What a single control emits.
///
/// Older records store a bare keycode (`"HID_KEY_A"`) or a raw usage number;
/// the configurator writes a structured [`Binding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingEntry {
    Keycode(String),
    Usage(u16),
    Binding(Binding),
}

impl MappingEntry {
    /// The symbolic keycode this entry carries, if any.
    pub fn keycode(&self) -> Option<&str> {
        match self {
            MappingEntry::Keycode(code) => Some(code),
            MappingEntry::Usage(_) => None,
            MappingEntry::Binding(binding) => binding.keycode.as_deref(),
        }
    }

    pub fn as_binding(&self) -> Option<&Binding> {
        match self {
            MappingEntry::Binding(binding) => Some(binding),
            _ => None,
        }
    }
}

impl From<Binding> for MappingEntry {
    fn from(binding: Binding) -> Self {
        MappingEntry::Binding(binding)
    }
}

/// Kind of output a structured binding drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Gamepad,
    Keyboard,
    Analog,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Gamepad => "gamepad",
            InputKind::Keyboard => "keyboard",
            InputKind::Analog => "analog",
        }
    }
}

impl std::str::FromStr for InputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gamepad" => Ok(InputKind::Gamepad),
            "keyboard" => Ok(InputKind::Keyboard),
            "analog" => Ok(InputKind::Analog),
            other => Err(format!("unknown input kind: {other}")),
        }
    }
}

/// Structured mapping entry written by the configurator.
///
/// Every field is optional on the wire.  Fields this crate does not know are
/// kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Device-facing keycode, e.g. `"HID_KEY_A"`.  A bare number on the wire
    /// is read as its decimal text.
    #[serde(
        default,
        deserialize_with = "keycode_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub keycode: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<InputKind>,
    /// UI-facing symbolic input, e.g. `"key_a"` or `"xb_button_a"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(
        rename = "analogConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub analog_config: Option<AnalogConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Binding {
    /// The minimal structured form, `{"keycode": code}`.
    pub fn keycode(code: impl Into<String>) -> Self {
        Self {
            keycode: Some(code.into()),
            ..Self::default()
        }
    }
}

fn keycode_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Keycode {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Keycode>::deserialize(deserializer)?.map(|code| match code {
        Keycode::Text(text) => text,
        Keycode::Number(n) => n.to_string(),
    }))
}

/// Tuning for bindings that drive an analog axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogConfig {
    /// Dead zone as a fraction of full travel.
    pub threshold: f32,
    pub sensitivity: f32,
    pub axis: Axis,
    pub direction: AnalogDirection,
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            sensitivity: 1.0,
            axis: Axis::X,
            direction: AnalogDirection::Bidirectional,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    X,
    Y,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalogDirection {
    #[default]
    Bidirectional,
    Unidirectional,
}

// ── Persisted store ───────────────────────────────────────────────────────────

/// Everything the local store persists, as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub devices: BTreeMap<String, Device>,
}

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            devices: BTreeMap::new(),
        }
    }
}
