//! # openarcade-core
//!
//! Shared library for the OpenArcade configuration tools: the device data
//! model, the newline-delimited JSON line protocol, and the key translation
//! tables that bridge UI-facing input names and device-facing HID keycodes.
//!
//! This crate performs no I/O.  It has no dependency on serial ports, async
//! runtimes, or the file system, so everything here can be unit-tested on
//! any machine.
//!
//! # Architecture overview
//!
//! An OpenArcade controller exposes a small command/response protocol over a
//! serial link: one JSON object per line in each direction.  A configuration
//! client sends commands such as `set_mapping` and waits for `{"ok":true}`.
//!
//! - **`domain`** – The entities the protocol talks about: a [`Device`] with
//!   named [`Mode`]s, each mapping control IDs to a [`MappingEntry`], plus the
//!   per-device button layout.
//!
//! - **`keymap`** – USB HID keyboard usages ([`HidKeyCode`]) with their wire
//!   names (`HID_KEY_A`) and UI input names (`key_a`).
//!
//! - **`protocol`** – How lines travel: the [`LineFramer`] that cuts a byte
//!   stream into lines, and the codec that turns typed commands into JSON
//!   lines and response lines back into typed results.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::device::{
    default_layout, AnalogConfig, AnalogDirection, Axis, Binding, Device, DeviceError, DeviceUi,
    InputKind, Layout, MappingEntry, Mode, StoreSnapshot, DEFAULT_ACTIVE_MODE, GAMEPAD_MODE,
    SCHEMA_VERSION,
};
pub use domain::layout::LayoutIndex;
pub use keymap::{build_binding, resolve_keycode, HidKeyCode, InputCatalog, TableCatalog};
pub use protocol::codec::{decode_response, encode_request, encode_response, CodecError};
pub use protocol::framer::LineFramer;
pub use protocol::messages::{Command, Request, Response};
pub use protocol::{RequestIdCounter, DEFAULT_BAUD_RATE};
