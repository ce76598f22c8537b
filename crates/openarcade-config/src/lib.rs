//! openarcade-config library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does openarcade-config do? (for beginners)
//!
//! An OpenArcade controller stores which key or gamepad button each of its
//! physical buttons emits.  This crate reads and changes that configuration:
//!
//! 1. Opens a link to the controller (a USB serial port).
//! 2. Sends newline-delimited JSON commands such as `set_mapping`.
//! 3. Matches each response line with the command that caused it.
//! 4. Hands typed [`Device`](openarcade_core::Device) records back to the
//!    caller.
//!
//! The same contract is also served from a local JSON file, so the
//! configurator can be used without a controller attached.

/// Application layer: the client contract and use cases.
pub mod application;

/// Infrastructure layer: transports, backends, storage, and the emulator.
pub mod infrastructure;

pub use application::config_client::{ConfigClient, ConfigError};
pub use application::map_button::{MapButtonUseCase, MappedButton};
pub use infrastructure::hardware::{ClientOptions, SerialConfigClient};
pub use infrastructure::storage::{DeviceStore, FileSlot, LocalConfigClient, MemorySlot};
pub use infrastructure::transport::{ByteTransport, DuplexTransport, SerialTransport};
