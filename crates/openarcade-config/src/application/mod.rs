//! Application layer: the configuration contract and the use cases built on
//! it.
//!
//! Nothing here touches a serial port or the file system.  Use cases depend
//! only on the [`ConfigClient`](config_client::ConfigClient) trait, so they
//! run unchanged against the hardware backend, the local backend, or a test
//! double.
//!
//! - **`config_client`** – the contract and its error taxonomy.
//! - **`map_button`** – resolves a UI button click to a device mapping.

pub mod config_client;
pub mod map_button;
