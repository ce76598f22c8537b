//! Persistence: the local device store and the tool's own settings file.
//!
//! - [`slot`] – durable single-document slots ([`FileSlot`], [`MemorySlot`]).
//! - [`store`] – [`DeviceStore`], the device table persisted through a slot.
//! - [`local_client`] – [`LocalConfigClient`], the contract over a store.
//! - [`config`] – TOML application settings.

pub mod config;
pub mod local_client;
pub mod slot;
pub mod store;

pub use local_client::LocalConfigClient;
pub use slot::{FileSlot, KeyValueSlot, MemorySlot, StorageError};
pub use store::{DeviceStore, SharedStore, StoreError};
