//! LocalConfigClient: the [`ConfigClient`] backed by a [`DeviceStore`].
//!
//! Used when no controller is attached.  Behaves like the hardware backend
//! except that:
//!
//! - Referencing an unknown device creates it with default modes and layout
//!   (`get_device` never returns `None`).
//! - Listing always includes the default device, creating it on a fresh
//!   store.
//! - Every call waits `latency` first, so UI code sees realistic timing.
//!
//! All results are owned copies of the store's state.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use openarcade_core::{Device, MappingEntry};
use serde_json::Value;
use tracing::debug;

use super::store::SharedStore;
use crate::application::config_client::{ConfigClient, ConfigError};

/// Configuration client over a local device store.
pub struct LocalConfigClient {
    store: SharedStore,
    default_device_id: String,
    latency: Duration,
}

impl LocalConfigClient {
    /// `default_device_id` names the controller an offline session stands in
    /// for, normally `OA-001`.
    pub fn new(store: SharedStore, default_device_id: impl Into<String>, latency: Duration) -> Self {
        Self {
            store,
            default_device_id: default_device_id.into(),
            latency,
        }
    }

    /// The underlying store, e.g. to serve it through the emulator as well.
    pub fn store(&self) -> SharedStore {
        SharedStore::clone(&self.store)
    }

    async fn simulate_round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ConfigClient for LocalConfigClient {
    async fn connect(&self) -> Result<(), ConfigError> {
        debug!("local backend ready");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), ConfigError> {
        self.simulate_round_trip().await;
        Ok(())
    }

    async fn list_devices(&self) -> Result<BTreeMap<String, Device>, ConfigError> {
        self.simulate_round_trip().await;
        let mut store = self.store.lock().await;
        store.ensure_device(&self.default_device_id)?;
        Ok(store.devices())
    }

    async fn get_device(&self, device_id: &str) -> Result<Option<Device>, ConfigError> {
        self.simulate_round_trip().await;
        let device = self.store.lock().await.ensure_device(device_id)?;
        Ok(Some(device))
    }

    async fn set_mapping(
        &self,
        device_id: &str,
        mode: &str,
        control_id: &str,
        entry: MappingEntry,
    ) -> Result<(), ConfigError> {
        self.simulate_round_trip().await;
        self.store
            .lock()
            .await
            .set_mapping(device_id, mode, control_id, entry)?;
        Ok(())
    }

    async fn set_active_mode(&self, device_id: &str, mode: &str) -> Result<(), ConfigError> {
        self.simulate_round_trip().await;
        self.store.lock().await.set_active_mode(device_id, mode)?;
        Ok(())
    }

    async fn touch(&self, device_id: &str) -> Result<(), ConfigError> {
        self.simulate_round_trip().await;
        self.store.lock().await.touch(device_id)?;
        Ok(())
    }

    async fn set_descriptor(&self, device_id: &str, descriptor: Value) -> Result<(), ConfigError> {
        self.simulate_round_trip().await;
        self.store
            .lock()
            .await
            .set_descriptor(device_id, descriptor)?;
        Ok(())
    }
}
