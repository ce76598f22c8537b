//! DeviceStore: the in-memory device table behind the local backend and the
//! device emulator.
//!
//! The whole table is one [`StoreSnapshot`] persisted through a
//! [`KeyValueSlot`]:
//!
//! ```json
//! {"schema_version": 1, "devices": {"OA-001": { ... }}}
//! ```
//!
//! Rules:
//!
//! - Loading never fails.  A missing or unreadable document is logged and
//!   replaced with an empty table.  A document that is not a JSON object is
//!   copied aside through [`KeyValueSlot::back_up`] before the first write
//!   replaces it; if that copy fails, nothing is written.
//! - Device records are decoded one by one.  A record that does not decode
//!   is logged, kept verbatim in every later write, and refused for
//!   mutation; the other devices load normally.
//! - Every mutation writes the full document back before returning.
//! - Writes create the device if it does not exist yet; plain reads do not.
//! - Every read hands out an owned copy, so callers cannot reach the table
//!   through a returned value.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use openarcade_core::{Device, DeviceError, MappingEntry, StoreSnapshot};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::slot::{KeyValueSlot, StorageError};
use crate::application::config_client::ConfigError;

/// A store shared between async tasks.
pub type SharedStore = Arc<tokio::sync::Mutex<DeviceStore>>;

/// Error type for store mutations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The change violates a device rule; nothing was changed.
    #[error(transparent)]
    Rule(#[from] DeviceError),

    /// The change could not be persisted, or would overwrite a record
    /// that failed to decode.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<StoreError> for ConfigError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rule(rule) => ConfigError::command(rule.code()),
            StoreError::Storage(storage) => ConfigError::Storage(storage.to_string()),
        }
    }
}

/// Device table persisted through a [`KeyValueSlot`].
pub struct DeviceStore {
    slot: Box<dyn KeyValueSlot>,
    data: StoreSnapshot,
    /// Raw records that did not decode as a [`Device`].
    undecoded: BTreeMap<String, Value>,
    /// Unusable document still to be copied aside before the next write.
    pending_backup: Option<String>,
    clock: fn() -> DateTime<Utc>,
}

impl DeviceStore {
    /// Opens the store, loading whatever the slot holds.
    pub fn open(slot: Box<dyn KeyValueSlot>) -> Self {
        let loaded = load_snapshot(slot.as_ref());
        Self {
            slot,
            data: loaded.data,
            undecoded: loaded.undecoded,
            pending_backup: loaded.unusable,
            clock: Utc::now,
        }
    }

    /// Replaces the time source used for `last_seen`.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Wraps the store for sharing between tasks.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Re-reads the slot, picking up changes made by other processes.
    pub fn reload(&mut self) {
        let loaded = load_snapshot(self.slot.as_ref());
        self.data = loaded.data;
        self.undecoded = loaded.undecoded;
        self.pending_backup = loaded.unusable;
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Copy of every device.
    pub fn devices(&self) -> BTreeMap<String, Device> {
        self.data.devices.clone()
    }

    /// Copy of one device, if present.
    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.data.devices.get(device_id).cloned()
    }

    /// Copy of every decoded device, in persisted form.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.data.clone()
    }

    /// IDs of stored records that could not be decoded.
    pub fn undecoded_ids(&self) -> Vec<String> {
        self.undecoded.keys().cloned().collect()
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Returns the device, synthesizing and persisting a default one first if
    /// it does not exist.
    pub fn ensure_device(&mut self, device_id: &str) -> Result<Device, StoreError> {
        if let Some(device) = self.data.devices.get(device_id) {
            return Ok(device.clone());
        }
        self.refuse_undecoded(device_id)?;
        let device = Device::synthesize(device_id, (self.clock)());
        info!("created device record {device_id}");
        self.data
            .devices
            .insert(device_id.to_string(), device.clone());
        self.flush()?;
        Ok(device)
    }

    pub fn set_mapping(
        &mut self,
        device_id: &str,
        mode: &str,
        control_id: &str,
        entry: MappingEntry,
    ) -> Result<(), StoreError> {
        self.mutate(device_id, |device| {
            device.set_mapping(mode, control_id, entry);
            Ok(())
        })
    }

    /// Switches the active mode.  Unknown modes are rejected.
    pub fn set_active_mode(&mut self, device_id: &str, mode: &str) -> Result<(), StoreError> {
        self.mutate(device_id, |device| device.set_active_mode(mode))
    }

    /// Refreshes `last_seen` only.
    pub fn touch(&mut self, device_id: &str) -> Result<(), StoreError> {
        self.mutate(device_id, |_| Ok(()))
    }

    pub fn set_descriptor(&mut self, device_id: &str, descriptor: Value) -> Result<(), StoreError> {
        self.mutate(device_id, |device| {
            device.descriptor = Some(descriptor);
            Ok(())
        })
    }

    /// Applies `change` to the device (creating it if needed), stamps
    /// `last_seen`, and persists.  A rejected change leaves everything as it
    /// was.
    fn mutate<F>(&mut self, device_id: &str, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Device) -> Result<(), DeviceError>,
    {
        self.refuse_undecoded(device_id)?;
        let now = (self.clock)();
        let mut device = match self.data.devices.get(device_id) {
            Some(existing) => existing.clone(),
            None => {
                info!("created device record {device_id}");
                Device::synthesize(device_id, now)
            }
        };

        change(&mut device)?;
        device.touch(now);
        self.data.devices.insert(device_id.to_string(), device);
        self.flush()
    }

    fn refuse_undecoded(&self, device_id: &str) -> Result<(), StorageError> {
        if self.undecoded.contains_key(device_id) {
            warn!("refusing to overwrite undecodable record {device_id}");
            return Err(StorageError::UndecodableRecord(device_id.to_string()));
        }
        Ok(())
    }

    /// Writes the whole table to the slot, undecoded records included.
    fn flush(&mut self) -> Result<(), StoreError> {
        if let Some(original) = &self.pending_backup {
            self.slot.back_up(original)?;
            info!("copied unusable device store aside before replacing it");
            self.pending_backup = None;
        }

        let mut document = serde_json::to_value(&self.data).map_err(StorageError::from)?;
        if let Some(devices) = document.get_mut("devices").and_then(Value::as_object_mut) {
            for (device_id, record) in &self.undecoded {
                devices.insert(device_id.clone(), record.clone());
            }
        }
        let mut json = serde_json::to_string_pretty(&document).map_err(StorageError::from)?;
        json.push('\n');
        self.slot.write(&json)?;
        debug!("persisted {} device(s)", self.data.devices.len() + self.undecoded.len());
        Ok(())
    }
}

/// What [`load_snapshot`] made of the slot.
#[derive(Default)]
struct Loaded {
    data: StoreSnapshot,
    undecoded: BTreeMap<String, Value>,
    /// The raw document, when none of it could be used.
    unusable: Option<String>,
}

fn load_snapshot(slot: &dyn KeyValueSlot) -> Loaded {
    let contents = match slot.read() {
        Ok(Some(contents)) => contents,
        Ok(None) => return Loaded::default(),
        Err(e) => {
            warn!("could not read device store, starting empty: {e}");
            return Loaded::default();
        }
    };

    let document = match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(document)) => document,
        Ok(_) => {
            warn!("device store is not a JSON object, starting empty");
            return unusable(contents);
        }
        Err(e) => {
            warn!("device store is malformed, starting empty: {e}");
            return unusable(contents);
        }
    };

    let mut loaded = Loaded::default();
    if let Some(version) = document
        .get("schema_version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
    {
        loaded.data.schema_version = version;
    }
    let records = match document.get("devices") {
        None | Some(Value::Null) => return loaded,
        Some(Value::Object(records)) => records,
        Some(_) => {
            warn!("device store has no usable `devices` table, starting empty");
            return unusable(contents);
        }
    };

    for (device_id, record) in records {
        match serde_json::from_value::<Device>(record.clone()) {
            Ok(device) => {
                loaded.data.devices.insert(device_id.clone(), device);
            }
            Err(e) => {
                warn!("could not decode stored device {device_id}, keeping it as is: {e}");
                loaded.undecoded.insert(device_id.clone(), record.clone());
            }
        }
    }
    debug!(
        "loaded {} device(s), {} undecodable",
        loaded.data.devices.len(),
        loaded.undecoded.len()
    );
    loaded
}

fn unusable(contents: String) -> Loaded {
    Loaded {
        unusable: Some(contents),
        ..Loaded::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::slot::{MemorySlot, MockKeyValueSlot};
    use chrono::TimeZone;
    use openarcade_core::Binding;

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn memory_store() -> (DeviceStore, MemorySlot) {
        let slot = MemorySlot::new();
        let store = DeviceStore::open(Box::new(slot.clone())).with_clock(fixed_clock);
        (store, slot)
    }

    #[test]
    fn test_empty_slot_opens_empty_store() {
        let (store, slot) = memory_store();

        assert!(store.devices().is_empty());
        assert_eq!(store.snapshot().schema_version, 1);
        assert!(slot.contents().is_none(), "opening must not write");
    }

    #[test]
    fn test_malformed_document_opens_empty_store() {
        let store = DeviceStore::open(Box::new(MemorySlot::with_contents("{not json")));
        assert!(store.devices().is_empty());
    }

    #[test]
    fn test_malformed_document_is_backed_up_before_first_write() {
        // Arrange
        let slot = MemorySlot::with_contents("{not json");
        let mut store = DeviceStore::open(Box::new(slot.clone())).with_clock(fixed_clock);
        assert!(slot.backup().is_none(), "opening must not write");

        // Act
        store.touch("OA-001").unwrap();

        // Assert
        assert_eq!(slot.backup().as_deref(), Some("{not json"));
        assert!(slot.contents().unwrap().contains("\"OA-001\""));
    }

    #[test]
    fn test_failed_backup_blocks_the_write() {
        // Arrange
        let mut slot = MockKeyValueSlot::new();
        slot.expect_read().returning(|| Ok(Some("[1, 2, 3]".into())));
        slot.expect_back_up()
            .times(1)
            .returning(|_| Err(StorageError::Unavailable("read-only".into())));
        slot.expect_write().never();
        let mut store = DeviceStore::open(Box::new(slot));

        // Act
        let result = store.touch("OA-001");

        // Assert
        assert!(matches!(result, Err(StoreError::Storage(StorageError::Unavailable(_)))));
    }

    #[test]
    fn test_one_undecodable_record_does_not_cost_the_others() {
        // Arrange – OA-002's active mode is not a string
        let slot = MemorySlot::with_contents(
            serde_json::json!({
                "schema_version": 1,
                "devices": {
                    "OA-001": {"device_id": "OA-001", "active_mode": "gamepad"},
                    "OA-002": {"device_id": "OA-002", "active_mode": 7}
                }
            })
            .to_string(),
        );
        let mut store = DeviceStore::open(Box::new(slot.clone())).with_clock(fixed_clock);

        // Act
        store.touch("OA-003").unwrap();
        let refused = store.set_active_mode("OA-002", "keyboard");

        // Assert
        assert_eq!(store.undecoded_ids(), ["OA-002"]);
        assert!(matches!(
            refused,
            Err(StoreError::Storage(StorageError::UndecodableRecord(id))) if id == "OA-002"
        ));
        let written: Value = serde_json::from_str(&slot.contents().unwrap()).unwrap();
        assert_eq!(written["devices"]["OA-001"]["active_mode"], "gamepad");
        assert_eq!(written["devices"]["OA-002"]["active_mode"], 7);
        assert!(written["devices"]["OA-003"].is_object());
        assert!(slot.backup().is_none());
    }

    #[test]
    fn test_numeric_keycode_record_loads() {
        // Arrange
        let slot = MemorySlot::with_contents(
            r#"{"devices": {"OA-002": {"device_id": "OA-002", "modes": {"keyboard": {"mapping": {"1": {"keycode": 4}}}}}}}"#,
        );

        // Act
        let store = DeviceStore::open(Box::new(slot));

        // Assert
        let device = store.device("OA-002").expect("decoded");
        assert_eq!(device.active_keycodes().get("1"), Some(&0x04));
        assert!(store.undecoded_ids().is_empty());
    }

    #[test]
    fn test_unreadable_slot_opens_empty_store() {
        // Arrange
        let mut slot = MockKeyValueSlot::new();
        slot.expect_read()
            .times(1)
            .returning(|| Err(StorageError::Unavailable("offline".into())));

        // Act
        let store = DeviceStore::open(Box::new(slot));

        // Assert
        assert!(store.devices().is_empty());
    }

    #[test]
    fn test_ensure_device_synthesizes_and_persists_once() {
        // Arrange
        let mut slot = MockKeyValueSlot::new();
        slot.expect_read().returning(|| Ok(None));
        slot.expect_write()
            .withf(|doc: &str| doc.contains("\"OA-999\"") && doc.ends_with('\n'))
            .times(1)
            .returning(|_| Ok(()));
        let mut store = DeviceStore::open(Box::new(slot));

        // Act
        let first = store.ensure_device("OA-999").unwrap();
        let second = store.ensure_device("OA-999").unwrap();

        // Assert
        assert_eq!(first.active_mode, "keyboard");
        assert!(first.modes.values().all(|m| m.mapping.is_empty()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_device_does_not_create_on_read() {
        let (store, _slot) = memory_store();
        assert!(store.device("OA-404").is_none());
    }

    #[test]
    fn test_set_mapping_persists_document() {
        // Arrange
        let (mut store, slot) = memory_store();

        // Act
        store
            .set_mapping("OA-001", "keyboard", "1", Binding::keycode("HID_KEY_A").into())
            .unwrap();

        // Assert – a fresh store over the same slot sees the mapping
        let reopened = DeviceStore::open(Box::new(slot));
        let device = reopened.device("OA-001").expect("persisted");
        assert_eq!(device.modes["keyboard"].mapping["1"].keycode(), Some("HID_KEY_A"));
        assert_eq!(device.last_seen, Some(fixed_clock()));
    }

    #[test]
    fn test_rejected_mode_switch_changes_nothing() {
        // Arrange
        let (mut store, slot) = memory_store();
        store.ensure_device("OA-001").unwrap();
        let before = slot.contents();

        // Act
        let result = store.set_active_mode("OA-001", "turbo");

        // Assert
        assert!(matches!(result, Err(StoreError::Rule(DeviceError::UnknownMode(_)))));
        assert_eq!(slot.contents(), before);
        assert_eq!(store.device("OA-001").unwrap().active_mode, "keyboard");
    }

    #[test]
    fn test_write_failure_surfaces_as_storage_error() {
        // Arrange
        let mut slot = MockKeyValueSlot::new();
        slot.expect_read().returning(|| Ok(None));
        slot.expect_write()
            .returning(|_| Err(StorageError::Unavailable("disk full".into())));
        let mut store = DeviceStore::open(Box::new(slot));

        // Act
        let err = store.touch("OA-001").unwrap_err();

        // Assert
        let contract: ConfigError = err.into();
        assert_eq!(contract, ConfigError::Storage("storage unavailable: disk full".into()));
    }

    #[test]
    fn test_returned_devices_are_copies() {
        // Arrange
        let (mut store, _slot) = memory_store();
        store.ensure_device("OA-001").unwrap();

        // Act
        let mut copy = store.devices();
        copy.get_mut("OA-001").unwrap().active_mode = "gamepad".into();
        copy.get_mut("OA-001").unwrap().modes.clear();

        // Assert
        let fresh = store.device("OA-001").unwrap();
        assert_eq!(fresh.active_mode, "keyboard");
        assert_eq!(fresh.modes.len(), 2);
    }

    #[test]
    fn test_reload_picks_up_external_changes() {
        // Arrange
        let (mut store, slot) = memory_store();
        let mut other = DeviceStore::open(Box::new(slot.clone()));
        other.set_descriptor("OA-002", serde_json::json!({"buttons": 15})).unwrap();

        // Act
        store.reload();

        // Assert
        assert!(store.device("OA-002").is_some());
    }

    #[test]
    fn test_rule_error_maps_to_command_code() {
        let err: ConfigError = StoreError::Rule(DeviceError::UnknownMode("x".into())).into();
        assert_eq!(err.code(), Some("unknown_mode"));
    }
}
