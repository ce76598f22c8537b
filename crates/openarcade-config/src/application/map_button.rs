//! MapButtonUseCase: turns a UI button click into a device mapping.
//!
//! The UI only knows button names (`"start"`) and symbolic inputs
//! (`"key_enter"`, `"xb_button_a"`).  This use case resolves both to what the
//! device stores:
//!
//! ```text
//! "start" ──layout──▶ control "14"
//! (keyboard, "key_enter") ──catalog──▶ {type: keyboard, keycode: HID_KEY_ENTER, ...}
//!                          ──▶ set_mapping(device, mode, "14", binding)
//! ```
//!
//! Layout indexes are cached per device and rebuilt only when the device
//! reports a different layout.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use openarcade_core::{build_binding, Binding, Device, InputCatalog, InputKind, Layout, LayoutIndex, MappingEntry};
use tracing::debug;

use super::config_client::{ConfigClient, ConfigError};

/// What a successful [`MapButtonUseCase::map_button`] stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedButton {
    pub control_id: String,
    pub binding: Binding,
}

/// The Map Button use case.
pub struct MapButtonUseCase {
    client: Arc<dyn ConfigClient>,
    catalog: Arc<dyn InputCatalog + Send + Sync>,
    layouts: Mutex<HashMap<String, (Layout, Arc<LayoutIndex>)>>,
}

impl MapButtonUseCase {
    pub fn new(client: Arc<dyn ConfigClient>, catalog: Arc<dyn InputCatalog + Send + Sync>) -> Self {
        Self {
            client,
            catalog,
            layouts: Mutex::new(HashMap::new()),
        }
    }

    /// Maps `button` on `device_id` to `input` in `mode`.
    ///
    /// A device the backend does not know is resolved against the default
    /// layout; whether the mapping is then accepted is up to the backend.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownButton`] if the layout has no such button.
    /// - [`ConfigError::UnknownInput`] if the input has no device equivalent.
    /// - Any error from the underlying `get_device` / `set_mapping` calls.
    pub async fn map_button(
        &self,
        device_id: &str,
        mode: &str,
        button: &str,
        kind: InputKind,
        input: &str,
    ) -> Result<MappedButton, ConfigError> {
        let index = self.layout_index(device_id).await?;
        let control_id = index
            .control_for(button)
            .ok_or_else(|| ConfigError::UnknownButton(button.to_string()))?
            .to_string();

        let binding = build_binding(self.catalog.as_ref(), kind, input)
            .ok_or_else(|| ConfigError::UnknownInput(input.to_string()))?;

        debug!(device_id, mode, button, control_id = %control_id, input, "mapping button");
        self.client
            .set_mapping(device_id, mode, &control_id, MappingEntry::Binding(binding.clone()))
            .await?;

        Ok(MappedButton {
            control_id,
            binding,
        })
    }

    /// The mappings of `mode`, keyed by UI button name instead of control ID.
    ///
    /// Controls that no button in the layout refers to are omitted.
    pub async fn button_mappings(
        &self,
        device_id: &str,
        mode: &str,
    ) -> Result<BTreeMap<String, MappingEntry>, ConfigError> {
        let Some(device) = self.client.get_device(device_id).await? else {
            return Ok(BTreeMap::new());
        };
        let index = self.cached_index(&device);

        Ok(device
            .modes
            .get(mode)
            .map(|m| {
                m.mapping
                    .iter()
                    .filter_map(|(control, entry)| {
                        index
                            .button_for(control)
                            .map(|button| (button.to_string(), entry.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn layout_index(&self, device_id: &str) -> Result<Arc<LayoutIndex>, ConfigError> {
        match self.client.get_device(device_id).await? {
            Some(device) => Ok(self.cached_index(&device)),
            None => Ok(Arc::new(LayoutIndex::new(&openarcade_core::default_layout()))),
        }
    }

    fn cached_index(&self, device: &Device) -> Arc<LayoutIndex> {
        let layout = device.effective_layout();
        let mut cache = match self.layouts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some((cached_layout, index)) = cache.get(&device.device_id) {
            if *cached_layout == layout {
                return Arc::clone(index);
            }
        }

        let index = Arc::new(LayoutIndex::new(&layout));
        cache.insert(device.device_id.clone(), (layout, Arc::clone(&index)));
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use openarcade_core::TableCatalog;
    use serde_json::Value;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingClient {
        devices: Mutex<BTreeMap<String, Device>>,
        set_mapping_calls: Mutex<Vec<(String, String, String, MappingEntry)>>,
        get_device_calls: Mutex<usize>,
        should_fail: bool,
    }

    impl RecordingClient {
        fn with_device(device: Device) -> Self {
            let client = Self::default();
            client
                .devices
                .lock()
                .unwrap()
                .insert(device.device_id.clone(), device);
            client
        }
    }

    #[async_trait]
    impl ConfigClient for RecordingClient {
        async fn connect(&self) -> Result<(), ConfigError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ConfigError> {
            Ok(())
        }

        async fn ping(&self) -> Result<(), ConfigError> {
            Ok(())
        }

        async fn list_devices(&self) -> Result<BTreeMap<String, Device>, ConfigError> {
            Ok(self.devices.lock().unwrap().clone())
        }

        async fn get_device(&self, device_id: &str) -> Result<Option<Device>, ConfigError> {
            *self.get_device_calls.lock().unwrap() += 1;
            Ok(self.devices.lock().unwrap().get(device_id).cloned())
        }

        async fn set_mapping(
            &self,
            device_id: &str,
            mode: &str,
            control_id: &str,
            entry: MappingEntry,
        ) -> Result<(), ConfigError> {
            if self.should_fail {
                return Err(ConfigError::command("set_mapping_failed"));
            }
            self.set_mapping_calls.lock().unwrap().push((
                device_id.to_string(),
                mode.to_string(),
                control_id.to_string(),
                entry.clone(),
            ));
            if let Some(device) = self.devices.lock().unwrap().get_mut(device_id) {
                device.set_mapping(mode, control_id, entry);
            }
            Ok(())
        }

        async fn set_active_mode(&self, _device_id: &str, _mode: &str) -> Result<(), ConfigError> {
            Ok(())
        }

        async fn touch(&self, _device_id: &str) -> Result<(), ConfigError> {
            Ok(())
        }

        async fn set_descriptor(&self, _device_id: &str, _descriptor: Value) -> Result<(), ConfigError> {
            Ok(())
        }
    }

    fn catalog() -> Arc<TableCatalog> {
        Arc::new(TableCatalog::new().with(InputKind::Gamepad, "xb_button_a", "A"))
    }

    fn use_case(client: Arc<RecordingClient>) -> MapButtonUseCase {
        MapButtonUseCase::new(client, catalog())
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_map_start_button_to_enter() {
        // Arrange
        let client = Arc::new(RecordingClient::with_device(Device::synthesize("OA-001", Utc::now())));
        let uc = use_case(Arc::clone(&client));

        // Act
        let mapped = uc
            .map_button("OA-001", "keyboard", "start", InputKind::Keyboard, "key_enter")
            .await
            .expect("map_button");

        // Assert
        assert_eq!(mapped.control_id, "14");
        assert_eq!(mapped.binding.keycode.as_deref(), Some("HID_KEY_ENTER"));
        let calls = client.set_mapping_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "OA-001");
        assert_eq!(calls[0].1, "keyboard");
        assert_eq!(calls[0].2, "14");
        assert_eq!(calls[0].3.keycode(), Some("HID_KEY_ENTER"));
    }

    #[tokio::test]
    async fn test_device_layout_overrides_default() {
        // Arrange – this board wires "start" to control 7
        let mut device = Device::synthesize("OA-002", Utc::now());
        device.ui.layout = [("start".to_string(), "7".to_string())].into_iter().collect();
        let client = Arc::new(RecordingClient::with_device(device));
        let uc = use_case(Arc::clone(&client));

        // Act
        let mapped = uc
            .map_button("OA-002", "gamepad", "start", InputKind::Gamepad, "xb_button_a")
            .await
            .unwrap();

        // Assert
        assert_eq!(mapped.control_id, "7");
        assert_eq!(mapped.binding.keycode, None);
        assert_eq!(mapped.binding.label.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_unknown_device_uses_default_layout() {
        let client = Arc::new(RecordingClient::default());
        let uc = use_case(Arc::clone(&client));

        let mapped = uc
            .map_button("OA-404", "keyboard", "button_3", InputKind::Keyboard, "key_c")
            .await
            .unwrap();

        assert_eq!(mapped.control_id, "3");
    }

    #[tokio::test]
    async fn test_unknown_button_is_rejected_before_any_write() {
        // Arrange
        let client = Arc::new(RecordingClient::with_device(Device::synthesize("OA-001", Utc::now())));
        let uc = use_case(Arc::clone(&client));

        // Act
        let result = uc
            .map_button("OA-001", "keyboard", "turbo", InputKind::Keyboard, "key_a")
            .await;

        // Assert
        assert_eq!(result, Err(ConfigError::UnknownButton("turbo".into())));
        assert!(client.set_mapping_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_input_is_rejected_before_any_write() {
        let client = Arc::new(RecordingClient::with_device(Device::synthesize("OA-001", Utc::now())));
        let uc = use_case(Arc::clone(&client));

        let result = uc
            .map_button("OA-001", "gamepad", "start", InputKind::Gamepad, "ps_triangle")
            .await;

        assert_eq!(result, Err(ConfigError::UnknownInput("ps_triangle".into())));
        assert!(client.set_mapping_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let client = Arc::new(RecordingClient {
            should_fail: true,
            ..RecordingClient::default()
        });
        let uc = use_case(Arc::clone(&client));

        let result = uc
            .map_button("OA-001", "keyboard", "start", InputKind::Keyboard, "key_enter")
            .await;

        assert_eq!(result.unwrap_err().code(), Some("set_mapping_failed"));
    }

    #[tokio::test]
    async fn test_button_mappings_are_keyed_by_button_name() {
        // Arrange
        let client = Arc::new(RecordingClient::with_device(Device::synthesize("OA-001", Utc::now())));
        let uc = use_case(Arc::clone(&client));
        uc.map_button("OA-001", "keyboard", "start", InputKind::Keyboard, "key_enter")
            .await
            .unwrap();
        client.devices.lock().unwrap().get_mut("OA-001").unwrap().set_mapping(
            "keyboard",
            "99",
            MappingEntry::Keycode("HID_KEY_Z".into()),
        );

        // Act
        let by_button = uc.button_mappings("OA-001", "keyboard").await.unwrap();

        // Assert – control 99 has no button in the layout
        assert_eq!(by_button.len(), 1);
        assert_eq!(by_button["start"].keycode(), Some("HID_KEY_ENTER"));
    }

    #[tokio::test]
    async fn test_layout_index_is_reused_until_layout_changes() {
        // Arrange
        let client = Arc::new(RecordingClient::with_device(Device::synthesize("OA-001", Utc::now())));
        let uc = use_case(Arc::clone(&client));
        let device = client.devices.lock().unwrap()["OA-001"].clone();

        // Act
        let first = uc.cached_index(&device);
        let second = uc.cached_index(&device);
        let mut rewired = device.clone();
        rewired.ui.layout.insert("start".into(), "20".into());
        let third = uc.cached_index(&rewired);

        // Assert
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.control_for("start"), Some("20"));
    }
}
