//! End-to-end tests for `SerialConfigClient` over an in-memory link.
//!
//! Most tests put the device emulator on the far end of a
//! `tokio::io::duplex` pipe.  The rest use a scripted device that answers
//! without request IDs, the way older firmware does, to exercise the
//! oldest-first fallback.

use std::sync::Arc;
use std::time::Duration;

use openarcade_config::infrastructure::emulator::serve_stream;
use openarcade_config::infrastructure::storage::store::SharedStore;
use openarcade_config::{
    ClientOptions, ConfigClient, ConfigError, DeviceStore, DuplexTransport, FileSlot,
    MapButtonUseCase, MemorySlot, SerialConfigClient,
};
use openarcade_core::{InputKind, MappingEntry, TableCatalog};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// A connected client talking to the emulator over `store`.
async fn emulated_client(store: SharedStore) -> SerialConfigClient {
    let (transport, device) = DuplexTransport::pair(4096);
    tokio::spawn(serve_stream(device, store));
    let client = SerialConfigClient::new(Arc::new(transport), ClientOptions::default());
    client.connect().await.expect("connect");
    client
}

fn memory_store() -> SharedStore {
    DeviceStore::open(Box::new(MemorySlot::new())).into_shared()
}

/// A device that answers each request line with `reply(request)`, written
/// one byte at a time and never echoing the request ID.
fn spawn_scripted_device(device: DuplexStream, reply: fn(&Value) -> String) {
    tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(device);
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).expect("request is JSON");
            for byte in reply(&request).bytes() {
                if write.write_all(&[byte]).await.is_err() {
                    return;
                }
                let _ = write.flush().await;
            }
        }
    });
}

async fn scripted_client(reply: fn(&Value) -> String) -> SerialConfigClient {
    let (transport, device) = DuplexTransport::pair(4096);
    spawn_scripted_device(device, reply);
    let client = SerialConfigClient::new(Arc::new(transport), ClientOptions::default());
    client.connect().await.expect("connect");
    client
}

// ── Emulator round trips ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_mapping_then_mode_switch_is_visible_in_get_device() {
    // Arrange
    let client = emulated_client(memory_store()).await;

    // Act
    client
        .set_mapping(
            "OA-001",
            "keyboard",
            "14",
            MappingEntry::Keycode("HID_KEY_ENTER".into()),
        )
        .await
        .expect("set_mapping");
    client
        .set_active_mode("OA-001", "gamepad")
        .await
        .expect("set_active_mode");
    let device = client
        .get_device("OA-001")
        .await
        .expect("get_device")
        .expect("device exists after a write");

    // Assert
    assert_eq!(device.active_mode, "gamepad");
    assert_eq!(
        device.modes["keyboard"].mapping["14"],
        MappingEntry::Keycode("HID_KEY_ENTER".into())
    );
    assert!(device.modes["gamepad"].mapping.is_empty());
}

#[tokio::test]
async fn test_ping_and_empty_listing() {
    let client = emulated_client(memory_store()).await;

    assert_eq!(client.ping().await, Ok(()));
    assert!(client.list_devices().await.expect("list").is_empty());
}

#[tokio::test]
async fn test_unknown_device_is_none_over_the_wire() {
    let client = emulated_client(memory_store()).await;

    let device = client.get_device("OA-404").await.expect("get_device");

    assert_eq!(device, None);
}

#[tokio::test]
async fn test_unknown_mode_is_rejected_and_nothing_changes() {
    // Arrange
    let store = memory_store();
    let client = emulated_client(SharedStore::clone(&store)).await;
    client.touch("OA-001").await.expect("touch");

    // Act
    let result = client.set_active_mode("OA-001", "turbo").await;

    // Assert
    assert_eq!(result, Err(ConfigError::command("unknown_mode")));
    let device = store.lock().await.device("OA-001").expect("device");
    assert_eq!(device.active_mode, "keyboard");
}

#[tokio::test]
async fn test_descriptor_round_trips_verbatim() {
    let client = emulated_client(memory_store()).await;
    let descriptor = json!({"buttons": 15, "firmware": "1.2.0"});

    client
        .set_descriptor("OA-002", descriptor.clone())
        .await
        .expect("set_descriptor");
    let device = client.get_device("OA-002").await.unwrap().unwrap();

    assert_eq!(device.descriptor, Some(descriptor));
}

#[tokio::test]
async fn test_map_button_resolves_layout_and_stores_binding() {
    // Arrange
    let client: Arc<dyn ConfigClient> = Arc::new(emulated_client(memory_store()).await);
    client.touch("OA-001").await.expect("touch");
    let catalog = TableCatalog::new().with(InputKind::Gamepad, "xb_button_a", "A Button");
    let use_case = MapButtonUseCase::new(Arc::clone(&client), Arc::new(catalog));

    // Act
    let start = use_case
        .map_button("OA-001", "keyboard", "start", InputKind::Keyboard, "key_enter")
        .await
        .expect("map start");
    let select = use_case
        .map_button("OA-001", "gamepad", "select", InputKind::Gamepad, "xb_button_a")
        .await
        .expect("map select");
    let device = client.get_device("OA-001").await.unwrap().unwrap();

    // Assert
    assert_eq!(start.control_id, "14");
    assert_eq!(select.control_id, "13");
    assert_eq!(device.modes["keyboard"].mapping["14"].keycode(), Some("HID_KEY_ENTER"));
    assert_eq!(device.active_keycodes().get("14"), Some(&0x28));
    assert_eq!(
        device.modes["gamepad"].mapping["13"].as_binding().and_then(|b| b.label.as_deref()),
        Some("A Button")
    );
}

#[tokio::test]
async fn test_emulator_writes_are_persisted_to_file() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("devices.json");
    let store = DeviceStore::open(Box::new(FileSlot::new(&path))).into_shared();
    let client = emulated_client(store).await;

    // Act
    client
        .set_mapping("OA-003", "keyboard", "1", MappingEntry::Keycode("HID_KEY_A".into()))
        .await
        .expect("set_mapping");
    client.disconnect().await.expect("disconnect");
    let reopened = DeviceStore::open(Box::new(FileSlot::new(&path)));

    // Assert
    let device = reopened.device("OA-003").expect("persisted device");
    assert_eq!(device.modes["keyboard"].mapping["1"].keycode(), Some("HID_KEY_A"));
    let text = std::fs::read_to_string(&path).expect("read store");
    assert!(text.ends_with('\n'));
}

// ── Responses without IDs ─────────────────────────────────────────────────────

fn reject_set_mapping(request: &Value) -> String {
    match request["cmd"].as_str() {
        Some("set_mapping") => "{\"ok\":false,\"error\":\"set_mapping_failed\"}\n".to_string(),
        Some("list_devices") => "{\"ok\":true,\"devices\":{}}\n".to_string(),
        _ => "{\"ok\":true}\n".to_string(),
    }
}

#[tokio::test]
async fn test_concurrent_requests_resolve_oldest_first_across_split_reads() {
    // Arrange
    let client = scripted_client(reject_set_mapping).await;

    // Act
    let (ping, mapping, devices) = tokio::join!(
        client.ping(),
        client.set_mapping("OA-001", "keyboard", "1", MappingEntry::Keycode("HID_KEY_A".into())),
        client.list_devices(),
    );

    // Assert – only the rejected call fails and the queue keeps draining
    assert_eq!(ping, Ok(()));
    assert_eq!(mapping, Err(ConfigError::command("set_mapping_failed")));
    assert!(devices.expect("list_devices").is_empty());
    assert_eq!(client.ping().await, Ok(()));
}

fn one_odd_device(request: &Value) -> String {
    match request["cmd"].as_str() {
        Some("list_devices") => concat!(
            "{\"ok\":true,\"devices\":{",
            "\"OA-001\":{\"device_id\":\"OA-001\",\"active_mode\":\"gamepad\"},",
            "\"OA-002\":{\"device_id\":\"OA-002\",\"modes\":\"lost\"}}}\n"
        )
        .to_string(),
        _ => "{\"ok\":true}\n".to_string(),
    }
}

#[tokio::test]
async fn test_listing_skips_a_record_that_does_not_decode() {
    let client = scripted_client(one_odd_device).await;

    let devices = client.list_devices().await.expect("list_devices");

    assert_eq!(devices.keys().collect::<Vec<_>>(), ["OA-001"]);
    assert_eq!(devices["OA-001"].active_mode, "gamepad");
}

fn garbage_for_ping(request: &Value) -> String {
    match request["cmd"].as_str() {
        Some("ping") => "definitely not json\n".to_string(),
        _ => "{\"ok\":true}\n".to_string(),
    }
}

#[tokio::test]
async fn test_unparseable_line_fails_only_the_oldest_request() {
    // Arrange
    let client = scripted_client(garbage_for_ping).await;

    // Act
    let (ping, touch) = tokio::join!(client.ping(), client.touch("OA-001"));

    // Assert
    assert_eq!(ping, Err(ConfigError::InvalidJson));
    assert_eq!(touch, Ok(()));
}

fn ack_without_fields(_request: &Value) -> String {
    "{\"ok\":false}\n".to_string()
}

#[tokio::test]
async fn test_failure_without_code_names_the_command() {
    let client = scripted_client(ack_without_fields).await;

    let result = client.set_active_mode("OA-001", "gamepad").await;

    assert_eq!(result, Err(ConfigError::command("set_active_mode_failed")));
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_after_timeout_does_not_answer_the_next_request() {
    // Arrange – the first reply takes longer than the client waits
    let (transport, device) = DuplexTransport::pair(4096);
    tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(device);
        let mut lines = BufReader::new(read).lines();
        let mut first = true;
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).expect("request is JSON");
            if std::mem::take(&mut first) {
                tokio::time::sleep(Duration::from_millis(800)).await;
            }
            if write.write_all(reject_set_mapping(&request).as_bytes()).await.is_err() {
                return;
            }
        }
    });
    let options = ClientOptions {
        request_timeout: Duration::from_millis(500),
        ..ClientOptions::default()
    };
    let client = SerialConfigClient::new(Arc::new(transport), options);
    client.connect().await.expect("connect");

    // Act
    let ping = client.ping().await;
    let mapping = client
        .set_mapping("OA-001", "keyboard", "1", MappingEntry::Keycode("HID_KEY_A".into()))
        .await;
    let follow_up = client.ping().await;

    // Assert
    assert_eq!(ping, Err(ConfigError::Timeout(Duration::from_millis(500))));
    assert_eq!(mapping, Err(ConfigError::command("set_mapping_failed")));
    assert_eq!(follow_up, Ok(()));
}
