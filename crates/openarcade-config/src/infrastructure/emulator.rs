//! Device emulator: serves the configuration protocol from a [`DeviceStore`].
//!
//! This is the device side of the link, answering exactly the way the
//! controller's config daemon does:
//!
//! - One response line per non-empty request line, in order.
//! - Lines that are not JSON objects get `{"ok":false,"error":"invalid_json"}`.
//! - Missing arguments get `missing_device_id` / `missing_fields`; a missing
//!   or unknown `cmd` gets `missing_cmd` / `unknown_cmd`.
//! - Writes create the device if needed; `get_device` answers `null` for an
//!   unknown device.
//! - A request `id` is echoed back so the client can match by ID.
//!
//! The store is reloaded before every command so edits made by another
//! process to a file-backed store are visible.
//!
//! [`serve_device`] runs until the reader reaches end of stream.

use std::io;

use openarcade_core::protocol::codec::encode_response;
use openarcade_core::{LineFramer, MappingEntry, Response};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

use crate::infrastructure::storage::store::{DeviceStore, SharedStore, StoreError};

const READ_BUF_SIZE: usize = 1024;

/// Serves requests read from `reader`, writing responses to `writer`.
///
/// Returns the number of requests answered once `reader` reaches end of
/// stream.
///
/// # Errors
///
/// Any I/O error from reading or writing the link.
pub async fn serve_device<R, W>(mut reader: R, mut writer: W, store: SharedStore) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut served = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            info!("emulator: link closed after {served} request(s)");
            return Ok(served);
        }

        let lines: Vec<String> = framer.feed(&buf[..n]).collect();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let response = {
                let mut store = store.lock().await;
                handle_line(&mut store, &line)
            };
            let bytes =
                encode_response(&response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writer.write_all(&bytes).await?;
            writer.flush().await?;
            served += 1;
        }
    }
}

/// Serves requests over one bidirectional stream.
pub async fn serve_stream<S>(stream: S, store: SharedStore) -> io::Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    serve_device(reader, writer, store).await
}

/// Answers one request line.
pub fn handle_line(store: &mut DeviceStore, line: &str) -> Response {
    let message = match serde_json::from_str::<Value>(line.trim()) {
        Ok(Value::Object(message)) => message,
        _ => {
            debug!("emulator: invalid JSON received: {line:?}");
            return Response::invalid_json();
        }
    };

    store.reload();
    let id = message.get("id").and_then(Value::as_u64);
    let response = handle_command(store, &message);
    debug!("emulator: {:?} -> ok={}", message.get("cmd"), response.ok);
    response.with_id(id)
}

fn handle_command(store: &mut DeviceStore, message: &Map<String, Value>) -> Response {
    let Some(cmd) = non_empty_str(message, "cmd") else {
        return Response::failure("missing_cmd");
    };

    match cmd {
        "ping" => Response::ack().with_field("reply", Value::from("pong")),
        "list_devices" => match serde_json::to_value(store.devices()) {
            Ok(devices) => Response::ack().with_field("devices", devices),
            Err(e) => internal_failure(cmd, &e),
        },
        "get_device" => {
            let Some(device_id) = non_empty_str(message, "device_id") else {
                return Response::failure("missing_device_id");
            };
            match serde_json::to_value(store.device(device_id)) {
                Ok(device) => Response::ack().with_field("device", device),
                Err(e) => internal_failure(cmd, &e),
            }
        }
        "set_descriptor" => {
            let device_id = non_empty_str(message, "device_id");
            let descriptor = message.get("descriptor").filter(|v| !v.is_null());
            match (device_id, descriptor) {
                (Some(device_id), Some(descriptor)) => {
                    outcome(cmd, store.set_descriptor(device_id, descriptor.clone()))
                }
                _ => Response::failure("missing_fields"),
            }
        }
        "set_mapping" => {
            let device_id = non_empty_str(message, "device_id");
            let mode = non_empty_str(message, "mode");
            let control_id = message.get("control_id").and_then(control_id_text);
            let mapping = message
                .get("mapping")
                .filter(|v| !v.is_null())
                .and_then(|v| serde_json::from_value::<MappingEntry>(v.clone()).ok());
            match (device_id, mode, control_id, mapping) {
                (Some(device_id), Some(mode), Some(control_id), Some(mapping)) => outcome(
                    cmd,
                    store.set_mapping(device_id, mode, &control_id, mapping),
                ),
                _ => Response::failure("missing_fields"),
            }
        }
        "set_active_mode" => {
            match (non_empty_str(message, "device_id"), non_empty_str(message, "mode")) {
                (Some(device_id), Some(mode)) => outcome(cmd, store.set_active_mode(device_id, mode)),
                _ => Response::failure("missing_fields"),
            }
        }
        "set_last_seen" => {
            let Some(device_id) = non_empty_str(message, "device_id") else {
                return Response::failure("missing_device_id");
            };
            outcome(cmd, store.touch(device_id))
        }
        _ => Response::failure("unknown_cmd"),
    }
}

fn non_empty_str<'a>(message: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    message
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Control IDs may arrive as strings or numbers.
fn control_id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn outcome(cmd: &str, result: Result<(), StoreError>) -> Response {
    match result {
        Ok(()) => Response::ack(),
        Err(StoreError::Rule(rule)) => Response::failure(rule.code()),
        Err(StoreError::Storage(e)) => internal_failure(cmd, &e),
    }
}

fn internal_failure(cmd: &str, e: &dyn std::fmt::Display) -> Response {
    error!("emulator: {cmd} failed: {e}");
    Response::failure(format!("{cmd}_failed"))
}
