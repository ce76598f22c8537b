//! SerialConfigClient: the hardware-backed [`ConfigClient`].
//!
//! # Anatomy of a connection
//!
//! ```text
//!            send_command()                        read loop (spawned)
//!   ┌───────────────────────────┐        ┌──────────────────────────────────┐
//!   │ lock writer               │        │ read chunk ─▶ LineFramer          │
//!   │ register id in Correlator │        │   ─▶ decode_response per line    │
//!   │ write JSON line           │        │   ─▶ Correlator::resolve         │
//!   │ unlock writer             │        │ on EOF / error / shutdown:       │
//!   │ await reply (timeout)     │◀───────│   Correlator::close_all          │
//!   └───────────────────────────┘        └──────────────────────────────────┘
//! ```
//!
//! Registration and the write happen under the same lock, so the order in
//! which requests enter the correlator is the order their bytes hit the
//! wire.  That is what makes oldest-first matching valid for firmware that
//! does not echo request IDs.
//!
//! The read loop is the only reader of the link.  It runs until the stream
//! ends, a read fails, or [`disconnect`](SerialConfigClient::disconnect)
//! signals it to stop.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use openarcade_core::protocol::messages::INVALID_JSON;
use openarcade_core::{
    decode_response, encode_request, Command, Device, LineFramer, MappingEntry, Request,
    RequestIdCounter, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::correlator::Correlator;
use crate::application::config_client::{ConfigClient, ConfigError};
use crate::infrastructure::storage::config::SerialConfig;
use crate::infrastructure::transport::{BoxedReader, BoxedWriter, ByteTransport};

/// Size of the buffer each read from the link fills.
const READ_BUF_SIZE: usize = 1024;

/// Tunables for [`SerialConfigClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long a command waits for its response.
    pub request_timeout: Duration,
    /// Maximum number of commands awaiting a response at once.
    pub max_pending: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(2000),
            max_pending: 32,
        }
    }
}

impl From<&SerialConfig> for ClientOptions {
    fn from(cfg: &SerialConfig) -> Self {
        Self {
            request_timeout: cfg.request_timeout(),
            max_pending: cfg.max_pending.max(1),
        }
    }
}

type SharedCorrelator = Arc<Mutex<Correlator>>;

fn lock(correlator: &SharedCorrelator) -> MutexGuard<'_, Correlator> {
    correlator.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything owned by one open link.
struct Connection {
    writer: BoxedWriter,
    correlator: SharedCorrelator,
    shutdown: Option<oneshot::Sender<()>>,
    reader_task: JoinHandle<()>,
    label: String,
}

impl Connection {
    /// The read loop has exited, so nothing on this link will be answered.
    fn is_dead(&self) -> bool {
        self.reader_task.is_finished() || lock(&self.correlator).is_closed()
    }

    /// Stops the reader, releases the writer and fails whatever is still
    /// waiting.  Every step runs; the first error is returned.
    async fn close(mut self) -> Result<(), ConfigError> {
        let mut first_error: Option<ConfigError> = None;

        // 1. Stop the reader.  A send error means it already exited.
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.reader_task).await {
            if !e.is_cancelled() {
                first_error.get_or_insert(ConfigError::Io(e.to_string()));
            }
        }

        // 2. Release the writer.
        if let Err(e) = self.writer.shutdown().await {
            debug!("shutting down writer for {}: {e}", self.label);
            first_error.get_or_insert(ConfigError::Io(e.to_string()));
        }

        // 3. Anything still waiting cannot be answered any more.
        lock(&self.correlator).close_all();

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Releases the read half even if disconnect() was never called.
        self.reader_task.abort();
    }
}

/// Configuration client talking to a controller over a [`ByteTransport`].
pub struct SerialConfigClient {
    transport: Arc<dyn ByteTransport>,
    options: ClientOptions,
    ids: RequestIdCounter,
    connection: tokio::sync::Mutex<Option<Connection>>,
}

impl SerialConfigClient {
    pub fn new(transport: Arc<dyn ByteTransport>, options: ClientOptions) -> Self {
        Self {
            transport,
            options,
            ids: RequestIdCounter::new(),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    /// Whether a link is open.  A link whose read side has ended still
    /// counts until `disconnect()` or the next `connect()`; commands on it
    /// fail with `ConnectionClosed`.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Sends `command` and waits for its response.
    ///
    /// Returns the response when `ok` is true; otherwise the device's error
    /// code as [`ConfigError::Command`] (or `<cmd>_failed` if it sent none).
    pub async fn send_command(&self, command: Command) -> Result<Response, ConfigError> {
        let id = self.ids.next_id();
        let name = command.name();
        let failure_code = command.failure_code();
        let bytes = encode_request(&Request::with_id(command, id))
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        let (rx, correlator) = {
            let mut guard = self.connection.lock().await;
            let conn = guard.as_mut().ok_or(ConfigError::NotConnected)?;
            let rx = lock(&conn.correlator).register(id)?;

            let written = match conn.writer.write_all(&bytes).await {
                Ok(()) => conn.writer.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                lock(&conn.correlator).cancel(id);
                error!("failed to write {name} to {}: {e}", conn.label);
                return Err(ConfigError::Io(e.to_string()));
            }
            debug!("sent {name} (id {id}) to {}", conn.label);
            (rx, Arc::clone(&conn.correlator))
        };

        let response = match tokio::time::timeout(self.options.request_timeout, rx).await {
            Ok(Ok(reply)) => reply?,
            Ok(Err(_)) => return Err(ConfigError::ConnectionClosed),
            Err(_) => {
                lock(&correlator).abandon(id);
                warn!(
                    "{name} (id {id}) timed out after {:?}",
                    self.options.request_timeout
                );
                return Err(ConfigError::Timeout(self.options.request_timeout));
            }
        };

        check_response(response, &failure_code)
    }

    async fn ack(&self, command: Command) -> Result<(), ConfigError> {
        self.send_command(command).await.map(|_| ())
    }
}

/// Turns an `ok:false` response into the matching error.
fn check_response(response: Response, failure_code: &str) -> Result<Response, ConfigError> {
    if response.ok {
        return Ok(response);
    }
    match response.error.as_deref() {
        Some(INVALID_JSON) => Err(ConfigError::InvalidJson),
        Some(code) => Err(ConfigError::command(code)),
        None => Err(ConfigError::command(failure_code)),
    }
}

/// Pulls a typed result field out of a successful response.
fn result_field<T: DeserializeOwned>(mut response: Response, key: &str) -> Result<Option<T>, ConfigError> {
    response.take_field(key).map_err(|e| {
        warn!("malformed `{key}` in response: {e}");
        ConfigError::InvalidJson
    })
}

/// Reads the link until it ends or `shutdown` fires, resolving responses as
/// they complete.
async fn read_loop(
    mut reader: BoxedReader,
    correlator: SharedCorrelator,
    mut shutdown: oneshot::Receiver<()>,
    label: String,
) {
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = tokio::select! {
            _ = &mut shutdown => {
                debug!("read loop for {label} stopping");
                break;
            }
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    info!("{label} closed by device");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    error!("read error on {label}: {e}");
                    break;
                }
            },
        };

        for line in framer.feed(&buf[..n]) {
            if line.trim().is_empty() {
                continue;
            }
            let response = decode_response(&line);
            lock(&correlator).resolve(response);
        }
    }

    let failed = lock(&correlator).close_all();
    if failed > 0 {
        warn!("{label}: {failed} request(s) failed with connection closed");
    }
    if framer.pending_len() > 0 {
        debug!("{label}: discarded {} byte(s) of partial line", framer.pending_len());
    }
}

#[async_trait]
impl ConfigClient for SerialConfigClient {
    async fn connect(&self) -> Result<(), ConfigError> {
        let mut guard = self.connection.lock().await;
        match guard.as_ref() {
            Some(conn) if !conn.is_dead() => return Ok(()),
            Some(conn) => info!("{} went away, reopening", conn.label),
            None => {}
        }
        if let Some(stale) = guard.take() {
            if let Err(e) = stale.close().await {
                debug!("tearing down dead link: {e}");
            }
        }

        let handle = self.transport.open().await?;
        let correlator = Arc::new(Mutex::new(Correlator::new(self.options.max_pending)));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let reader_task = tokio::spawn(read_loop(
            handle.reader,
            Arc::clone(&correlator),
            shutdown_rx,
            handle.label.clone(),
        ));

        info!("connected to {}", handle.label);
        *guard = Some(Connection {
            writer: handle.writer,
            correlator,
            shutdown: Some(shutdown_tx),
            reader_task,
            label: handle.label,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConfigError> {
        let Some(conn) = self.connection.lock().await.take() else {
            return Ok(());
        };
        let label = conn.label.clone();
        let result = conn.close().await;
        info!("disconnected from {label}");
        result
    }

    async fn ping(&self) -> Result<(), ConfigError> {
        self.ack(Command::Ping).await
    }

    async fn list_devices(&self) -> Result<BTreeMap<String, Device>, ConfigError> {
        let response = self.send_command(Command::ListDevices).await?;
        let raw: BTreeMap<String, Value> = result_field(response, "devices")?.unwrap_or_default();
        let mut devices = BTreeMap::new();
        for (device_id, record) in raw {
            match serde_json::from_value::<Device>(record) {
                Ok(device) => {
                    devices.insert(device_id, device);
                }
                Err(e) => warn!("skipping undecodable device {device_id}: {e}"),
            }
        }
        Ok(devices)
    }

    async fn get_device(&self, device_id: &str) -> Result<Option<Device>, ConfigError> {
        let response = self
            .send_command(Command::GetDevice {
                device_id: device_id.to_string(),
            })
            .await?;
        result_field(response, "device")
    }

    async fn set_mapping(
        &self,
        device_id: &str,
        mode: &str,
        control_id: &str,
        entry: MappingEntry,
    ) -> Result<(), ConfigError> {
        self.ack(Command::SetMapping {
            device_id: device_id.to_string(),
            mode: mode.to_string(),
            control_id: control_id.to_string(),
            mapping: entry,
        })
        .await
    }

    async fn set_active_mode(&self, device_id: &str, mode: &str) -> Result<(), ConfigError> {
        self.ack(Command::SetActiveMode {
            device_id: device_id.to_string(),
            mode: mode.to_string(),
        })
        .await
    }

    async fn touch(&self, device_id: &str) -> Result<(), ConfigError> {
        self.ack(Command::SetLastSeen {
            device_id: device_id.to_string(),
        })
        .await
    }

    async fn set_descriptor(&self, device_id: &str, descriptor: Value) -> Result<(), ConfigError> {
        self.ack(Command::SetDescriptor {
            device_id: device_id.to_string(),
            descriptor,
        })
        .await
    }
}
