//! Byte transports: the raw bidirectional link to a controller.
//!
//! A [`ByteTransport`] knows how to open one link and hand back its two
//! halves.  It knows nothing about lines or JSON; framing happens above it.
//!
//! - [`serial::SerialTransport`] – a USB serial port via `tokio-serial`.
//! - [`duplex::DuplexTransport`] – an in-process pipe, used by the device
//!   emulator and tests.
//!
//! Closing a link means dropping both halves.  The hardware client owns them
//! for the lifetime of a connection and releases them on every exit path.

pub mod duplex;
pub mod serial;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::application::config_client::ConfigError;

pub use duplex::DuplexTransport;
pub use serial::{list_ports, PortInfo, SerialTransport};

/// Error type for opening and using a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The runtime offers no compatible byte-stream primitive.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// The device could not be opened.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// The link broke mid-operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for ConfigError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::UnsupportedTransport(msg) => ConfigError::UnsupportedTransport(msg),
            TransportError::OpenFailed(msg) => ConfigError::OpenFailed(msg),
            TransportError::Io(e) => ConfigError::Io(e.to_string()),
        }
    }
}

/// Read half of an open link.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an open link.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open link, split so that one task can read while another writes.
pub struct TransportHandle {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    /// Human-readable name of the link for logs, e.g. `/dev/ttyACM0`.
    pub label: String,
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Something that can open a byte link to a controller.
#[async_trait]
pub trait ByteTransport: Send + Sync {
    /// Opens the link.  The returned halves are owned exclusively by the
    /// caller until dropped.
    async fn open(&self) -> Result<TransportHandle, TransportError>;
}
