//! In-process transport over `tokio::io::duplex`.
//!
//! [`DuplexTransport::pair`] returns the client-side transport together with
//! the device-side end of the pipe, which is usually handed to the device
//! emulator.  The pipe can be opened once; a second `open` fails the way a
//! busy serial port does.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use super::{ByteTransport, TransportError, TransportHandle};

/// Default pipe capacity in bytes per direction.
pub const DEFAULT_CAPACITY: usize = 4096;

/// A transport whose link is one end of an in-memory pipe.
#[derive(Debug)]
pub struct DuplexTransport {
    stream: Mutex<Option<DuplexStream>>,
}

impl DuplexTransport {
    /// Wraps an existing pipe end.
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }

    /// Creates a pipe and returns `(client transport, device end)`.
    pub fn pair(capacity: usize) -> (Self, DuplexStream) {
        let (client, device) = tokio::io::duplex(capacity);
        (Self::new(client), device)
    }
}

#[async_trait]
impl ByteTransport for DuplexTransport {
    async fn open(&self) -> Result<TransportHandle, TransportError> {
        let stream = self
            .stream
            .lock()
            .map_err(|_| TransportError::OpenFailed("pipe lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| TransportError::OpenFailed("device busy".to_string()))?;

        let (reader, writer) = tokio::io::split(stream);
        Ok(TransportHandle {
            reader: Box::new(reader),
            writer: Box::new(writer),
            label: "duplex".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bytes_flow_both_ways() {
        // Arrange
        let (transport, mut device) = DuplexTransport::pair(DEFAULT_CAPACITY);
        let mut handle = transport.open().await.expect("open");

        // Act
        handle.writer.write_all(b"ping\n").await.unwrap();
        let mut from_client = [0u8; 5];
        device.read_exact(&mut from_client).await.unwrap();
        device.write_all(b"pong\n").await.unwrap();
        let mut from_device = [0u8; 5];
        handle.reader.read_exact(&mut from_device).await.unwrap();

        // Assert
        assert_eq!(&from_client, b"ping\n");
        assert_eq!(&from_device, b"pong\n");
    }

    #[tokio::test]
    async fn test_second_open_reports_busy() {
        let (transport, _device) = DuplexTransport::pair(64);
        let _first = transport.open().await.expect("first open");

        let second = transport.open().await;

        assert!(matches!(second, Err(TransportError::OpenFailed(msg)) if msg == "device busy"));
    }
}
