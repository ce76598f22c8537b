//! Serial-port transport built on `tokio-serial`.
//!
//! The controller enumerates as a USB CDC-ACM device and speaks at a fixed
//! 115200 baud, 8N1.  When no port is configured the first USB serial port
//! found is used, which covers the common single-controller setup.
//!
//! Without the `serial` cargo feature the crate still builds, but
//! [`SerialTransport::open`] fails with `UnsupportedTransport`.

use async_trait::async_trait;
use tracing::debug;

use super::{ByteTransport, TransportError, TransportHandle};

/// A serial port visible to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Path or name used to open the port (`/dev/ttyACM0`, `COM3`).
    pub name: String,
    /// `"usb"`, `"pci"`, `"bluetooth"` or `"unknown"`.
    pub kind: &'static str,
    /// USB product string or manufacturer, when the OS reports one.
    pub description: Option<String>,
}

/// Lists the serial ports currently present.
#[cfg(feature = "serial")]
pub fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    use tokio_serial::SerialPortType;

    let ports = tokio_serial::available_ports()
        .map_err(|e| TransportError::UnsupportedTransport(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (kind, description) = match p.port_type {
                SerialPortType::UsbPort(usb) => ("usb", usb.product.or(usb.manufacturer)),
                SerialPortType::PciPort => ("pci", None),
                SerialPortType::BluetoothPort => ("bluetooth", None),
                SerialPortType::Unknown => ("unknown", None),
            };
            PortInfo {
                name: p.port_name,
                kind,
                description,
            }
        })
        .collect())
}

#[cfg(not(feature = "serial"))]
pub fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    Err(TransportError::UnsupportedTransport(
        "built without serial support".to_string(),
    ))
}

/// Opens a serial port at a fixed baud rate.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    port: Option<String>,
    baud_rate: u32,
}

impl SerialTransport {
    /// `port = None` selects the first USB serial port at open time.
    pub fn new(port: Option<String>, baud_rate: u32) -> Self {
        Self { port, baud_rate }
    }

    /// Picks the port to open: the configured one, else the first USB port.
    #[cfg_attr(not(feature = "serial"), allow(dead_code))]
    fn resolve_port(&self) -> Result<String, TransportError> {
        if let Some(port) = &self.port {
            return Ok(port.clone());
        }
        let ports = list_ports()?;
        debug!("auto-detecting controller among {} serial port(s)", ports.len());
        select_port(&ports)
            .map(|p| p.name.clone())
            .ok_or_else(|| TransportError::OpenFailed("no device selected".to_string()))
    }
}

/// First USB port, since the controller is always USB-attached.
fn select_port(ports: &[PortInfo]) -> Option<&PortInfo> {
    ports.iter().find(|p| p.kind == "usb")
}

#[async_trait]
impl ByteTransport for SerialTransport {
    #[cfg(feature = "serial")]
    async fn open(&self) -> Result<TransportHandle, TransportError> {
        use tokio_serial::SerialPortBuilderExt;

        let path = self.resolve_port()?;
        let stream = tokio_serial::new(path.as_str(), self.baud_rate)
            .open_native_async()
            .map_err(|e| open_error(&path, e))?;

        tracing::info!("opened serial port {path} at {} baud", self.baud_rate);
        let (reader, writer) = tokio::io::split(stream);
        Ok(TransportHandle {
            reader: Box::new(reader),
            writer: Box::new(writer),
            label: path,
        })
    }

    #[cfg(not(feature = "serial"))]
    async fn open(&self) -> Result<TransportHandle, TransportError> {
        Err(TransportError::UnsupportedTransport(
            "built without serial support".to_string(),
        ))
    }
}

#[cfg(feature = "serial")]
fn open_error(path: &str, e: tokio_serial::Error) -> TransportError {
    use tokio_serial::ErrorKind;

    let reason = match e.kind {
        ErrorKind::NoDevice => "no such device".to_string(),
        ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => "permission denied".to_string(),
        // Busy ports surface as EBUSY, which only the OS description names.
        _ => e.description,
    };
    TransportError::OpenFailed(format!("{path}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, kind: &'static str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            kind,
            description: None,
        }
    }

    #[test]
    fn test_select_port_prefers_first_usb_port() {
        // Arrange
        let ports = vec![
            port("/dev/ttyS0", "pci"),
            port("/dev/ttyACM0", "usb"),
            port("/dev/ttyACM1", "usb"),
        ];

        // Act
        let selected = select_port(&ports);

        // Assert
        assert_eq!(selected.map(|p| p.name.as_str()), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_select_port_ignores_non_usb_ports() {
        let ports = vec![port("/dev/ttyS0", "pci"), port("/dev/rfcomm0", "bluetooth")];
        assert!(select_port(&ports).is_none());
    }

    #[test]
    fn test_configured_port_is_used_verbatim() {
        let transport = SerialTransport::new(Some("COM7".to_string()), 115_200);
        assert_eq!(transport.resolve_port().unwrap(), "COM7");
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_open_error_keeps_os_description_for_unmapped_kinds() {
        // Arrange
        let busy = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::Other),
            "Device or resource busy",
        );
        let missing = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "ENOENT");

        // Act
        let busy = open_error("/dev/ttyACM0", busy);
        let missing = open_error("/dev/ttyACM1", missing);

        // Assert
        assert!(
            matches!(&busy, TransportError::OpenFailed(msg) if msg == "/dev/ttyACM0: Device or resource busy")
        );
        assert!(
            matches!(&missing, TransportError::OpenFailed(msg) if msg == "/dev/ttyACM1: no such device")
        );
    }

    #[cfg(feature = "serial")]
    #[tokio::test]
    async fn test_open_missing_port_fails_with_open_failed() {
        // Arrange
        let transport = SerialTransport::new(Some("/dev/openarcade-does-not-exist".into()), 115_200);

        // Act
        let result = transport.open().await;

        // Assert
        match result {
            Err(TransportError::OpenFailed(msg)) => {
                assert!(msg.starts_with("/dev/openarcade-does-not-exist"), "{msg}")
            }
            other => panic!("expected OpenFailed, got {other:?}"),
        }
    }
}
