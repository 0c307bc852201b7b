//! Serial port transport.
//!
//! The sensor talks 8N1 at 115200 baud without flow control. Any other
//! ordered byte stream (a socket bridge, an in-memory duplex in tests) can
//! stand in for the port as long as it implements [`Transport`].
//!
//! # Example
//!
//! ```ignore
//! use bno055_uart::transport::open_serial;
//!
//! let port = open_serial("/dev/ttyS0", 115_200)?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

use crate::error::{Bno055Error, Result};

pub use tokio_serial::SerialStream;

/// Byte stream the protocol engine can own.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Open `path` as an async serial port configured for the sensor.
///
/// # Errors
///
/// Every failure maps to `TransportOpenFailure` with a reason naming the
/// cause (missing device, permission, invalid settings).
pub fn open_serial(path: &str, baud_rate: u32) -> Result<SerialStream> {
    if path.is_empty() {
        return Err(open_failure(path, "no serial port configured".to_string()));
    }

    let stream = tokio_serial::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(|e| {
            let reason = match e.kind {
                tokio_serial::ErrorKind::NoDevice => "device not found".to_string(),
                tokio_serial::ErrorKind::InvalidInput => {
                    format!("invalid port settings: {}", e.description)
                }
                tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    "permission denied".to_string()
                }
                tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    "device not found".to_string()
                }
                _ => e.to_string(),
            };
            open_failure(path, reason)
        })?;

    tracing::info!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(stream)
}

fn open_failure(path: &str, reason: String) -> Bno055Error {
    tracing::error!("Failed to open serial port {:?}: {}", path, reason);
    Bno055Error::TransportOpenFailure {
        path: path.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_transport<T: Transport>() {}

    #[test]
    fn test_duplex_is_a_transport() {
        assert_transport::<tokio::io::DuplexStream>();
        assert_transport::<SerialStream>();
    }

    #[test]
    fn test_empty_path_rejected() {
        let result = open_serial("", 115_200);
        assert!(matches!(
            result,
            Err(Bno055Error::TransportOpenFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_device_rejected() {
        let result = open_serial("/dev/bno055-does-not-exist", 115_200);
        match result {
            Err(Bno055Error::TransportOpenFailure { path, .. }) => {
                assert_eq!(path, "/dev/bno055-does-not-exist");
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
