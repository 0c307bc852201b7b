//! Error types for bno055-uart.

use thiserror::Error;

use crate::mode::InitStage;
use crate::protocol::ResponseStatus;
use crate::registers::OperationMode;

/// Main error type for all driver operations.
#[derive(Debug, Error)]
pub enum Bno055Error {
    /// The serial port could not be opened.
    #[error("Failed to open transport {path}: {reason}")]
    TransportOpenFailure { path: String, reason: String },

    /// I/O error while writing to the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport closed while a request was outstanding.
    #[error("Transport closed")]
    TransportClosed,

    /// The sensor answered a write with something other than `EE 01`.
    #[error("Register 0x{address:02X} write rejected: {response:02X?} ({status})")]
    WriteRejected {
        address: u8,
        response: [u8; 2],
        status: ResponseStatus,
    },

    /// A 2-byte reply did not start with the `0xEE` response sentinel.
    #[error("Malformed ack: {0:02X?}")]
    MalformedAck([u8; 2]),

    /// No write acknowledgment arrived in time.
    #[error("Timed out waiting for write ack on register 0x{address:02X}")]
    AckTimeout { address: u8 },

    /// The read header did not carry the `0xBB` marker.
    #[error("Register read rejected: header {header:02X?} ({status})")]
    ReadRejected {
        header: [u8; 2],
        status: ResponseStatus,
    },

    /// No read reply arrived in time.
    #[error("Timed out waiting for read reply from register 0x{address:02X}")]
    ReadTimeout { address: u8 },

    /// Fewer data bytes than the header declared arrived before the deadline.
    #[error("Read length mismatch: expected {expected} bytes, received {received}")]
    ReadLengthMismatch { expected: usize, received: usize },

    /// Read length outside the protocol's `1..=128` range.
    #[error("Invalid read length {0} (must be 1..=128)")]
    InvalidLength(usize),

    /// Chip-identity register did not hold the documented value.
    #[error("Device identity mismatch: expected 0x{expected:02X}, found 0x{found:02X}")]
    DeviceIdentityMismatch { expected: u8, found: u8 },

    /// Mode-sensitive register written outside CONFIG mode.
    #[error("Register 0x{address:02X} can only be written in CONFIG mode (current: {mode})")]
    RequiresConfigMode { address: u8, mode: OperationMode },

    /// Operation attempted before the driver was opened.
    #[error("Driver is not open")]
    NotOpen,

    /// Another request cycle is in flight and the busy policy is fail-fast.
    #[error("Another request is in flight")]
    Busy,

    /// Bytes arrived that no pending request owned.
    #[error("Protocol desync: {discarded} unexpected bytes discarded")]
    ProtocolDesync { discarded: usize },

    /// A stage of `initialize()` failed.
    #[error("Initialization failed at {stage}: {source}")]
    InitFailed {
        stage: InitStage,
        #[source]
        source: Box<Bno055Error>,
    },
}

impl Bno055Error {
    /// Wrap an error with the initialization stage it came from.
    pub(crate) fn at_stage(self, stage: InitStage) -> Self {
        Bno055Error::InitFailed {
            stage,
            source: Box::new(self),
        }
    }

    /// Returns `true` for errors produced by a bounded wait expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Bno055Error::AckTimeout { .. }
                | Bno055Error::ReadTimeout { .. }
                | Bno055Error::ReadLengthMismatch { .. }
        )
    }
}

/// Result type alias using Bno055Error.
pub type Result<T> = std::result::Result<T, Bno055Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_failed_reports_stage() {
        let err = Bno055Error::DeviceIdentityMismatch {
            expected: 0xA0,
            found: 0x00,
        }
        .at_stage(InitStage::VerifyChipId);

        let msg = err.to_string();
        assert!(msg.contains("verify chip id"));
        assert!(msg.contains("0xA0"));
    }

    #[test]
    fn test_is_timeout() {
        assert!(Bno055Error::ReadTimeout { address: 0 }.is_timeout());
        assert!(Bno055Error::AckTimeout { address: 0x3D }.is_timeout());
        assert!(!Bno055Error::NotOpen.is_timeout());
    }
}
