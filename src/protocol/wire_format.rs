//! Wire format encoding and decoding.
//!
//! Requests start with `0xAA`, followed by the direction byte:
//! ```text
//! ┌───────┬───────┬─────────┬────────┬─────────┐
//! │ Start │ Dir   │ Address │ Length │ Value   │
//! │ 0xAA  │ 00/01 │ 1 byte  │ 1 byte │ (write) │
//! └───────┴───────┴─────────┴────────┴─────────┘
//! ```
//!
//! Replies are always two bytes, optionally followed by data:
//! - `EE <status>`: write acknowledgment, or read failure
//! - `BB <len>`: read success, `<len>` data bytes follow

use std::fmt;

use crate::error::{Bno055Error, Result};

/// Start byte of every request.
pub const START_BYTE: u8 = 0xAA;

/// Direction byte for register writes.
pub const DIR_WRITE: u8 = 0x00;

/// Direction byte for register reads.
pub const DIR_READ: u8 = 0x01;

/// First byte of an acknowledgment / status reply.
pub const ACK_MARKER: u8 = 0xEE;

/// First byte of a successful read reply.
pub const READ_MARKER: u8 = 0xBB;

/// Size of an ack or read header.
pub const REPLY_HEADER_SIZE: usize = 2;

/// Size of an encoded read request.
pub const READ_REQUEST_SIZE: usize = 4;

/// Size of an encoded single-byte write request.
pub const WRITE_REQUEST_SIZE: usize = 5;

/// Largest read the sensor's UART interface serves in one request.
pub const MAX_READ_LENGTH: usize = 128;

/// Status byte carried by an `EE xx` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    WriteSuccess,
    ReadFail,
    WriteFail,
    InvalidAddress,
    WriteDisabled,
    WrongStartByte,
    BusOverRun,
    MaxLength,
    MinLength,
    ReceiveCharacterTimeout,
    Unknown(u8),
}

impl ResponseStatus {
    pub fn from_byte(code: u8) -> Self {
        match code {
            0x01 => Self::WriteSuccess,
            0x03 => Self::ReadFail,
            0x04 => Self::WriteFail,
            0x05 => Self::InvalidAddress,
            0x06 => Self::WriteDisabled,
            0x07 => Self::WrongStartByte,
            0x08 => Self::BusOverRun,
            0x09 => Self::MaxLength,
            0x0A => Self::MinLength,
            0x0B => Self::ReceiveCharacterTimeout,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteSuccess => write!(f, "write success"),
            Self::ReadFail => write!(f, "read fail"),
            Self::WriteFail => write!(f, "write fail"),
            Self::InvalidAddress => write!(f, "invalid register address"),
            Self::WriteDisabled => write!(f, "register write disabled"),
            Self::WrongStartByte => write!(f, "wrong start byte"),
            Self::BusOverRun => write!(f, "bus over-run"),
            Self::MaxLength => write!(f, "maximum length exceeded"),
            Self::MinLength => write!(f, "minimum length not met"),
            Self::ReceiveCharacterTimeout => write!(f, "receive character timeout"),
            Self::Unknown(code) => write!(f, "unknown status 0x{:02X}", code),
        }
    }
}

/// Decoded 2-byte acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: ResponseStatus,
    raw: [u8; REPLY_HEADER_SIZE],
}

impl Ack {
    /// Only `EE 01` counts as success.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.raw == [ACK_MARKER, 0x01]
    }

    #[inline]
    pub fn raw(&self) -> [u8; REPLY_HEADER_SIZE] {
        self.raw
    }
}

/// Decoded read header (`BB <len>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHeader {
    /// Number of data bytes that follow.
    pub length: u8,
}

/// Encode a register read request.
///
/// # Example
///
/// ```
/// use bno055_uart::protocol::encode_read_request;
///
/// assert_eq!(encode_read_request(0x35, 1), [0xAA, 0x01, 0x35, 0x01]);
/// ```
#[inline]
pub fn encode_read_request(address: u8, length: u8) -> [u8; READ_REQUEST_SIZE] {
    [START_BYTE, DIR_READ, address, length]
}

/// Encode a single-byte register write request.
///
/// # Example
///
/// ```
/// use bno055_uart::protocol::encode_write_request;
///
/// assert_eq!(encode_write_request(0x3D, 0x0C), [0xAA, 0x00, 0x3D, 0x01, 0x0C]);
/// ```
#[inline]
pub fn encode_write_request(address: u8, value: u8) -> [u8; WRITE_REQUEST_SIZE] {
    [START_BYTE, DIR_WRITE, address, 0x01, value]
}

/// Decode a write acknowledgment.
///
/// Fails with `MalformedAck` unless the first byte is the `0xEE` sentinel.
pub fn decode_ack(bytes: [u8; REPLY_HEADER_SIZE]) -> Result<Ack> {
    if bytes[0] != ACK_MARKER {
        return Err(Bno055Error::MalformedAck(bytes));
    }
    Ok(Ack {
        status: ResponseStatus::from_byte(bytes[1]),
        raw: bytes,
    })
}

/// Decode a read header.
///
/// Fails with `ReadRejected` unless the first byte is `0xBB`.
pub fn decode_read_header(bytes: [u8; REPLY_HEADER_SIZE]) -> Result<ReadHeader> {
    if bytes[0] != READ_MARKER {
        let status = if bytes[0] == ACK_MARKER {
            ResponseStatus::from_byte(bytes[1])
        } else {
            ResponseStatus::Unknown(bytes[0])
        };
        return Err(Bno055Error::ReadRejected {
            header: bytes,
            status,
        });
    }
    Ok(ReadHeader { length: bytes[1] })
}

/// Validate a caller-supplied read length and narrow it to the wire byte.
pub fn validate_read_length(length: usize) -> Result<u8> {
    if length == 0 || length > MAX_READ_LENGTH {
        return Err(Bno055Error::InvalidLength(length));
    }
    Ok(length as u8)
}
