//! Outgoing request frames.
//!
//! A [`Command`] is the typed form of one request; [`Command::encode`]
//! produces the exact bytes written to the transport.
//!
//! # Example
//!
//! ```
//! use bno055_uart::protocol::{Command, ExpectedReply};
//!
//! let cmd = Command::read(0x35, 1).unwrap();
//! assert_eq!(&cmd.encode()[..], &[0xAA, 0x01, 0x35, 0x01]);
//! assert_eq!(cmd.expected_reply(true), ExpectedReply::ReadHeader);
//! ```

use bytes::Bytes;

use super::wire_format::{encode_read_request, encode_write_request, validate_read_length};
use crate::error::Result;

/// One protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read `length` bytes starting at `address`.
    Read { address: u8, length: u8 },
    /// Write a single byte to `address`.
    Write { address: u8, value: u8 },
}

/// What the engine has to wait for after sending a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedReply {
    /// Fire-and-forget.
    Nothing,
    /// Two-byte write acknowledgment.
    Ack,
    /// Two-byte read header, then the declared number of data bytes.
    ReadHeader,
}

impl Command {
    /// Build a read command, validating the length.
    pub fn read(address: u8, length: usize) -> Result<Self> {
        Ok(Command::Read {
            address,
            length: validate_read_length(length)?,
        })
    }

    pub fn write(address: u8, value: u8) -> Self {
        Command::Write { address, value }
    }

    #[inline]
    pub fn address(&self) -> u8 {
        match *self {
            Command::Read { address, .. } | Command::Write { address, .. } => address,
        }
    }

    /// Encode into the wire bytes.
    pub fn encode(&self) -> Bytes {
        match *self {
            Command::Read { address, length } => {
                Bytes::copy_from_slice(&encode_read_request(address, length))
            }
            Command::Write { address, value } => {
                Bytes::copy_from_slice(&encode_write_request(address, value))
            }
        }
    }

    /// Reply the sensor sends for this command. Writes only wait for it when
    /// `expect_ack` is set; some mode changes are never acknowledged.
    pub fn expected_reply(&self, expect_ack: bool) -> ExpectedReply {
        match self {
            Command::Read { .. } => ExpectedReply::ReadHeader,
            Command::Write { .. } if expect_ack => ExpectedReply::Ack,
            Command::Write { .. } => ExpectedReply::Nothing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Bno055Error;

    #[test]
    fn test_read_command_encoding() {
        let cmd = Command::read(0x08, 6).unwrap();
        assert_eq!(cmd.address(), 0x08);
        assert_eq!(&cmd.encode()[..], &[0xAA, 0x01, 0x08, 0x06]);
    }

    #[test]
    fn test_write_command_encoding() {
        let cmd = Command::write(0x3D, 0x0C);
        assert_eq!(cmd.address(), 0x3D);
        assert_eq!(&cmd.encode()[..], &[0xAA, 0x00, 0x3D, 0x01, 0x0C]);
    }

    #[test]
    fn test_read_command_rejects_bad_length() {
        assert!(matches!(
            Command::read(0x00, 0),
            Err(Bno055Error::InvalidLength(0))
        ));
        assert!(Command::read(0x00, 200).is_err());
    }

    #[test]
    fn test_expected_reply() {
        let write = Command::write(0x07, 0);
        assert_eq!(write.expected_reply(true), ExpectedReply::Ack);
        assert_eq!(write.expected_reply(false), ExpectedReply::Nothing);

        // Reads always produce a header, regardless of the ack flag
        let read = Command::read(0x00, 1).unwrap();
        assert_eq!(read.expected_reply(false), ExpectedReply::ReadHeader);
    }
}
