//! Protocol module - wire format, request frames and reply correlation.
//!
//! This module implements the sensor's UART protocol:
//! - Request encoding and reply decoding
//! - Typed request frames
//! - Pending-request queue matching replies to requests by arrival order

mod frame;
mod pending;
mod wire_format;

pub use frame::{Command, ExpectedReply};
pub use pending::{PendingQueue, ReadReceivers, SlotId};
pub use wire_format::{
    decode_ack, decode_read_header, encode_read_request, encode_write_request,
    validate_read_length, Ack, ReadHeader, ResponseStatus, ACK_MARKER, DIR_READ, DIR_WRITE,
    MAX_READ_LENGTH, READ_MARKER, READ_REQUEST_SIZE, REPLY_HEADER_SIZE, START_BYTE,
    WRITE_REQUEST_SIZE,
};
