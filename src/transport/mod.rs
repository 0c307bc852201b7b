//! Transport module - the byte pipe between the engine and the sensor.
//!
//! Provides:
//! - The [`Transport`] bound every engine stream satisfies
//! - Serial port opening via `tokio-serial`

mod serial;

pub use serial::{open_serial, SerialStream, Transport};
