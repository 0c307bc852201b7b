//! Driver configuration.
//!
//! [`DriverConfig`] can be built in code through
//! [`Bno055Builder`](crate::Bno055Builder) or deserialized from any serde
//! format. Durations use human-readable strings (`"500ms"`, `"1s"`).
//!
//! ```
//! use bno055_uart::DriverConfig;
//!
//! let config: DriverConfig = serde_json::from_str(
//!     r#"{ "port": "/dev/ttyS0", "ack_timeout": "250ms", "busy_policy": "fail_fast" }"#,
//! ).unwrap();
//! assert_eq!(config.baud_rate, 115_200);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Baud rate fixed by the sensor's UART interface.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default wait for a write ack or read header.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Default wait for the data bytes of a read.
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_millis(500);

/// Minimum settle time after an operation-mode change.
pub const MIN_SETTLE_DELAY: Duration = Duration::from_millis(30);

/// What to do when a request arrives while another is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Wait for the in-flight request to finish.
    #[default]
    Queue,
    /// Fail immediately with `Busy`.
    FailFast,
}

/// Configuration consumed by [`Bno055`](crate::Bno055).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Serial port path (e.g. "/dev/ttyS0" or "COM3").
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// `T_ack`: bound on waiting for a write ack or read header.
    #[serde(default = "default_ack_timeout", with = "humantime_serde")]
    pub ack_timeout: Duration,

    /// `T_data`: bound on waiting for read data.
    #[serde(default = "default_data_timeout", with = "humantime_serde")]
    pub data_timeout: Duration,

    /// Pause enforced after every mode change. Clamped to at least 30ms.
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,

    #[serde(default)]
    pub busy_policy: BusyPolicy,

    /// Fail the next request with `ProtocolDesync` when stray bytes were
    /// discarded since the previous one.
    #[serde(default)]
    pub strict_desync: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_ack_timeout() -> Duration {
    DEFAULT_ACK_TIMEOUT
}

fn default_data_timeout() -> Duration {
    DEFAULT_DATA_TIMEOUT
}

fn default_settle_delay() -> Duration {
    MIN_SETTLE_DELAY
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            data_timeout: DEFAULT_DATA_TIMEOUT,
            settle_delay: MIN_SETTLE_DELAY,
            busy_policy: BusyPolicy::Queue,
            strict_desync: false,
        }
    }
}

impl DriverConfig {
    /// Configuration for the given serial port, everything else default.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Settle delay actually enforced by the engine.
    #[inline]
    pub fn effective_settle_delay(&self) -> Duration {
        self.settle_delay.max(MIN_SETTLE_DELAY)
    }
}
