//! Driver facade.
//!
//! [`Bno055`] is the entry point applications use. It owns at most one
//! protocol engine, which in turn owns the transport; closing or dropping
//! the driver stops the engine's tasks and releases the port.

use bytes::Bytes;

use crate::calibration::CalibrationStatus;
use crate::config::{BusyPolicy, DriverConfig};
use crate::engine::ProtocolEngine;
use crate::error::{Bno055Error, Result};
use crate::registers::{
    OperationMode, PowerMode, RegisterPage, CALIB_STAT_ADDR, CHIP_ID_ADDR,
};
use crate::transport::{open_serial, Transport};

/// Builder for configuring a [`Bno055`] driver.
#[derive(Debug, Clone, Default)]
pub struct Bno055Builder {
    config: DriverConfig,
}

impl Bno055Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. one loaded from a file).
    pub fn from_config(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Serial port path used by [`Bno055::open`].
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.config.port = port.into();
        self
    }

    /// Default: 115200
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    /// Bound on waiting for a write ack or read header.
    ///
    /// Default: 500ms
    pub fn ack_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Bound on waiting for the data bytes of a read.
    ///
    /// Default: 500ms
    pub fn data_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.data_timeout = timeout;
        self
    }

    /// Pause after a mode change. Values below 30ms are raised to 30ms.
    pub fn settle_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// What a request does while another one is in flight.
    ///
    /// Default: [`BusyPolicy::Queue`]
    pub fn busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.config.busy_policy = policy;
        self
    }

    /// Fail the next request with `ProtocolDesync` after stray bytes.
    ///
    /// Default: false (stray bytes are only logged and counted)
    pub fn strict_desync(mut self, strict: bool) -> Self {
        self.config.strict_desync = strict;
        self
    }

    /// Create the driver. No port is opened until [`Bno055::open`].
    pub fn build(self) -> Bno055 {
        Bno055::new(self.config)
    }
}

/// BNO055 driver speaking the sensor's UART protocol.
///
/// Every operation except [`open`](Self::open) fails with `NotOpen` until
/// the driver has been opened. Operations take `&self`, so a driver shared
/// through an `Arc` can be used from several tasks; the configured
/// [`BusyPolicy`] decides what concurrent callers see.
pub struct Bno055 {
    config: DriverConfig,
    engine: Option<ProtocolEngine>,
}

impl Bno055 {
    pub fn builder() -> Bno055Builder {
        Bno055Builder::new()
    }

    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            engine: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Open the configured serial port and start the protocol engine.
    ///
    /// An already open driver is closed first. Must be called from within a
    /// tokio runtime.
    pub fn open(&mut self) -> Result<()> {
        self.close();
        let port = open_serial(&self.config.port, self.config.baud_rate)?;
        self.engine = Some(ProtocolEngine::start(port, &self.config));
        Ok(())
    }

    /// Start the protocol engine on an already open byte stream.
    pub fn open_with_transport<T: Transport>(&mut self, transport: T) {
        self.close();
        self.engine = Some(ProtocolEngine::start(transport, &self.config));
    }

    /// Stop the engine and release the transport. Idempotent.
    pub fn close(&mut self) {
        if self.engine.take().is_some() {
            tracing::info!("Driver closed");
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    fn engine(&self) -> Result<&ProtocolEngine> {
        self.engine.as_ref().ok_or(Bno055Error::NotOpen)
    }

    /// Select page 0, enter CONFIG and verify the chip identity.
    pub async fn initialize(&self) -> Result<()> {
        self.engine()?.initialize().await
    }

    /// Read `length` (1..=128) consecutive bytes starting at `address`.
    pub async fn read_register(&self, address: u8, length: usize) -> Result<Bytes> {
        self.engine()?.read_register(address, length).await
    }

    /// Read a single register byte.
    pub async fn read_byte(&self, address: u8) -> Result<u8> {
        let data = self.read_register(address, 1).await?;
        data.first()
            .copied()
            .ok_or(Bno055Error::ReadLengthMismatch {
                expected: 1,
                received: 0,
            })
    }

    /// Write one register and wait for the sensor's acknowledgment.
    pub async fn write_register(&self, address: u8, value: u8) -> Result<()> {
        self.engine()?.write_register(address, value, true).await
    }

    /// Write one register without waiting for an acknowledgment.
    pub async fn write_register_unacked(&self, address: u8, value: u8) -> Result<()> {
        self.engine()?.write_register(address, value, false).await
    }

    pub async fn set_mode(&self, mode: OperationMode) -> Result<()> {
        self.engine()?.set_mode(mode).await
    }

    /// Mode recorded from the last successful mode change.
    pub fn mode(&self) -> Result<OperationMode> {
        Ok(self.engine()?.mode())
    }

    pub async fn set_page(&self, page: RegisterPage) -> Result<()> {
        self.engine()?.set_page(page).await
    }

    pub async fn set_power_mode(&self, power: PowerMode) -> Result<()> {
        self.engine()?.set_power_mode(power).await
    }

    /// Read the chip-identity register (0xA0 on a genuine sensor).
    pub async fn chip_id(&self) -> Result<u8> {
        self.read_page_0_byte(CHIP_ID_ADDR).await
    }

    /// Read and decode `CALIB_STAT`.
    pub async fn get_calibration_status(&self) -> Result<CalibrationStatus> {
        let raw = self.read_page_0_byte(CALIB_STAT_ADDR).await?;
        let status = CalibrationStatus::from_byte(raw);
        tracing::debug!("Calibration status {:?}", status);
        Ok(status)
    }

    pub async fn is_fully_calibrated(&self) -> Result<bool> {
        Ok(self.get_calibration_status().await?.is_fully_calibrated())
    }

    /// Bytes the engine discarded because no request owned them.
    pub fn desync_count(&self) -> Result<u64> {
        Ok(self.engine()?.desync_count())
    }

    async fn read_page_0_byte(&self, address: u8) -> Result<u8> {
        let data = self.engine()?.read_page_0(address, 1).await?;
        data.first()
            .copied()
            .ok_or(Bno055Error::ReadLengthMismatch {
                expected: 1,
                received: 0,
            })
    }
}

impl Default for Bno055 {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builder_sets_config() {
        let driver = Bno055::builder()
            .port("/dev/ttyUSB0")
            .ack_timeout(Duration::from_millis(100))
            .data_timeout(Duration::from_millis(200))
            .settle_delay(Duration::from_millis(40))
            .busy_policy(BusyPolicy::FailFast)
            .strict_desync(true)
            .build();

        let config = driver.config();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.ack_timeout, Duration::from_millis(100));
        assert_eq!(config.data_timeout, Duration::from_millis(200));
        assert_eq!(config.settle_delay, Duration::from_millis(40));
        assert_eq!(config.busy_policy, BusyPolicy::FailFast);
        assert!(config.strict_desync);
        assert!(!driver.is_open());
    }

    #[tokio::test]
    async fn test_not_open() {
        let driver = Bno055::default();

        assert!(matches!(driver.initialize().await, Err(Bno055Error::NotOpen)));
        assert!(matches!(
            driver.read_register(0x00, 1).await,
            Err(Bno055Error::NotOpen)
        ));
        assert!(matches!(
            driver.write_register(0x3D, 0x00).await,
            Err(Bno055Error::NotOpen)
        ));
        assert!(matches!(
            driver.get_calibration_status().await,
            Err(Bno055Error::NotOpen)
        ));
        assert!(matches!(driver.mode(), Err(Bno055Error::NotOpen)));
        assert!(matches!(driver.desync_count(), Err(Bno055Error::NotOpen)));
    }

    #[tokio::test]
    async fn test_open_without_port_fails() {
        let mut driver = Bno055::default();

        let result = driver.open();
        assert!(matches!(
            result,
            Err(Bno055Error::TransportOpenFailure { .. })
        ));
        assert!(!driver.is_open());
    }

    #[tokio::test]
    async fn test_open_with_transport_and_close() {
        let (host, _device) = tokio::io::duplex(64);
        let mut driver = Bno055::default();

        driver.open_with_transport(host);
        assert!(driver.is_open());
        assert_eq!(driver.mode().unwrap(), OperationMode::Config);

        driver.close();
        assert!(!driver.is_open());
        driver.close();
    }
}
