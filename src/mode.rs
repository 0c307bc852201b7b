//! Operating-mode state machine and the initialization sequence.
//!
//! The sensor powers up in CONFIG. Offsets, unit selection, axis remap and
//! power mode may only be written in CONFIG; every other mode runs the
//! sensors and, for the fusion modes, the on-chip fusion. After each mode
//! change the sensor needs time to switch, so the engine refuses to touch
//! the transport until a settle deadline has passed.
//!
//! ```text
//! CONFIG ──set_mode(op)──► op ──set_mode(CONFIG)──► CONFIG
//!   │                       │
//!   └── settle ≥ 30ms ──────┴── before any further access
//! ```

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::engine::ProtocolEngine;
use crate::error::{Bno055Error, Result};
use crate::protocol::Command;
use crate::registers::{
    is_config_only, OperationMode, PowerMode, RegisterPage, BNO055_ID, CHIP_ID_ADDR,
    OPR_MODE_ADDR, PAGE_ID_ADDR, PWR_MODE_ADDR,
};

/// Stage of [`ProtocolEngine::initialize`] reported by `InitFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitStage {
    /// Unacknowledged `PAGE_ID = 0` while the device state is unknown.
    SelectPage,
    EnterConfigMode,
    /// Acknowledged `PAGE_ID = 0`.
    ReselectPage,
    ReadChipId,
    VerifyChipId,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InitStage::SelectPage => "select page",
            InitStage::EnterConfigMode => "enter config mode",
            InitStage::ReselectPage => "reselect page",
            InitStage::ReadChipId => "read chip id",
            InitStage::VerifyChipId => "verify chip id",
        };
        f.write_str(s)
    }
}

/// What the engine believes about the sensor, updated on successful writes.
#[derive(Debug, Default)]
pub struct ModeState {
    mode: OperationMode,
    page: RegisterPage,
    settle_until: Option<Instant>,
    /// The last cycle was a write sent without waiting for its ack.
    unacked_write: bool,
}

impl ModeState {
    #[inline]
    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    #[inline]
    pub fn page(&self) -> RegisterPage {
        self.page
    }

    /// Earliest instant the next register access may start.
    #[inline]
    pub fn settle_deadline(&self) -> Option<Instant> {
        self.settle_until
    }

    pub(crate) fn take_unacked_write(&mut self) -> bool {
        std::mem::take(&mut self.unacked_write)
    }

    /// Refuse writes to mode-sensitive registers outside CONFIG.
    pub fn check_writable(&self, address: u8) -> Result<()> {
        if !self.mode.is_config() && is_config_only(self.page, address) {
            return Err(Bno055Error::RequiresConfigMode {
                address,
                mode: self.mode,
            });
        }
        Ok(())
    }

    /// Track a completed write. Mode changes arm the settle deadline.
    pub fn record_write(&mut self, address: u8, value: u8, acked: bool, settle: Duration) {
        self.unacked_write = !acked;

        if address == PAGE_ID_ADDR {
            match RegisterPage::from_id(value) {
                Some(page) => self.page = page,
                None => tracing::warn!("PAGE_ID written with unknown page {}", value),
            }
            return;
        }

        if address == OPR_MODE_ADDR && self.page == RegisterPage::Page0 {
            match OperationMode::from_code(value) {
                Some(mode) => {
                    if mode != self.mode {
                        tracing::info!("Operation mode {} -> {}", self.mode, mode);
                    }
                    self.mode = mode;
                }
                None => tracing::warn!("OPR_MODE written with unknown mode 0x{:02X}", value),
            }
            self.settle_until = Some(Instant::now() + settle);
        }
    }
}

impl ProtocolEngine {
    /// Switch the operating mode.
    ///
    /// `OPR_MODE` lives on page 0, which is selected first if needed. The
    /// mode write itself is not acknowledged; the mode is recorded once the
    /// frame is out and every later access waits for the settle delay.
    pub async fn set_mode(&self, mode: OperationMode) -> Result<()> {
        let _permit = self.acquire().await?;
        self.page_0_cycle().await?;
        self.write_cycle(OPR_MODE_ADDR, mode.code(), false).await
    }

    /// Read a page-0 register, selecting page 0 first if needed. Both
    /// happen under one permit so no page change can slip in between.
    pub async fn read_page_0(&self, address: u8, length: usize) -> Result<Bytes> {
        let command = Command::read(address, length)?;
        let _permit = self.acquire().await?;
        self.page_0_cycle().await?;
        self.read_cycle(command).await
    }

    /// Select page 0 unless it is already tracked. Caller holds the permit.
    async fn page_0_cycle(&self) -> Result<()> {
        let page = self.state.lock().page();
        if page != RegisterPage::Page0 {
            self.write_cycle(PAGE_ID_ADDR, RegisterPage::Page0.id(), true)
                .await?;
        }
        Ok(())
    }

    /// Select a register page (acknowledged).
    pub async fn set_page(&self, page: RegisterPage) -> Result<()> {
        let _permit = self.acquire().await?;
        self.write_cycle(PAGE_ID_ADDR, page.id(), true).await
    }

    /// Write `PWR_MODE`. Requires CONFIG mode.
    pub async fn set_power_mode(&self, power: PowerMode) -> Result<()> {
        let _permit = self.acquire().await?;
        self.page_0_cycle().await?;
        self.write_cycle(PWR_MODE_ADDR, power.code(), true).await
    }

    /// Bring the sensor into a known state: page 0, CONFIG mode, identity
    /// verified.
    ///
    /// Safe to call again at any time; a failure names the stage it
    /// stopped at.
    pub async fn initialize(&self) -> Result<()> {
        let _permit = self.acquire().await?;
        tracing::debug!("Initializing sensor");

        self.write_cycle(PAGE_ID_ADDR, RegisterPage::Page0.id(), false)
            .await
            .map_err(|e| e.at_stage(InitStage::SelectPage))?;

        self.write_cycle(OPR_MODE_ADDR, OperationMode::Config.code(), false)
            .await
            .map_err(|e| e.at_stage(InitStage::EnterConfigMode))?;

        self.write_cycle(PAGE_ID_ADDR, RegisterPage::Page0.id(), true)
            .await
            .map_err(|e| e.at_stage(InitStage::ReselectPage))?;

        let command =
            Command::read(CHIP_ID_ADDR, 1).map_err(|e| e.at_stage(InitStage::ReadChipId))?;
        let id = self
            .read_cycle(command)
            .await
            .map_err(|e| e.at_stage(InitStage::ReadChipId))?;

        let found = id.first().copied().unwrap_or_default();
        if found != BNO055_ID {
            tracing::error!("Unexpected chip id 0x{:02X}", found);
            return Err(Bno055Error::DeviceIdentityMismatch {
                expected: BNO055_ID,
                found,
            }
            .at_stage(InitStage::VerifyChipId));
        }

        tracing::info!("Sensor initialized (chip id 0x{:02X})", found);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{ACCEL_OFFSET_X_LSB_ADDR, ACC_CONFIG_ADDR, CALIB_STAT_ADDR};

    const SETTLE: Duration = Duration::from_millis(30);

    #[test]
    fn test_starts_in_config_on_page_0() {
        let state = ModeState::default();
        assert_eq!(state.mode(), OperationMode::Config);
        assert_eq!(state.page(), RegisterPage::Page0);
        assert!(state.settle_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_write_records_mode_and_arms_settle() {
        let mut state = ModeState::default();
        let before = Instant::now();

        state.record_write(OPR_MODE_ADDR, OperationMode::Ndof.code(), false, SETTLE);

        assert_eq!(state.mode(), OperationMode::Ndof);
        assert_eq!(state.settle_deadline(), Some(before + SETTLE));
        assert!(state.take_unacked_write());
        assert!(!state.take_unacked_write());
    }

    #[test]
    fn test_page_write_records_page() {
        let mut state = ModeState::default();

        state.record_write(PAGE_ID_ADDR, 1, true, SETTLE);
        assert_eq!(state.page(), RegisterPage::Page1);

        // OPR_MODE does not exist on page 1
        state.record_write(OPR_MODE_ADDR, OperationMode::Ndof.code(), true, SETTLE);
        assert_eq!(state.mode(), OperationMode::Config);
    }

    #[test]
    fn test_config_only_refused_outside_config() {
        let mut state = ModeState::default();
        assert!(state.check_writable(ACCEL_OFFSET_X_LSB_ADDR).is_ok());

        state.record_write(OPR_MODE_ADDR, OperationMode::ImuPlus.code(), false, SETTLE);

        assert!(matches!(
            state.check_writable(ACCEL_OFFSET_X_LSB_ADDR),
            Err(Bno055Error::RequiresConfigMode {
                address: ACCEL_OFFSET_X_LSB_ADDR,
                mode: OperationMode::ImuPlus,
            })
        ));
        assert!(state.check_writable(CALIB_STAT_ADDR).is_ok());
        assert!(state.check_writable(OPR_MODE_ADDR).is_ok());
    }

    #[test]
    fn test_page_1_config_registers() {
        let mut state = ModeState::default();
        state.record_write(OPR_MODE_ADDR, OperationMode::Amg.code(), false, SETTLE);
        state.record_write(PAGE_ID_ADDR, 1, true, SETTLE);

        assert!(state.check_writable(ACC_CONFIG_ADDR).is_err());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(InitStage::SelectPage.to_string(), "select page");
        assert_eq!(InitStage::ReadChipId.to_string(), "read chip id");
    }
}
