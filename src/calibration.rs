//! Calibration status decoding.
//!
//! `CALIB_STAT` packs four 2-bit levels, MSB first:
//! ```text
//! ┌────────┬────────┬────────┬────────┐
//! │ 7..6   │ 5..4   │ 3..2   │ 1..0   │
//! │ system │ gyro   │ accel  │ mag    │
//! └────────┴────────┴────────┴────────┘
//! ```
//! Each level ranges from 0 (uncalibrated) to 3 (fully calibrated).

/// Highest calibration level reported by the sensor.
pub const FULLY_CALIBRATED: u8 = 3;

/// Decoded `CALIB_STAT` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationStatus {
    pub system: u8,
    pub gyroscope: u8,
    pub accelerometer: u8,
    pub magnetometer: u8,
}

impl CalibrationStatus {
    /// Decompose the raw register byte.
    pub fn from_byte(raw: u8) -> Self {
        Self {
            system: (raw >> 6) & 0b11,
            gyroscope: (raw >> 4) & 0b11,
            accelerometer: (raw >> 2) & 0b11,
            magnetometer: raw & 0b11,
        }
    }

    /// Pack back into the register layout.
    pub fn to_byte(self) -> u8 {
        ((self.system & 0b11) << 6)
            | ((self.gyroscope & 0b11) << 4)
            | ((self.accelerometer & 0b11) << 2)
            | (self.magnetometer & 0b11)
    }

    /// All four levels at their maximum.
    pub fn is_fully_calibrated(&self) -> bool {
        self.system == FULLY_CALIBRATED
            && self.gyroscope == FULLY_CALIBRATED
            && self.accelerometer == FULLY_CALIBRATED
            && self.magnetometer == FULLY_CALIBRATED
    }
}

impl From<u8> for CalibrationStatus {
    fn from(raw: u8) -> Self {
        Self::from_byte(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_msb_first() {
        // system=3, gyro=2, accel=1, mag=0
        let status = CalibrationStatus::from_byte(0b11_10_01_00);
        assert_eq!(status.system, 3);
        assert_eq!(status.gyroscope, 2);
        assert_eq!(status.accelerometer, 1);
        assert_eq!(status.magnetometer, 0);
        assert!(!status.is_fully_calibrated());
    }

    #[test]
    fn test_fully_calibrated() {
        assert!(CalibrationStatus::from_byte(0xFF).is_fully_calibrated());
        assert_eq!(CalibrationStatus::from_byte(0x00), CalibrationStatus::default());
    }

    #[test]
    fn test_to_byte_restores_register() {
        for raw in [0x00u8, 0x1B, 0x3C, 0xC3, 0xFF] {
            assert_eq!(CalibrationStatus::from(raw).to_byte(), raw);
        }
    }
}
