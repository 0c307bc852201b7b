//! Register map, register pages and operation-mode codes.
//!
//! Addresses are page 0 unless stated otherwise. Multi-byte data registers
//! are little endian (LSB at the lower address).

use std::fmt;

/// Documented value of the chip-identity register.
pub const BNO055_ID: u8 = 0xA0;

/// Page selection register (present on both pages).
pub const PAGE_ID_ADDR: u8 = 0x07;

// Identification
pub const CHIP_ID_ADDR: u8 = 0x00;
pub const ACCEL_REV_ID_ADDR: u8 = 0x01;
pub const MAG_REV_ID_ADDR: u8 = 0x02;
pub const GYRO_REV_ID_ADDR: u8 = 0x03;
pub const SW_REV_ID_LSB_ADDR: u8 = 0x04;
pub const SW_REV_ID_MSB_ADDR: u8 = 0x05;
pub const BL_REV_ID_ADDR: u8 = 0x06;

// Sensor data (X LSB of each 6-byte vector)
pub const ACCEL_DATA_X_LSB_ADDR: u8 = 0x08;
pub const MAG_DATA_X_LSB_ADDR: u8 = 0x0E;
pub const GYRO_DATA_X_LSB_ADDR: u8 = 0x14;
pub const EULER_H_LSB_ADDR: u8 = 0x1A;
pub const QUATERNION_DATA_W_LSB_ADDR: u8 = 0x20;
pub const LINEAR_ACCEL_DATA_X_LSB_ADDR: u8 = 0x28;
pub const GRAVITY_DATA_X_LSB_ADDR: u8 = 0x2E;
pub const TEMP_ADDR: u8 = 0x34;

// Status
pub const CALIB_STAT_ADDR: u8 = 0x35;
pub const SELFTEST_RESULT_ADDR: u8 = 0x36;
pub const INTR_STAT_ADDR: u8 = 0x37;
pub const SYS_CLK_STAT_ADDR: u8 = 0x38;
pub const SYS_STAT_ADDR: u8 = 0x39;
pub const SYS_ERR_ADDR: u8 = 0x3A;

// Configuration
pub const UNIT_SEL_ADDR: u8 = 0x3B;
pub const OPR_MODE_ADDR: u8 = 0x3D;
pub const PWR_MODE_ADDR: u8 = 0x3E;
pub const SYS_TRIGGER_ADDR: u8 = 0x3F;
pub const TEMP_SOURCE_ADDR: u8 = 0x40;
pub const AXIS_MAP_CONFIG_ADDR: u8 = 0x41;
pub const AXIS_MAP_SIGN_ADDR: u8 = 0x42;

// Soft-iron calibration matrix, offsets and radii
pub const SIC_MATRIX_0_LSB_ADDR: u8 = 0x43;
pub const SIC_MATRIX_8_MSB_ADDR: u8 = 0x54;
pub const ACCEL_OFFSET_X_LSB_ADDR: u8 = 0x55;
pub const MAG_OFFSET_X_LSB_ADDR: u8 = 0x5B;
pub const GYRO_OFFSET_X_LSB_ADDR: u8 = 0x61;
pub const ACCEL_RADIUS_LSB_ADDR: u8 = 0x67;
pub const MAG_RADIUS_LSB_ADDR: u8 = 0x69;
pub const MAG_RADIUS_MSB_ADDR: u8 = 0x6A;

// Page 1 sensor configuration
pub const ACC_CONFIG_ADDR: u8 = 0x08;
pub const MAG_CONFIG_ADDR: u8 = 0x09;
pub const GYR_CONFIG_0_ADDR: u8 = 0x0A;
pub const GYR_CONFIG_1_ADDR: u8 = 0x0B;

/// Register page selected through `PAGE_ID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegisterPage {
    #[default]
    Page0,
    Page1,
}

impl RegisterPage {
    /// Value written to `PAGE_ID` to select this page.
    pub fn id(self) -> u8 {
        match self {
            RegisterPage::Page0 => 0,
            RegisterPage::Page1 => 1,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(RegisterPage::Page0),
            1 => Some(RegisterPage::Page1),
            _ => None,
        }
    }
}

/// Catalog entry describing one addressable register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub name: &'static str,
    pub address: u8,
    pub page: RegisterPage,
    /// Number of consecutive bytes the register spans.
    pub width: u8,
    /// Writable only while the sensor is in CONFIG mode.
    pub config_only: bool,
}

impl Register {
    const fn new(name: &'static str, address: u8, page: RegisterPage, width: u8) -> Self {
        Self {
            name,
            address,
            page,
            width,
            config_only: false,
        }
    }

    const fn config(name: &'static str, address: u8, page: RegisterPage, width: u8) -> Self {
        Self {
            name,
            address,
            page,
            width,
            config_only: true,
        }
    }

    /// Returns `true` if `address` falls inside this register's span.
    #[inline]
    pub fn contains(&self, page: RegisterPage, address: u8) -> bool {
        self.page == page
            && address >= self.address
            && (address as u16) < self.address as u16 + self.width as u16
    }
}

use RegisterPage::{Page0, Page1};

/// Static catalog of the registers the driver knows by name.
pub const REGISTERS: &[Register] = &[
    Register::new("CHIP_ID", CHIP_ID_ADDR, Page0, 1),
    Register::new("ACC_ID", ACCEL_REV_ID_ADDR, Page0, 1),
    Register::new("MAG_ID", MAG_REV_ID_ADDR, Page0, 1),
    Register::new("GYR_ID", GYRO_REV_ID_ADDR, Page0, 1),
    Register::new("SW_REV_ID", SW_REV_ID_LSB_ADDR, Page0, 2),
    Register::new("BL_REV_ID", BL_REV_ID_ADDR, Page0, 1),
    Register::new("PAGE_ID", PAGE_ID_ADDR, Page0, 1),
    Register::new("ACC_DATA", ACCEL_DATA_X_LSB_ADDR, Page0, 6),
    Register::new("MAG_DATA", MAG_DATA_X_LSB_ADDR, Page0, 6),
    Register::new("GYR_DATA", GYRO_DATA_X_LSB_ADDR, Page0, 6),
    Register::new("EUL_DATA", EULER_H_LSB_ADDR, Page0, 6),
    Register::new("QUA_DATA", QUATERNION_DATA_W_LSB_ADDR, Page0, 8),
    Register::new("LIA_DATA", LINEAR_ACCEL_DATA_X_LSB_ADDR, Page0, 6),
    Register::new("GRV_DATA", GRAVITY_DATA_X_LSB_ADDR, Page0, 6),
    Register::new("TEMP", TEMP_ADDR, Page0, 1),
    Register::new("CALIB_STAT", CALIB_STAT_ADDR, Page0, 1),
    Register::new("ST_RESULT", SELFTEST_RESULT_ADDR, Page0, 1),
    Register::new("INT_STA", INTR_STAT_ADDR, Page0, 1),
    Register::new("SYS_CLK_STATUS", SYS_CLK_STAT_ADDR, Page0, 1),
    Register::new("SYS_STATUS", SYS_STAT_ADDR, Page0, 1),
    Register::new("SYS_ERR", SYS_ERR_ADDR, Page0, 1),
    Register::config("UNIT_SEL", UNIT_SEL_ADDR, Page0, 1),
    Register::new("OPR_MODE", OPR_MODE_ADDR, Page0, 1),
    Register::config("PWR_MODE", PWR_MODE_ADDR, Page0, 1),
    Register::new("SYS_TRIGGER", SYS_TRIGGER_ADDR, Page0, 1),
    Register::config("TEMP_SOURCE", TEMP_SOURCE_ADDR, Page0, 1),
    Register::config("AXIS_MAP_CONFIG", AXIS_MAP_CONFIG_ADDR, Page0, 1),
    Register::config("AXIS_MAP_SIGN", AXIS_MAP_SIGN_ADDR, Page0, 1),
    Register::config("SIC_MATRIX", SIC_MATRIX_0_LSB_ADDR, Page0, 18),
    Register::config("ACC_OFFSET", ACCEL_OFFSET_X_LSB_ADDR, Page0, 6),
    Register::config("MAG_OFFSET", MAG_OFFSET_X_LSB_ADDR, Page0, 6),
    Register::config("GYR_OFFSET", GYRO_OFFSET_X_LSB_ADDR, Page0, 6),
    Register::config("ACC_RADIUS", ACCEL_RADIUS_LSB_ADDR, Page0, 2),
    Register::config("MAG_RADIUS", MAG_RADIUS_LSB_ADDR, Page0, 2),
    Register::new("PAGE_ID", PAGE_ID_ADDR, Page1, 1),
    Register::config("ACC_CONFIG", ACC_CONFIG_ADDR, Page1, 1),
    Register::config("MAG_CONFIG", MAG_CONFIG_ADDR, Page1, 1),
    Register::config("GYR_CONFIG", GYR_CONFIG_0_ADDR, Page1, 2),
];

/// Find the catalog entry covering `address` on `page`.
pub fn lookup(page: RegisterPage, address: u8) -> Option<&'static Register> {
    REGISTERS.iter().find(|r| r.contains(page, address))
}

/// Returns `true` if writing `address` on `page` requires CONFIG mode.
pub fn is_config_only(page: RegisterPage, address: u8) -> bool {
    lookup(page, address).is_some_and(|r| r.config_only)
}

/// Sensor operation mode (datasheet table 3-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum OperationMode {
    #[default]
    Config = 0x00,
    AccOnly = 0x01,
    MagOnly = 0x02,
    GyroOnly = 0x03,
    AccMag = 0x04,
    AccGyro = 0x05,
    MagGyro = 0x06,
    Amg = 0x07,
    ImuPlus = 0x08,
    Compass = 0x09,
    M4g = 0x0A,
    NdofFmcOff = 0x0B,
    Ndof = 0x0C,
}

impl OperationMode {
    /// Every mode, in code order.
    pub const ALL: [OperationMode; 13] = [
        OperationMode::Config,
        OperationMode::AccOnly,
        OperationMode::MagOnly,
        OperationMode::GyroOnly,
        OperationMode::AccMag,
        OperationMode::AccGyro,
        OperationMode::MagGyro,
        OperationMode::Amg,
        OperationMode::ImuPlus,
        OperationMode::Compass,
        OperationMode::M4g,
        OperationMode::NdofFmcOff,
        OperationMode::Ndof,
    ];

    /// Code written to `OPR_MODE`.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode an `OPR_MODE` value. Only the low nibble is significant.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get((code & 0x0F) as usize).copied()
    }

    #[inline]
    pub fn is_config(self) -> bool {
        self == OperationMode::Config
    }

    /// Fusion modes compute orientation on the sensor.
    pub fn is_fusion(self) -> bool {
        matches!(
            self,
            OperationMode::ImuPlus
                | OperationMode::Compass
                | OperationMode::M4g
                | OperationMode::NdofFmcOff
                | OperationMode::Ndof
        )
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "CONFIG",
            Self::AccOnly => "ACCONLY",
            Self::MagOnly => "MAGONLY",
            Self::GyroOnly => "GYRONLY",
            Self::AccMag => "ACCMAG",
            Self::AccGyro => "ACCGYRO",
            Self::MagGyro => "MAGGYRO",
            Self::Amg => "AMG",
            Self::ImuPlus => "IMUPLUS",
            Self::Compass => "COMPASS",
            Self::M4g => "M4G",
            Self::NdofFmcOff => "NDOF_FMC_OFF",
            Self::Ndof => "NDOF",
        };
        write!(f, "{}", s)
    }
}

/// Sensor power mode (`PWR_MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PowerMode {
    #[default]
    Normal = 0x00,
    LowPower = 0x01,
    Suspend = 0x02,
}

impl PowerMode {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}
