//! # bno055-uart
//!
//! Async driver for the Bosch BNO055 absolute-orientation sensor over its
//! UART command/acknowledgment protocol.
//!
//! ## Architecture
//!
//! - **Driver** ([`Bno055`]): open/close, initialization, register access
//! - **Engine**: one request in flight, replies matched to requests by
//!   arrival order, every wait bounded by a timeout
//! - **Mode state**: CONFIG-only registers guarded, settle delay enforced
//!   after mode changes
//!
//! ## Example
//!
//! ```ignore
//! use bno055_uart::{Bno055, OperationMode};
//!
//! #[tokio::main]
//! async fn main() -> bno055_uart::Result<()> {
//!     let mut imu = Bno055::builder().port("/dev/ttyS0").build();
//!     imu.open()?;
//!     imu.initialize().await?;
//!     imu.set_mode(OperationMode::Ndof).await?;
//!
//!     let status = imu.get_calibration_status().await?;
//!     println!("{:?}", status);
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registers;
pub mod transport;

mod driver;
mod engine;
mod mode;
mod writer;

pub use calibration::CalibrationStatus;
pub use config::{BusyPolicy, DriverConfig};
pub use driver::{Bno055, Bno055Builder};
pub use engine::ProtocolEngine;
pub use error::{Bno055Error, Result};
pub use mode::InitStage;
pub use registers::{OperationMode, PowerMode, RegisterPage};
