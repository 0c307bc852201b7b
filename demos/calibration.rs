//! Calibration monitor - example of driving a sensor on a serial port.
//!
//! This example demonstrates:
//! - Building a driver with `Bno055::builder()`
//! - Running `initialize()` and switching to the NDOF fusion mode
//! - Polling `get_calibration_status()` until every subsystem reports 3
//!
//! # Running
//!
//! ```text
//! RUST_LOG=bno055_uart=debug cargo run --example calibration -- /dev/ttyS0
//! ```
//!
//! Move the sensor through a few figure eights and rest it on each axis
//! while the monitor runs.

use std::time::Duration;

use bno055_uart::{Bno055, OperationMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyS0".to_string());

    let mut imu = Bno055::builder()
        .port(port)
        .ack_timeout(Duration::from_millis(250))
        .build();

    imu.open()?;
    imu.initialize().await?;
    imu.set_mode(OperationMode::Ndof).await?;

    loop {
        let status = imu.get_calibration_status().await?;
        println!(
            "sys {} gyr {} acc {} mag {}",
            status.system, status.gyroscope, status.accelerometer, status.magnetometer
        );

        if status.is_fully_calibrated() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    println!("Fully calibrated ({} stray bytes seen)", imu.desync_count()?);

    // Leave the sensor in CONFIG so offsets can be read back
    imu.set_mode(OperationMode::Config).await?;
    imu.close();
    Ok(())
}
