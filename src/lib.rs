//! # tmf882x
//!
//! Host-side driver for the ams TMF8820/TMF8821/TMF8828 multi-zone direct
//! time-of-flight sensors.
//!
//! The bus is any blocking [`embedded_hal::i2c::I2c`] implementation; waits
//! between status polls go through [`embedded_hal::delay::DelayNs`].
//!
//! ## Quick Start
//!
//! ```no_run
//! # fn run<I2C: embedded_hal::i2c::I2c, D: embedded_hal::delay::DelayNs>(i2c: I2C, delay: D)
//! #     -> Result<(), tmf882x::Tmf882xError<I2C::Error>> {
//! use tmf882x::Tmf882x;
//!
//! let mut tof = Tmf882x::new(i2c, delay);
//!
//! // Enabled for the lifetime of the guard, back in standby when it drops.
//! let mut sensor = tof.enabled()?;
//! sensor.set_spad_map_id(1)?;
//!
//! let measurement = sensor.measure()?;
//! if let Some(grid) = measurement.primary_grid() {
//!     for row in grid {
//!         println!("{row:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Calibration
//!
//! Factory calibration is captured once (dark housing, no target within
//! 40 cm) and must be stored by the caller. After every power-up it is
//! uploaded again:
//!
//! ```no_run
//! # fn run<I2C: embedded_hal::i2c::I2c, D: embedded_hal::delay::DelayNs>(tof: &mut tmf882x::Tmf882x<I2C, D>)
//! #     -> Result<(), tmf882x::Tmf882xError<I2C::Error>> {
//! use tmf882x::CalibrationBlob;
//!
//! tof.enable()?;
//! let blob = tof.calibrate()?;
//! let stored = blob.to_persisted();
//!
//! // ... later, after a power cycle
//! let blob = CalibrationBlob::from_persisted(&stored).expect("non-empty");
//! tof.write_calibration(&blob)?;
//! assert!(tof.measure()?.calibration_ok);
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod config;
pub mod device;
pub mod frame;
pub mod protocol;
pub mod spad_map;
pub mod state;
pub mod types;

pub use device::{Enabled, Tmf882x};
pub use frame::Measurement;
pub use spad_map::{Geometry, SpadMap};
pub use types::*;

/// Errors returned by the tmf882x driver.
///
/// `E` is the error type of the underlying I2C bus.
#[derive(Debug, thiserror::Error)]
pub enum Tmf882xError<E> {
    /// The I2C bus failed; passed through unchanged.
    #[error("I2C transport error: {0:?}")]
    Transport(E),

    /// The operation is not allowed in the current device state.
    #[error("{operation} requires state {required:?}, device is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: DeviceState,
        required: DeviceState,
    },

    /// The device answered a command with a failure status.
    #[error("Command {command:#04x} rejected with status {status:#04x} (state {state:?})")]
    CommandRejected {
        command: u8,
        status: u8,
        state: DeviceState,
    },

    /// A bounded poll ran out before the device reached the expected state.
    #[error("Timed out waiting for {operation} after {attempts} polls (state {state:?}, last status {last_status:#04x})")]
    Timeout {
        operation: &'static str,
        attempts: u32,
        state: DeviceState,
        last_status: u8,
    },

    /// A configuration field read back differently from what was written.
    #[error("Readback of {field} returned {actual}, expected {expected}")]
    Verification {
        field: &'static str,
        expected: u32,
        actual: u32,
    },

    /// The result frame does not have the length the SPAD map predicts.
    #[error("Frame for SPAD map {spad_map_id} is {actual} bytes, expected {expected}")]
    Frame {
        spad_map_id: u8,
        expected: usize,
        actual: usize,
    },

    /// The result area holds a different page than a measurement result.
    #[error("Unexpected page {actual:#04x} in result area, expected {expected:#04x}")]
    UnexpectedPage { expected: u8, actual: u8 },

    /// The result counter did not advance since the previous read.
    #[error("Stale result number {result_number} (previous {previous})")]
    StaleResult { result_number: u8, previous: u8 },

    /// The calibration sequence did not complete.
    #[error("Calibration failed during {stage} (status {status:#04x})")]
    Calibration { stage: &'static str, status: u8 },

    /// An input was rejected before any bus traffic.
    #[error("Invalid {field} {value}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: u32,
        reason: &'static str,
    },

    /// A page load command completed but the page header does not match.
    #[error("Page {page:#04x} not loaded, header is {header:02x?}")]
    PageNotLoaded { page: u8, header: [u8; 4] },

    /// The chip is running its bootloader and no firmware image was configured.
    #[error("No application running (app id {app_id:#04x}) and no firmware image configured")]
    NoApplication { app_id: u8 },
}

/// Result alias used throughout the driver.
pub type Result<T, E> = core::result::Result<T, Tmf882xError<E>>;
