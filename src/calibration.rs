//! Factory calibration capture and re-upload.
//!
//! The device keeps calibration data in RAM only. [`Tmf882x::calibrate`]
//! captures it once under controlled conditions; after every power-up the
//! stored blob goes back in through [`Tmf882x::write_calibration`].

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::device::Tmf882x;
use crate::protocol::*;
use crate::types::{CalibrationBlob, DeviceState};
use crate::{Result, Tmf882xError};

impl<I2C: I2c, D: DelayNs> Tmf882x<I2C, D> {
    /// Run factory calibration and return the captured data.
    ///
    /// Needs a dark environment with no target within 40 cm. The measurement
    /// iterations are raised for the duration of the run and restored
    /// afterwards, also when the run fails.
    pub fn calibrate(&mut self) -> Result<CalibrationBlob, I2C::Error> {
        self.state.require("calibrate", DeviceState::Enabled)?;
        let spad_map_id = self.spad_map_id()?;
        let kilo_iterations = self.kilo_iterations()?;
        self.set_kilo_iterations(CALIBRATION_KILO_ITERATIONS)?;

        let captured = self.capture_calibration();
        let restored = self.set_kilo_iterations(kilo_iterations);
        let data = captured?;
        restored?;

        log::debug!("captured {} calibration bytes under SPAD map {spad_map_id}", data.len());
        self.calibration_map = Some(spad_map_id);
        Ok(CalibrationBlob::new(spad_map_id, data))
    }

    fn capture_calibration(&mut self) -> Result<Vec<u8>, I2C::Error> {
        self.send_command(CMD_FACTORY_CALIBRATION)
            .map_err(|e| calibration_failure("factory calibration", e))?;
        self.load_page(CMD_LOAD_CALIBRATION_PAGE, PAGE_ID_CALIBRATION)
            .map_err(|e| calibration_failure("load calibration page", e))?;
        let page = self.read_block(REG_CONFIG_RESULT, CALIBRATION_PAGE_LEN)?;
        self.commit_page()
            .map_err(|e| calibration_failure("write config page", e))?;
        Ok(page[PAGE_HEADER_LEN..].to_vec())
    }

    /// Upload calibration data captured earlier by [`calibrate`](Self::calibrate).
    ///
    /// A blob captured under a different SPAD map than the active one is
    /// uploaded anyway, with a warning.
    pub fn write_calibration(&mut self, blob: &CalibrationBlob) -> Result<(), I2C::Error> {
        self.state.require("write_calibration", DeviceState::Enabled)?;
        if !blob.has_expected_len() {
            return Err(Tmf882xError::InvalidValue {
                field: "calibration data length",
                value: blob.as_bytes().len() as u32,
                reason: "must be 188 bytes",
            });
        }
        let active = self.spad_map_id()?;
        if blob.spad_map_id() != active {
            log::warn!(
                "uploading calibration captured under SPAD map {} while map {active} is active",
                blob.spad_map_id()
            );
        }

        self.load_page(CMD_LOAD_CALIBRATION_PAGE, PAGE_ID_CALIBRATION)?;
        self.write_block(REG_CALIBRATION_DATA, blob.as_bytes())?;
        self.commit_page()?;
        self.calibration_map = Some(blob.spad_map_id());
        Ok(())
    }

    /// SPAD map of the calibration data last captured or uploaded.
    pub fn calibration_spad_map(&self) -> Option<u8> {
        self.calibration_map
    }

    /// Warn when the loaded calibration belongs to another SPAD map.
    pub(crate) fn check_calibration_context(&self, active: u8) {
        if let Some(calibrated) = self.calibration_map {
            if calibrated != active {
                log::warn!(
                    "calibration data belongs to SPAD map {calibrated}, map {active} is active"
                );
            }
        }
    }
}

/// Report a refused or stuck calibration step as a calibration failure.
fn calibration_failure<E>(stage: &'static str, error: Tmf882xError<E>) -> Tmf882xError<E> {
    match error {
        Tmf882xError::CommandRejected { status, .. } => Tmf882xError::Calibration { stage, status },
        Tmf882xError::Timeout { last_status, .. } => Tmf882xError::Calibration {
            stage,
            status: last_status,
        },
        other => other,
    }
}
