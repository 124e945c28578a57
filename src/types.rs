use crate::protocol::{CALIBRATION_DATA_LEN, DEFAULT_ADDRESS};

/// Lifecycle state of the device as tracked by the driver.
///
/// The device resets to standby on power loss, so this is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Low-power state; entered on construction and by `standby()`.
    #[default]
    Standby,
    /// Application running and idle.
    Enabled,
    /// A measurement command was issued and its result is pending.
    Measuring,
}

/// Chip variant. Higher variants support the larger zone maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChipVariant {
    /// 3x3 zones only.
    Tmf8820,
    /// 3x3, 4x4 and 3x6 zones.
    Tmf8821,
    /// 8x8-capable part, driven in its TMF8821-compatible legacy mode.
    Tmf8828,
}

/// Device-side measurement configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub measurement_period_ms: u16,
    /// Iterations per measurement in units of 1024.
    pub kilo_iterations: u16,
    /// Results below this confidence are reported as "no target".
    pub confidence_threshold: u8,
    pub spad_map_id: u8,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            measurement_period_ms: 33,
            kilo_iterations: 537,
            confidence_threshold: 6,
            spad_map_id: 1,
        }
    }
}

/// Result for a single zone: the strongest and the second target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneResult {
    /// 0 means no target, 255 maximal certainty.
    pub confidence: u8,
    pub distance_mm: u16,
    pub secondary_confidence: u8,
    pub secondary_distance_mm: u16,
}

impl ZoneResult {
    /// A primary target was reported.
    pub fn has_target(&self) -> bool {
        self.confidence > 0
    }

    /// A secondary target was reported.
    pub fn has_secondary_target(&self) -> bool {
        self.secondary_confidence > 0
    }
}

/// Factory calibration data captured by `calibrate()`.
///
/// The payload is chip-defined and must be stored verbatim. It is only valid
/// for the SPAD map it was captured under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationBlob {
    spad_map_id: u8,
    data: Vec<u8>,
}

impl CalibrationBlob {
    /// Wrap calibration bytes captured under `spad_map_id`.
    pub fn new(spad_map_id: u8, data: Vec<u8>) -> Self {
        Self { spad_map_id, data }
    }

    /// SPAD map the data was captured under.
    pub fn spad_map_id(&self) -> u8 {
        self.spad_map_id
    }

    /// Raw calibration payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the blob, returning the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Serialize for storage: `[spad_map_id, data...]`.
    pub fn to_persisted(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 1);
        out.push(self.spad_map_id);
        out.extend_from_slice(&self.data);
        out
    }

    /// Restore a blob written by [`to_persisted`](Self::to_persisted).
    ///
    /// Returns `None` if the input is empty.
    pub fn from_persisted(bytes: &[u8]) -> Option<Self> {
        let (&spad_map_id, data) = bytes.split_first()?;
        Some(Self::new(spad_map_id, data.to_vec()))
    }

    pub(crate) fn has_expected_len(&self) -> bool {
        self.data.len() == CALIBRATION_DATA_LEN
    }
}

/// Driver-side settings: addressing, chip variant and poll budgets.
///
/// ```
/// use tmf882x::{ChipVariant, DriverConfig};
///
/// let config = DriverConfig {
///     variant: ChipVariant::Tmf8820,
///     measure_polls: 500,
///     ..DriverConfig::default()
/// };
/// assert_eq!(config.address, 0x41);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// 7-bit I2C address.
    pub address: u8,
    pub variant: ChipVariant,
    /// Delay between two polls of a status register.
    pub poll_interval_us: u32,
    /// Polls allowed for the mode switch in `enable()`/`standby()`.
    pub ready_polls: u32,
    /// Polls allowed for a command to leave the busy state.
    pub command_polls: u32,
    /// Polls allowed for a measurement result to arrive.
    pub measure_polls: u32,
    /// Application image uploaded when the chip boots into its bootloader.
    pub firmware: Option<&'static [u8]>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            variant: ChipVariant::Tmf8821,
            poll_interval_us: 1_000,
            ready_polls: 100,
            command_polls: 1_000,
            measure_polls: 2_000,
            firmware: None,
        }
    }
}
