//! Measurement result frame decoding.
//!
//! A result frame is read from 0x20 after the result interrupt fires:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | page header `[0x10, tid, size_lsb, size_msb]` |
//! | 4 | 1 | result number |
//! | 5 | 1 | temperature (°C, signed) |
//! | 6 | 1 | valid results |
//! | 8 | 4 | ambient light |
//! | 12 | 4 | photon count |
//! | 16 | 4 | reference count |
//! | 20 | 4 | system tick |
//! | 24 | 54 | primary target, 18 × `[confidence, distance_lsb, distance_msb]` |
//! | 78 | 54 | secondary target, same layout |

use crate::protocol::{PAGE_HEADER_LEN, PAGE_ID_RESULT};
use crate::spad_map::{SpadMap, RESULT_CHANNELS};
use crate::types::ZoneResult;
use crate::Tmf882xError;

pub const RESULT_HEADER_LEN: usize = 24;
pub const ZONE_RECORD_LEN: usize = 3;
/// Every map reports all channels, so the frame length is fixed.
pub const FRAME_LEN: usize = RESULT_HEADER_LEN + 2 * RESULT_CHANNELS * ZONE_RECORD_LEN;

const OFFSET_RESULT_NUMBER: usize = 4;
const OFFSET_TEMPERATURE: usize = 5;
const OFFSET_VALID_RESULTS: usize = 6;
const OFFSET_AMBIENT_LIGHT: usize = 8;
const OFFSET_PHOTON_COUNT: usize = 12;
const OFFSET_REFERENCE_COUNT: usize = 16;
const OFFSET_SYSTEM_TICK: usize = 20;

/// One decoded measurement.
///
/// Produced fresh by every successful `measure()`; holds no reference to the
/// device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    /// Incrementing 8-bit counter; wraps around.
    pub result_number: u8,
    pub temperature_c: i8,
    pub valid_results: u8,
    pub ambient_light: u32,
    pub photon_count: u32,
    pub reference_count: u32,
    pub system_tick: u32,
    /// The device's own verdict on the loaded calibration data.
    pub calibration_ok: bool,
    pub spad_map_id: u8,
    /// Zone results in row-major order of the SPAD map.
    pub results: Vec<ZoneResult>,
    shape: Option<(usize, usize)>,
}

impl Measurement {
    /// `(rows, columns)` of the SPAD map, `None` for user-defined maps.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// Result for one zone, `None` outside the grid or for user-defined maps.
    pub fn zone(&self, row: usize, column: usize) -> Option<&ZoneResult> {
        let (rows, columns) = self.shape?;
        if row >= rows || column >= columns {
            return None;
        }
        self.results.get(row * columns + column)
    }

    /// Zone results arranged as rows of the physical layout.
    pub fn grid(&self) -> Option<Vec<Vec<ZoneResult>>> {
        self.arrange(|z| *z)
    }

    /// Primary target distances in millimeters.
    pub fn primary_grid(&self) -> Option<Vec<Vec<u16>>> {
        self.arrange(|z| z.distance_mm)
    }

    /// Secondary target distances in millimeters.
    pub fn secondary_grid(&self) -> Option<Vec<Vec<u16>>> {
        self.arrange(|z| z.secondary_distance_mm)
    }

    /// Primary target confidences.
    pub fn primary_confidence_grid(&self) -> Option<Vec<Vec<u8>>> {
        self.arrange(|z| z.confidence)
    }

    /// Secondary target confidences.
    pub fn secondary_confidence_grid(&self) -> Option<Vec<Vec<u8>>> {
        self.arrange(|z| z.secondary_confidence)
    }

    fn arrange<T>(&self, f: impl Fn(&ZoneResult) -> T) -> Option<Vec<Vec<T>>> {
        let (_, columns) = self.shape?;
        Some(
            self.results
                .chunks(columns)
                .map(|row| row.iter().map(&f).collect())
                .collect(),
        )
    }
}

/// A result frame that cannot be turned into a [`Measurement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Length {
        spad_map_id: u8,
        expected: usize,
        actual: usize,
    },
    UnexpectedPage {
        expected: u8,
        actual: u8,
    },
    Stale {
        result_number: u8,
        previous: u8,
    },
}

impl<E> From<FrameError> for Tmf882xError<E> {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Length {
                spad_map_id,
                expected,
                actual,
            } => Tmf882xError::Frame {
                spad_map_id,
                expected,
                actual,
            },
            FrameError::UnexpectedPage { expected, actual } => {
                Tmf882xError::UnexpectedPage { expected, actual }
            }
            FrameError::Stale {
                result_number,
                previous,
            } => Tmf882xError::StaleResult {
                result_number,
                previous,
            },
        }
    }
}

/// True if `current` is a newer result number than `previous`.
///
/// The counter is 8 bits wide; an advance of 1..=127 counts as newer, an
/// unchanged or backwards counter as stale.
pub fn is_fresh(previous: u8, current: u8) -> bool {
    let advance = current.wrapping_sub(previous);
    advance != 0 && advance < 0x80
}

/// Decode a raw result frame for the given SPAD map.
///
/// `previous` is the result number of the last accepted frame, if any.
pub fn decode_measurement(
    frame: &[u8],
    map: &SpadMap,
    previous: Option<u8>,
    calibration_ok: bool,
) -> Result<Measurement, FrameError> {
    if frame.len() != FRAME_LEN {
        return Err(FrameError::Length {
            spad_map_id: map.id,
            expected: FRAME_LEN,
            actual: frame.len(),
        });
    }
    if frame[0] != PAGE_ID_RESULT {
        return Err(FrameError::UnexpectedPage {
            expected: PAGE_ID_RESULT,
            actual: frame[0],
        });
    }
    let declared = PAGE_HEADER_LEN + u16::from_le_bytes([frame[2], frame[3]]) as usize;
    if declared != frame.len() {
        return Err(FrameError::Length {
            spad_map_id: map.id,
            expected: declared,
            actual: frame.len(),
        });
    }

    let result_number = frame[OFFSET_RESULT_NUMBER];
    if let Some(previous) = previous {
        if !is_fresh(previous, result_number) {
            return Err(FrameError::Stale {
                result_number,
                previous,
            });
        }
    }

    let results = map
        .channels()
        .iter()
        .map(|&channel| {
            let (confidence, distance_mm) = zone_record(frame, channel);
            let (secondary_confidence, secondary_distance_mm) =
                zone_record(frame, channel + RESULT_CHANNELS);
            ZoneResult {
                confidence,
                distance_mm,
                secondary_confidence,
                secondary_distance_mm,
            }
        })
        .collect();

    Ok(Measurement {
        result_number,
        temperature_c: frame[OFFSET_TEMPERATURE] as i8,
        valid_results: frame[OFFSET_VALID_RESULTS],
        ambient_light: read_u32(frame, OFFSET_AMBIENT_LIGHT),
        photon_count: read_u32(frame, OFFSET_PHOTON_COUNT),
        reference_count: read_u32(frame, OFFSET_REFERENCE_COUNT),
        system_tick: read_u32(frame, OFFSET_SYSTEM_TICK),
        calibration_ok,
        spad_map_id: map.id,
        results,
        shape: map.shape(),
    })
}

fn zone_record(frame: &[u8], slot: usize) -> (u8, u16) {
    let at = RESULT_HEADER_LEN + slot * ZONE_RECORD_LEN;
    (frame[at], u16::from_le_bytes([frame[at + 1], frame[at + 2]]))
}

fn read_u32(frame: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
}
