//! Pre-programmed SPAD maps: zone geometry, result channel layout and the
//! minimum chip variant that supports each map.

use crate::types::ChipVariant;
use crate::types::ChipVariant::{Tmf8820, Tmf8821};

/// Result channels in one measurement frame.
pub const RESULT_CHANNELS: usize = 18;

/// Physical zone arrangement of a SPAD map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Grid { rows: usize, columns: usize },
    /// User-programmed map; zones have no fixed 2-D arrangement.
    UserDefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpadMap {
    pub id: u8,
    pub geometry: Geometry,
    pub min_variant: ChipVariant,
    /// Result channels that carry zones, in row-major zone order.
    channels: &'static [usize],
}

static CHANNELS_3X3: [usize; 9] = [0, 1, 2, 3, 4, 5, 6, 7, 8];
// The 4x4 maps are measured as two 8-zone halves; channel 8 is unused.
static CHANNELS_4X4: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 9, 10, 11, 12, 13, 14, 15, 16];
static CHANNELS_ALL: [usize; RESULT_CHANNELS] =
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17];

const fn grid(
    id: u8,
    rows: usize,
    columns: usize,
    min_variant: ChipVariant,
    channels: &'static [usize],
) -> SpadMap {
    SpadMap {
        id,
        geometry: Geometry::Grid { rows, columns },
        min_variant,
        channels,
    }
}

const fn user_defined(id: u8, channels: &'static [usize]) -> SpadMap {
    SpadMap {
        id,
        geometry: Geometry::UserDefined,
        min_variant: Tmf8820,
        channels,
    }
}

static SPAD_MAPS: [SpadMap; 13] = [
    grid(1, 3, 3, Tmf8820, &CHANNELS_3X3),  // normal field of view
    grid(2, 3, 3, Tmf8820, &CHANNELS_3X3),  // macro, upper
    grid(3, 3, 3, Tmf8820, &CHANNELS_3X3),  // wide
    grid(4, 4, 4, Tmf8821, &CHANNELS_4X4),  // normal
    grid(5, 3, 3, Tmf8820, &CHANNELS_3X3),  // macro, lower
    grid(6, 3, 3, Tmf8820, &CHANNELS_3X3),  // narrow
    grid(7, 4, 4, Tmf8821, &CHANNELS_4X4),  // wide
    grid(10, 3, 6, Tmf8821, &CHANNELS_ALL),
    grid(11, 3, 3, Tmf8820, &CHANNELS_3X3), // checkerboard
    grid(12, 3, 3, Tmf8820, &CHANNELS_3X3), // inverted checkerboard
    grid(13, 3, 3, Tmf8820, &CHANNELS_3X3), // wide, half density
    user_defined(14, &CHANNELS_ALL),
    user_defined(15, &CHANNELS_ALL),
];

/// Look up a SPAD map by id.
pub fn lookup(id: u8) -> Option<&'static SpadMap> {
    SPAD_MAPS.iter().find(|m| m.id == id)
}

/// All maps with a known layout.
pub fn all() -> impl Iterator<Item = &'static SpadMap> {
    SPAD_MAPS.iter()
}

impl SpadMap {
    /// Number of zones reported per measurement.
    pub fn zone_count(&self) -> usize {
        self.channels.len()
    }

    /// Result channels carrying zones, in row-major order.
    pub fn channels(&self) -> &'static [usize] {
        self.channels
    }

    /// `(rows, columns)`, or `None` for user-defined maps.
    pub fn shape(&self) -> Option<(usize, usize)> {
        match self.geometry {
            Geometry::Grid { rows, columns } => Some((rows, columns)),
            Geometry::UserDefined => None,
        }
    }

    /// Whether `variant` has this map pre-programmed.
    pub fn supported_by(&self, variant: ChipVariant) -> bool {
        variant >= self.min_variant
    }
}
