//! Band name translation.
//!
//! Vendors name the same band in many ways (`B2`, `b02`, `BLUE`, ...) and the
//! band number behind a physical wavelength changes between sensor
//! generations. Every lookup therefore goes through a per-sensor alias table.

use crate::types::Sensor;
use serde::{Deserialize, Serialize};

/// Canonical, sensor-independent band identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    B01,
    B02,
    B03,
    B04,
    B05,
    B06,
    B07,
    B08,
    B8A,
    B09,
    B10,
    B11,
    B12,
    /// Raw quality-assurance layer (Landsat QA_PIXEL, Sentinel-2 SCL)
    Qa,
    /// Decoded quality mask, derived from [`Band::Qa`]
    Mask,
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::B01 => "B01",
            Band::B02 => "B02",
            Band::B03 => "B03",
            Band::B04 => "B04",
            Band::B05 => "B05",
            Band::B06 => "B06",
            Band::B07 => "B07",
            Band::B08 => "B08",
            Band::B8A => "B8A",
            Band::B09 => "B09",
            Band::B10 => "B10",
            Band::B11 => "B11",
            Band::B12 => "B12",
            Band::Qa => "QA",
            Band::Mask => "MASK",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

type AliasTable = &'static [(Band, &'static [&'static str])];

const OLI_ALIASES: AliasTable = &[
    (Band::B01, &["B1", "b1", "B01", "b01", "Coastal Aerosol", "Aerosol", "aerosol"]),
    (Band::B02, &["B2", "b2", "B02", "b02", "BLUE", "blue"]),
    (Band::B03, &["B3", "b3", "B03", "b03", "GREEN", "green"]),
    (Band::B04, &["B4", "b4", "B04", "b04", "RED", "red"]),
    (Band::B05, &["B5", "b5", "B05", "b05", "NIR", "nir"]),
    (Band::B06, &["B6", "b6", "B06", "b06", "SWIR1", "swir1"]),
    (Band::B07, &["B7", "b7", "B07", "b07", "SWIR2", "swir2"]),
    (Band::B08, &["B8", "b8", "B08", "b08", "Panchromatic", "panchromatic"]),
    (Band::B09, &["B9", "b9", "B09", "b09", "Cirrus", "cirrus"]),
    (Band::B10, &["B10", "b10", "TIRS1"]),
    (Band::B11, &["B11", "b11", "TIRS2"]),
    (Band::Qa, &["QA_PIXEL", "QA", "qa"]),
    (Band::Mask, &["MASK", "mask", "Mask"]),
];

// TM and ETM+ share the pre-OLI numbering
const ETM_ALIASES: AliasTable = &[
    (Band::B01, &["B1", "b1", "B01", "b01", "BLUE", "blue"]),
    (Band::B02, &["B2", "b2", "B02", "b02", "GREEN", "green"]),
    (Band::B03, &["B3", "b3", "B03", "b03", "RED", "red"]),
    (Band::B04, &["B4", "b4", "B04", "b04", "NIR", "nir"]),
    (Band::B05, &["B5", "b5", "B05", "b05", "SWIR1", "swir1"]),
    (Band::B06, &["B6", "b6", "B06", "b06", "THERMAL", "thermal"]),
    (Band::B07, &["B7", "b7", "B07", "b07", "SWIR2", "swir2"]),
    (Band::B08, &["B8", "b8", "B08", "b08", "Panchromatic", "panchromatic"]),
    (Band::Qa, &["QA_PIXEL", "QA", "qa"]),
    (Band::Mask, &["MASK", "mask", "Mask"]),
];

const MSI_ALIASES: AliasTable = &[
    (Band::B01, &["B1", "b1", "B01", "b01", "Coastal Aerosol", "Aerosol", "aerosol"]),
    (Band::B02, &["B2", "b2", "B02", "b02", "BLUE", "blue"]),
    (Band::B03, &["B3", "b3", "B03", "b03", "GREEN", "green"]),
    (Band::B04, &["B4", "b4", "B04", "b04", "RED", "red"]),
    (Band::B05, &["B5", "b5", "B05", "b05", "RE1", "re1", "RedEdge1"]),
    (Band::B06, &["B6", "b6", "B06", "b06", "RE2", "re2", "RedEdge2"]),
    (Band::B07, &["B7", "b7", "B07", "b07", "RE3", "re3", "RedEdge3"]),
    (Band::B08, &["B8", "b8", "B08", "b08", "NIR", "nir"]),
    (Band::B8A, &["B8A", "b8a", "B8a", "NIR2", "nir2", "NarrowNIR"]),
    (Band::B09, &["B9", "b9", "B09", "b09", "WV", "wv", "WaterVapour"]),
    (Band::B10, &["B10", "b10", "Cirrus", "cirrus"]),
    (Band::B11, &["B11", "b11", "SWIR1", "swir1"]),
    (Band::B12, &["B12", "b12", "SWIR2", "swir2"]),
    (Band::Qa, &["SCL", "scl", "QA", "qa"]),
    (Band::Mask, &["MASK", "mask", "Mask"]),
];

/// Alias lookup for one sensor
#[derive(Debug, Clone, Copy)]
pub struct BandTranslator {
    sensor: Sensor,
    table: AliasTable,
}

impl BandTranslator {
    pub fn for_sensor(sensor: Sensor) -> Self {
        let table = match sensor {
            Sensor::LandsatOli => OLI_ALIASES,
            Sensor::LandsatEtm | Sensor::LandsatTm => ETM_ALIASES,
            Sensor::Sentinel2Msi => MSI_ALIASES,
        };
        Self { sensor, table }
    }

    pub fn sensor(&self) -> Sensor {
        self.sensor
    }

    /// Resolve a raw or canonical band name.
    ///
    /// Returns `None` for names the sensor does not know; callers decide
    /// whether that is worth a warning.
    pub fn translate(&self, raw: &str) -> Option<Band> {
        self.table
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|alias| *alias == raw))
            .map(|(band, _)| *band)
    }

    pub fn aliases(&self, band: Band) -> &'static [&'static str] {
        self.table
            .iter()
            .find(|(candidate, _)| *candidate == band)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }

    pub fn bands(&self) -> impl Iterator<Item = Band> + '_ {
        self.table.iter().map(|(band, _)| *band)
    }
}

/// Shorthand for `BandTranslator::for_sensor(sensor).translate(raw)`
pub fn translate(sensor: Sensor, raw: &str) -> Option<Band> {
    BandTranslator::for_sensor(sensor).translate(raw)
}
