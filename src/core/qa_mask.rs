//! Quality-assurance decoding.
//!
//! A QA raster is turned into a categorical [`QualityMask`]. Only the distinct
//! QA codes present in a scene are classified; the full-resolution mask is then
//! produced by a table lookup per pixel.
//!
//! Rules of a layout are evaluated in order and every matching rule overwrites
//! the category assigned so far, so the last matching rule wins.

use crate::types::{MaskCategory, PixelStatistics, QaRaster, QualityMask, Sensor};
use ndarray::Zip;

/// One classification rule of a QA layout
#[derive(Debug, Clone, Copy)]
pub struct QaRule {
    pub category: MaskCategory,
    pub matches: fn(u16) -> bool,
}

/// Sensor-specific interpretation of QA codes
#[derive(Debug, Clone, Copy)]
pub struct QaLayout {
    pub name: &'static str,
    pub rules: &'static [QaRule],
}

#[inline]
fn bit(value: u16, index: u32) -> bool {
    (value >> index) & 1 == 1
}

fn landsat_snow(v: u16) -> bool {
    bit(v, 5)
}

fn landsat_shadow(v: u16) -> bool {
    // dilated shadow, or high cloud-shadow confidence (bits 10-11 = 0b11)
    bit(v, 4) || (bit(v, 10) && bit(v, 11))
}

fn landsat_cloud(v: u16) -> bool {
    // cloud, dilated cloud, medium or high cloud confidence (bits 8-9 = 0b10 / 0b11),
    // high cirrus confidence (bits 14-15 = 0b11)
    bit(v, 3)
        || bit(v, 2)
        || (!bit(v, 8) && bit(v, 9))
        || (bit(v, 8) && bit(v, 9))
        || (bit(v, 14) && bit(v, 15))
}

fn landsat_fill(v: u16) -> bool {
    bit(v, 0)
}

/// Landsat Collection-2 `QA_PIXEL` bit layout (TM, ETM+ and OLI)
pub const LANDSAT_C2_QA_PIXEL: QaLayout = QaLayout {
    name: "Landsat C2 QA_PIXEL",
    rules: &[
        QaRule { category: MaskCategory::Snow, matches: landsat_snow },
        QaRule { category: MaskCategory::CloudShadow, matches: landsat_shadow },
        QaRule { category: MaskCategory::Cloud, matches: landsat_cloud },
        QaRule { category: MaskCategory::Fill, matches: landsat_fill },
    ],
};

fn scl_snow(v: u16) -> bool {
    v == 11
}

fn scl_shadow(v: u16) -> bool {
    v == 3
}

fn scl_cloud(v: u16) -> bool {
    matches!(v, 8 | 9 | 10)
}

fn scl_fill(v: u16) -> bool {
    matches!(v, 0 | 1)
}

/// Sentinel-2 L2A scene classification (SCL) layout
pub const SENTINEL2_SCL: QaLayout = QaLayout {
    name: "Sentinel-2 SCL",
    rules: &[
        QaRule { category: MaskCategory::Snow, matches: scl_snow },
        QaRule { category: MaskCategory::CloudShadow, matches: scl_shadow },
        QaRule { category: MaskCategory::Cloud, matches: scl_cloud },
        QaRule { category: MaskCategory::Fill, matches: scl_fill },
    ],
};

impl QaLayout {
    pub fn for_sensor(sensor: Sensor) -> &'static QaLayout {
        match sensor {
            Sensor::LandsatOli | Sensor::LandsatEtm | Sensor::LandsatTm => &LANDSAT_C2_QA_PIXEL,
            Sensor::Sentinel2Msi => &SENTINEL2_SCL,
        }
    }

    pub fn classify(&self, value: u16) -> MaskCategory {
        let mut category = MaskCategory::Valid;
        for rule in self.rules {
            if (rule.matches)(value) {
                category = rule.category;
            }
        }
        category
    }
}

/// Decoded mask together with its pixel counts
#[derive(Debug, Clone)]
pub struct DecodedMask {
    pub mask: QualityMask,
    pub statistics: PixelStatistics,
}

/// QA raster decoder parameterised by a [`QaLayout`]
#[derive(Debug, Clone, Copy)]
pub struct QualityMaskDecoder {
    layout: &'static QaLayout,
}

impl QualityMaskDecoder {
    pub fn new(layout: &'static QaLayout) -> Self {
        Self { layout }
    }

    pub fn for_sensor(sensor: Sensor) -> Self {
        Self::new(QaLayout::for_sensor(sensor))
    }

    pub fn layout(&self) -> &'static QaLayout {
        self.layout
    }

    /// Distinct QA codes of `qa` in ascending order
    pub fn distinct_values(qa: &QaRaster) -> Vec<u16> {
        let mut seen = vec![false; u16::MAX as usize + 1];
        for &value in qa.iter() {
            seen[value as usize] = true;
        }
        seen.iter()
            .enumerate()
            .filter(|(_, present)| **present)
            .map(|(value, _)| value as u16)
            .collect()
    }

    /// Category of every distinct QA code present in `qa`
    pub fn lookup_table(&self, qa: &QaRaster) -> Vec<(u16, MaskCategory)> {
        Self::distinct_values(qa)
            .into_iter()
            .map(|value| (value, self.layout.classify(value)))
            .collect()
    }

    pub fn decode(&self, qa: &QaRaster) -> DecodedMask {
        let table = self.lookup_table(qa);
        log::debug!(
            "{}: {} distinct QA codes in {}x{} raster",
            self.layout.name,
            table.len(),
            qa.nrows(),
            qa.ncols()
        );

        let mut lut = vec![MaskCategory::Valid.value(); u16::MAX as usize + 1];
        for (value, category) in &table {
            lut[*value as usize] = category.value();
        }

        #[cfg(feature = "parallel")]
        let mask = Zip::from(qa).par_map_collect(|&value| lut[value as usize]);
        #[cfg(not(feature = "parallel"))]
        let mask = Zip::from(qa).map_collect(|&value| lut[value as usize]);

        let statistics = PixelStatistics::from_mask(&mask);
        DecodedMask { mask, statistics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn landsat() -> QualityMaskDecoder {
        QualityMaskDecoder::for_sensor(Sensor::LandsatOli)
    }

    #[test]
    fn test_landsat_single_flags() {
        let layout = &LANDSAT_C2_QA_PIXEL;
        assert_eq!(layout.classify(0), MaskCategory::Valid);
        // Clear-sky land, low confidences (typical 21824 = 0b0101_0101_0100_0000)
        assert_eq!(layout.classify(21824), MaskCategory::Valid);
        assert_eq!(layout.classify(1 << 5), MaskCategory::Snow);
        assert_eq!(layout.classify(1 << 4), MaskCategory::CloudShadow);
        assert_eq!(layout.classify((1 << 10) | (1 << 11)), MaskCategory::CloudShadow);
        assert_eq!(layout.classify(1 << 10), MaskCategory::Valid);
        assert_eq!(layout.classify(1 << 3), MaskCategory::Cloud);
        assert_eq!(layout.classify(1 << 2), MaskCategory::Cloud);
        assert_eq!(layout.classify(1 << 9), MaskCategory::Cloud);
        assert_eq!(layout.classify((1 << 8) | (1 << 9)), MaskCategory::Cloud);
        assert_eq!(layout.classify(1 << 8), MaskCategory::Valid);
        assert_eq!(layout.classify((1 << 14) | (1 << 15)), MaskCategory::Cloud);
        assert_eq!(layout.classify(1), MaskCategory::Fill);
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let layout = &LANDSAT_C2_QA_PIXEL;
        // fill + snow: fill is evaluated last
        assert_eq!(layout.classify(1 | (1 << 5)), MaskCategory::Fill);
        // snow + shadow
        assert_eq!(layout.classify((1 << 5) | (1 << 4)), MaskCategory::CloudShadow);
        // shadow + cloud
        assert_eq!(layout.classify((1 << 4) | (1 << 3)), MaskCategory::Cloud);
        // everything
        assert_eq!(layout.classify(u16::MAX), MaskCategory::Fill);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let layout = &LANDSAT_C2_QA_PIXEL;
        for value in 0..=u16::MAX {
            assert_eq!(layout.classify(value), layout.classify(value));
        }
    }

    #[test]
    fn test_decode_full_raster() {
        let qa: QaRaster = array![
            [21824, 21824, 1],
            [1 << 5, 1 << 4, 1 << 3],
            [21824, 1 << 3, 21824]
        ];
        let decoded = landsat().decode(&qa);

        assert_eq!(decoded.mask, array![[0u8, 0, 2], [5, 4, 3], [0, 3, 0]]);
        assert_eq!(decoded.statistics.total, 9);
        assert_eq!(decoded.statistics.invalid, 5);
        assert_eq!(decoded.statistics.no_data, 1);
        assert_eq!(decoded.statistics.cloud, 3);
    }

    #[test]
    fn test_only_distinct_values_are_classified() {
        let qa = Array2::from_shape_fn((50, 40), |(r, c)| if (r + c) % 2 == 0 { 21824 } else { 1 });
        let table = landsat().lookup_table(&qa);
        assert_eq!(table, vec![(1, MaskCategory::Fill), (21824, MaskCategory::Valid)]);

        let stats = landsat().decode(&qa).statistics;
        assert_eq!(stats.total, 2000);
        assert_eq!(stats.no_data, 1000);
        assert!(stats.invalid <= stats.total);
    }

    #[test]
    fn test_sentinel2_scl_layout() {
        let decoder = QualityMaskDecoder::for_sensor(Sensor::Sentinel2Msi);
        assert_eq!(decoder.layout().name, "Sentinel-2 SCL");

        let scl: QaRaster = array![[0, 1, 3, 4], [8, 9, 10, 11]];
        let decoded = decoder.decode(&scl);
        assert_eq!(decoded.mask, array![[2u8, 2, 4, 0], [3, 3, 3, 5]]);
        assert_eq!(decoded.statistics.cloud, 4);
        assert_eq!(decoded.statistics.no_data, 2);
        assert_eq!(decoded.statistics.invalid, 7);
    }
}
