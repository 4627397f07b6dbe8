//! Tile registry: discovers scene directories below a dataset root.

use crate::types::{Mission, TileError, TileResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Length of a Landsat Collection-2 product identifier
const LANDSAT_PRODUCT_ID_LEN: usize = 40;

/// Landsat Collection-2 Level-2 surface product, e.g.
/// `LC08_L2SP_190028_20220615_20220627_02_T1`
const LANDSAT_L2SP_PATTERN: &str = r"^L[CEOT]0[4-9]_L2SP_(\d{6})_\d{8}_\d{8}_\d{2}_(T1|T2|RT)$";

/// Sentinel-2 Level-2A product, e.g.
/// `S2A_MSIL2A_20220615T101559_N0400_R065_T32TQM_20220615T152512.SAFE`
const SENTINEL2_L2A_PATTERN: &str = r"^S2[A-D]_MSIL2A_\d{8}T\d{6}_N\d{4}_R\d{3}_(T\d{2}[A-Z]{3})_\d{8}T\d{6}\.SAFE$";

/// Recognises scene directories of one mission and extracts their tile id
#[derive(Debug, Clone)]
pub struct SceneNameMatcher {
    mission: Mission,
    pattern: Regex,
}

impl SceneNameMatcher {
    pub fn new(mission: Mission) -> TileResult<Self> {
        let source = match mission {
            Mission::Landsat => LANDSAT_L2SP_PATTERN,
            Mission::Sentinel2 => SENTINEL2_L2A_PATTERN,
        };
        let pattern = Regex::new(source).map_err(|e| TileError::Processing(format!("Regex error: {}", e)))?;
        Ok(Self { mission, pattern })
    }

    /// Tile id of a scene directory name, `None` if the name is not a scene
    pub fn tile_of(&self, name: &str) -> Option<String> {
        if self.mission == Mission::Landsat && name.len() != LANDSAT_PRODUCT_ID_LEN {
            return None;
        }
        self.pattern
            .captures(name)
            .and_then(|captures| captures.get(1))
            .map(|tile| tile.as_str().to_string())
    }
}

/// Map every tile id found below `root` to its scene directories.
///
/// Directories that do not follow the mission's product naming are skipped
/// silently. Scene directories are not descended into. Paths are sorted per tile.
pub fn scan<P: AsRef<Path>>(root: P, mission: Mission) -> TileResult<BTreeMap<String, Vec<PathBuf>>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(TileError::Config(format!("Dataset root is not a directory: {}", root.display())));
    }

    let matcher = SceneNameMatcher::new(mission)?;
    let mut tiles: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    let mut walker = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Cannot read directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = match entry.file_name().to_str() {
            Some(name) => name,
            None => continue,
        };

        if let Some(tile) = matcher.tile_of(name) {
            tiles.entry(tile).or_default().push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }

    for (tile, scenes) in tiles.iter_mut() {
        scenes.sort();
        log::info!("Tile {} has been added ({} scene(s))", tile, scenes.len());
    }

    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_landsat_names() {
        let matcher = SceneNameMatcher::new(Mission::Landsat).unwrap();
        assert_eq!(
            matcher.tile_of("LC08_L2SP_190028_20220615_20220627_02_T1"),
            Some("190028".to_string())
        );
        assert_eq!(
            matcher.tile_of("LE07_L2SP_190028_20020615_20200916_02_T1"),
            Some("190028".to_string())
        );
        assert_eq!(
            matcher.tile_of("LT05_L2SP_190028_19990615_20200916_02_T2"),
            Some("190028".to_string())
        );
        // Level-1 product, truncated and extended names
        assert_eq!(matcher.tile_of("LC08_L1TP_190028_20220615_20220627_02_T1"), None);
        assert_eq!(matcher.tile_of("LC08_L2SP_190028_20220615_20220627_02_T"), None);
        assert_eq!(matcher.tile_of("LC08_L2SP_190028_20220615_20220627_02_T1_x"), None);
    }

    #[test]
    fn test_sentinel2_names() {
        let matcher = SceneNameMatcher::new(Mission::Sentinel2).unwrap();
        assert_eq!(
            matcher.tile_of("S2A_MSIL2A_20220615T101559_N0400_R065_T32TQM_20220615T152512.SAFE"),
            Some("T32TQM".to_string())
        );
        assert_eq!(
            matcher.tile_of("S2B_MSIL1C_20220615T101559_N0400_R065_T32TQM_20220615T152512.SAFE"),
            None
        );
    }

    #[test]
    fn test_scan_groups_by_tile() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for name in [
            "2022/LC08_L2SP_190028_20220615_20220627_02_T1",
            "2022/LC08_L2SP_190028_20220501_20220510_02_T1",
            "LC08_L2SP_191028_20220615_20220627_02_T1",
            "LC08_L2SP_190028_20220615_20220627_02_T1_extracted",
            "downloads/partial",
        ] {
            std::fs::create_dir_all(root.join(name)).unwrap();
        }
        std::fs::write(root.join("LC08_L2SP_192028_20220615_20220627_02_T1"), b"").unwrap();

        let tiles = scan(root, Mission::Landsat).unwrap();
        assert_eq!(tiles.keys().collect::<Vec<_>>(), vec!["190028", "191028"]);
        assert_eq!(tiles["190028"].len(), 2);
        assert!(tiles["190028"][0] < tiles["190028"][1]);
        assert_eq!(tiles["191028"].len(), 1);
    }

    #[test]
    fn test_scan_one_match_one_miss() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("LC08_L2SP_190028_20220615_20220627_02_T1")).unwrap();
        std::fs::create_dir_all(temp.path().join("not_a_scene")).unwrap();

        let tiles = scan(temp.path(), Mission::Landsat).unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles["190028"].len(), 1);
    }

    #[test]
    fn test_scan_missing_root() {
        assert!(matches!(
            scan("/definitely/not/here", Mission::Landsat),
            Err(TileError::Config(_))
        ));
    }
}
