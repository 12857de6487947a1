//! On-disk layout of inputs, intermediate files and products.
//!
//! ```text
//! <source>/C_<TILE>.LAZ                                 main tile point cloud
//! <processing>/<TILE>/subtiles/<i>.LAS                  clipped sub-tile
//! <processing>/<TILE>/interpolated_dtm/<i>.TIF          sub-tile DTM raster
//! <processing>/<TILE>/interpolated_dsm/<i>.TIF          sub-tile DSM raster
//! <finished>/M_<TILE>.TIF  /  R_<TILE>.TIF              merged DTM / DSM
//! <finished>/M5_<TILE>.TIF /  R5_<TILE>.TIF             downsampled DTM / DSM
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::TileId;
use crate::config::{ConfigError, FolderPaths};

/// Elevation product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Product {
    /// Bare-earth terrain model.
    Dtm,
    /// Surface model including buildings and vegetation.
    Dsm,
}

impl Product {
    pub const ALL: [Product; 2] = [Product::Dtm, Product::Dsm];

    fn folder(self) -> &'static str {
        match self {
            Product::Dtm => "interpolated_dtm",
            Product::Dsm => "interpolated_dsm",
        }
    }

    fn merged_prefix(self) -> &'static str {
        match self {
            Product::Dtm => "M_",
            Product::Dsm => "R_",
        }
    }

    fn downsampled_prefix(self) -> &'static str {
        match self {
            Product::Dtm => "M5_",
            Product::Dsm => "R5_",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::Dtm => f.write_str("dtm"),
            Product::Dsm => f.write_str("dsm"),
        }
    }
}

/// Processing stage of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Subtiling,
    Interpolated(Product),
    Merged(Product),
    Downsampled(Product),
}

impl Stage {
    /// Product carried by raster stages.
    pub fn product(self) -> Option<Product> {
        match self {
            Stage::Subtiling => None,
            Stage::Interpolated(p) | Stage::Merged(p) | Stage::Downsampled(p) => Some(p),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Subtiling => f.write_str("subtiling"),
            Stage::Interpolated(p) => write!(f, "interpolated_{}", p),
            Stage::Merged(p) => write!(f, "merged_{}", p),
            Stage::Downsampled(p) => write!(f, "downsampled_{}", p),
        }
    }
}

/// Resolves file locations for every stage.
#[derive(Clone, Debug)]
pub struct Layout {
    folders: FolderPaths,
    /// Uppercase file stem → path of every file in the source folder.
    source_files: HashMap<String, PathBuf>,
}

impl Layout {
    /// Creates a layout, indexing the source folder once.
    ///
    /// A missing source folder is tolerated; every main tile then resolves
    /// to its default `C_<TILE>.LAZ` path.
    pub fn new(folders: FolderPaths) -> Self {
        let mut source_files = HashMap::new();
        match fs::read_dir(&folders.source_tiles) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        source_files.insert(stem.to_uppercase(), path);
                    }
                }
            }
            Err(e) => {
                warn!(
                    folder = %folders.source_tiles.display(),
                    error = %e,
                    "Source tile folder not readable"
                );
            }
        }
        Self {
            folders,
            source_files,
        }
    }

    pub fn folders(&self) -> &FolderPaths {
        &self.folders
    }

    /// Input point cloud of a MAIN tile.
    ///
    /// A file whose stem equals the tile name wins; otherwise the standard
    /// `C_<TILE>.LAZ` name is used.
    pub fn main_tile_path(&self, id: &TileId) -> PathBuf {
        if let Some(path) = self.source_files.get(id.as_str()) {
            return path.clone();
        }
        let standard = format!("C_{}", id);
        if let Some(path) = self.source_files.get(&standard) {
            return path.clone();
        }
        self.folders.source_tiles.join(format!("{}.LAZ", standard))
    }

    /// Working folder of one MAIN tile for a stage.
    pub fn stage_dir(&self, parent: &TileId, stage: Stage) -> PathBuf {
        let base = self.folders.processing.join(parent.as_str());
        match stage {
            Stage::Subtiling => base.join("subtiles"),
            Stage::Interpolated(product) => base.join(product.folder()),
            Stage::Merged(_) | Stage::Downsampled(_) => self.folders.finished.clone(),
        }
    }

    /// Clipped point cloud of sub-tile `index`.
    pub fn subtile_path(&self, parent: &TileId, index: usize) -> PathBuf {
        self.stage_dir(parent, Stage::Subtiling)
            .join(format!("{}.LAS", index))
    }

    /// Interpolated raster of sub-tile `index`.
    pub fn interpolated_path(&self, parent: &TileId, index: usize, product: Product) -> PathBuf {
        self.stage_dir(parent, Stage::Interpolated(product))
            .join(format!("{}.TIF", index))
    }

    /// Merged full-tile raster.
    pub fn merged_path(&self, tile: &TileId, product: Product) -> PathBuf {
        self.folders
            .finished
            .join(format!("{}{}.TIF", product.merged_prefix(), tile))
    }

    /// Downsampled overview raster.
    pub fn downsampled_path(&self, tile: &TileId, product: Product) -> PathBuf {
        self.folders
            .finished
            .join(format!("{}{}.TIF", product.downsampled_prefix(), tile))
    }

    /// Polygon layers flattened in every product.
    pub fn water_polygon_dir(&self) -> PathBuf {
        self.folders.flattening_polygons.clone()
    }

    /// Polygon layers flattened in the DTM only.
    pub fn building_polygon_dir(&self) -> PathBuf {
        self.folders.flattening_polygons.join("buildings")
    }

    /// Polygon layers used to homogenize merged rasters.
    pub fn homogenization_polygon_dir(&self) -> PathBuf {
        self.folders.flattening_polygons.join("homogenization")
    }
}

/// Creates the parent folder of `path` if needed.
pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Lists the tiles to process from `C_<SHEET>.LAZ` file names.
///
/// Returns the sheet names sorted, and fails when none are found.
pub fn discover_targets(folder: &Path) -> Result<Vec<TileId>, ConfigError> {
    let mut targets = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let is_laz = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("laz"));
        if !is_laz {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match stem.split_once('_') {
            Some((_, sheet)) if !sheet.is_empty() => targets.push(TileId::new(sheet)),
            _ => warn!(file = %path.display(), "Skipping target with unexpected name"),
        }
    }
    if targets.is_empty() {
        return Err(ConfigError::NoTargets(folder.to_path_buf()));
    }
    targets.sort();
    targets.dedup();
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_paths() {
        let layout = Layout::new(FolderPaths::under("/data"));
        let tile = TileId::new("37en1");

        assert_eq!(
            layout.subtile_path(&tile, 3),
            PathBuf::from("/data/processing/37EN1/subtiles/3.LAS")
        );
        assert_eq!(
            layout.interpolated_path(&tile, 3, Product::Dsm),
            PathBuf::from("/data/processing/37EN1/interpolated_dsm/3.TIF")
        );
        assert_eq!(
            layout.merged_path(&tile, Product::Dtm),
            PathBuf::from("/data/finished/M_37EN1.TIF")
        );
        assert_eq!(
            layout.downsampled_path(&tile, Product::Dsm),
            PathBuf::from("/data/finished/R5_37EN1.TIF")
        );
    }

    #[test]
    fn test_main_tile_path_prefers_existing_file() {
        let dir = TempDir::new().unwrap();
        let folders = FolderPaths::under(dir.path());
        fs::create_dir_all(&folders.source_tiles).unwrap();
        fs::write(folders.source_tiles.join("c_37en1.laz"), b"").unwrap();
        fs::write(folders.source_tiles.join("37EN2.las"), b"").unwrap();

        let layout = Layout::new(folders.clone());
        assert_eq!(
            layout.main_tile_path(&TileId::new("37EN1")),
            folders.source_tiles.join("c_37en1.laz")
        );
        assert_eq!(
            layout.main_tile_path(&TileId::new("37EN2")),
            folders.source_tiles.join("37EN2.las")
        );
        assert_eq!(
            layout.main_tile_path(&TileId::new("37EN3")),
            folders.source_tiles.join("C_37EN3.LAZ")
        );
    }

    #[test]
    fn test_discover_targets() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("C_37HN1.LAZ"), b"").unwrap();
        fs::write(dir.path().join("C_25bz2.laz"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let targets = discover_targets(dir.path()).unwrap();
        assert_eq!(targets, vec![TileId::new("25BZ2"), TileId::new("37HN1")]);
    }

    #[test]
    fn test_discover_targets_empty_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            discover_targets(dir.path()),
            Err(ConfigError::NoTargets(_))
        ));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Interpolated(Product::Dtm).to_string(), "interpolated_dtm");
        assert_eq!(Stage::Merged(Product::Dsm).product(), Some(Product::Dsm));
        assert_eq!(Stage::Subtiling.product(), None);
    }
}
