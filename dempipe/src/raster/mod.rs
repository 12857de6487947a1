//! Single-band elevation rasters.
//!
//! A [`Grid`] is an in-memory north-up raster: row 0 is the northern edge
//! and rows grow southwards. A [`Raster`] names a grid stored on disk and
//! opens it lazily.
//!
//! # Example
//!
//! ```ignore
//! use dempipe::raster::{GeoTransform, Grid, NODATA};
//!
//! let grid = Grid::filled(GeoTransform::new(85000.0, 447500.0, 0.5), 4, 4, NODATA);
//! dempipe::raster::write_geotiff(&path, &grid)?;
//! ```

mod geotiff;
mod ops;

pub use geotiff::{read_geotiff, write_geotiff, EPSG_CODE};
pub use ops::{crop, downsample, homogenize, merge, MERGE_PRECISION};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use geo::{coord, Rect};
use ndarray::Array2;
use thiserror::Error;

use crate::tile::Stage;

/// Value marking an unresolved cell.
pub const NODATA: f64 = -9999.0;

/// True when `value` is the NODATA sentinel (or not a number).
#[inline]
pub fn is_nodata(value: f64) -> bool {
    value.is_nan() || (value - NODATA).abs() < 1e-6
}

/// Errors from raster I/O and raster operations.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TIFF codec rejected the file.
    #[error("TIFF error in {path}: {reason}")]
    Tiff { path: PathBuf, reason: String },

    /// The file has no usable georeferencing.
    #[error("Missing georeferencing in {0}")]
    MissingTransform(PathBuf),

    /// Cropping left no cells.
    #[error("Clip of {name} produced no cells")]
    ClipFailure { name: String },

    /// Nothing to merge.
    #[error("No rasters to merge")]
    NothingToMerge,
}

// =============================================================================
// Georeferencing
// =============================================================================

/// North-up affine transform with square cells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform {
    /// X of the top-left corner.
    pub origin_x: f64,
    /// Y of the top-left corner.
    pub origin_y: f64,
    /// Cell edge length.
    pub cell_size: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_size,
        }
    }

    /// Centre of cell (row, col).
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_size,
            self.origin_y - (row as f64 + 0.5) * self.cell_size,
        )
    }

    /// Cell containing (x, y), possibly outside the grid.
    #[inline]
    pub fn cell_at(&self, x: f64, y: f64) -> (i64, i64) {
        (
            ((self.origin_y - y) / self.cell_size).floor() as i64,
            ((x - self.origin_x) / self.cell_size).floor() as i64,
        )
    }
}

// =============================================================================
// Grid
// =============================================================================

/// In-memory raster.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    pub transform: GeoTransform,
    /// Values indexed `[row, col]`.
    pub data: Array2<f64>,
}

impl Grid {
    /// Creates a grid with every cell set to `value`.
    pub fn filled(transform: GeoTransform, rows: usize, cols: usize, value: f64) -> Self {
        Self {
            transform,
            data: Array2::from_elem((rows, cols), value),
        }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Ground extent covered by the grid.
    pub fn bounds(&self) -> Rect<f64> {
        let t = &self.transform;
        Rect::new(
            coord! {
                x: t.origin_x,
                y: t.origin_y - self.rows() as f64 * t.cell_size,
            },
            coord! {
                x: t.origin_x + self.cols() as f64 * t.cell_size,
                y: t.origin_y,
            },
        )
    }

    /// Number of cells holding data.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !is_nodata(**v)).count()
    }

    /// Value at the cell containing (x, y), if inside and not NODATA.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (row, col) = self.transform.cell_at(x, y);
        if row < 0 || col < 0 || row as usize >= self.rows() || col as usize >= self.cols() {
            return None;
        }
        let value = self.data[[row as usize, col as usize]];
        (!is_nodata(value)).then_some(value)
    }
}

impl AsRef<Grid> for Grid {
    fn as_ref(&self) -> &Grid {
        self
    }
}

// =============================================================================
// Raster handle
// =============================================================================

/// A named raster file at a processing stage, opened on demand.
#[derive(Clone, Debug)]
pub struct Raster {
    name: String,
    path: PathBuf,
    stage: Stage,
    handle: Option<Arc<Grid>>,
}

impl Raster {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, stage: Stage) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            stage,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Reads the file on first use and returns the grid.
    pub fn open(&mut self) -> Result<Arc<Grid>, RasterError> {
        if let Some(grid) = &self.handle {
            return Ok(Arc::clone(grid));
        }
        let grid = Arc::new(read_geotiff(&self.path)?);
        self.handle = Some(Arc::clone(&grid));
        Ok(grid)
    }

    /// Releases the in-memory grid.
    pub fn close(&mut self) {
        self.handle = None;
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Replaces the file content and drops any open handle.
    pub fn overwrite(&mut self, grid: &Grid) -> Result<(), RasterError> {
        write_geotiff(&self.path, grid)?;
        self.handle = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Product;

    #[test]
    fn test_cell_center_and_lookup() {
        let t = GeoTransform::new(100.0, 200.0, 0.5);
        assert_eq!(t.cell_center(0, 0), (100.25, 199.75));
        assert_eq!(t.cell_at(100.25, 199.75), (0, 0));
        assert_eq!(t.cell_at(101.1, 198.9), (2, 2));
        assert_eq!(t.cell_at(99.9, 200.1), (-1, -1));
    }

    #[test]
    fn test_grid_bounds_and_sample() {
        let mut grid = Grid::filled(GeoTransform::new(0.0, 10.0, 1.0), 10, 5, NODATA);
        grid.data[[0, 0]] = 3.0;
        let b = grid.bounds();
        assert_eq!((b.min().x, b.min().y, b.max().x, b.max().y), (0.0, 0.0, 5.0, 10.0));
        assert_eq!(grid.sample(0.5, 9.5), Some(3.0));
        assert_eq!(grid.sample(1.5, 9.5), None);
        assert_eq!(grid.sample(6.0, 9.5), None);
        assert_eq!(grid.valid_count(), 1);
    }

    #[test]
    fn test_is_nodata() {
        assert!(is_nodata(NODATA));
        assert!(is_nodata(-9999.0f32 as f64));
        assert!(is_nodata(f64::NAN));
        assert!(!is_nodata(0.0));
    }

    #[test]
    fn test_raster_open_is_lazy() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("r.TIF");
        let grid = Grid::filled(GeoTransform::new(0.0, 2.0, 1.0), 2, 2, 1.5);
        write_geotiff(&path, &grid).unwrap();

        let mut raster = Raster::new("R", &path, Stage::Interpolated(Product::Dtm));
        assert!(!raster.is_open());
        let opened = raster.open().unwrap();
        assert!(raster.is_open());
        assert_eq!(opened.data[[1, 1]], 1.5);
        raster.close();
        assert!(!raster.is_open());
    }
}
