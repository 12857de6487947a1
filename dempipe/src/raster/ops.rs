//! Crop, merge, homogenize and downsample.
//!
//! All operations work on north-up grids that share a cell size. Window
//! arithmetic snaps ground coordinates to cell edges by rounding, so float
//! drift in tile bounds never produces off-by-one windows.

use geo::{BoundingRect, Intersects, Polygon, Rect};
use ndarray::s;

use super::{is_nodata, GeoTransform, Grid, RasterError, NODATA};
use crate::vector::covered_cells;

/// Decimal places used when deriving merged grid dimensions.
pub const MERGE_PRECISION: i32 = 5;

fn round_to(value: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (value * factor).round() / factor
}

/// Cuts the window of `grid` lying inside `bounds`.
///
/// Fails with [`RasterError::ClipFailure`] when the window is empty.
pub fn crop(grid: &Grid, bounds: Rect<f64>, name: &str) -> Result<Grid, RasterError> {
    let t = &grid.transform;
    let snap = |v: f64| v.round().max(0.0) as usize;

    let col0 = snap((bounds.min().x - t.origin_x) / t.cell_size).min(grid.cols());
    let col1 = snap((bounds.max().x - t.origin_x) / t.cell_size).min(grid.cols());
    let row0 = snap((t.origin_y - bounds.max().y) / t.cell_size).min(grid.rows());
    let row1 = snap((t.origin_y - bounds.min().y) / t.cell_size).min(grid.rows());

    if col1 <= col0 || row1 <= row0 {
        return Err(RasterError::ClipFailure {
            name: name.to_string(),
        });
    }

    let transform = GeoTransform::new(
        t.origin_x + col0 as f64 * t.cell_size,
        t.origin_y - row0 as f64 * t.cell_size,
        t.cell_size,
    );
    Ok(Grid {
        transform,
        data: grid.data.slice(s![row0..row1, col0..col1]).to_owned(),
    })
}

/// Mosaics `grids` into a new grid covering `bounds`.
///
/// The cell size is taken from the first grid. The output size is the
/// bounds span divided by the cell size, rounded to `precision` decimals and
/// then up. Where sources overlap, the first valid value wins.
pub fn merge<G: AsRef<Grid>>(
    grids: &[G],
    bounds: Rect<f64>,
    precision: i32,
) -> Result<Grid, RasterError> {
    let first = grids.first().ok_or(RasterError::NothingToMerge)?;
    let cell = first.as_ref().transform.cell_size;

    let cols = round_to(bounds.width() / cell, precision).ceil().max(0.0) as usize;
    let rows = round_to(bounds.height() / cell, precision).ceil().max(0.0) as usize;
    let transform = GeoTransform::new(bounds.min().x, bounds.max().y, cell);
    let mut out = Grid::filled(transform, rows, cols, NODATA);

    for grid in grids {
        let grid = grid.as_ref();
        for ((row, col), &value) in grid.data.indexed_iter() {
            if is_nodata(value) {
                continue;
            }
            let (x, y) = grid.transform.cell_center(row, col);
            let (r, c) = transform.cell_at(x, y);
            if r < 0 || c < 0 || r as usize >= rows || c as usize >= cols {
                continue;
            }
            let target = &mut out.data[[r as usize, c as usize]];
            if is_nodata(*target) {
                *target = value;
            }
        }
    }

    Ok(out)
}

/// Replaces the valid cells under each polygon with their mean.
///
/// Polygons that miss the grid or cover no valid cell are ignored. Returns
/// the number of polygons applied.
pub fn homogenize(grid: &mut Grid, polygons: &[Polygon<f64>]) -> usize {
    let extent = grid.bounds();
    let mut applied = 0;

    for polygon in polygons {
        let touches = polygon
            .bounding_rect()
            .is_some_and(|bbox| bbox.intersects(&extent));
        if !touches {
            continue;
        }

        let cells: Vec<(usize, usize)> =
            covered_cells(&grid.transform, grid.rows(), grid.cols(), polygon)
                .into_iter()
                .filter(|&(r, c)| !is_nodata(grid.data[[r, c]]))
                .collect();
        if cells.is_empty() {
            continue;
        }

        let mean = cells.iter().map(|&(r, c)| grid.data[[r, c]]).sum::<f64>() / cells.len() as f64;
        for (r, c) in cells {
            grid.data[[r, c]] = mean;
        }
        applied += 1;
    }

    applied
}

/// Resamples `grid` to `cell_size` by nearest neighbor.
pub fn downsample(grid: &Grid, cell_size: f64) -> Grid {
    let extent = grid.bounds();
    let cols = (round_to(extent.width() / cell_size, MERGE_PRECISION).round() as usize).max(1);
    let rows = (round_to(extent.height() / cell_size, MERGE_PRECISION).round() as usize).max(1);
    let transform = GeoTransform::new(grid.transform.origin_x, grid.transform.origin_y, cell_size);

    let mut out = Grid::filled(transform, rows, cols, NODATA);
    for ((row, col), value) in out.data.indexed_iter_mut() {
        let (x, y) = transform.cell_center(row, col);
        if let Some(v) = grid.sample(x, y) {
            *value = v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, polygon};
    use std::sync::Arc;

    fn rect(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Rect<f64> {
        Rect::new(coord! { x: minx, y: miny }, coord! { x: maxx, y: maxy })
    }

    fn ramp(origin_x: f64, origin_y: f64, rows: usize, cols: usize) -> Grid {
        let mut grid = Grid::filled(GeoTransform::new(origin_x, origin_y, 1.0), rows, cols, 0.0);
        for ((r, c), v) in grid.data.indexed_iter_mut() {
            *v = (r * 100 + c) as f64;
        }
        grid
    }

    #[test]
    fn test_crop_removes_buffer() {
        let grid = ramp(-2.0, 12.0, 14, 14);
        let cropped = crop(&grid, rect(0.0, 0.0, 10.0, 10.0), "1").unwrap();

        assert_eq!(cropped.rows(), 10);
        assert_eq!(cropped.cols(), 10);
        assert_eq!(cropped.transform.origin_x, 0.0);
        assert_eq!(cropped.transform.origin_y, 10.0);
        assert_eq!(cropped.data[[0, 0]], grid.data[[2, 2]]);
    }

    #[test]
    fn test_crop_tolerates_float_drift() {
        let grid = ramp(0.0, 10.0, 10, 10);
        let cropped = crop(&grid, rect(0.0000001, 0.0, 9.9999999, 10.0), "1").unwrap();
        assert_eq!(cropped.cols(), 10);
    }

    #[test]
    fn test_crop_outside_fails() {
        let grid = ramp(0.0, 10.0, 10, 10);
        let err = crop(&grid, rect(20.0, 20.0, 30.0, 30.0), "7").unwrap_err();
        assert!(matches!(err, RasterError::ClipFailure { name } if name == "7"));
    }

    #[test]
    fn test_merge_places_tiles_and_first_wins() {
        let left = Grid::filled(GeoTransform::new(0.0, 4.0, 1.0), 4, 3, 1.0);
        let right = Grid::filled(GeoTransform::new(2.0, 4.0, 1.0), 4, 2, 2.0);

        let merged = merge(&[Arc::new(left), Arc::new(right)], rect(0.0, 0.0, 4.0, 4.0), MERGE_PRECISION)
            .unwrap();

        assert_eq!((merged.rows(), merged.cols()), (4, 4));
        assert_eq!(merged.data[[0, 0]], 1.0);
        // column 2 is covered by both; the first grid wins
        assert_eq!(merged.data[[0, 2]], 1.0);
        assert_eq!(merged.data[[0, 3]], 2.0);
    }

    #[test]
    fn test_merge_fills_gaps_with_nodata_and_skips_nodata_sources() {
        let mut a = Grid::filled(GeoTransform::new(0.0, 2.0, 1.0), 2, 2, 5.0);
        a.data[[0, 0]] = NODATA;
        let b = Grid::filled(GeoTransform::new(0.0, 2.0, 1.0), 2, 2, 7.0);

        let merged = merge(&[a, b].map(Arc::new), rect(0.0, 0.0, 3.0, 2.0), MERGE_PRECISION).unwrap();
        assert_eq!(merged.data[[0, 0]], 7.0);
        assert_eq!(merged.data[[1, 1]], 5.0);
        assert_eq!(merged.data[[0, 2]], NODATA);
    }

    #[test]
    fn test_merge_rounds_dimensions() {
        let a = Grid::filled(GeoTransform::new(0.0, 1.0, 0.5), 2, 2, 1.0);
        let merged = merge(&[Arc::new(a)], rect(0.0, 0.0, 0.9999999999, 1.0), MERGE_PRECISION).unwrap();
        assert_eq!(merged.cols(), 2);
    }

    #[test]
    fn test_merge_nothing() {
        let empty: Vec<Arc<Grid>> = Vec::new();
        assert!(matches!(
            merge(&empty, rect(0.0, 0.0, 1.0, 1.0), MERGE_PRECISION),
            Err(RasterError::NothingToMerge)
        ));
    }

    #[test]
    fn test_homogenize_replaces_with_mean() {
        let mut grid = ramp(0.0, 4.0, 4, 4);
        grid.data[[1, 1]] = NODATA;
        let lake = polygon![(x: 0.0, y: 2.0), (x: 2.0, y: 2.0), (x: 2.0, y: 4.0), (x: 0.0, y: 4.0)];
        let far = polygon![(x: 50.0, y: 50.0), (x: 60.0, y: 50.0), (x: 60.0, y: 60.0)];

        let applied = homogenize(&mut grid, &[lake, far]);
        assert_eq!(applied, 1);

        // cells (0,0)=0, (0,1)=1, (1,0)=100 are valid
        let mean = (0.0 + 1.0 + 100.0) / 3.0;
        assert_eq!(grid.data[[0, 0]], mean);
        assert_eq!(grid.data[[0, 1]], mean);
        assert_eq!(grid.data[[1, 0]], mean);
        assert_eq!(grid.data[[1, 1]], NODATA);
        assert_eq!(grid.data[[2, 2]], 202.0);
    }

    #[test]
    fn test_downsample_nearest() {
        let grid = ramp(0.0, 10.0, 20, 20).with_cell(0.5);
        let coarse = downsample(&grid, 5.0);

        assert_eq!((coarse.rows(), coarse.cols()), (2, 2));
        assert_eq!(coarse.transform.cell_size, 5.0);
        // centre (2.5, 7.5) falls in fine cell (5, 5)
        assert_eq!(coarse.data[[0, 0]], 505.0);
        assert_eq!(coarse.data[[1, 1]], 1515.0);
    }

    impl Grid {
        fn with_cell(mut self, cell_size: f64) -> Self {
            self.transform.cell_size = cell_size;
            self
        }
    }
}
