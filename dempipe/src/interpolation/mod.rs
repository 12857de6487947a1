//! Scattered point to grid interpolation.
//!
//! Fills the elevation grid of one sub-tile from its filtered points.
//!
//! # Architecture
//!
//! ```text
//! points ──► Tin (always) ──┬─► Laplace fill        (DTM)
//!        └─► QuadrantIdw ───┴─► quadrant IDW fill   (DSM)
//!                                   │
//!                                   ▼
//!                       flatten water / buildings (Tin sampled)
//!                                   │
//!                                   ▼
//!                              patch holes
//! ```
//!
//! # Grid layout
//!
//! The grid is derived from the sub-tile's unbuffered bounds truncated to
//! integers. `cols = floor(width / cell)`, `rows = floor(height / cell)`,
//! origin at (minx, maxy). Node (r, c) is evaluated at
//! `(minx + c·cell, miny + (rows − 1 − r)·cell)`.

mod flatten;
mod idw;
mod patch;
mod tin;

pub use flatten::{flatten_polygons, FlatteningPolygons};
pub use idw::{IdwParams, QuadrantIdw};
pub use patch::patch_holes;
pub use tin::{Tin, TinError};

use std::fmt;
use std::time::Instant;

use geo::{coord, Rect};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::pointcloud::SurveyPoint;
use crate::raster::{GeoTransform, Grid, NODATA};
use crate::tile::Product;

// =============================================================================
// Grid specification
// =============================================================================

/// Extent and resolution of one sub-tile grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpec {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub cell_size: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    /// Derives the grid from unbuffered bounds, truncating them to integers.
    pub fn from_bounds(bounds: Rect<f64>, cell_size: f64) -> Self {
        let (min_x, min_y) = (bounds.min().x.trunc(), bounds.min().y.trunc());
        let (max_x, max_y) = (bounds.max().x.trunc(), bounds.max().y.trunc());
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            cell_size,
            cols: ((max_x - min_x) / cell_size).floor().max(0.0) as usize,
            rows: ((max_y - min_y) / cell_size).floor().max(0.0) as usize,
        }
    }

    /// Raster transform with the origin at (minx, maxy).
    pub fn transform(&self) -> GeoTransform {
        GeoTransform::new(self.min_x, self.max_y, self.cell_size)
    }

    /// Evaluation point of node (row, col).
    #[inline]
    pub fn node(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.min_x + col as f64 * self.cell_size,
            self.min_y + (self.rows - 1 - row) as f64 * self.cell_size,
        )
    }

    /// Truncated bounds.
    pub fn bbox(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }

    /// Evaluates `f` at every node, one row per rayon task.
    ///
    /// `f` receives a per-row scratch value created by `init`.
    fn fill<S, I, F>(&self, init: I, f: F) -> Grid
    where
        I: Fn() -> S + Sync,
        F: Fn(&mut S, f64, f64) -> f64 + Sync,
    {
        let values: Vec<f64> = (0..self.rows)
            .into_par_iter()
            .flat_map_iter(|row| {
                let mut scratch = init();
                (0..self.cols)
                    .map(|col| {
                        let (x, y) = self.node(row, col);
                        f(&mut scratch, x, y)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let data = Array2::from_shape_vec((self.rows, self.cols), values)
            .unwrap_or_else(|_| Array2::from_elem((self.rows, self.cols), NODATA));
        Grid {
            transform: self.transform(),
            data,
        }
    }
}

// =============================================================================
// Fills
// =============================================================================

/// Laplace fill; nodes outside the hull or failing to interpolate are NODATA.
pub fn laplace_fill(tin: &Tin, spec: &GridSpec) -> Grid {
    spec.fill(
        || tin.start_hint(),
        |hint, x, y| tin.interpolate_laplace(x, y, hint).unwrap_or(NODATA),
    )
}

/// Quadrant IDW fill; nodes without quadrant coverage are NODATA.
pub fn idw_fill(idw: &QuadrantIdw, spec: &GridSpec) -> Grid {
    spec.fill(|| (), |_, x, y| idw.estimate(x, y).unwrap_or(NODATA))
}

// =============================================================================
// Engine
// =============================================================================

/// Interpolation method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Laplace,
    QuadrantIdw,
}

impl Method {
    pub fn for_product(product: Product) -> Self {
        match product {
            Product::Dtm => Method::Laplace,
            Product::Dsm => Method::QuadrantIdw,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Laplace => f.write_str("laplace"),
            Method::QuadrantIdw => f.write_str("quadrant-idw"),
        }
    }
}

/// Counters from one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterpolationStats {
    pub points: usize,
    pub filled: usize,
    pub flattened: usize,
    pub patched: usize,
    pub nodata: usize,
}

/// Fills one sub-tile grid for one product.
pub struct InterpolationEngine {
    spec: GridSpec,
    product: Product,
    idw: IdwParams,
}

impl InterpolationEngine {
    pub fn new(spec: GridSpec, product: Product) -> Self {
        Self {
            spec,
            product,
            idw: IdwParams::default(),
        }
    }

    pub fn with_idw_params(mut self, params: IdwParams) -> Self {
        self.idw = params;
        self
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn method(&self) -> Method {
        Method::for_product(self.product)
    }

    /// Interpolates, flattens and patches.
    pub fn run(&self, points: &[SurveyPoint], polygons: &FlatteningPolygons) -> (Grid, InterpolationStats) {
        let started = Instant::now();
        let tin = Tin::new(points);

        let mut grid = match self.method() {
            Method::Laplace => laplace_fill(&tin, &self.spec),
            Method::QuadrantIdw => idw_fill(&QuadrantIdw::new(points, self.idw), &self.spec),
        };
        let filled = grid.valid_count();

        let selected = polygons.select(self.product, &self.spec.bbox());
        let flattened = flatten_polygons(&mut grid, &self.spec, &tin, &selected);
        let patched = patch_holes(&mut grid);

        let stats = InterpolationStats {
            points: points.len(),
            filled,
            flattened,
            patched,
            nodata: grid.rows() * grid.cols() - grid.valid_count(),
        };
        debug!(
            product = %self.product,
            method = %self.method(),
            rows = self.spec.rows,
            cols = self.spec.cols,
            points = stats.points,
            filled = stats.filled,
            flattened = stats.flattened,
            patched = stats.patched,
            duration_ms = started.elapsed().as_millis() as u64,
            "Interpolated grid"
        );
        (grid, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_spec_truncates_and_floors() {
        let spec = GridSpec::from_bounds(
            Rect::new(coord! { x: 85000.7, y: 447500.2 }, coord! { x: 86250.9, y: 449062.5 }),
            0.5,
        );
        assert_eq!((spec.min_x, spec.max_x), (85000.0, 86250.0));
        assert_eq!((spec.min_y, spec.max_y), (447500.0, 449062.0));
        assert_eq!(spec.cols, 2500);
        assert_eq!(spec.rows, 3124);
        assert_eq!(spec.transform().origin_y, 449062.0);
    }

    #[test]
    fn test_node_positions() {
        let spec = GridSpec::from_bounds(
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 4.0, y: 2.0 }),
            1.0,
        );
        assert_eq!((spec.rows, spec.cols), (2, 4));
        assert_eq!(spec.node(0, 0), (0.0, 1.0));
        assert_eq!(spec.node(1, 3), (3.0, 0.0));
    }

    #[test]
    fn test_method_per_product() {
        assert_eq!(Method::for_product(Product::Dtm), Method::Laplace);
        assert_eq!(Method::for_product(Product::Dsm), Method::QuadrantIdw);
    }

    #[test]
    fn test_engine_dtm_on_plane() {
        let mut points = Vec::new();
        for i in -3..=13 {
            for j in -3..=13 {
                let (x, y) = (i as f64 + 0.011 * (j % 5) as f64, j as f64 + 0.007 * (i % 3) as f64);
                points.push(SurveyPoint::new(x, y, 10.0 + 0.1 * x));
            }
        }
        let spec = GridSpec::from_bounds(
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 }),
            1.0,
        );
        let (grid, stats) =
            InterpolationEngine::new(spec, Product::Dtm).run(&points, &FlatteningPolygons::default());

        assert_eq!(stats.nodata, 0);
        assert_eq!(stats.patched, 0);
        let (x, _) = spec.node(4, 7);
        assert!((grid.data[[4, 7]] - (10.0 + 0.1 * x)).abs() < 1e-6);
    }

    #[test]
    fn test_engine_dsm_patches_sparse_nodes() {
        // dense points everywhere except around node (2, 2)
        let mut points = Vec::new();
        for i in 0..40 {
            for j in 0..40 {
                let (x, y) = (-5.0 + i as f64 * 0.5 + 0.1, -5.0 + j as f64 * 0.5 + 0.1);
                if (x - 2.0).abs() < 4.5 && (y - 7.0).abs() < 4.5 {
                    continue;
                }
                points.push(SurveyPoint::new(x, y, 3.0));
            }
        }
        let spec = GridSpec::from_bounds(
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 }),
            1.0,
        );
        let (grid, stats) =
            InterpolationEngine::new(spec, Product::Dsm).run(&points, &FlatteningPolygons::default());

        assert!(stats.filled < spec.rows * spec.cols);
        assert!(stats.patched > 0);
        assert!(grid.data.iter().all(|v| *v == NODATA || (*v - 3.0).abs() < 1e-9));
    }
}
