//! Buffered sub-tiling.
//!
//! A tile is cut into a `rows × cols` grid of cells. Each cell gets an
//! unbuffered box (its share of the tile) and a buffered box grown by the
//! buffer distance on every side, so interpolation near cell edges sees
//! points from adjacent cells and, at the tile border, from neighbor tiles.
//!
//! # Architecture
//!
//! The subtiler is a typestate; each step consumes the previous one:
//!
//! ```text
//! Subtiler<Pending> ──set_extents──► Subtiler<Extents> ──subdivide──► Subtiler<Subdivided> ──clip──► Vec<Tile>
//! ```
//!
//! Cells are numbered column-major from the bottom-left, 1-based:
//!
//! ```text
//!  rows=3, cols=3
//!  ┌───┬───┬───┐
//!  │ 3 │ 6 │ 9 │
//!  ├───┼───┼───┤
//!  │ 2 │ 5 │ 8 │
//!  ├───┼───┼───┤
//!  │ 1 │ 4 │ 7 │
//!  └───┴───┴───┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let subtiles = Subtiler::new(tile, SubtileParams::from_config(&config))
//!     .set_extents()?
//!     .subdivide()
//!     .clip(&graph, &layout, &LasClipper)?;
//! ```

mod position;

pub use position::{gather_directions, SubtilePosition};

use std::time::Instant;

use geo::{coord, Rect};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::pointcloud::{PointCloudClipper, PointCloudError};
use crate::tile::{Layout, Tile, TileGraph, TileId};

/// Errors from sub-tiling.
#[derive(Debug, Error)]
pub enum SubtileError {
    /// The tile geometry has no extent.
    #[error("Tile {0} has an empty geometry")]
    EmptyGeometry(TileId),

    /// The clip tool failed for one cell.
    #[error("Clipping sub-tile {index} of {tile} failed: {source}")]
    Clip {
        tile: TileId,
        index: usize,
        #[source]
        source: PointCloudError,
    },
}

/// Grid and buffer settings for one split.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubtileParams {
    pub rows: usize,
    pub cols: usize,
    pub base_cell_size: f64,
    pub buffer: f64,
    pub overwrite: bool,
}

impl SubtileParams {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            rows: config.subtile_rows,
            cols: config.subtile_cols,
            base_cell_size: config.base_cell_size,
            buffer: config.buffer,
            overwrite: config.overwrite,
        }
    }
}

/// The boxes of one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubtileBox {
    /// 1-based, column-major.
    pub index: usize,
    pub unbuffered: Rect<f64>,
    pub buffered: Rect<f64>,
}

// ===== States =====

/// Created, bounds not read yet.
pub struct Pending;

/// Bounds read.
pub struct Extents {
    bounds: Rect<f64>,
}

/// Cell boxes computed.
pub struct Subdivided {
    boxes: Vec<SubtileBox>,
}

/// Splits one tile into buffered cells.
pub struct Subtiler<'a, S> {
    tile: &'a Tile,
    params: SubtileParams,
    state: S,
}

impl<'a> Subtiler<'a, Pending> {
    pub fn new(tile: &'a Tile, params: SubtileParams) -> Self {
        Self {
            tile,
            params,
            state: Pending,
        }
    }

    /// Reads the bounding box of the unbuffered geometry, or of the
    /// geometry for a MAIN tile.
    pub fn set_extents(self) -> Result<Subtiler<'a, Extents>, SubtileError> {
        let bounds = self
            .tile
            .unbuffered_bounds()
            .ok_or_else(|| SubtileError::EmptyGeometry(self.tile.id().clone()))?;
        Ok(Subtiler {
            tile: self.tile,
            params: self.params,
            state: Extents { bounds },
        })
    }
}

impl<'a> Subtiler<'a, Extents> {
    pub fn bounds(&self) -> Rect<f64> {
        self.state.bounds
    }

    /// Computes the cell boxes.
    pub fn subdivide(self) -> Subtiler<'a, Subdivided> {
        let boxes = subdivide(self.state.bounds, &self.params);
        Subtiler {
            tile: self.tile,
            params: self.params,
            state: Subdivided { boxes },
        }
    }
}

impl<'a> Subtiler<'a, Subdivided> {
    pub fn boxes(&self) -> &[SubtileBox] {
        &self.state.boxes
    }

    /// Clips every cell's point file and returns the SUBTILE tiles.
    ///
    /// Cells whose output already exists are not clipped again unless
    /// overwrite is enabled; their tiles are still returned.
    pub fn clip(
        self,
        graph: &TileGraph,
        layout: &Layout,
        clipper: &dyn PointCloudClipper,
    ) -> Result<Vec<Tile>, SubtileError> {
        let parent = self.tile.id();
        let (rows, cols) = (self.params.rows, self.params.cols);
        let mut subtiles = Vec::with_capacity(self.state.boxes.len());

        for cell in &self.state.boxes {
            let output = layout.subtile_path(parent, cell.index);

            if output.exists() && !self.params.overwrite {
                debug!(tile = %parent, subtile = cell.index, "Sub-tile exists, skipping clip");
            } else {
                let position = SubtilePosition::of(cell.index, rows, cols);
                let mut sources = vec![self.tile.filepath().to_path_buf()];
                sources.extend(graph.neighbor_files(parent, &gather_directions(cell.index, rows, cols)));

                let started = Instant::now();
                let stats = clipper
                    .clip(cell.buffered, &sources, &output)
                    .map_err(|source| SubtileError::Clip {
                        tile: parent.clone(),
                        index: cell.index,
                        source,
                    })?;
                info!(
                    subtile = %parent.subtile(cell.index),
                    position = %position,
                    sources = stats.sources_read,
                    points = stats.points_written,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Split sub-tile"
                );
            }

            subtiles.push(Tile::subtile(
                parent,
                cell.index,
                cell.buffered,
                cell.unbuffered,
                output,
            ));
        }

        Ok(subtiles)
    }
}

/// Cell edges along one axis.
///
/// Steps are `base × ceil((span / count) / base)`. Any edge reaching the
/// true maximum is clamped to it, rounded to the nearest integer.
///
/// When the base cell is so coarse that the rounded step would push an
/// inner edge to the maximum, leaving empty trailing cells, the span is
/// split evenly instead.
fn edges(min: f64, max: f64, count: usize, base: f64) -> Vec<f64> {
    let span = max - min;
    let mut step = base * ((span / count as f64) / base).ceil();
    if count > 1 && step * (count - 1) as f64 >= span {
        step = span / count as f64;
    }
    let clamped = max.round();
    (0..=count)
        .map(|k| {
            let edge = min + step * k as f64;
            if k == count || edge >= max {
                clamped
            } else {
                edge
            }
        })
        .collect()
}

/// Computes the `rows × cols` cell boxes of `bounds`.
pub fn subdivide(bounds: Rect<f64>, params: &SubtileParams) -> Vec<SubtileBox> {
    let (min, max) = (bounds.min(), bounds.max());
    let xs = edges(min.x, max.x, params.cols, params.base_cell_size);
    let ys = edges(min.y, max.y, params.rows, params.base_cell_size);
    let b = params.buffer;

    let mut boxes = Vec::with_capacity(params.rows * params.cols);
    for col in 0..params.cols {
        for row in 0..params.rows {
            let (x0, x1, y0, y1) = (xs[col], xs[col + 1], ys[row], ys[row + 1]);
            boxes.push(SubtileBox {
                index: col * params.rows + row + 1,
                unbuffered: Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 }),
                buffered: Rect::new(
                    coord! { x: x0 - b, y: y0 - b },
                    coord! { x: x1 + b, y: y1 + b },
                ),
            });
        }
    }
    boxes
}
