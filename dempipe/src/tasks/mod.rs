//! Task bodies.
//!
//! Each function implements one [`Task`](crate::executor::Task) kind. They
//! run on worker threads, block freely, and share the read-only
//! [`PipelineContext`].
//!
//! # Data Flow
//!
//! ```text
//! split        main tile  ──► <processing>/<T>/subtiles/<i>.LAS
//!                             → 2 × rows × cols Interpolate tasks
//! interpolate  <i>.LAS    ──► <processing>/<T>/interpolated_<p>/<i>.TIF
//!                             → Completion for the ledger
//! merge        children   ──► <finished>/M_<T>.TIF | R_<T>.TIF
//!                             → Downsample task
//! downsample   merged     ──► <finished>/M5_<T>.TIF | R5_<T>.TIF
//! ```

mod downsample;
mod interpolate;
mod merge;
mod split;

pub use downsample::downsample_tile;
pub use interpolate::interpolate_subtile;
pub use merge::merge_subtiles;
pub use split::split_tile;

use std::sync::Arc;

use geo::Polygon;

use crate::config::PipelineConfig;
use crate::interpolation::FlatteningPolygons;
use crate::pointcloud::{GroundFilter, PointCloudClipper};
use crate::tile::{Layout, TileGraph};

/// Everything a task body reads.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub layout: Layout,
    pub graph: Arc<TileGraph>,
    pub filter: Arc<dyn GroundFilter>,
    pub clipper: Arc<dyn PointCloudClipper>,
    pub flattening: FlatteningPolygons,
    pub homogenization: Vec<Polygon<f64>>,
}

impl PipelineContext {
    /// Context without polygon layers.
    pub fn new(
        config: PipelineConfig,
        layout: Layout,
        graph: Arc<TileGraph>,
        filter: Arc<dyn GroundFilter>,
        clipper: Arc<dyn PointCloudClipper>,
    ) -> Self {
        Self {
            config,
            layout,
            graph,
            filter,
            clipper,
            flattening: FlatteningPolygons::default(),
            homogenization: Vec::new(),
        }
    }

    pub fn with_flattening(mut self, polygons: FlatteningPolygons) -> Self {
        self.flattening = polygons;
        self
    }

    pub fn with_homogenization(mut self, polygons: Vec<Polygon<f64>>) -> Self {
        self.homogenization = polygons;
        self
    }
}
