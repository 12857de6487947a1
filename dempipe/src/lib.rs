//! dempipe - lidar point-cloud tiles to terrain and surface rasters.
//!
//! Each national map sheet is split into buffered sub-tiles, every sub-tile
//! is interpolated into a DTM (ground only, Laplace/natural-neighbour) and
//! a DSM (all returns, quadrant IDW), and the sub-tile rasters are merged
//! back into one raster per sheet and product, then downsampled.
//!
//! # Modules
//!
//! - [`config`]: INI configuration and folder layout
//! - [`index`]: national tile index (WFS or GeoJSON file)
//! - [`tile`]: tile model, neighbor graph and on-disk layout
//! - [`subtile`]: sub-tile grid construction and neighbor wiring
//! - [`pointcloud`]: LAS/LAZ reading, clipping and class filtering
//! - [`interpolation`]: TIN/Laplace, quadrant IDW, flattening, hole patching
//! - [`raster`]: grids, GeoTIFF I/O, crop, merge, downsample
//! - [`vector`]: polygon layers and rasterization
//! - [`tasks`]: split, interpolate, merge and downsample task bodies
//! - [`executor`]: queue, workers, completion ledger, supervisor
//! - [`telemetry`]: counters, snapshots and stalled branches
//! - [`logging`]: tracing subscriber setup
//! - [`app`]: startup wiring and lifecycle

pub mod app;
pub mod config;
pub mod executor;
pub mod index;
pub mod interpolation;
pub mod logging;
pub mod pointcloud;
pub mod raster;
pub mod subtile;
pub mod tasks;
pub mod telemetry;
pub mod tile;
pub mod vector;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
