//! Application bootstrap and lifecycle management.
//!
//! [`Pipeline`] wires configuration, the tile index and polygon layers into
//! a [`PipelineContext`](crate::tasks::PipelineContext), then runs the
//! executor until shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Pipeline                              │
//! │                                                                  │
//! │  1. PipelineConfig ──► discover_targets ──► Vec<TileId>          │
//! │  2. IndexSource ─────► TileGraph                                 │
//! │  3. Polygon layers ──► FlatteningPolygons, homogenization        │
//! │  4. LedgerActor + WorkerPool + Supervisor (until shutdown)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dempipe::app::Pipeline;
//! use dempipe::index::FileIndex;
//!
//! let pipeline = Pipeline::new(config, &FileIndex::new("index.geojson"))?;
//! let summary = pipeline.run_blocking(shutdown)?;
//! ```

mod bootstrap;
mod error;

pub use bootstrap::{Pipeline, RunOptions};
pub use error::AppError;
