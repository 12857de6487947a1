//! Pipeline telemetry for observability.
//!
//! Workers and the ledger actor update lock-free counters; the supervisor
//! takes snapshots and logs them together with the stalled-branch
//! registry.
//!
//! # Architecture
//!
//! ```text
//! Workers / Ledger ─────► PipelineMetrics ─────► TelemetrySnapshot ─────► Supervisor log
//!                        (atomic counters)     (point-in-time copy)      CLI summary
//! Workers (failure) ────► StalledRegistry
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dempipe::telemetry::PipelineMetrics;
//!
//! let metrics = Arc::new(PipelineMetrics::new());
//! metrics.task_started(TaskKind::Split);
//! metrics.task_completed(TaskKind::Split);
//!
//! let snapshot = metrics.snapshot(queue.len(), stalled.len());
//! println!("Finished: {}", snapshot.products_finished());
//! ```

mod metrics;
mod snapshot;
mod stalled;

pub use metrics::PipelineMetrics;
pub use snapshot::{KindCounts, TelemetrySnapshot};
pub use stalled::{StalledBranch, StalledRegistry};
