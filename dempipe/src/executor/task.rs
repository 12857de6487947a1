//! Task kinds and related types.
//!
//! A task is one unit of pipeline work executed by a worker. Each variant
//! carries exactly the payload its handler needs; the handler's result
//! decides what happens next.
//!
//! ```text
//! Split ──► Interpolate(DTM) ×N ──┐
//!       └─► Interpolate(DSM) ×N ──┴─► ledger ──► Merge ──► Downsample
//! ```

use std::fmt;
use std::path::PathBuf;

use crate::tile::{Product, Tile, TileId};

/// One unit of pipeline work.
#[derive(Clone, Debug)]
pub enum Task {
    /// Cut a MAIN tile into buffered sub-tile point files.
    Split { tile: TileId },

    /// Fill the grid of one sub-tile for one product.
    Interpolate { subtile: Tile, product: Product },

    /// Stitch the interpolated children of a MAIN tile.
    Merge {
        tile: TileId,
        product: Product,
        children: Vec<Tile>,
    },

    /// Resample a merged raster to the coarse cell size.
    Downsample {
        tile: TileId,
        product: Product,
        merged: PathBuf,
    },
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Split { .. } => TaskKind::Split,
            Task::Interpolate { .. } => TaskKind::Interpolate,
            Task::Merge { .. } => TaskKind::Merge,
            Task::Downsample { .. } => TaskKind::Downsample,
        }
    }

    /// The tile this task works on.
    pub fn tile(&self) -> &TileId {
        match self {
            Task::Split { tile } => tile,
            Task::Interpolate { subtile, .. } => subtile.id(),
            Task::Merge { tile, .. } | Task::Downsample { tile, .. } => tile,
        }
    }

    /// Product, for every kind but Split.
    pub fn product(&self) -> Option<Product> {
        match self {
            Task::Split { .. } => None,
            Task::Interpolate { product, .. }
            | Task::Merge { product, .. }
            | Task::Downsample { product, .. } => Some(*product),
        }
    }

    /// Identifies the (tile, stage) branch this task advances.
    pub fn branch(&self) -> BranchKey {
        BranchKey {
            tile: self.tile().clone(),
            kind: self.kind(),
            product: self.product(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.product() {
            Some(product) => write!(f, "{}({}, {})", self.kind(), self.tile(), product),
            None => write!(f, "{}({})", self.kind(), self.tile()),
        }
    }
}

/// Task kind without payload, for telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Split,
    Interpolate,
    Merge,
    Downsample,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Split,
        TaskKind::Interpolate,
        TaskKind::Merge,
        TaskKind::Downsample,
    ];

    /// Position in [`TaskKind::ALL`].
    pub fn index(self) -> usize {
        match self {
            TaskKind::Split => 0,
            TaskKind::Interpolate => 1,
            TaskKind::Merge => 2,
            TaskKind::Downsample => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Split => "split",
            TaskKind::Interpolate => "interpolate",
            TaskKind::Merge => "merge",
            TaskKind::Downsample => "downsample",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (tile, stage) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BranchKey {
    pub tile: TileId,
    pub kind: TaskKind,
    pub product: Option<Product>,
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.product {
            Some(product) => write!(f, "{}/{}/{}", self.tile, self.kind, product),
            None => write!(f, "{}/{}", self.tile, self.kind),
        }
    }
}

/// A finished interpolation, reported to the completion ledger.
#[derive(Clone, Debug)]
pub struct Completion {
    pub parent: TileId,
    pub product: Product,
    pub subtile: Tile,
}

/// What a handler asks the scheduler to do next.
#[derive(Debug)]
pub enum Outcome {
    /// Enqueue these tasks.
    FollowOn(Vec<Task>),
    /// Report to the ledger.
    Completed(Completion),
    /// Nothing further.
    Done,
}

// =============================================================================
// Task Error
// =============================================================================

/// Classification of a task failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskErrorKind {
    /// The point file is too small to interpolate.
    EmptyInput,
    /// Any other failure; the branch stalls.
    Failed,
}

/// Error type for task failures.
#[derive(Debug)]
pub struct TaskError {
    message: String,
    kind: TaskErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TaskErrorKind::Failed,
            source: None,
        }
    }

    /// A point file below the minimum size.
    pub fn empty_input(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TaskErrorKind::EmptyInput,
            source: None,
        }
    }

    /// Attaches a source error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> TaskErrorKind {
        self.kind
    }

    pub fn is_empty_input(&self) -> bool {
        self.kind == TaskErrorKind::EmptyInput
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &_)
    }
}
