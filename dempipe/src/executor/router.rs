//! Dispatch from task kind to task body.

use std::sync::Arc;

use super::task::{Outcome, Task, TaskError};
use crate::tasks::{
    downsample_tile, interpolate_subtile, merge_subtiles, split_tile, PipelineContext,
};

/// Routes tasks to their bodies and maps results to [`Outcome`]s.
pub struct Router {
    ctx: Arc<PipelineContext>,
}

impl Router {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Executes `task`.
    ///
    /// ```text
    /// Split       → FollowOn(N × Interpolate per product)
    /// Interpolate → Completed(notice for the ledger)
    /// Merge       → FollowOn([Downsample]) or Done
    /// Downsample  → Done
    /// ```
    pub fn route(&self, task: Task) -> Result<Outcome, TaskError> {
        let ctx = self.ctx.as_ref();
        match task {
            Task::Split { tile } => split_tile(ctx, &tile).map(Outcome::FollowOn),
            Task::Interpolate { subtile, product } => {
                interpolate_subtile(ctx, subtile, product).map(Outcome::Completed)
            }
            Task::Merge {
                tile,
                product,
                children,
            } => merge_subtiles(ctx, &tile, product, children).map(|next| match next {
                Some(downsample) => Outcome::FollowOn(vec![downsample]),
                None => Outcome::Done,
            }),
            Task::Downsample {
                tile,
                product,
                merged,
            } => downsample_tile(ctx, &tile, product, &merged).map(|()| Outcome::Done),
        }
    }
}
