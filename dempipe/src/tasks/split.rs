//! Split task.

use std::time::Instant;

use tracing::info;

use super::PipelineContext;
use crate::executor::{Task, TaskError};
use crate::subtile::{SubtileParams, Subtiler};
use crate::tile::{Product, TileId};

/// Splits a MAIN tile and returns one Interpolate task per sub-tile and
/// product.
pub fn split_tile(ctx: &PipelineContext, id: &TileId) -> Result<Vec<Task>, TaskError> {
    let started = Instant::now();
    let tile = ctx
        .graph
        .get(id)
        .ok_or_else(|| TaskError::new(format!("Tile {} is not in the index", id)))?;

    let subtiles = Subtiler::new(tile, SubtileParams::from_config(&ctx.config))
        .set_extents()
        .map_err(|e| TaskError::new(format!("Cannot split {}", id)).with_source(e))?
        .subdivide()
        .clip(&ctx.graph, &ctx.layout, ctx.clipper.as_ref())
        .map_err(|e| TaskError::new(format!("Cannot split {}", id)).with_source(e))?;

    info!(
        tile = %id,
        subtiles = subtiles.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Tile split"
    );

    let mut tasks = Vec::with_capacity(subtiles.len() * Product::ALL.len());
    for product in Product::ALL {
        tasks.extend(subtiles.iter().map(|subtile| Task::Interpolate {
            subtile: subtile.clone(),
            product,
        }));
    }
    Ok(tasks)
}
