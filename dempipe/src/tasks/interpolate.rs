//! Interpolate task.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::PipelineContext;
use crate::executor::{Completion, TaskError};
use crate::interpolation::{GridSpec, InterpolationEngine};
use crate::pointcloud::{file_size, MIN_POINT_FILE_BYTES};
use crate::raster::{write_geotiff, Raster};
use crate::tile::{Product, Stage, Tile};

/// Interpolates one sub-tile for one product.
///
/// The returned completion carries the sub-tile with `interpolated` and
/// `related_raster` set. A point file below the minimum size still
/// completes, with the sub-tile left uninterpolated so the merge skips it.
pub fn interpolate_subtile(
    ctx: &PipelineContext,
    mut subtile: Tile,
    product: Product,
) -> Result<Completion, TaskError> {
    let (parent, index) = match (subtile.parent(), subtile.subtile_index()) {
        (Some(parent), Some(index)) => (parent.clone(), index),
        _ => {
            return Err(TaskError::new(format!(
                "{} is not a sub-tile",
                subtile.id()
            )))
        }
    };

    match run(ctx, &subtile, product) {
        Ok(raster) => {
            subtile.interpolated = true;
            subtile.related_raster = Some(raster);
        }
        Err(e) if e.is_empty_input() => {
            warn!(subtile = %subtile.id(), product = %product, reason = %e, "Skipping empty sub-tile");
            subtile.interpolated = false;
            subtile.related_raster = None;
        }
        Err(e) => return Err(e),
    }

    debug!(parent = %parent, index, product = %product, "Sub-tile done");
    Ok(Completion {
        parent,
        product,
        subtile,
    })
}

fn run(ctx: &PipelineContext, subtile: &Tile, product: Product) -> Result<Raster, TaskError> {
    let (Some(parent), Some(index)) = (subtile.parent(), subtile.subtile_index()) else {
        return Err(TaskError::new(format!("{} is not a sub-tile", subtile.id())));
    };
    let output = ctx.layout.interpolated_path(parent, index, product);
    let raster = Raster::new(subtile.id().to_string(), &output, Stage::Interpolated(product));

    let size = file_size(subtile.filepath());
    if size < MIN_POINT_FILE_BYTES {
        return Err(TaskError::empty_input(format!(
            "{} holds {} bytes",
            subtile.filepath().display(),
            size
        )));
    }

    if output.exists() && !ctx.config.overwrite {
        debug!(subtile = %subtile.id(), product = %product, "Raster exists, skipping");
        return Ok(raster);
    }

    let started = Instant::now();
    let points = ctx
        .filter
        .filter(subtile.filepath(), product)
        .map_err(|e| TaskError::new(format!("Filtering {} failed", subtile.id())).with_source(e))?;

    let bounds = subtile
        .unbuffered_bounds()
        .ok_or_else(|| TaskError::new(format!("{} has no bounds", subtile.id())))?;
    let spec = GridSpec::from_bounds(bounds, ctx.config.base_cell_size);

    let (grid, stats) = InterpolationEngine::new(spec, product).run(&points, &ctx.flattening);
    write_geotiff(&output, &grid)
        .map_err(|e| TaskError::new(format!("Writing {} failed", output.display())).with_source(e))?;

    info!(
        subtile = %subtile.id(),
        product = %product,
        points = stats.points,
        nodata = stats.nodata,
        duration_ms = started.elapsed().as_millis() as u64,
        "Interpolated sub-tile"
    );
    Ok(raster)
}
