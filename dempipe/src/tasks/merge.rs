//! Merge task.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::PipelineContext;
use crate::executor::{Task, TaskError};
use crate::raster::{crop, homogenize, merge, write_geotiff, Grid, RasterError, MERGE_PRECISION};
use crate::tile::{Product, Tile, TileId};

/// Stitches the interpolated children of `tile` into its finished raster.
///
/// Children without a raster are left out. Each child is cropped to its
/// unbuffered bounds first; a child whose crop fails is dropped. Returns the
/// Downsample task, or `None` when no child contributed.
pub fn merge_subtiles(
    ctx: &PipelineContext,
    tile: &TileId,
    product: Product,
    children: Vec<Tile>,
) -> Result<Option<Task>, TaskError> {
    let started = Instant::now();
    let bounds = ctx
        .graph
        .get(tile)
        .and_then(|t| t.bounds())
        .ok_or_else(|| TaskError::new(format!("Tile {} is not in the index", tile)))?;

    let total = children.len();
    let mut grids: Vec<Arc<Grid>> = Vec::with_capacity(total);
    for mut child in children {
        if !child.interpolated {
            continue;
        }
        let Some(unbuffered) = child.unbuffered_bounds() else {
            continue;
        };
        let Some(raster) = child.related_raster.as_mut() else {
            continue;
        };

        let cropped = raster
            .open()
            .and_then(|grid| crop(&grid, unbuffered, raster.name()));
        raster.close();
        match cropped {
            Ok(grid) => grids.push(Arc::new(grid)),
            Err(e @ RasterError::ClipFailure { .. }) => {
                warn!(subtile = %child.id(), product = %product, error = %e, "Dropping sub-tile from merge");
            }
            Err(e) => {
                return Err(TaskError::new(format!("Reading {} failed", child.id())).with_source(e));
            }
        }
    }

    let mut merged = match merge(&grids, bounds, MERGE_PRECISION) {
        Ok(grid) => grid,
        Err(RasterError::NothingToMerge) => {
            warn!(tile = %tile, product = %product, children = total, "No sub-tile rasters to merge");
            return Ok(None);
        }
        Err(e) => return Err(TaskError::new(format!("Merging {} failed", tile)).with_source(e)),
    };
    let homogenized = homogenize(&mut merged, &ctx.homogenization);

    let output = ctx.layout.merged_path(tile, product);
    write_geotiff(&output, &merged)
        .map_err(|e| TaskError::new(format!("Writing {} failed", output.display())).with_source(e))?;

    info!(
        tile = %tile,
        product = %product,
        merged = grids.len(),
        children = total,
        homogenized,
        duration_ms = started.elapsed().as_millis() as u64,
        "Merged tile"
    );
    Ok(Some(Task::Downsample {
        tile: tile.clone(),
        product,
        merged: output,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{read_geotiff, GeoTransform, Raster};
    use crate::tasks::downsample_tile;
    use crate::tasks::test_support::single_tile_context;
    use crate::tile::Stage;
    use geo::{coord, Rect};
    use tempfile::TempDir;

    /// A child of T1 covering a 20 m quadrant, with its raster on disk.
    fn child(ctx: &PipelineContext, index: usize, x0: f64, y0: f64, value: f64) -> Tile {
        let parent = TileId::new("T1");
        let rect = Rect::new(coord! { x: x0, y: y0 }, coord! { x: x0 + 20.0, y: y0 + 20.0 });
        let buffered = Rect::new(
            coord! { x: x0 - 2.0, y: y0 - 2.0 },
            coord! { x: x0 + 22.0, y: y0 + 22.0 },
        );
        let path = ctx.layout.interpolated_path(&parent, index, Product::Dtm);
        let grid = Grid::filled(GeoTransform::new(x0 - 2.0, y0 + 22.0, 1.0), 24, 24, value);
        write_geotiff(&path, &grid).unwrap();

        let mut tile = Tile::subtile(&parent, index, buffered, rect, path.clone());
        tile.interpolated = true;
        tile.related_raster = Some(Raster::new(tile.id().to_string(), path, Stage::Interpolated(Product::Dtm)));
        tile
    }

    #[test]
    fn test_merge_crops_children_and_schedules_downsample() {
        let dir = TempDir::new().unwrap();
        let ctx = single_tile_context(dir.path());
        let children = vec![
            child(&ctx, 1, 1000.0, 2000.0, 1.0),
            child(&ctx, 2, 1000.0, 2020.0, 2.0),
            child(&ctx, 3, 1020.0, 2000.0, 3.0),
            child(&ctx, 4, 1020.0, 2020.0, 4.0),
        ];

        let next = merge_subtiles(&ctx, &TileId::new("T1"), Product::Dtm, children).unwrap();
        let Some(Task::Downsample { merged, .. }) = next else {
            panic!("expected downsample");
        };
        let grid = read_geotiff(&merged).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (40, 40));
        // the buffer of child 1 must not bleed into child 3's quadrant
        assert_eq!(grid.sample(1020.5, 2000.5), Some(3.0));
        assert_eq!(grid.sample(1019.5, 2000.5), Some(1.0));
        assert_eq!(grid.sample(1000.5, 2039.5), Some(2.0));
        assert_eq!(grid.valid_count(), 1600);

        downsample_tile(&ctx, &TileId::new("T1"), Product::Dtm, &merged).unwrap();
        let coarse =
            read_geotiff(&ctx.layout.downsampled_path(&TileId::new("T1"), Product::Dtm)).unwrap();
        assert_eq!((coarse.rows(), coarse.cols()), (8, 8));
        assert_eq!(coarse.transform, GeoTransform::new(1000.0, 2040.0, 5.0));
        assert_eq!(coarse.sample(1002.5, 2002.5), Some(1.0));
        assert_eq!(coarse.sample(1037.5, 2037.5), Some(4.0));
    }

    #[test]
    fn test_uninterpolated_children_are_skipped() {
        let dir = TempDir::new().unwrap();
        let ctx = single_tile_context(dir.path());
        let mut empty = child(&ctx, 2, 1000.0, 2020.0, 2.0);
        empty.interpolated = false;
        empty.related_raster = None;
        let children = vec![child(&ctx, 1, 1000.0, 2000.0, 1.0), empty];

        let next = merge_subtiles(&ctx, &TileId::new("T1"), Product::Dtm, children).unwrap();
        assert!(next.is_some());
        let grid = read_geotiff(&ctx.layout.merged_path(&TileId::new("T1"), Product::Dtm)).unwrap();
        assert_eq!(grid.valid_count(), 400);
    }

    #[test]
    fn test_nothing_to_merge_has_no_follow_on() {
        let dir = TempDir::new().unwrap();
        let ctx = single_tile_context(dir.path());
        let next = merge_subtiles(&ctx, &TileId::new("T1"), Product::Dsm, Vec::new()).unwrap();
        assert!(next.is_none());
        assert!(!ctx.layout.merged_path(&TileId::new("T1"), Product::Dsm).exists());
    }
}
