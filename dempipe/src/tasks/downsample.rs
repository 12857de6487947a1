//! Downsample task.

use std::path::Path;
use std::time::Instant;

use tracing::info;

use super::PipelineContext;
use crate::executor::TaskError;
use crate::raster::{downsample, read_geotiff, write_geotiff};
use crate::tile::{Product, TileId};

/// Resamples a merged raster to the coarse cell size.
pub fn downsample_tile(
    ctx: &PipelineContext,
    tile: &TileId,
    product: Product,
    merged: &Path,
) -> Result<(), TaskError> {
    let started = Instant::now();
    let grid = read_geotiff(merged)
        .map_err(|e| TaskError::new(format!("Reading {} failed", merged.display())).with_source(e))?;

    let coarse = downsample(&grid, ctx.config.coarse_cell_size);
    let output = ctx.layout.downsampled_path(tile, product);
    write_geotiff(&output, &coarse)
        .map_err(|e| TaskError::new(format!("Writing {} failed", output.display())).with_source(e))?;

    info!(
        tile = %tile,
        product = %product,
        rows = coarse.rows(),
        cols = coarse.cols(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Downsampled tile"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GeoTransform, Grid};
    use crate::tasks::test_support::single_tile_context;
    use tempfile::TempDir;

    #[test]
    fn test_downsample_writes_coarse_product() {
        let dir = TempDir::new().unwrap();
        let ctx = single_tile_context(dir.path());
        let tile = TileId::new("T1");
        let merged = ctx.layout.merged_path(&tile, Product::Dsm);
        write_geotiff(&merged, &Grid::filled(GeoTransform::new(1000.0, 2040.0, 1.0), 40, 40, 7.0))
            .unwrap();

        downsample_tile(&ctx, &tile, Product::Dsm, &merged).unwrap();

        let out = ctx.layout.downsampled_path(&tile, Product::Dsm);
        assert!(out.file_name().unwrap().to_string_lossy().starts_with("R5_"));
        let coarse = read_geotiff(&out).unwrap();
        assert_eq!((coarse.rows(), coarse.cols()), (8, 8));
        assert!(coarse.data.iter().all(|v| *v == 7.0));
    }

    #[test]
    fn test_missing_merged_raster_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = single_tile_context(dir.path());
        let missing = dir.path().join("nope.TIF");
        assert!(downsample_tile(&ctx, &TileId::new("T1"), Product::Dtm, &missing).is_err());
    }
}
