//! End-to-end pipeline run on a synthetic point cloud.
//!
//! Run with: `cargo test --test pipeline_integration`

use std::fs;
use std::path::Path;
use std::time::Duration;

use dempipe::app::{Pipeline, RunOptions};
use dempipe::config::{FolderPaths, PipelineConfig};
use dempipe::index::StaticIndex;
use dempipe::pointcloud::write_las;
use dempipe::raster::{is_nodata, read_geotiff};
use dempipe::tile::{IndexFootprint, Layout, Product, TileId};
use geo::{coord, Rect};
use las::point::Classification;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helper Functions
// ============================================================================

fn footprint(name: &str, x: f64, y: f64) -> IndexFootprint {
    IndexFootprint::new(
        TileId::new(name),
        Rect::new(coord! { x: x, y: y }, coord! { x: x + 40.0, y: y + 40.0 }).to_polygon(),
    )
}

fn ground(x: f64) -> f64 {
    0.1 * (x - 1000.0)
}

/// Ground returns every metre plus a 30 m roof return next to each.
fn write_tile(path: &Path, origin: (f64, f64)) {
    let mut points = Vec::new();
    for i in 0..=40 {
        for j in 0..=40 {
            let x = origin.0 + i as f64;
            let y = origin.1 + j as f64;
            points.push(las::Point {
                x,
                y,
                z: ground(x),
                classification: Classification::Ground,
                ..Default::default()
            });
            points.push(las::Point {
                x: x + 0.25,
                y: y + 0.25,
                z: 30.0,
                classification: Classification::Building,
                ..Default::default()
            });
        }
    }
    write_las(path, points).unwrap();
}

fn fast_options() -> RunOptions {
    RunOptions::default()
        .with_supervisor_period(Duration::from_millis(20))
        .with_replenish_interval(Duration::from_millis(20))
        .with_idle_timeout(Duration::from_millis(20))
        .with_task_pause(Duration::ZERO)
        .with_exit_when_drained(true)
}

// ============================================================================
// Full run
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_run_produces_all_products() {
    let dir = TempDir::new().unwrap();
    let folders = FolderPaths::under(dir.path());
    let config = PipelineConfig::new(folders.clone())
        .with_worker_count(2)
        .with_cell_sizes(1.0, 5.0)
        .with_subtile_grid(2, 2)
        .with_buffer(2.0);
    let layout = Layout::new(folders.clone());

    // T1 has points; T2 is its eastern neighbor without a point file;
    // T3 is a target whose point file is missing.
    let index = StaticIndex::new(vec![
        footprint("T1", 1000.0, 2000.0),
        footprint("T2", 1040.0, 2000.0),
        footprint("T3", 2000.0, 2000.0),
    ]);
    write_tile(&layout.main_tile_path(&TileId::new("T1")), (1000.0, 2000.0));
    fs::create_dir_all(&folders.tiles_to_process).unwrap();
    for name in ["C_T1.LAZ", "C_T3.LAZ", "C_NOTINDEX.LAZ"] {
        fs::write(folders.tiles_to_process.join(name), b"").unwrap();
    }

    let pipeline = Pipeline::new(config, &index).unwrap().with_options(fast_options());
    assert_eq!(pipeline.targets().len(), 3);

    let summary = tokio::time::timeout(
        Duration::from_secs(120),
        pipeline.run(CancellationToken::new()),
    )
    .await
    .expect("pipeline did not drain")
    .unwrap();

    assert_eq!(summary.products_finished(), 2);
    assert_eq!(summary.merges_emitted, 2);
    assert_eq!(summary.completed.interpolate, 8);
    assert_eq!(summary.failed.split, 1);
    assert_eq!(summary.stalled, 1);

    let t1 = TileId::new("T1");
    let dtm = read_geotiff(&layout.merged_path(&t1, Product::Dtm)).unwrap();
    assert_eq!((dtm.rows(), dtm.cols()), (40, 40));
    let value = dtm.sample(1020.5, 2020.5).unwrap();
    assert!(!is_nodata(value));
    assert!((value - ground(1020.5)).abs() < 0.2, "dtm {}", value);

    let dsm = read_geotiff(&layout.merged_path(&t1, Product::Dsm)).unwrap();
    let roof = dsm.sample(1020.5, 2020.5).unwrap();
    assert!(roof > ground(1020.5), "dsm {}", roof);

    for product in Product::ALL {
        let coarse = read_geotiff(&layout.downsampled_path(&t1, product)).unwrap();
        assert_eq!((coarse.rows(), coarse.cols()), (8, 8));
    }
    assert!(!layout.merged_path(&TileId::new("T3"), Product::Dtm).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_run_returns_promptly() {
    let dir = TempDir::new().unwrap();
    let folders = FolderPaths::under(dir.path());
    let config = PipelineConfig::new(folders.clone()).with_worker_count(1);
    fs::create_dir_all(&folders.tiles_to_process).unwrap();
    fs::write(folders.tiles_to_process.join("C_T9.LAZ"), b"").unwrap();
    let index = StaticIndex::new(vec![footprint("T9", 0.0, 0.0)]);

    let pipeline = Pipeline::new(config, &index).unwrap().with_options(
        RunOptions::default()
            .with_idle_timeout(Duration::from_secs(30))
            .with_supervisor_period(Duration::from_secs(30)),
    );
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(10), pipeline.run(shutdown))
        .await
        .expect("shutdown took too long")
        .unwrap();
    assert_eq!(summary.products_finished(), 0);
}
