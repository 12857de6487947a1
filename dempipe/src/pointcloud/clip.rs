//! Point-cloud clip seam.

use std::path::{Path, PathBuf};

use geo::Rect;
use tracing::{debug, warn};

use super::{open_reader, write_las, PointCloudError};

/// Outcome of one clip call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipStats {
    /// Source files actually read.
    pub sources_read: usize,
    /// Points written to the output.
    pub points_written: u64,
}

/// Cuts one buffered box out of a set of point files.
///
/// Implementations must be idempotent: the same box and sources always
/// produce the same output file.
pub trait PointCloudClipper: Send + Sync {
    fn clip(
        &self,
        bbox: Rect<f64>,
        sources: &[PathBuf],
        output: &Path,
    ) -> Result<ClipStats, PointCloudError>;
}

/// Streams LAS/LAZ sources and keeps the points inside the box.
///
/// Missing sources are skipped; the first source is the parent tile and
/// must exist.
#[derive(Clone, Copy, Debug, Default)]
pub struct LasClipper;

impl PointCloudClipper for LasClipper {
    fn clip(
        &self,
        bbox: Rect<f64>,
        sources: &[PathBuf],
        output: &Path,
    ) -> Result<ClipStats, PointCloudError> {
        let (min, max) = (bbox.min(), bbox.max());
        let mut kept = Vec::new();
        let mut stats = ClipStats::default();

        for (i, source) in sources.iter().enumerate() {
            if i > 0 && !source.exists() {
                warn!(file = %source.display(), "Neighbor point file missing, skipping");
                continue;
            }
            let mut reader = open_reader(source)?;
            for point in reader.points() {
                let point = point.map_err(|e| PointCloudError::Las {
                    path: source.clone(),
                    source: e,
                })?;
                if point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y {
                    kept.push(point);
                }
            }
            stats.sources_read += 1;
        }

        stats.points_written = write_las(output, kept)?;
        debug!(
            output = %output.display(),
            sources = stats.sources_read,
            points = stats.points_written,
            "Clipped point cloud"
        );
        Ok(stats)
    }
}
