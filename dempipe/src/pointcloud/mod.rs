//! Point-cloud access.
//!
//! Two seams sit here: a [`GroundFilter`] that turns a point file into the
//! points used for one product, and a [`PointCloudClipper`] that cuts a
//! buffered sub-tile out of a parent file plus its neighbors. Both ship with
//! an implementation on top of the `las` crate.

mod clip;
mod filter;

pub use clip::{ClipStats, LasClipper, PointCloudClipper};
pub use filter::{ClassFilter, GroundFilter, CLASS_GROUND, CLASS_NOISE};

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use las::{Builder, Reader, Writer};
use thiserror::Error;

use crate::tile::ensure_parent;

/// Point files smaller than this are treated as empty.
pub const MIN_POINT_FILE_BYTES: u64 = 1000;

/// Errors from reading or writing point files.
#[derive(Debug, Error)]
pub enum PointCloudError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("LAS error on {path}: {source}")]
    Las {
        path: PathBuf,
        #[source]
        source: las::Error,
    },
}

impl PointCloudError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn las(path: &Path, source: las::Error) -> Self {
        Self::Las {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A filtered survey point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurveyPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SurveyPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Opens a LAS/LAZ file for reading.
pub fn open_reader(path: &Path) -> Result<Reader, PointCloudError> {
    let file = File::open(path).map_err(|e| PointCloudError::io(path, e))?;
    Reader::new(BufReader::new(file)).map_err(|e| PointCloudError::las(path, e))
}

/// Writes `points` to an uncompressed LAS 1.4 file, creating parent folders.
///
/// Only coordinates, intensity and classification are kept.
pub fn write_las(
    path: &Path,
    points: impl IntoIterator<Item = las::Point>,
) -> Result<u64, PointCloudError> {
    ensure_parent(path).map_err(|e| PointCloudError::io(path, e))?;

    let mut builder = Builder::from((1, 4));
    builder.point_format = las::point::Format::new(0).map_err(|e| PointCloudError::las(path, e))?;
    let header = builder
        .into_header()
        .map_err(|e| PointCloudError::las(path, e))?;

    let mut writer = Writer::from_path(path, header).map_err(|e| PointCloudError::las(path, e))?;
    let mut written = 0u64;
    for point in points {
        let point = las::Point {
            x: point.x,
            y: point.y,
            z: point.z,
            intensity: point.intensity,
            classification: point.classification,
            ..Default::default()
        };
        writer
            .write_point(point)
            .map_err(|e| PointCloudError::las(path, e))?;
        written += 1;
    }
    writer.close().map_err(|e| PointCloudError::las(path, e))?;
    Ok(written)
}

/// Size of a point file in bytes, or 0 when it does not exist.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use las::point::Classification;

    /// A LAS point with the given class.
    pub fn point(x: f64, y: f64, z: f64, class: Classification) -> las::Point {
        las::Point {
            x,
            y,
            z,
            classification: class,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::point;
    use super::*;
    use las::point::Classification;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_points() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("1.LAS");

        let written = write_las(
            &path,
            vec![
                point(85000.5, 447000.25, 1.5, Classification::Ground),
                point(85001.0, 447001.0, 7.0, Classification::Building),
            ],
        )
        .unwrap();
        assert_eq!(written, 2);

        let mut reader = open_reader(&path).unwrap();
        let points: Vec<las::Point> = reader.points().collect::<Result<_, _>>().unwrap();
        assert_eq!(points.len(), 2);
        assert!((points[0].x - 85000.5).abs() < 1e-3);
        assert_eq!(points[1].classification, Classification::Building);
    }

    #[test]
    fn test_open_missing_file() {
        let err = open_reader(Path::new("/nonexistent/1.LAS")).err().expect("expected error");
        assert!(matches!(err, PointCloudError::Io { .. }));
        assert_eq!(file_size(Path::new("/nonexistent/1.LAS")), 0);
    }
}
