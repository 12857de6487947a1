//! Ground filter seam.

use std::path::Path;

use tracing::debug;

use super::{open_reader, PointCloudError, SurveyPoint};
use crate::tile::Product;

/// ASPRS class for ground returns.
pub const CLASS_GROUND: u8 = 2;

/// ASPRS class for low noise points.
pub const CLASS_NOISE: u8 = 7;

/// Extracts the points a product is interpolated from.
pub trait GroundFilter: Send + Sync {
    fn filter(&self, path: &Path, product: Product) -> Result<Vec<SurveyPoint>, PointCloudError>;
}

/// Selects points by their stored classification.
///
/// DTM keeps ground returns only; DSM keeps everything but noise.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassFilter;

impl ClassFilter {
    /// Whether a point of class `class` belongs to `product`.
    pub fn keeps(product: Product, class: u8) -> bool {
        match product {
            Product::Dtm => class == CLASS_GROUND,
            Product::Dsm => class != CLASS_NOISE,
        }
    }
}

impl GroundFilter for ClassFilter {
    fn filter(&self, path: &Path, product: Product) -> Result<Vec<SurveyPoint>, PointCloudError> {
        let mut reader = open_reader(path)?;
        let mut points = Vec::new();
        let mut total = 0usize;

        for point in reader.points() {
            let point = point.map_err(|e| PointCloudError::Las {
                path: path.to_path_buf(),
                source: e,
            })?;
            total += 1;
            if Self::keeps(product, u8::from(point.classification)) {
                points.push(SurveyPoint::new(point.x, point.y, point.z));
            }
        }

        debug!(
            file = %path.display(),
            product = %product,
            total,
            kept = points.len(),
            "Filtered points"
        );
        Ok(points)
    }
}
