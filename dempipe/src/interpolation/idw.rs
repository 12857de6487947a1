//! Quadrant-constrained inverse distance weighting.

use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::pointcloud::SurveyPoint;

type IndexedPoint = GeomWithData<[f64; 2], f64>;

/// Search parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdwParams {
    /// First search radius.
    pub start_radius: f64,
    /// Radius growth per attempt.
    pub increment: f64,
    /// Number of radii tried before giving up.
    pub attempts: usize,
    /// Points required in every quadrant.
    pub min_per_quadrant: usize,
    /// Distance exponent.
    pub power: f64,
}

impl Default for IdwParams {
    fn default() -> Self {
        Self {
            start_radius: 1.0,
            increment: 3.0,
            attempts: 2,
            min_per_quadrant: 1,
            power: 2.0,
        }
    }
}

/// IDW estimator over an R-tree of point positions.
pub struct QuadrantIdw {
    tree: RTree<IndexedPoint>,
    params: IdwParams,
}

impl QuadrantIdw {
    pub fn new(points: &[SurveyPoint], params: IdwParams) -> Self {
        let entries = points
            .iter()
            .map(|p| GeomWithData::new([p.x, p.y], p.z))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            params,
        }
    }

    pub fn params(&self) -> &IdwParams {
        &self.params
    }

    /// Estimate at (x, y), or `None` when no tried radius covers all
    /// four quadrants.
    ///
    /// Quadrants are strict: points on the axes through (x, y) count for
    /// none of them but still take part in the weighted mean.
    pub fn estimate(&self, x: f64, y: f64) -> Option<f64> {
        let p = &self.params;
        let mut radius = p.start_radius;

        for _ in 0..p.attempts {
            let found: Vec<&IndexedPoint> = self
                .tree
                .locate_within_distance([x, y], radius * radius)
                .collect();

            if found.len() >= 4 * p.min_per_quadrant && covers_quadrants(&found, x, y, p.min_per_quadrant)
            {
                return weighted_mean(&found, x, y, p.power);
            }
            radius += p.increment;
        }
        None
    }
}

fn covers_quadrants(points: &[&IndexedPoint], x: f64, y: f64, min: usize) -> bool {
    let mut counts = [0usize; 4];
    for point in points {
        let [px, py] = *point.geom();
        let quadrant = match (px < x, px > x, py < y, py > y) {
            (true, _, true, _) => 0,
            (_, true, true, _) => 1,
            (true, _, _, true) => 2,
            (_, true, _, true) => 3,
            _ => continue,
        };
        counts[quadrant] += 1;
    }
    counts.iter().all(|&c| c >= min)
}

fn weighted_mean(points: &[&IndexedPoint], x: f64, y: f64, power: f64) -> Option<f64> {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for point in points {
        let [px, py] = *point.geom();
        let distance = (px - x).hypot(py - y);
        if distance > 0.0 {
            let w = 1.0 / distance.powf(power);
            weighted += point.data * w;
            total += w;
        }
    }
    (total > 0.0).then(|| weighted / total)
}
