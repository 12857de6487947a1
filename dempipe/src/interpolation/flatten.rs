//! Flattening of water bodies and building footprints.
//!
//! Each polygon touching the sub-tile is given one elevation: the median of
//! the triangulated surface sampled at its vertices (exterior and interior
//! rings) that lie inside the convex hull of the valid grid nodes. Every
//! cell covered by the polygon then takes that elevation.

use geo::{Contains, ConvexHull, Coord, LineString, MultiPoint, Point, Polygon, Rect};
use tracing::debug;

use super::patch::median;
use super::tin::Tin;
use super::GridSpec;
use crate::raster::{is_nodata, Grid};
use crate::tile::{Layout, Product};
use crate::vector::{load_polygons, polygons_in_bbox, rasterize, VectorError};

/// Polygon layers used for flattening.
#[derive(Clone, Debug, Default)]
pub struct FlatteningPolygons {
    /// Flattened in every product.
    pub water: Vec<Polygon<f64>>,
    /// Flattened in the DTM only.
    pub buildings: Vec<Polygon<f64>>,
}

impl FlatteningPolygons {
    /// Reads the water and building layers.
    pub fn load(layout: &Layout) -> Result<Self, VectorError> {
        Ok(Self {
            water: load_polygons(&layout.water_polygon_dir())?,
            buildings: load_polygons(&layout.building_polygon_dir())?,
        })
    }

    /// Polygons that apply to `product` inside `bbox`, clipped to it.
    pub fn select(&self, product: Product, bbox: &Rect<f64>) -> Vec<Polygon<f64>> {
        let mut selected = polygons_in_bbox(&self.water, bbox);
        if product == Product::Dtm {
            selected.extend(polygons_in_bbox(&self.buildings, bbox));
        }
        selected
    }
}

/// Convex hull of the valid nodes of `grid`.
///
/// Only the outermost valid node of each row side is needed.
fn valid_hull(grid: &Grid, spec: &GridSpec) -> Polygon<f64> {
    let mut extremes = Vec::new();
    for (r, row) in grid.data.outer_iter().enumerate() {
        let first = row.iter().position(|v| !is_nodata(*v));
        let last = row.iter().rposition(|v| !is_nodata(*v));
        for c in [first, last].into_iter().flatten() {
            let (x, y) = spec.node(r, c);
            extremes.push(Point::new(x, y));
        }
    }
    MultiPoint::new(extremes).convex_hull()
}

/// Ring coordinates without the closing repeat.
fn ring_vertices(ring: &LineString<f64>) -> &[Coord<f64>] {
    match ring.0.split_last() {
        Some((last, rest)) if ring.0.len() > 1 && Some(last) == ring.0.first() => rest,
        _ => &ring.0,
    }
}

/// Flattens `polygons` into `grid`, sampling elevations from `tin`.
///
/// Returns the number of polygons burned in.
pub fn flatten_polygons(grid: &mut Grid, spec: &GridSpec, tin: &Tin, polygons: &[Polygon<f64>]) -> usize {
    if polygons.is_empty() || tin.is_empty() {
        return 0;
    }

    let hull = valid_hull(grid, spec);
    let mut hint = tin.start_hint();
    let mut shapes = Vec::new();

    for polygon in polygons {
        let mut samples: Vec<f64> = std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .flat_map(ring_vertices)
            .filter(|c| hull.contains(*c))
            .filter_map(|c| tin.interpolate_laplace(c.x, c.y, &mut hint).ok())
            .collect();

        if let Some(level) = median(&mut samples) {
            shapes.push((polygon.clone(), level));
        }
    }

    let burned = shapes.len();
    let cells = rasterize(grid, &shapes);
    debug!(polygons = polygons.len(), burned, cells, "Flattened polygons");
    burned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcloud::SurveyPoint;
    use crate::raster::NODATA;
    use geo::{coord, polygon};

    fn spec() -> GridSpec {
        GridSpec::from_bounds(
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 }),
            1.0,
        )
    }

    fn sloped_tin() -> Tin {
        let mut points = Vec::new();
        for i in -2..=12 {
            for j in -2..=12 {
                let (x, y) = (i as f64 + 0.01 * (j % 3) as f64, j as f64 + 0.013 * (i % 4) as f64);
                points.push(SurveyPoint::new(x, y, x));
            }
        }
        Tin::new(&points)
    }

    #[test]
    fn test_polygon_takes_median_of_vertex_samples() {
        let spec = spec();
        let mut grid = Grid::filled(spec.transform(), spec.rows, spec.cols, 50.0);
        let tin = sloped_tin();
        // surface z = x; vertices at x = 2, 4, 4, 2 → median 3
        let lake = polygon![(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 6.0), (x: 2.0, y: 6.0)];

        let burned = flatten_polygons(&mut grid, &spec, &tin, &[lake]);
        assert_eq!(burned, 1);

        // cell centred at (2.5, 5.5) is inside the lake
        let (r, c) = spec.transform().cell_at(2.5, 5.5);
        assert!((grid.data[[r as usize, c as usize]] - 3.0).abs() < 1e-6);
        assert_eq!(grid.data[[0, 0]], 50.0);
    }

    #[test]
    fn test_vertices_outside_valid_hull_are_ignored() {
        let spec = spec();
        let mut grid = Grid::filled(spec.transform(), spec.rows, spec.cols, NODATA);
        grid.data[[0, 0]] = 1.0;
        let tin = sloped_tin();
        let lake = polygon![(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 6.0)];

        assert_eq!(flatten_polygons(&mut grid, &spec, &tin, &[lake]), 0);
        assert_eq!(grid.valid_count(), 1);
    }

    #[test]
    fn test_buildings_only_for_dtm() {
        let square = |x: f64| Rect::new(coord! { x: x, y: 1.0 }, coord! { x: x + 1.0, y: 2.0 }).to_polygon();
        let layers = FlatteningPolygons {
            water: vec![square(1.0)],
            buildings: vec![square(3.0), square(50.0)],
        };
        let bbox = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 });

        assert_eq!(layers.select(Product::Dtm, &bbox).len(), 2);
        assert_eq!(layers.select(Product::Dsm, &bbox).len(), 1);
    }
}
