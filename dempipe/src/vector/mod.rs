//! Polygon layers and polygon-to-grid primitives.
//!
//! Flattening and homogenization polygons are read from GeoJSON files
//! (`*.geojson` / `*.json`) in a folder. Polygons are clipped to a box with
//! Sutherland-Hodgman and burned onto grids by cell centre.

pub(crate) mod geojson;

use std::fs;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Contains, Coord, Intersects, LineString, Polygon, Rect};
use thiserror::Error;
use tracing::{debug, warn};

use crate::raster::{GeoTransform, Grid};
use geojson::FeatureCollection;

/// Errors from reading polygon layers.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid GeoJSON in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid layer pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

// =============================================================================
// Loading
// =============================================================================

/// Reads every polygon from the GeoJSON layers directly inside `dir`.
///
/// A missing folder yields no polygons.
pub fn load_polygons(dir: &Path) -> Result<Vec<Polygon<f64>>, VectorError> {
    if !dir.is_dir() {
        debug!(folder = %dir.display(), "No polygon folder");
        return Ok(Vec::new());
    }

    let mut polygons = Vec::new();
    let pattern = dir.join("*");
    for entry in glob::glob(&pattern.to_string_lossy())? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable polygon layer");
                continue;
            }
        };
        let is_layer = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"));
        if !is_layer || !path.is_file() {
            continue;
        }
        let layer = read_layer(&path)?;
        debug!(layer = %path.display(), polygons = layer.len(), "Loaded polygon layer");
        polygons.extend(layer);
    }
    Ok(polygons)
}

fn read_layer(path: &Path) -> Result<Vec<Polygon<f64>>, VectorError> {
    let text = fs::read_to_string(path).map_err(|source| VectorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let collection: FeatureCollection =
        serde_json::from_str(&text).map_err(|e| VectorError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(collection
        .features
        .iter()
        .flat_map(|f| f.polygons())
        .collect())
}

// =============================================================================
// Clipping
// =============================================================================

#[derive(Clone, Copy)]
enum Edge {
    Left,
    Right,
    Bottom,
    Top,
}

impl Edge {
    fn is_inside(self, p: Coord<f64>, rect: &Rect<f64>) -> bool {
        match self {
            Edge::Left => p.x >= rect.min().x,
            Edge::Right => p.x <= rect.max().x,
            Edge::Bottom => p.y >= rect.min().y,
            Edge::Top => p.y <= rect.max().y,
        }
    }

    fn intersect(self, p: Coord<f64>, q: Coord<f64>, rect: &Rect<f64>) -> Coord<f64> {
        let (dx, dy) = (q.x - p.x, q.y - p.y);
        match self {
            Edge::Left => {
                let x = rect.min().x;
                Coord { x, y: p.y + (x - p.x) / dx * dy }
            }
            Edge::Right => {
                let x = rect.max().x;
                Coord { x, y: p.y + (x - p.x) / dx * dy }
            }
            Edge::Bottom => {
                let y = rect.min().y;
                Coord { x: p.x + (y - p.y) / dy * dx, y }
            }
            Edge::Top => {
                let y = rect.max().y;
                Coord { x: p.x + (y - p.y) / dy * dx, y }
            }
        }
    }
}

fn clip_ring(ring: &LineString<f64>, rect: &Rect<f64>) -> Option<LineString<f64>> {
    let mut vertices: Vec<Coord<f64>> = ring.0.clone();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }

    for edge in [Edge::Left, Edge::Right, Edge::Bottom, Edge::Top] {
        let n = vertices.len();
        let mut output = Vec::with_capacity(n + 4);
        for i in 0..n {
            let current = vertices[i];
            let next = vertices[(i + 1) % n];
            match (edge.is_inside(current, rect), edge.is_inside(next, rect)) {
                (true, true) => output.push(next),
                (true, false) => output.push(edge.intersect(current, next, rect)),
                (false, true) => {
                    output.push(edge.intersect(current, next, rect));
                    output.push(next);
                }
                (false, false) => {}
            }
        }
        vertices = output;
        if vertices.len() < 3 {
            return None;
        }
    }

    vertices.push(vertices[0]);
    Some(LineString::new(vertices))
}

/// Clips `polygon` to `rect`, interior rings included.
///
/// Returns `None` when nothing of the exterior remains.
pub fn clip_to_rect(polygon: &Polygon<f64>, rect: &Rect<f64>) -> Option<Polygon<f64>> {
    let exterior = clip_ring(polygon.exterior(), rect)?;
    let interiors = polygon
        .interiors()
        .iter()
        .filter_map(|ring| clip_ring(ring, rect))
        .collect();
    Some(Polygon::new(exterior, interiors))
}

/// Polygons intersecting `bbox`, clipped to it when they extend beyond.
pub fn polygons_in_bbox(polygons: &[Polygon<f64>], bbox: &Rect<f64>) -> Vec<Polygon<f64>> {
    polygons
        .iter()
        .filter_map(|polygon| {
            let extent = polygon.bounding_rect()?;
            if !extent.intersects(bbox) {
                return None;
            }
            let inside = extent.min().x >= bbox.min().x
                && extent.min().y >= bbox.min().y
                && extent.max().x <= bbox.max().x
                && extent.max().y <= bbox.max().y;
            if inside {
                Some(polygon.clone())
            } else {
                clip_to_rect(polygon, bbox)
            }
        })
        .collect()
}

// =============================================================================
// Rasterization
// =============================================================================

/// Cells of a `rows` × `cols` grid whose centre lies inside `polygon`.
pub fn covered_cells(
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    polygon: &Polygon<f64>,
) -> Vec<(usize, usize)> {
    let Some(extent) = polygon.bounding_rect() else {
        return Vec::new();
    };
    let (r_top, c_left) = transform.cell_at(extent.min().x, extent.max().y);
    let (r_bottom, c_right) = transform.cell_at(extent.max().x, extent.min().y);

    let clamp = |v: i64, len: usize| v.clamp(0, len as i64 - 1) as usize;
    if rows == 0 || cols == 0 || r_bottom < 0 || c_right < 0 {
        return Vec::new();
    }
    if r_top >= rows as i64 || c_left >= cols as i64 {
        return Vec::new();
    }

    let mut cells = Vec::new();
    for row in clamp(r_top, rows)..=clamp(r_bottom, rows) {
        for col in clamp(c_left, cols)..=clamp(c_right, cols) {
            let (x, y) = transform.cell_center(row, col);
            if polygon.contains(&Coord { x, y }) {
                cells.push((row, col));
            }
        }
    }
    cells
}

/// Burns each `(polygon, value)` pair onto `grid`; later shapes win.
///
/// Returns the number of cells written.
pub fn rasterize(grid: &mut Grid, shapes: &[(Polygon<f64>, f64)]) -> usize {
    let (rows, cols) = (grid.rows(), grid.cols());
    let mut written = 0;
    for (polygon, value) in shapes {
        for (r, c) in covered_cells(&grid.transform, rows, cols, polygon) {
            grid.data[[r, c]] = *value;
            written += 1;
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::NODATA;
    use geo::{coord, polygon, Area};
    use tempfile::TempDir;

    fn rect(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Rect<f64> {
        Rect::new(coord! { x: minx, y: miny }, coord! { x: maxx, y: maxy })
    }

    #[test]
    fn test_clip_partially_overlapping_polygon() {
        let square = rect(-5.0, -5.0, 5.0, 5.0).to_polygon();
        let clipped = clip_to_rect(&square, &rect(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert!((clipped.unsigned_area() - 25.0).abs() < 1e-9);
        let bbox = clipped.bounding_rect().unwrap();
        assert_eq!(bbox, rect(0.0, 0.0, 5.0, 5.0));
    }

    #[test]
    fn test_clip_disjoint_polygon() {
        let square = rect(20.0, 20.0, 30.0, 30.0).to_polygon();
        assert!(clip_to_rect(&square, &rect(0.0, 0.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn test_polygons_in_bbox_keeps_inside_and_clips_partial() {
        let inside = rect(1.0, 1.0, 2.0, 2.0).to_polygon();
        let partial = rect(8.0, 8.0, 12.0, 12.0).to_polygon();
        let outside = rect(20.0, 20.0, 30.0, 30.0).to_polygon();

        let kept = polygons_in_bbox(&[inside.clone(), partial, outside], &rect(0.0, 0.0, 10.0, 10.0));
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0], inside);
        assert!((kept[1].unsigned_area() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_covered_cells_by_centre() {
        let transform = GeoTransform::new(0.0, 4.0, 1.0);
        let tri = polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 0.0, y: 4.0)];
        let mut cells = covered_cells(&transform, 4, 4, &tri);
        cells.sort();
        // centres strictly below the hypotenuse x + y = 4
        let expected: Vec<(usize, usize)> = (0..4)
            .flat_map(|r| (0..4).map(move |c| (r, c)))
            .filter(|&(r, c)| (c as f64 + 0.5) + (3.5 - r as f64) < 4.0)
            .collect();
        assert_eq!(cells, expected);
        assert_eq!(cells.len(), 6);
    }

    #[test]
    fn test_covered_cells_outside_grid() {
        let transform = GeoTransform::new(0.0, 4.0, 1.0);
        let far = rect(10.0, 10.0, 12.0, 12.0).to_polygon();
        assert!(covered_cells(&transform, 4, 4, &far).is_empty());
    }

    #[test]
    fn test_rasterize_burns_values() {
        let mut grid = Grid::filled(GeoTransform::new(0.0, 4.0, 1.0), 4, 4, NODATA);
        let written = rasterize(&mut grid, &[(rect(0.0, 0.0, 2.0, 2.0).to_polygon(), 3.0)]);
        assert_eq!(written, 4);
        assert_eq!(grid.data[[3, 0]], 3.0);
        assert_eq!(grid.data[[0, 0]], NODATA);
    }

    #[test]
    fn test_load_polygons_from_folder() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("water.geojson"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},"geometry":{"type":"Polygon",
                 "coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let polygons = load_polygons(dir.path()).unwrap();
        assert_eq!(polygons.len(), 1);
        assert!(load_polygons(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_load_polygons_rejects_bad_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.geojson"), "{ not json").unwrap();
        assert!(matches!(
            load_polygons(dir.path()),
            Err(VectorError::Parse { .. })
        ));
    }
}
