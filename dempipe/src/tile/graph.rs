//! National tile adjacency graph.
//!
//! Built once at startup from the index footprints. For every ordered pair
//! of footprints that touch, the touch is classified as a corner (single
//! point) or an edge (line) and stored in the matching neighbor slot.
//!
//! # Classification
//!
//! ```text
//! point touch ──► compare with centroid ──► TopLeft / TopRight / BottomLeft / BottomRight
//! line touch  ──► vertical?   ──► yes ──► Left / Right   (x vs centroid)
//!                             └─► no  ──► Bottom / Top   (y vs centroid)
//! ```
//!
//! A shared edge split into several parts (extra vertices along one of the
//! rings) is collapsed into one straight segment spanning the rounded bounds
//! of all parts.

use std::collections::HashMap;

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BoundingRect, Centroid, Coord, Line, Point, Polygon, Relate};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use thiserror::Error;
use tracing::{debug, info};

use super::{Direction, Layout, Neighbors, Tile, TileId};

/// One entry of the national tile index.
#[derive(Clone, Debug)]
pub struct IndexFootprint {
    pub id: TileId,
    pub footprint: Polygon<f64>,
}

impl IndexFootprint {
    pub fn new(id: TileId, footprint: Polygon<f64>) -> Self {
        Self { id, footprint }
    }
}

/// Errors raised while building the graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two index entries share a sheet name.
    #[error("Duplicate tile in index: {0}")]
    DuplicateTile(TileId),

    /// A footprint has no extent.
    #[error("Tile {0} has an empty footprint")]
    EmptyFootprint(TileId),
}

/// Shape of the contact between two touching footprints.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Contact {
    Corner(Coord<f64>),
    Edge(Line<f64>),
}

/// Bounding box entry for candidate lookup.
struct FootprintEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for FootprintEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Owning map of every MAIN tile, keyed by id.
#[derive(Debug, Default)]
pub struct TileGraph {
    tiles: HashMap<TileId, Tile>,
}

impl TileGraph {
    /// Builds the graph from index footprints.
    ///
    /// Input file paths are resolved through `layout`.
    pub fn build(footprints: Vec<IndexFootprint>, layout: &Layout) -> Result<Self, GraphError> {
        let mut seen = HashMap::with_capacity(footprints.len());
        let mut envelopes = Vec::with_capacity(footprints.len());
        for (index, entry) in footprints.iter().enumerate() {
            if seen.insert(entry.id.clone(), index).is_some() {
                return Err(GraphError::DuplicateTile(entry.id.clone()));
            }
            let rect = entry
                .footprint
                .bounding_rect()
                .ok_or_else(|| GraphError::EmptyFootprint(entry.id.clone()))?;
            envelopes.push(FootprintEnvelope {
                index,
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            });
        }
        let tree = RTree::bulk_load(envelopes);

        let neighbors: Vec<Neighbors> = footprints
            .par_iter()
            .enumerate()
            .map(|(index, entry)| classify_neighbors(index, &footprints, &tree, entry))
            .collect();

        let mut tiles = HashMap::with_capacity(footprints.len());
        for (entry, neighbors) in footprints.into_iter().zip(neighbors) {
            let filepath = layout.main_tile_path(&entry.id);
            let mut tile = Tile::main(entry.id.clone(), entry.footprint, filepath);
            tile.set_neighbors(neighbors);
            tiles.insert(entry.id, tile);
        }

        info!(tiles = tiles.len(), "Tile graph built");
        Ok(Self { tiles })
    }

    /// Looks up a tile by id.
    pub fn get(&self, id: &TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.tiles.contains_key(id)
    }

    /// Resolves the neighbor of `id` in `direction`.
    pub fn neighbor(&self, id: &TileId, direction: Direction) -> Option<&Tile> {
        self.tiles
            .get(id)
            .and_then(|tile| tile.neighbors().get(direction))
            .and_then(|neighbor| self.tiles.get(neighbor))
    }

    /// Input files of the neighbors of `id` in the given directions.
    ///
    /// Empty slots are skipped.
    pub fn neighbor_files(&self, id: &TileId, directions: &[Direction]) -> Vec<std::path::PathBuf> {
        directions
            .iter()
            .filter_map(|d| self.neighbor(id, *d))
            .map(|tile| tile.filepath().to_path_buf())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Iterates over all tiles in arbitrary order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }
}

fn classify_neighbors(
    index: usize,
    footprints: &[IndexFootprint],
    tree: &RTree<FootprintEnvelope>,
    entry: &IndexFootprint,
) -> Neighbors {
    let mut neighbors = Neighbors::default();
    let Some(centroid) = entry.footprint.centroid() else {
        return neighbors;
    };
    let Some(rect) = entry.footprint.bounding_rect() else {
        return neighbors;
    };

    // Touching boxes share at least a boundary coordinate, so a tiny
    // expansion is enough to find every candidate.
    let pad = 1e-6;
    let search = AABB::from_corners(
        [rect.min().x - pad, rect.min().y - pad],
        [rect.max().x + pad, rect.max().y + pad],
    );

    for candidate in tree.locate_in_envelope_intersecting(&search) {
        if candidate.index == index {
            continue;
        }
        let other = &footprints[candidate.index];
        if !entry.footprint.relate(&other.footprint).is_touches() {
            continue;
        }
        let Some(contact) = contact_between(&entry.footprint, &other.footprint) else {
            continue;
        };
        let direction = direction_of(contact, centroid);
        debug!(tile = %entry.id, neighbor = %other.id, %direction, "Neighbor found");
        neighbors.set(direction, other.id.clone());
    }

    neighbors
}

/// Intersection of the two exterior rings, reduced to a single corner or edge.
fn contact_between(a: &Polygon<f64>, b: &Polygon<f64>) -> Option<Contact> {
    let mut points = Vec::new();
    let mut segments = Vec::new();

    for line_a in a.exterior().lines() {
        for line_b in b.exterior().lines() {
            match line_intersection(line_a, line_b) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    points.push(intersection)
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    if intersection.start != intersection.end {
                        segments.push(intersection);
                    } else {
                        points.push(intersection.start);
                    }
                }
                None => {}
            }
        }
    }

    match segments.len() {
        0 => points.first().copied().map(Contact::Corner),
        1 => Some(Contact::Edge(segments[0])),
        _ => Some(Contact::Edge(merge_segments(&segments))),
    }
}

/// Collapses a multi-part edge into one segment over the rounded bounds.
fn merge_segments(segments: &[Line<f64>]) -> Line<f64> {
    let mut min = Coord {
        x: f64::INFINITY,
        y: f64::INFINITY,
    };
    let mut max = Coord {
        x: f64::NEG_INFINITY,
        y: f64::NEG_INFINITY,
    };
    for segment in segments {
        for c in [segment.start, segment.end] {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
    }
    Line::new(
        Coord {
            x: min.x.round(),
            y: min.y.round(),
        },
        Coord {
            x: max.x.round(),
            y: max.y.round(),
        },
    )
}

fn direction_of(contact: Contact, centroid: Point<f64>) -> Direction {
    match contact {
        Contact::Corner(c) => match (c.x < centroid.x(), c.y < centroid.y()) {
            (true, true) => Direction::BottomLeft,
            (true, false) => Direction::TopLeft,
            (false, true) => Direction::BottomRight,
            (false, false) => Direction::TopRight,
        },
        Contact::Edge(line) => {
            let dx = (line.end.x - line.start.x).abs();
            let dy = (line.end.y - line.start.y).abs();
            if dx < dy {
                if line.start.x < centroid.x() {
                    Direction::Left
                } else {
                    Direction::Right
                }
            } else if line.start.y < centroid.y() {
                Direction::Bottom
            } else {
                Direction::Top
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FolderPaths;
    use geo::{coord, LineString, Rect};
    use proptest::prelude::*;

    fn layout() -> Layout {
        Layout::new(FolderPaths::under("/nonexistent"))
    }

    fn square(name: &str, x: f64, y: f64, size: f64) -> IndexFootprint {
        IndexFootprint::new(
            TileId::new(name),
            Rect::new(coord! { x: x, y: y }, coord! { x: x + size, y: y + size }).to_polygon(),
        )
    }

    /// 3x3 grid of 10x10 squares named by (col, row).
    fn grid_3x3() -> Vec<IndexFootprint> {
        let mut out = Vec::new();
        for col in 0..3 {
            for row in 0..3 {
                out.push(square(&format!("T{}{}", col, row), col as f64 * 10.0, row as f64 * 10.0, 10.0));
            }
        }
        out
    }

    fn assert_symmetric(graph: &TileGraph) {
        for tile in graph.tiles() {
            for (direction, neighbor) in tile.neighbors().iter() {
                let back = graph.get(neighbor).unwrap().neighbors().get(direction.opposite());
                assert_eq!(back, Some(tile.id()), "{} {} {}", tile.id(), direction, neighbor);
            }
        }
    }

    #[test]
    fn test_center_tile_has_all_neighbors() {
        let graph = TileGraph::build(grid_3x3(), &layout()).unwrap();
        let center = TileId::new("T11");
        let n = graph.get(&center).unwrap().neighbors();

        assert_eq!(n.len(), 8);
        assert_eq!(n.get(Direction::Left), Some(&TileId::new("T01")));
        assert_eq!(n.get(Direction::Right), Some(&TileId::new("T21")));
        assert_eq!(n.get(Direction::Top), Some(&TileId::new("T12")));
        assert_eq!(n.get(Direction::Bottom), Some(&TileId::new("T10")));
        assert_eq!(n.get(Direction::TopLeft), Some(&TileId::new("T02")));
        assert_eq!(n.get(Direction::TopRight), Some(&TileId::new("T22")));
        assert_eq!(n.get(Direction::BottomLeft), Some(&TileId::new("T00")));
        assert_eq!(n.get(Direction::BottomRight), Some(&TileId::new("T20")));
    }

    #[test]
    fn test_corner_tile_has_three_neighbors() {
        let graph = TileGraph::build(grid_3x3(), &layout()).unwrap();
        let n = graph.get(&TileId::new("T00")).unwrap().neighbors();
        assert_eq!(n.len(), 3);
        assert_eq!(n.get(Direction::Right), Some(&TileId::new("T10")));
        assert_eq!(n.get(Direction::Top), Some(&TileId::new("T01")));
        assert_eq!(n.get(Direction::TopRight), Some(&TileId::new("T11")));
        assert_symmetric(&graph);
    }

    #[test]
    fn test_disjoint_tiles_have_no_neighbors() {
        let graph = TileGraph::build(
            vec![square("a", 0.0, 0.0, 10.0), square("b", 20.0, 0.0, 10.0)],
            &layout(),
        )
        .unwrap();
        assert!(graph.get(&TileId::new("A")).unwrap().neighbors().is_empty());
        assert!(graph.get(&TileId::new("B")).unwrap().neighbors().is_empty());
    }

    #[test]
    fn test_multi_part_edge_is_simplified() {
        // Right tile has an extra vertex halfway along its left edge
        let left = square("left", 0.0, 0.0, 10.0);
        let right = IndexFootprint::new(
            TileId::new("right"),
            Polygon::new(
                LineString::from(vec![
                    (10.0, 0.0),
                    (20.0, 0.0),
                    (20.0, 10.0),
                    (10.0, 10.0),
                    (10.0, 5.0),
                    (10.0, 0.0),
                ]),
                vec![],
            ),
        );
        let graph = TileGraph::build(vec![left, right], &layout()).unwrap();
        assert_eq!(
            graph.get(&TileId::new("LEFT")).unwrap().neighbors().get(Direction::Right),
            Some(&TileId::new("RIGHT"))
        );
        assert_eq!(
            graph.get(&TileId::new("RIGHT")).unwrap().neighbors().get(Direction::Left),
            Some(&TileId::new("LEFT"))
        );
    }

    #[test]
    fn test_duplicate_tile_rejected() {
        let result = TileGraph::build(
            vec![square("a", 0.0, 0.0, 10.0), square("A", 10.0, 0.0, 10.0)],
            &layout(),
        );
        assert!(matches!(result, Err(GraphError::DuplicateTile(_))));
    }

    #[test]
    fn test_neighbor_files() {
        let graph = TileGraph::build(grid_3x3(), &layout()).unwrap();
        let files = graph.neighbor_files(
            &TileId::new("T00"),
            &[Direction::Left, Direction::BottomLeft, Direction::Right],
        );
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("C_T10.LAZ"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_adjacency_is_symmetric(
            widths in prop::collection::vec(1u32..50, 1..5),
            heights in prop::collection::vec(1u32..50, 1..5),
        ) {
            let mut footprints = Vec::new();
            let mut x = 0.0;
            for (col, w) in widths.iter().enumerate() {
                let mut y = 0.0;
                for (row, h) in heights.iter().enumerate() {
                    let rect = Rect::new(
                        coord! { x: x, y: y },
                        coord! { x: x + *w as f64, y: y + *h as f64 },
                    );
                    footprints.push(IndexFootprint::new(
                        TileId::new(format!("C{}R{}", col, row)),
                        rect.to_polygon(),
                    ));
                    y += *h as f64;
                }
                x += *w as f64;
            }
            let graph = TileGraph::build(footprints, &layout()).unwrap();
            assert_symmetric(&graph);

            // Interior tiles of the grid see all 8 neighbors
            for col in 1..widths.len().saturating_sub(1) {
                for row in 1..heights.len().saturating_sub(1) {
                    let id = TileId::new(format!("C{}R{}", col, row));
                    prop_assert_eq!(graph.get(&id).unwrap().neighbors().len(), 8);
                }
            }
        }
    }
}
