//! Tile model.
//!
//! A [`Tile`] is either a MAIN tile taken from the national index or a
//! SUBTILE cell produced by the subtiler. All MAIN tiles are owned by the
//! [`TileGraph`]; neighbor relations are stored as [`TileId`]s and resolved
//! through the graph, never as owning references.
//!
//! # Neighborhood
//!
//! ```text
//!  TopLeft    │  Top    │ TopRight
//! ────────────┼─────────┼────────────
//!  Left       │  tile   │ Right
//! ────────────┼─────────┼────────────
//!  BottomLeft │ Bottom  │ BottomRight
//! ```

mod graph;
mod layout;

pub use graph::{GraphError, IndexFootprint, TileGraph};
pub use layout::{discover_targets, Layout, Product, Stage};
pub(crate) use layout::ensure_parent;

use std::fmt;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Polygon, Rect};

use crate::raster::Raster;

// =============================================================================
// Tile identity
// =============================================================================

/// Uppercase tile name, e.g. `37EN1` or `37EN1_5`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(String);

impl TileId {
    /// Creates an id, normalizing the name to uppercase.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_uppercase())
    }

    /// Id of sub-tile `index` (1-based) of this tile.
    pub fn subtile(&self, index: usize) -> Self {
        Self(format!("{}_{}", self.0, index))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a tile comes from the index or from subdivision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TileKind {
    /// A national index tile.
    Main,
    /// Cell `index` (1-based, column-major) of `parent`.
    Subtile { parent: TileId, index: usize },
}

// =============================================================================
// Neighbors
// =============================================================================

/// The 8 neighbor slots around a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Direction {
    /// All directions in slot order.
    pub const ALL: [Direction; 8] = [
        Direction::Top,
        Direction::Bottom,
        Direction::Left,
        Direction::Right,
        Direction::TopLeft,
        Direction::TopRight,
        Direction::BottomLeft,
        Direction::BottomRight,
    ];

    /// The slot that points back from the neighbor.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Top => Direction::Bottom,
            Direction::Bottom => Direction::Top,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::TopLeft => Direction::BottomRight,
            Direction::TopRight => Direction::BottomLeft,
            Direction::BottomLeft => Direction::TopRight,
            Direction::BottomRight => Direction::TopLeft,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Top => "top",
            Direction::Bottom => "bottom",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::TopLeft => "top-left",
            Direction::TopRight => "top-right",
            Direction::BottomLeft => "bottom-left",
            Direction::BottomRight => "bottom-right",
        };
        f.write_str(name)
    }
}

/// Neighbor ids by direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Neighbors {
    slots: [Option<TileId>; 8],
}

impl Neighbors {
    /// Neighbor in the given direction, if any.
    pub fn get(&self, direction: Direction) -> Option<&TileId> {
        self.slots[direction.slot()].as_ref()
    }

    /// Records a neighbor in the given direction.
    pub fn set(&mut self, direction: Direction, id: TileId) {
        self.slots[direction.slot()] = Some(id);
    }

    /// Iterates over the filled slots.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, &TileId)> {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.get(d).map(|id| (d, id)))
    }

    /// Number of filled slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True when no slot is filled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tile
// =============================================================================

/// A MAIN tile or a SUBTILE cell.
#[derive(Clone, Debug)]
pub struct Tile {
    id: TileId,
    geometry: Polygon<f64>,
    unbuffered: Option<Polygon<f64>>,
    kind: TileKind,
    neighbors: Neighbors,
    filepath: PathBuf,

    /// Set once the interpolation task has handled this tile.
    pub interpolated: bool,

    /// Raster produced by the interpolation task, if any.
    pub related_raster: Option<Raster>,
}

impl Tile {
    /// Creates a MAIN tile from an index footprint.
    pub fn main(id: TileId, geometry: Polygon<f64>, filepath: PathBuf) -> Self {
        Self {
            id,
            geometry,
            unbuffered: None,
            kind: TileKind::Main,
            neighbors: Neighbors::default(),
            filepath,
            interpolated: false,
            related_raster: None,
        }
    }

    /// Creates SUBTILE `index` of `parent` from its buffered and unbuffered boxes.
    pub fn subtile(
        parent: &TileId,
        index: usize,
        buffered: Rect<f64>,
        unbuffered: Rect<f64>,
        filepath: PathBuf,
    ) -> Self {
        Self {
            id: parent.subtile(index),
            geometry: buffered.to_polygon(),
            unbuffered: Some(unbuffered.to_polygon()),
            kind: TileKind::Subtile {
                parent: parent.clone(),
                index,
            },
            neighbors: Neighbors::default(),
            filepath,
            interpolated: false,
            related_raster: None,
        }
    }

    pub fn id(&self) -> &TileId {
        &self.id
    }

    pub fn kind(&self) -> &TileKind {
        &self.kind
    }

    pub fn is_subtile(&self) -> bool {
        matches!(self.kind, TileKind::Subtile { .. })
    }

    /// Parent id for sub-tiles.
    pub fn parent(&self) -> Option<&TileId> {
        match &self.kind {
            TileKind::Main => None,
            TileKind::Subtile { parent, .. } => Some(parent),
        }
    }

    /// Sub-tile index for sub-tiles.
    pub fn subtile_index(&self) -> Option<usize> {
        match &self.kind {
            TileKind::Main => None,
            TileKind::Subtile { index, .. } => Some(*index),
        }
    }

    /// Buffered geometry for sub-tiles, footprint for MAIN tiles.
    pub fn geometry(&self) -> &Polygon<f64> {
        &self.geometry
    }

    /// Unbuffered geometry, if this tile has one.
    pub fn unbuffered_geometry(&self) -> Option<&Polygon<f64>> {
        self.unbuffered.as_ref()
    }

    /// Bounding box of the unbuffered geometry, falling back to the geometry.
    pub fn unbuffered_bounds(&self) -> Option<Rect<f64>> {
        self.unbuffered
            .as_ref()
            .unwrap_or(&self.geometry)
            .bounding_rect()
    }

    /// Bounding box of the geometry.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    pub fn neighbors(&self) -> &Neighbors {
        &self.neighbors
    }

    pub(crate) fn set_neighbors(&mut self, neighbors: Neighbors) {
        self.neighbors = neighbors;
    }

    /// Resolved input point-cloud file.
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn test_tile_id_uppercases() {
        let id = TileId::new(" 37en1 ");
        assert_eq!(id.as_str(), "37EN1");
        assert_eq!(id.subtile(3).as_str(), "37EN1_3");
        assert_eq!(id.to_string(), "37EN1");
    }

    #[test]
    fn test_direction_opposite_is_involution() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert_ne!(d.opposite(), d);
        }
    }

    #[test]
    fn test_neighbors_set_and_iter() {
        let mut neighbors = Neighbors::default();
        assert!(neighbors.is_empty());
        neighbors.set(Direction::Left, TileId::new("a"));
        neighbors.set(Direction::TopRight, TileId::new("b"));
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors.get(Direction::Left), Some(&TileId::new("A")));
        assert_eq!(neighbors.get(Direction::Right), None);
        let dirs: Vec<_> = neighbors.iter().map(|(d, _)| d).collect();
        assert_eq!(dirs, vec![Direction::Left, Direction::TopRight]);
    }

    #[test]
    fn test_subtile_links_parent() {
        let parent = TileId::new("37EN1");
        let unbuffered = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 });
        let buffered = Rect::new(coord! { x: -2.0, y: -2.0 }, coord! { x: 12.0, y: 12.0 });
        let tile = Tile::subtile(&parent, 2, buffered, unbuffered, PathBuf::from("2.LAS"));

        assert!(tile.is_subtile());
        assert_eq!(tile.parent(), Some(&parent));
        assert_eq!(tile.subtile_index(), Some(2));
        assert_eq!(tile.id().as_str(), "37EN1_2");
        assert_eq!(tile.unbuffered_bounds(), Some(unbuffered));
        assert_eq!(tile.bounds(), Some(buffered));
        assert!(!tile.interpolated);
        assert!(tile.related_raster.is_none());
    }
}
