//! Where a cell sits in its parent's grid, and which neighbor tiles cover
//! its buffer zone.

use std::fmt;

use crate::tile::Direction;

/// Position class of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubtilePosition {
    BottomLeft,
    TopLeft,
    TopRight,
    BottomRight,
    Left,
    Right,
    Top,
    Bottom,
    Interior,
}

impl SubtilePosition {
    /// Classifies cell `index` (1-based, column-major) of a `rows × cols` grid.
    ///
    /// Corners take precedence over edges, and the left and right columns
    /// over the top and bottom rows.
    pub fn of(index: usize, rows: usize, cols: usize) -> Self {
        let total = rows * cols;
        let bottom_right = total + 1 - rows;

        if index == 1 {
            Self::BottomLeft
        } else if index == rows {
            Self::TopLeft
        } else if index == total {
            Self::TopRight
        } else if index == bottom_right {
            Self::BottomRight
        } else if index > 1 && index < rows {
            Self::Left
        } else if index > bottom_right && index < total {
            Self::Right
        } else if index % rows == 0 {
            Self::Top
        } else if index % rows == 1 {
            Self::Bottom
        } else {
            Self::Interior
        }
    }

    /// Neighbor slots of the parent whose points reach into this cell's buffer.
    pub fn directions(self) -> &'static [Direction] {
        use Direction::*;
        match self {
            Self::BottomLeft => &[Left, BottomLeft, Bottom],
            Self::TopLeft => &[Left, TopLeft, Top],
            Self::TopRight => &[Right, TopRight, Top],
            Self::BottomRight => &[Right, BottomRight, Bottom],
            Self::Left => &[Left],
            Self::Right => &[Right],
            Self::Top => &[Top],
            Self::Bottom => &[Bottom],
            Self::Interior => &[],
        }
    }
}

impl fmt::Display for SubtilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BottomLeft => "bottom-left",
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomRight => "bottom-right",
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Interior => "interior",
        };
        f.write_str(name)
    }
}

/// Neighbor slots to merge before clipping cell `index`.
///
/// Grids of at least 2×2 use the position class. Single-row or
/// single-column grids have cells touching opposite borders at once, so
/// their set is built from the borders each cell actually touches.
pub fn gather_directions(index: usize, rows: usize, cols: usize) -> Vec<Direction> {
    if rows >= 2 && cols >= 2 {
        return SubtilePosition::of(index, rows, cols).directions().to_vec();
    }

    let col = (index - 1) / rows;
    let row = (index - 1) % rows;
    let left = col == 0;
    let right = col + 1 == cols;
    let bottom = row == 0;
    let top = row + 1 == rows;

    Direction::ALL
        .into_iter()
        .filter(|d| match d {
            Direction::Left => left,
            Direction::Right => right,
            Direction::Bottom => bottom,
            Direction::Top => top,
            Direction::TopLeft => top && left,
            Direction::TopRight => top && right,
            Direction::BottomLeft => bottom && left,
            Direction::BottomRight => bottom && right,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_4x4() {
        use SubtilePosition::*;
        let expected = [
            // column 0, bottom to top
            BottomLeft, Left, Left, TopLeft,
            // column 1
            Bottom, Interior, Interior, Top,
            // column 2
            Bottom, Interior, Interior, Top,
            // column 3
            BottomRight, Right, Right, TopRight,
        ];
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(SubtilePosition::of(i + 1, 4, 4), *want, "index {}", i + 1);
        }
    }

    #[test]
    fn test_corner_neighbor_sets() {
        assert_eq!(
            SubtilePosition::BottomLeft.directions(),
            &[Direction::Left, Direction::BottomLeft, Direction::Bottom]
        );
        assert_eq!(
            SubtilePosition::TopRight.directions(),
            &[Direction::Right, Direction::TopRight, Direction::Top]
        );
        assert!(SubtilePosition::Interior.directions().is_empty());
    }

    #[test]
    fn test_gather_matches_position_on_regular_grids() {
        for index in 1..=12 {
            let dirs = gather_directions(index, 3, 4);
            assert_eq!(dirs.as_slice(), SubtilePosition::of(index, 3, 4).directions());
        }
    }

    #[test]
    fn test_gather_single_cell_needs_every_neighbor() {
        assert_eq!(gather_directions(1, 1, 1).len(), 8);
    }

    #[test]
    fn test_gather_single_row() {
        // middle cell of a 1x3 strip touches top and bottom
        let dirs = gather_directions(2, 1, 3);
        assert_eq!(dirs, vec![Direction::Top, Direction::Bottom]);
    }

    #[test]
    fn test_display() {
        assert_eq!(SubtilePosition::BottomRight.to_string(), "bottom-right");
    }
}
