//! Hole patching.

use crate::raster::{is_nodata, Grid};

const OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Median of `values`; the mean of the middle pair for even counts.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Fills every NODATA cell that has a valid 8-neighbor with the median of
/// those neighbors.
///
/// Neighbors are read from the grid as it was before the call, so one call
/// grows valid regions by exactly one cell. Returns the number of cells
/// filled.
pub fn patch_holes(grid: &mut Grid) -> usize {
    let source = grid.data.clone();
    let (rows, cols) = source.dim();
    let mut patched = 0;
    let mut neighbors = Vec::with_capacity(8);

    for ((r, c), value) in grid.data.indexed_iter_mut() {
        if !is_nodata(*value) {
            continue;
        }
        neighbors.clear();
        for (dr, dc) in OFFSETS {
            let (Some(nr), Some(nc)) = (r.checked_add_signed(dr), c.checked_add_signed(dc)) else {
                continue;
            };
            if nr >= rows || nc >= cols {
                continue;
            }
            let v = source[[nr, nc]];
            if !is_nodata(v) {
                neighbors.push(v);
            }
        }
        if let Some(m) = median(&mut neighbors) {
            *value = m;
            patched += 1;
        }
    }
    patched
}
