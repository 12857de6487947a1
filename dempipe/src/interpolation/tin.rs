//! Incremental Delaunay triangulation with Laplace interpolation.
//!
//! The triangulation is closed by one infinite vertex: every convex-hull
//! edge has a ghost triangle `(a, b, ∞)` on its outer side, so every edge
//! has exactly two adjacent triangles and point location never falls off
//! the mesh. A query that ends in a ghost triangle lies outside the hull.
//!
//! Points are inserted Bowyer-Watson style: locate by walking, grow the
//! conflict cavity (triangles whose circumcircle strictly contains the
//! point), and re-triangulate the cavity boundary as a fan around the point.
//!
//! Coordinates are stored relative to the first point to keep the
//! predicates well-conditioned for national grid coordinates.

use thiserror::Error;

use crate::pointcloud::SurveyPoint;

/// Index of the infinite vertex.
const INFINITE: usize = 0;

/// Coordinates closer than this are the same vertex.
const SAME_POINT: f64 = 1e-9;

/// Errors from point queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TinError {
    #[error("triangulation has no triangles")]
    Empty,

    #[error("point lies outside the convex hull")]
    OutsideHull,

    #[error("degenerate natural neighbor configuration")]
    Degenerate,
}

#[derive(Clone, Copy, Debug)]
struct Vertex {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Clone, Copy, Debug)]
struct Triangle {
    /// Counter-clockwise; may contain [`INFINITE`].
    v: [usize; 3],
    /// Neighbor across the edge opposite `v[k]`.
    n: [usize; 3],
    alive: bool,
}

impl Triangle {
    fn infinite_slot(&self) -> Option<usize> {
        self.v.iter().position(|&v| v == INFINITE)
    }

    /// Edge opposite `v[k]`, in counter-clockwise order.
    fn edge(&self, k: usize) -> (usize, usize) {
        (self.v[(k + 1) % 3], self.v[(k + 2) % 3])
    }
}

#[inline]
fn orient(ax: f64, ay: f64, bx: f64, by: f64, cx: f64, cy: f64) -> f64 {
    (bx - ax) * (cy - ay) - (by - ay) * (cx - ax)
}

#[inline]
fn in_circle(a: &Vertex, b: &Vertex, c: &Vertex, px: f64, py: f64) -> f64 {
    let (adx, ady) = (a.x - px, a.y - py);
    let (bdx, bdy) = (b.x - px, b.y - py);
    let (cdx, cdy) = (c.x - px, c.y - py);
    (adx * adx + ady * ady) * (bdx * cdy - cdx * bdy)
        + (bdx * bdx + bdy * bdy) * (cdx * ady - adx * cdy)
        + (cdx * cdx + cdy * cdy) * (adx * bdy - bdx * ady)
}

/// Circumcenter of `(a, b, p)` relative to `p`.
fn circumcenter(a: &Vertex, b: &Vertex, px: f64, py: f64) -> Option<(f64, f64)> {
    let (ax, ay) = (a.x - px, a.y - py);
    let (bx, by) = (b.x - px, b.y - py);
    let d = 2.0 * (ax * by - ay * bx);
    if d.abs() < 1e-12 {
        return None;
    }
    let (a2, b2) = (ax * ax + ay * ay, bx * bx + by * by);
    Some(((by * a2 - ay * b2) / d, (ax * b2 - bx * a2) / d))
}

/// A Delaunay triangulation of survey points.
#[derive(Clone, Debug)]
pub struct Tin {
    origin: (f64, f64),
    vertices: Vec<Vertex>,
    triangles: Vec<Triangle>,
    free: Vec<usize>,
    last: usize,
    duplicates: usize,
}

impl Tin {
    /// Triangulates `points`.
    ///
    /// Points sharing x/y with an earlier point are skipped. When every
    /// point is collinear the triangulation stays empty.
    pub fn new(points: &[SurveyPoint]) -> Self {
        let origin = points.first().map_or((0.0, 0.0), |p| (p.x, p.y));
        let mut tin = Self {
            origin,
            vertices: vec![Vertex {
                x: f64::NAN,
                y: f64::NAN,
                z: f64::NAN,
            }],
            triangles: Vec::new(),
            free: Vec::new(),
            last: 0,
            duplicates: 0,
        };

        let local: Vec<Vertex> = spatial_order(points)
            .into_iter()
            .map(|i| Vertex {
                x: points[i].x - origin.0,
                y: points[i].y - origin.1,
                z: points[i].z,
            })
            .collect();

        let Some(seed) = find_seed(&local) else {
            return tin;
        };
        tin.seed(local[seed[0]], local[seed[1]], local[seed[2]]);

        for (i, vertex) in local.iter().enumerate() {
            if seed.contains(&i) {
                continue;
            }
            if !tin.insert(*vertex) {
                tin.duplicates += 1;
            }
        }
        tin
    }

    /// Number of real vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Number of finite triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles
            .iter()
            .filter(|t| t.alive && t.infinite_slot().is_none())
            .count()
    }

    /// Points skipped because they repeated an earlier x/y.
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Triangle to start walks from.
    pub fn start_hint(&self) -> usize {
        self.last
    }

    /// Whether (x, y) lies inside a finite triangle.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (px, py) = (x - self.origin.0, y - self.origin.1);
        self.locate(px, py, self.last)
            .is_some_and(|t| self.triangles[t].infinite_slot().is_none())
    }

    /// Laplace (natural neighbor) interpolation at (x, y).
    ///
    /// `hint` is a triangle to start the walk from and is updated to the
    /// triangle containing the query; reuse it across nearby queries.
    pub fn interpolate_laplace(&self, x: f64, y: f64, hint: &mut usize) -> Result<f64, TinError> {
        let (px, py) = (x - self.origin.0, y - self.origin.1);
        let start = self.locate(px, py, *hint).ok_or(TinError::Empty)?;
        *hint = start;

        let triangle = self.triangles[start];
        for &v in triangle.v.iter().filter(|&&v| v != INFINITE) {
            let vertex = &self.vertices[v];
            if (vertex.x - px).abs() < SAME_POINT && (vertex.y - py).abs() < SAME_POINT {
                return Ok(vertex.z);
            }
        }
        if triangle.infinite_slot().is_some() {
            return Err(TinError::OutsideHull);
        }

        let cavity = self.cavity(start, px, py);
        if cavity
            .iter()
            .any(|&t| self.triangles[t].infinite_slot().is_some())
        {
            return Err(TinError::OutsideHull);
        }

        // Boundary edges (a → b), counter-clockwise around the query.
        let boundary = self.boundary(&cavity);
        let mut centers = Vec::with_capacity(boundary.len());
        for &(a, b, _) in &boundary {
            let center = circumcenter(&self.vertices[a], &self.vertices[b], px, py)
                .ok_or(TinError::Degenerate)?;
            centers.push(center);
        }

        let mut weighted = 0.0;
        let mut total = 0.0;
        for (i, &(a, _, _)) in boundary.iter().enumerate() {
            // Voronoi edge of `a`: between the circles of the edges ending and starting at `a`.
            let incoming = boundary
                .iter()
                .position(|&(_, b, _)| b == a)
                .ok_or(TinError::Degenerate)?;
            let (ox, oy) = centers[i];
            let (ix, iy) = centers[incoming];
            let vertex = &self.vertices[a];
            let distance = (vertex.x - px).hypot(vertex.y - py);
            let weight = (ox - ix).hypot(oy - iy) / distance;
            weighted += weight * vertex.z;
            total += weight;
        }

        if total <= 0.0 || !total.is_finite() {
            return Err(TinError::Degenerate);
        }
        Ok(weighted / total)
    }

    // ===== Construction =====

    fn seed(&mut self, a: Vertex, b: Vertex, c: Vertex) {
        let (b, c) = if orient(a.x, a.y, b.x, b.y, c.x, c.y) > 0.0 {
            (b, c)
        } else {
            (c, b)
        };
        self.vertices.extend([a, b, c]);
        let (ia, ib, ic) = (1, 2, 3);

        // 0: finite, 1..=3: ghosts across (b,c), (c,a), (a,b)
        self.triangles = vec![
            Triangle {
                v: [ia, ib, ic],
                n: [1, 2, 3],
                alive: true,
            },
            Triangle {
                v: [ic, ib, INFINITE],
                n: [3, 2, 0],
                alive: true,
            },
            Triangle {
                v: [ia, ic, INFINITE],
                n: [1, 3, 0],
                alive: true,
            },
            Triangle {
                v: [ib, ia, INFINITE],
                n: [2, 1, 0],
                alive: true,
            },
        ];
        self.last = 0;
    }

    /// Inserts one vertex; returns false for duplicates.
    fn insert(&mut self, p: Vertex) -> bool {
        let Some(start) = self.locate(p.x, p.y, self.last) else {
            return false;
        };
        let triangle = self.triangles[start];
        for &v in &triangle.v {
            if v == INFINITE {
                continue;
            }
            let vertex = &self.vertices[v];
            if (vertex.x - p.x).abs() < SAME_POINT && (vertex.y - p.y).abs() < SAME_POINT {
                return false;
            }
        }
        if !self.in_conflict(start, p.x, p.y) {
            return false;
        }

        let id = self.vertices.len();
        self.vertices.push(p);

        let cavity = self.cavity(start, p.x, p.y);
        let boundary = self.boundary(&cavity);
        for &t in &cavity {
            self.triangles[t].alive = false;
            self.free.push(t);
        }

        let mut created = Vec::with_capacity(boundary.len());
        for &(a, b, outer) in &boundary {
            let t = self.allocate(Triangle {
                v: [a, b, id],
                n: [usize::MAX, usize::MAX, outer],
                alive: true,
            });
            let outer_tri = &mut self.triangles[outer];
            for k in 0..3 {
                if outer_tri.edge(k) == (b, a) {
                    outer_tri.n[k] = t;
                }
            }
            created.push(t);
        }

        // Fan links: across (b, id) is the triangle starting at b,
        // across (id, a) the one ending at a.
        for (i, &(a, b, _)) in boundary.iter().enumerate() {
            let next = boundary.iter().position(|&(s, _, _)| s == b);
            let prev = boundary.iter().position(|&(_, e, _)| e == a);
            if let (Some(next), Some(prev)) = (next, prev) {
                let t = created[i];
                self.triangles[t].n[0] = created[next];
                self.triangles[t].n[1] = created[prev];
            }
        }

        self.last = created.first().copied().unwrap_or(self.last);
        true
    }

    fn allocate(&mut self, triangle: Triangle) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.triangles[slot] = triangle;
                slot
            }
            None => {
                self.triangles.push(triangle);
                self.triangles.len() - 1
            }
        }
    }

    // ===== Queries =====

    /// Whether the circumcircle of `t` strictly contains (px, py).
    ///
    /// For a ghost triangle the "circle" is the open half-plane beyond its
    /// hull edge plus the open hull edge itself.
    fn in_conflict(&self, t: usize, px: f64, py: f64) -> bool {
        let triangle = &self.triangles[t];
        match triangle.infinite_slot() {
            Some(k) => {
                let (a, b) = triangle.edge(k);
                let (a, b) = (&self.vertices[a], &self.vertices[b]);
                let side = orient(a.x, a.y, b.x, b.y, px, py);
                if side > 0.0 {
                    return true;
                }
                if side < 0.0 {
                    return false;
                }
                let dot = (px - a.x) * (b.x - a.x) + (py - a.y) * (b.y - a.y);
                let len2 = (b.x - a.x).powi(2) + (b.y - a.y).powi(2);
                dot > 0.0 && dot < len2
            }
            None => {
                let [a, b, c] = triangle.v.map(|v| &self.vertices[v]);
                in_circle(a, b, c, px, py) > 0.0
            }
        }
    }

    /// Connected set of triangles in conflict with (px, py), grown from `start`.
    fn cavity(&self, start: usize, px: f64, py: f64) -> Vec<usize> {
        let mut cavity = vec![start];
        let mut stack = vec![start];
        while let Some(t) = stack.pop() {
            for &nb in &self.triangles[t].n {
                if !cavity.contains(&nb) && self.in_conflict(nb, px, py) {
                    cavity.push(nb);
                    stack.push(nb);
                }
            }
        }
        cavity
    }

    /// Edges `(a, b, outer)` of the cavity boundary, with the triangle outside each edge.
    fn boundary(&self, cavity: &[usize]) -> Vec<(usize, usize, usize)> {
        let mut edges = Vec::new();
        for &t in cavity {
            let triangle = &self.triangles[t];
            for k in 0..3 {
                let nb = triangle.n[k];
                if !cavity.contains(&nb) {
                    let (a, b) = triangle.edge(k);
                    edges.push((a, b, nb));
                }
            }
        }
        edges
    }

    /// Walks from `hint` to a triangle containing (px, py).
    ///
    /// Returns a finite triangle when the point is inside the hull (or on
    /// its boundary) and a ghost triangle otherwise.
    fn locate(&self, px: f64, py: f64, hint: usize) -> Option<usize> {
        if self.triangles.is_empty() {
            return None;
        }
        let mut t = match self.triangles.get(hint) {
            Some(triangle) if triangle.alive => hint,
            _ => self.triangles.iter().position(|t| t.alive)?,
        };

        let limit = self.triangles.len() + 16;
        'walk: for step in 0..limit {
            let triangle = &self.triangles[t];
            if let Some(k) = triangle.infinite_slot() {
                let (a, b) = triangle.edge(k);
                let (a, b) = (&self.vertices[a], &self.vertices[b]);
                if orient(a.x, a.y, b.x, b.y, px, py) > 0.0 {
                    return Some(t);
                }
                t = triangle.n[k];
                continue;
            }
            for i in 0..3 {
                let k = (step + i) % 3;
                let (a, b) = triangle.edge(k);
                let (a, b) = (&self.vertices[a], &self.vertices[b]);
                if orient(a.x, a.y, b.x, b.y, px, py) < 0.0 {
                    t = triangle.n[k];
                    continue 'walk;
                }
            }
            return Some(t);
        }

        self.locate_exhaustive(px, py)
    }

    fn locate_exhaustive(&self, px: f64, py: f64) -> Option<usize> {
        let finite = self.triangles.iter().position(|triangle| {
            triangle.alive
                && triangle.infinite_slot().is_none()
                && (0..3).all(|k| {
                    let (a, b) = triangle.edge(k);
                    let (a, b) = (&self.vertices[a], &self.vertices[b]);
                    orient(a.x, a.y, b.x, b.y, px, py) >= 0.0
                })
        });
        finite.or_else(|| {
            (0..self.triangles.len()).find(|&t| {
                self.triangles[t].alive
                    && self.triangles[t].infinite_slot().is_some()
                    && self.in_conflict(t, px, py)
            })
        })
    }

    #[cfg(test)]
    fn finite_triangles(&self) -> impl Iterator<Item = [Vertex; 3]> + '_ {
        self.triangles
            .iter()
            .filter(|t| t.alive && t.infinite_slot().is_none())
            .map(|t| t.v.map(|v| self.vertices[v]))
    }
}

/// First three points spanning a non-degenerate triangle.
fn find_seed(points: &[Vertex]) -> Option<[usize; 3]> {
    let a = 0;
    let first = points.first()?;
    let b = points.iter().position(|p| {
        (p.x - first.x).abs() >= SAME_POINT || (p.y - first.y).abs() >= SAME_POINT
    })?;
    let (pa, pb) = (&points[a], &points[b]);
    let c = points
        .iter()
        .position(|p| orient(pa.x, pa.y, pb.x, pb.y, p.x, p.y).abs() > 1e-12)?;
    Some([a, b, c])
}

/// Insertion order that keeps consecutive points close together.
///
/// Points are bucketed on a square grid of about one point per cell and
/// visited row by row in serpentine order.
fn spatial_order(points: &[SurveyPoint]) -> Vec<usize> {
    let n = points.len();
    if n < 64 {
        return (0..n).collect();
    }
    let (mut minx, mut miny, mut maxx, mut maxy) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for p in points {
        minx = minx.min(p.x);
        miny = miny.min(p.y);
        maxx = maxx.max(p.x);
        maxy = maxy.max(p.y);
    }
    let area = ((maxx - minx) * (maxy - miny)).max(1e-6);
    let cell = (area / n as f64).sqrt().max(1e-6);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| {
        let row = ((points[i].y - miny) / cell) as i64;
        let col = ((points[i].x - minx) / cell) as i64;
        (row, if row % 2 == 0 { col } else { -col })
    });
    order
}
