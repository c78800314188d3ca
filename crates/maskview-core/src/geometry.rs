use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};

/// A 2D point in layout database units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by a 64-bit offset, failing if the result leaves the i32 range.
    pub fn translate(&self, dx: i64, dy: i64) -> Result<Self> {
        Ok(Self {
            x: narrow(i64::from(self.x) + dx)?,
            y: narrow(i64::from(self.y) + dy)?,
        })
    }
}

fn narrow(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| GeometryError::CoordinateOverflow(value as f64))
}

/// Round half-to-even and narrow to a layout coordinate.
pub fn round_coordinate(value: f64) -> Result<i32> {
    let rounded = value.round_ties_even();
    if !rounded.is_finite() || rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
        return Err(GeometryError::CoordinateOverflow(value));
    }
    Ok(rounded as i32)
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self::new(*first, *first);
        for p in &points[1..] {
            bbox.include(p);
        }
        Some(bbox)
    }

    pub fn include(&mut self, p: &Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn width(&self) -> i64 {
        i64::from(self.max.x) - i64::from(self.min.x)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.max.y) - i64::from(self.min.y)
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn union(&self, other: &BBox) -> Self {
        let mut result = *self;
        result.include(&other.min);
        result.include(&other.max);
        result
    }
}

/// Which way the material-side normal of an axis-aligned edge points.
///
/// For a counter-clockwise ring the normal points away from the enclosed
/// area, so an edge running in +x is south-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    South,
    East,
    North,
    West,
}

impl Facing {
    /// Classify the edge `from -> to`. Horizontal is tested first, so a
    /// zero-length edge counts as south-facing.
    pub fn of_edge(from: Point, to: Point) -> Option<Self> {
        if from.y == to.y {
            Some(if from.x > to.x { Facing::North } else { Facing::South })
        } else if from.x == to.x {
            Some(if from.y < to.y { Facing::East } else { Facing::West })
        } else {
            None
        }
    }

    /// Unit normal vector.
    pub fn normal(self) -> (i32, i32) {
        match self {
            Facing::South => (0, -1),
            Facing::East => (1, 0),
            Facing::North => (0, 1),
            Facing::West => (-1, 0),
        }
    }
}

/// A closed contour of at least three points. The closing edge from the last
/// point back to the first is implicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ring {
    points: Vec<Point>,
}

impl Ring {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.len() < 3 {
            return Err(GeometryError::DegenerateRing(points.len()));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Twice the signed area, from Σ (x[i-1] - x[i]) * (y[i-1] + y[i]).
    /// Positive for counter-clockwise rings.
    pub fn doubled_signed_area(&self) -> i128 {
        let n = self.points.len();
        (0..n)
            .map(|i| {
                let prev = self.points[(i + n - 1) % n];
                let cur = self.points[i];
                (i128::from(prev.x) - i128::from(cur.x)) * (i128::from(prev.y) + i128::from(cur.y))
            })
            .sum()
    }

    pub fn signed_area(&self) -> f64 {
        self.doubled_signed_area() as f64 / 2.0
    }

    pub fn is_ccw(&self) -> bool {
        self.doubled_signed_area() > 0
    }

    /// Reverse the ring unless it is strictly counter-clockwise.
    pub fn normalize_ccw(&mut self) {
        if self.doubled_signed_area() <= 0 {
            self.points.reverse();
        }
    }

    /// Reverse the ring unless it is strictly clockwise.
    pub fn normalize_cw(&mut self) {
        if self.doubled_signed_area() >= 0 {
            self.points.reverse();
        }
    }

    /// Edges `(points[i], points[i + 1])`, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Facing of every edge, in edge order.
    pub fn edge_facings(&self) -> Result<Vec<Facing>> {
        self.edges()
            .enumerate()
            .map(|(index, (from, to))| {
                Facing::of_edge(from, to)
                    .ok_or(GeometryError::NonAxisAlignedEdge { index, from, to })
            })
            .collect()
    }

    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox::new(self.points[0], self.points[0]);
        for p in &self.points[1..] {
            bbox.include(p);
        }
        bbox
    }

    /// Rotate so that `points[mid]` becomes the first point.
    pub fn rotate_left(&mut self, mid: usize) {
        let n = self.points.len();
        self.points.rotate_left(mid % n);
    }

    pub fn translated(&self, dx: i64, dy: i64) -> Result<Self> {
        let points = self
            .points
            .iter()
            .map(|p| p.translate(dx, dy))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { points })
    }
}

/// An outer ring with zero or more holes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    pub outer: Ring,
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(outer: Ring, holes: Vec<Ring>) -> Self {
        Self { outer, holes }
    }

    /// Outer ring first, then holes in order.
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.outer).chain(self.holes.iter())
    }

    pub fn rings_mut(&mut self) -> impl Iterator<Item = &mut Ring> {
        std::iter::once(&mut self.outer).chain(self.holes.iter_mut())
    }

    pub fn ring_count(&self) -> usize {
        1 + self.holes.len()
    }

    /// Total number of points across all rings.
    pub fn point_count(&self) -> usize {
        self.rings().map(Ring::len).sum()
    }

    /// A four-point outer ring without holes.
    pub fn is_simple_quad(&self) -> bool {
        self.holes.is_empty() && self.outer.len() == 4
    }

    pub fn translated(&self, dx: i64, dy: i64) -> Result<Self> {
        Ok(Self {
            outer: self.outer.translated(dx, dy)?,
            holes: self
                .holes
                .iter()
                .map(|h| h.translated(dx, dy))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

#[cfg(test)]
pub(crate) fn ring(coords: &[(i32, i32)]) -> Ring {
    Ring::new(coords.iter().map(|&(x, y)| Point::new(x, y)).collect()).unwrap()
}
