//! Growing and shrinking of axis-aligned rings.
//!
//! A vertex is moved along the sum of the normals of its two incident edges.
//! At a right-angle corner that sum is the diagonal that keeps both adjacent
//! edges axis-aligned after the move.

use crate::error::Result;
use crate::geometry::{round_coordinate, Point, Polygon, Ring};

/// Scale factor applied before the union so abutting shapes overlap.
pub const UNION_GROW_FACTOR: f64 = 10.0;

/// Outward displacement applied together with [`UNION_GROW_FACTOR`].
pub const UNION_GROW_OFFSET: i32 = 1;

/// Scale factor that undoes [`UNION_GROW_FACTOR`] after the union.
pub const UNION_SHRINK_FACTOR: f64 = 0.1;

/// Scale every vertex by `factor`, round half-to-even, then displace it by
/// `offset` along the normals of its incoming and outgoing edges.
///
/// Positive `offset` grows a counter-clockwise ring.
pub fn offset_ring(ring: &Ring, factor: f64, offset: i32) -> Result<Ring> {
    let facings = ring.edge_facings()?;
    let n = ring.len();
    let offset = f64::from(offset);

    let points = ring
        .points()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (ox, oy) = facings[i].normal();
            let (ix, iy) = facings[(i + n - 1) % n].normal();
            let x = (f64::from(p.x) * factor).round_ties_even() + offset * f64::from(ox + ix);
            let y = (f64::from(p.y) * factor).round_ties_even() + offset * f64::from(oy + iy);
            Ok(Point::new(round_coordinate(x)?, round_coordinate(y)?))
        })
        .collect::<Result<Vec<_>>>()?;

    Ring::new(points)
}

/// Offset the outer ring by `offset` and every hole by `-offset`.
pub fn offset_polygon(polygon: &Polygon, factor: f64, offset: i32) -> Result<Polygon> {
    let outer = offset_ring(&polygon.outer, factor, offset)?;
    let holes = polygon
        .holes
        .iter()
        .map(|h| offset_ring(h, factor, -offset))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(outer, holes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ring;

    #[test]
    fn test_grow_square() {
        let r = ring(&[(0, 0), (10, 0), (10, 10), (0, 10)]);
        let grown = offset_ring(&r, 1.0, 2).unwrap();
        assert_eq!(grown, ring(&[(-2, -2), (12, -2), (12, 12), (-2, 12)]));
    }

    #[test]
    fn test_scale_and_grow() {
        let r = ring(&[(0, 0), (10, 0), (10, 10), (0, 10)]);
        let grown = offset_ring(&r, UNION_GROW_FACTOR, UNION_GROW_OFFSET).unwrap();
        assert_eq!(grown, ring(&[(-1, -1), (101, -1), (101, 101), (-1, 101)]));
    }

    #[test]
    fn test_grow_then_shrink_restores_rectangle() {
        let r = ring(&[(-30, 5), (70, 5), (70, 45), (-30, 45)]);
        let grown = offset_ring(&r, 1.0, 3).unwrap();
        assert_eq!(offset_ring(&grown, 1.0, -3).unwrap(), r);

        let fattened = offset_ring(&r, UNION_GROW_FACTOR, UNION_GROW_OFFSET).unwrap();
        assert_eq!(offset_ring(&fattened, UNION_SHRINK_FACTOR, 0).unwrap(), r);
    }

    #[test]
    fn test_l_shape_concave_corner() {
        // The concave corner moves diagonally with its neighbours.
        let r = ring(&[(0, 0), (10, 0), (10, 5), (5, 5), (5, 10), (0, 10)]);
        let grown = offset_ring(&r, 1.0, 1).unwrap();
        assert_eq!(
            grown,
            ring(&[(-1, -1), (11, -1), (11, 6), (6, 6), (6, 11), (-1, 11)])
        );
        assert!(grown.edge_facings().is_ok());
    }

    #[test]
    fn test_holes_use_negated_offset() {
        let outer = ring(&[(0, 0), (20, 0), (20, 20), (0, 20)]);
        let hole = ring(&[(5, 15), (15, 15), (15, 5), (5, 5)]);
        assert!(!hole.is_ccw());
        let polygon = Polygon::new(outer, vec![hole]);
        let grown = offset_polygon(&polygon, 1.0, 1).unwrap();
        assert_eq!(grown.outer, ring(&[(-1, -1), (21, -1), (21, 21), (-1, 21)]));
        assert_eq!(grown.holes[0], ring(&[(4, 16), (16, 16), (16, 4), (4, 4)]));
    }

    #[test]
    fn test_diagonal_ring_fails() {
        let r = ring(&[(0, 0), (10, 0), (0, 10)]);
        assert!(offset_ring(&r, 1.0, 1).is_err());
    }
}
