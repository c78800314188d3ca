//! Deterministic polygon order and ring start points.
//!
//! Both transforms are idempotent, so encoding the same layer twice yields
//! byte-identical payloads regardless of the order the union emitted.

use crate::geometry::{Polygon, Ring};

/// Multiplier that pushes single-ring quadrilaterals behind every other
/// polygon.
pub const QUAD_PENALTY: i64 = 1000;

/// Sort key: more points first, plain quadrilaterals last.
pub fn complexity_key(polygon: &Polygon) -> i64 {
    let total = polygon.point_count() as i64;
    if polygon.is_simple_quad() {
        QUAD_PENALTY * total
    } else {
        -total
    }
}

/// Stable sort by [`complexity_key`].
pub fn sort_polygons(polygons: &mut [Polygon]) {
    polygons.sort_by_key(complexity_key);
}

/// Index of the first edge whose start x is less than its end x.
pub fn south_edge_index(ring: &Ring) -> Option<usize> {
    ring.edges().position(|(from, to)| from.x < to.x)
}

/// Rotate the ring so its first south-facing edge comes first. Rings without
/// such an edge are left alone.
pub fn rotate_to_south_edge(ring: &mut Ring) {
    if let Some(index) = south_edge_index(ring) {
        ring.rotate_left(index);
    }
}

/// Sort polygons and rotate every ring to its canonical start.
pub fn canonicalize(polygons: &mut [Polygon]) {
    sort_polygons(polygons);
    for polygon in polygons.iter_mut() {
        for ring in polygon.rings_mut() {
            rotate_to_south_edge(ring);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ring, Point};
    use proptest::prelude::*;

    fn quad(x0: i32, y0: i32) -> Polygon {
        Polygon::new(ring(&[(x0, y0), (x0 + 1, y0), (x0 + 1, y0 + 1), (x0, y0 + 1)]), vec![])
    }

    fn l_shape(x0: i32) -> Polygon {
        Polygon::new(
            ring(&[(x0, 0), (x0 + 10, 0), (x0 + 10, 5), (x0 + 5, 5), (x0 + 5, 10), (x0, 10)]),
            vec![],
        )
    }

    #[test]
    fn test_square_keeps_start() {
        let mut r = ring(&[(0, 0), (10, 0), (10, 10), (0, 10)]);
        rotate_to_south_edge(&mut r);
        assert_eq!(r.points()[0], Point::new(0, 0));
    }

    #[test]
    fn test_rotation_to_first_south_edge() {
        let mut r = ring(&[(10, 10), (0, 10), (0, 0), (10, 0)]);
        rotate_to_south_edge(&mut r);
        assert_eq!(r, ring(&[(0, 0), (10, 0), (10, 10), (0, 10)]));
    }

    #[test]
    fn test_closing_edge_can_be_south() {
        let mut r = ring(&[(10, 0), (10, 10), (0, 10), (0, 0)]);
        rotate_to_south_edge(&mut r);
        assert_eq!(r.points()[0], Point::new(0, 0));
    }

    #[test]
    fn test_ring_without_south_edge_is_unchanged() {
        let original = ring(&[(0, 0), (0, 10), (0, 5)]);
        let mut r = original.clone();
        rotate_to_south_edge(&mut r);
        assert_eq!(r, original);
    }

    #[test]
    fn test_quads_sort_last_and_stably() {
        let mut polygons = vec![quad(0, 0), l_shape(0), quad(5, 5), l_shape(100)];
        sort_polygons(&mut polygons);
        assert_eq!(polygons, vec![l_shape(0), l_shape(100), quad(0, 0), quad(5, 5)]);
    }

    #[test]
    fn test_larger_polygons_first() {
        let with_hole = Polygon::new(
            ring(&[(0, 0), (10, 0), (10, 10), (0, 10)]),
            vec![ring(&[(2, 8), (8, 8), (8, 2), (2, 2)])],
        );
        let mut polygons = vec![quad(0, 0), l_shape(0), with_hole.clone()];
        sort_polygons(&mut polygons);
        assert_eq!(polygons[0], with_hole);
        assert_eq!(complexity_key(&polygons[0]), -8);
        assert_eq!(complexity_key(&polygons[1]), -6);
        assert_eq!(complexity_key(&polygons[2]), 4000);
    }

    #[test]
    fn test_hole_rotation() {
        let mut polygons = vec![Polygon::new(
            ring(&[(10, 10), (0, 10), (0, 0), (10, 0)]),
            vec![ring(&[(8, 2), (2, 2), (2, 8), (8, 8)])],
        )];
        canonicalize(&mut polygons);
        assert_eq!(polygons[0].outer.points()[0], Point::new(0, 0));
        assert_eq!(polygons[0].holes[0].points()[0], Point::new(2, 8));
    }

    fn arb_rect() -> impl Strategy<Value = Ring> {
        (-100i32..100, -100i32..100, 1i32..50, 1i32..50, 0usize..4).prop_map(|(x, y, w, h, rot)| {
            let mut r = ring(&[(x, y), (x + w, y), (x + w, y + h), (x, y + h)]);
            r.rotate_left(rot);
            r
        })
    }

    proptest! {
        #[test]
        fn rotation_is_idempotent(mut r in arb_rect()) {
            rotate_to_south_edge(&mut r);
            let once = r.clone();
            rotate_to_south_edge(&mut r);
            prop_assert_eq!(r, once);
        }

        #[test]
        fn sorting_is_idempotent(rects in prop::collection::vec(arb_rect(), 0..8), n_l in 0usize..4) {
            let mut polygons: Vec<Polygon> = rects.into_iter().map(|r| Polygon::new(r, vec![])).collect();
            polygons.extend((0..n_l).map(|i| l_shape(i as i32 * 20)));
            sort_polygons(&mut polygons);
            let once = polygons.clone();
            sort_polygons(&mut polygons);
            prop_assert_eq!(polygons, once);
        }
    }
}
