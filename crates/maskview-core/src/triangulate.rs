//! Triangulation of canonical polygons into one per-layer index space.

use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};
use crate::geometry::{Facing, Point, Polygon};

/// A triangulation primitive.
///
/// `points` holds the outer ring followed by every hole; `ring_ends` holds the
/// ascending end offset of each ring in `points`. The result is a flat list of
/// index triples into `points`.
pub trait Triangulator {
    fn triangulate(&self, points: &[Point], ring_ends: &[usize]) -> Result<Vec<usize>>;
}

/// [`Triangulator`] backed by `earcutr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarcutTriangulator;

impl Triangulator for EarcutTriangulator {
    fn triangulate(&self, points: &[Point], ring_ends: &[usize]) -> Result<Vec<usize>> {
        let mut vertices = Vec::with_capacity(points.len() * 2);
        for p in points {
            vertices.push(f64::from(p.x));
            vertices.push(f64::from(p.y));
        }

        // earcutr wants the start of every hole, which is the end of the ring before it.
        let hole_starts = match ring_ends.split_last() {
            Some((_, rest)) => rest.to_vec(),
            None => Vec::new(),
        };

        earcutr::earcut(&vertices, &hole_starts, 2)
            .map_err(|e| GeometryError::Triangulation(format!("{:?}", e)))
    }
}

/// Number of ring edges facing each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeCounts {
    pub south: usize,
    pub east: usize,
    pub north: usize,
    pub west: usize,
}

impl EdgeCounts {
    pub fn add(&mut self, facing: Facing) {
        match facing {
            Facing::South => self.south += 1,
            Facing::East => self.east += 1,
            Facing::North => self.north += 1,
            Facing::West => self.west += 1,
        }
    }

    pub fn from_polygons(polygons: &[Polygon]) -> Result<Self> {
        let mut counts = Self::default();
        for ring in polygons.iter().flat_map(Polygon::rings) {
            for facing in ring.edge_facings()? {
                counts.add(facing);
            }
        }
        Ok(counts)
    }

    pub fn total(&self) -> usize {
        self.south + self.east + self.north + self.west
    }

    /// `[south, east, north, west]`
    pub fn as_array(&self) -> [usize; 4] {
        [self.south, self.east, self.north, self.west]
    }
}

/// Triangle indices addressing the concatenation of every polygon's rings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triangulation {
    pub indices: Vec<u32>,
    pub vertex_count: usize,
}

impl Triangulation {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Triangulate each polygon and shift its indices past all earlier polygons.
pub fn triangulate_batch(polygons: &[Polygon], triangulator: &dyn Triangulator) -> Result<Triangulation> {
    let mut batch = Triangulation::default();
    let mut points: Vec<Point> = Vec::new();
    let mut ring_ends: Vec<usize> = Vec::new();

    for polygon in polygons {
        points.clear();
        ring_ends.clear();
        for ring in polygon.rings() {
            points.extend_from_slice(ring.points());
            ring_ends.push(points.len());
        }

        let local = triangulator.triangulate(&points, &ring_ends)?;
        if local.len() % 3 != 0 {
            return Err(GeometryError::Triangulation(format!(
                "{} indices do not form whole triangles",
                local.len()
            )));
        }

        batch.indices.reserve(local.len());
        for index in local {
            if index >= points.len() {
                return Err(GeometryError::Triangulation(format!(
                    "index {} out of range for {} points",
                    index,
                    points.len()
                )));
            }
            let global = u32::try_from(batch.vertex_count + index).map_err(|_| {
                GeometryError::Triangulation("layer exceeds the 32-bit index space".into())
            })?;
            batch.indices.push(global);
        }
        batch.vertex_count += points.len();
    }

    log::debug!(
        "Triangulated {} polygons into {} triangles over {} vertices",
        polygons.len(),
        batch.triangle_count(),
        batch.vertex_count
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ring;

    struct FixedTriangulator(Vec<usize>);

    impl Triangulator for FixedTriangulator {
        fn triangulate(&self, _points: &[Point], _ring_ends: &[usize]) -> Result<Vec<usize>> {
            Ok(self.0.clone())
        }
    }

    fn square(x0: i32, size: i32) -> Polygon {
        Polygon::new(ring(&[(x0, 0), (x0 + size, 0), (x0 + size, size), (x0, size)]), vec![])
    }

    fn framed() -> Polygon {
        Polygon::new(
            ring(&[(0, 0), (30, 0), (30, 30), (0, 30)]),
            vec![ring(&[(10, 20), (20, 20), (20, 10), (10, 10)])],
        )
    }

    #[test]
    fn test_indices_offset_by_previous_polygons() {
        let polygons = vec![framed(), square(100, 10)];
        let batch = triangulate_batch(&polygons, &FixedTriangulator(vec![0, 1, 2])).unwrap();
        assert_eq!(batch.indices, vec![0, 1, 2, 8, 9, 10]);
        assert_eq!(batch.vertex_count, 12);
    }

    #[test]
    fn test_out_of_range_local_index_fails() {
        let polygons = vec![square(0, 10)];
        let err = triangulate_batch(&polygons, &FixedTriangulator(vec![0, 1, 4])).unwrap_err();
        assert!(matches!(err, GeometryError::Triangulation(_)));
    }

    #[test]
    fn test_earcut_square() {
        let batch = triangulate_batch(&[square(0, 10)], &EarcutTriangulator).unwrap();
        assert_eq!(batch.triangle_count(), 2);
        assert!(batch.indices.iter().all(|&i| i < 4));
    }

    #[test]
    fn test_earcut_respects_holes_and_batching() {
        let polygons = vec![framed(), square(100, 10), square(200, 5)];
        let batch = triangulate_batch(&polygons, &EarcutTriangulator).unwrap();
        assert_eq!(batch.vertex_count, 16);
        // A square frame needs 8 triangles, each quad 2.
        assert_eq!(batch.triangle_count(), 12);
        assert!(batch.indices.iter().all(|&i| (i as usize) < batch.vertex_count));
        assert!(batch.indices[24..].iter().all(|&i| i >= 8));
        assert!(batch.indices[30..].iter().all(|&i| i >= 12));
    }

    #[test]
    fn test_edge_counts_sum_to_edges() {
        let polygons = vec![framed(), square(100, 10)];
        let counts = EdgeCounts::from_polygons(&polygons).unwrap();
        assert_eq!(counts.total(), 12);
        assert_eq!(counts.as_array(), [3, 3, 3, 3]);
    }

    #[test]
    fn test_empty_batch() {
        let batch = triangulate_batch(&[], &EarcutTriangulator).unwrap();
        assert!(batch.indices.is_empty());
        assert_eq!(batch.vertex_count, 0);
    }
}
