//! Turns processed layers into [`LayerRecord`]s.

use thiserror::Error;

use maskview_core::{Engines, GeometryError, Layer, LayerKey, LayerStack, Polygon};

use crate::codec::{encode, EncodingRangeError, Format};
use crate::record::LayerRecord;

/// Physical size of one output unit.
pub const NM_PER_UNIT: f64 = 1.0;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("layer {key}: {source}")]
    Geometry {
        key: LayerKey,
        #[source]
        source: GeometryError,
    },

    #[error("layer {key}: {source}")]
    Encoding {
        key: LayerKey,
        #[source]
        source: EncodingRangeError,
    },
}

impl AssembleError {
    pub fn key(&self) -> LayerKey {
        match self {
            AssembleError::Geometry { key, .. } | AssembleError::Encoding { key, .. } => *key,
        }
    }
}

/// Delta stream of every ring in order.
///
/// Each ring contributes its length and the offset of its first point from
/// the cursor. The remaining points alternate: odd positions carry only an x
/// delta and even positions only a y delta, which is lossless for canonical
/// rectilinear rings since their first edge is horizontal.
pub fn points_stream(polygons: &[Polygon]) -> Vec<i64> {
    let mut stream = Vec::new();
    let (mut cx, mut cy) = (0i64, 0i64);

    for ring in polygons.iter().flat_map(Polygon::rings) {
        let Some((first, rest)) = ring.points().split_first() else {
            continue;
        };
        stream.push(ring.len() as i64);

        let (x, y) = (i64::from(first.x), i64::from(first.y));
        stream.push(x - cx);
        stream.push(y - cy);
        (cx, cy) = (x, y);

        for (i, p) in rest.iter().enumerate() {
            if i % 2 == 0 {
                let x = i64::from(p.x);
                stream.push(x - cx);
                cx = x;
            } else {
                let y = i64::from(p.y);
                stream.push(y - cy);
                cy = y;
            }
        }
    }
    stream
}

/// Each index replaced by its difference from the one before it.
pub fn triangle_stream(indices: &[u32]) -> Vec<i64> {
    let mut previous = 0i64;
    indices
        .iter()
        .map(|&index| {
            let index = i64::from(index);
            let delta = index - previous;
            previous = index;
            delta
        })
        .collect()
}

/// Run the layer's pipeline and encode the result.
pub fn assemble_layer(layer: &mut Layer, engines: &Engines) -> Result<LayerRecord, AssembleError> {
    let key = layer.key();
    let name = layer.config.name.clone();
    let elevation = layer.config.elevation;
    let thickness = layer.config.thickness;
    let color = layer.config.color.to_rgba();
    let xy_range = layer.xy_range();

    let (unioned, triangulation) = layer
        .triangulated(engines)
        .map_err(|source| AssembleError::Geometry { key, source })?;

    let points = points_stream(&unioned.polygons);
    let points_str = encode(&points, Format::FourState)
        .map_err(|source| AssembleError::Encoding { key, source })?
        .to_base64();

    let triangles = triangle_stream(&triangulation.indices);
    let triangles_str = encode(&triangles, Format::TwoState)
        .map_err(|source| AssembleError::Encoding { key, source })?
        .to_base64();

    log::debug!(
        "Layer {} ({}): {} points, {} triangles",
        key,
        name,
        unioned.point_count,
        triangulation.triangle_count()
    );

    Ok(LayerRecord {
        layer: key.to_string(),
        name,
        elevation,
        thickness,
        color,
        xy_range,
        xy_nm_per_unit: NM_PER_UNIT,
        points_count: unioned.point_count,
        points_str,
        triangles_points_count: triangulation.indices.len(),
        triangles_str,
        edge_counts: unioned.edge_counts.as_array(),
    })
}

/// Assemble every layer in stack order, stopping at the first failure.
pub fn assemble_stack(stack: &mut LayerStack, engines: &Engines) -> Result<Vec<LayerRecord>, AssembleError> {
    stack
        .layers_mut()
        .iter_mut()
        .map(|layer| assemble_layer(layer, engines))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use maskview_core::geometry::Point;
    use maskview_core::union::{ContourKind, ContourTree, UnionEngine};
    use maskview_core::{BBox, LayerConfig, Ring, Triangulator};

    fn pts(coords: &[(i32, i32)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    fn polygon(outer: &[(i32, i32)], holes: &[&[(i32, i32)]]) -> Polygon {
        Polygon::new(
            Ring::new(pts(outer)).unwrap(),
            holes.iter().map(|h| Ring::new(pts(h)).unwrap()).collect(),
        )
    }

    fn decode_str(s: &str) -> Vec<i64> {
        decode(&STANDARD.decode(s).unwrap()).unwrap()
    }

    fn m1() -> Layer {
        Layer::new(LayerConfig::new("m1", 68, 20).with_placement(1740, 360).with_color(1.0 / 3.0, 0.8, 0.45))
    }

    #[test]
    fn test_points_stream_cursor_carries_across_rings() {
        let polygons = vec![
            polygon(&[(0, 0), (10, 0), (10, 10), (0, 10)], &[]),
            polygon(&[(20, 0), (25, 0), (25, 5), (20, 5)], &[]),
        ];
        assert_eq!(
            points_stream(&polygons),
            vec![4, 0, 0, 10, 10, -10, 4, 20, -10, 5, 5, -5]
        );
    }

    #[test]
    fn test_points_stream_with_hole() {
        let polygons = vec![polygon(
            &[(0, 0), (30, 0), (30, 30), (0, 30)],
            &[&[(10, 20), (20, 20), (20, 10), (10, 10)]],
        )];
        assert_eq!(
            points_stream(&polygons),
            vec![4, 0, 0, 30, 30, -30, 4, 10, -10, 10, -10, -10]
        );
    }

    #[test]
    fn test_triangle_stream_deltas() {
        assert_eq!(triangle_stream(&[0, 1, 2, 2, 3, 0]), vec![0, 1, 1, 0, 1, -3]);
        assert!(triangle_stream(&[]).is_empty());
    }

    #[test]
    fn test_empty_layer_record() {
        let mut layer = m1();
        let record = assemble_layer(&mut layer, &Engines::default()).unwrap();
        assert_eq!(record.layer, "68/20");
        assert_eq!(record.points_count, 0);
        assert_eq!(record.points_str, "AQ==");
        assert_eq!(record.triangles_points_count, 0);
        assert_eq!(record.triangles_str, "AA==");
        assert_eq!(record.edge_counts, [0, 0, 0, 0]);
        assert_eq!(record.xy_range, [0, 0]);
    }

    #[test]
    fn test_square_layer_record() {
        let mut layer = m1();
        layer.add_polygons(vec![pts(&[(10, 10), (10, 0), (0, 0), (0, 10)])]);
        layer.set_extent(BBox::new(Point::new(0, 0), Point::new(40, 20)));

        let record = assemble_layer(&mut layer, &Engines::default()).unwrap();
        assert_eq!(record.name, "m1");
        assert_eq!(record.elevation, 1740);
        assert_eq!(record.thickness, 360);
        assert_eq!(record.color[3], 1.0);
        assert_eq!(record.xy_range, [40, 20]);
        assert_eq!(record.xy_nm_per_unit, 1.0);
        assert_eq!(record.points_count, 4);
        assert_eq!(decode_str(&record.points_str), vec![4, 0, 0, 10, 10, -10]);
        assert_eq!(record.edge_counts, [1, 1, 1, 1]);

        assert_eq!(record.triangles_points_count, 6);
        let mut index = 0;
        for delta in decode_str(&record.triangles_str) {
            index += delta;
            assert!((0..4).contains(&index));
        }
    }

    #[test]
    fn test_geometry_error_carries_key() {
        let mut layer = m1();
        layer.add_polygons(vec![pts(&[(0, 0), (10, 0), (0, 10)])]);
        let err = assemble_layer(&mut layer, &Engines::default()).unwrap_err();
        assert_eq!(err.key(), LayerKey::new(68, 20));
        assert!(matches!(
            err,
            AssembleError::Geometry {
                source: GeometryError::NonAxisAlignedEdge { .. },
                ..
            }
        ));
    }

    /// Ignores its input and reports one staircase outline.
    struct StaircaseUnion(i32);

    impl UnionEngine for StaircaseUnion {
        fn union(&self, _rings: &[Ring]) -> maskview_core::Result<ContourTree> {
            let steps = self.0;
            let mut contour = vec![Point::new(0, 0)];
            for i in 1..=steps {
                contour.push(Point::new(i * 10, (i - 1) * 10));
                contour.push(Point::new(i * 10, i * 10));
            }
            contour.push(Point::new(0, steps * 10));
            let mut tree = ContourTree::new();
            tree.add_root(ContourKind::Outer, contour);
            Ok(tree)
        }
    }

    /// One triangle spanning the first two and the last vertex.
    struct SpanTriangulator;

    impl Triangulator for SpanTriangulator {
        fn triangulate(&self, points: &[Point], _ring_ends: &[usize]) -> maskview_core::Result<Vec<usize>> {
            Ok(vec![0, 1, points.len() - 1])
        }
    }

    #[test]
    fn test_index_delta_out_of_two_state_range() {
        let mut layer = m1();
        layer.add_polygons(vec![pts(&[(0, 0), (1, 0), (1, 1), (0, 1)])]);
        let engines = Engines::new(Box::new(StaircaseUnion(20_000)), Box::new(SpanTriangulator));

        let err = assemble_layer(&mut layer, &engines).unwrap_err();
        match err {
            AssembleError::Encoding { key, source } => {
                assert_eq!(key, LayerKey::new(68, 20));
                assert_eq!(source.format, Format::TwoState);
                assert_eq!(source.value, 40_000);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_stack_in_order() {
        let mut stack = LayerStack::from_configs(vec![
            LayerConfig::new("li", 67, 20),
            LayerConfig::new("m1", 68, 20),
        ]);
        stack.set_extent(BBox::new(Point::new(0, 0), Point::new(10, 10)));
        if let Some(layer) = stack.get_layer_mut(LayerKey::new(68, 20)) {
            layer.add_polygons(vec![pts(&[(0, 0), (10, 0), (10, 10), (0, 10)])]);
        }

        let records = assemble_stack(&mut stack, &Engines::default()).unwrap();
        let keys: Vec<&str> = records.iter().map(|r| r.layer.as_str()).collect();
        assert_eq!(keys, vec!["67/20", "68/20"]);
        assert_eq!(records[0].points_count, 0);
        assert_eq!(records[1].points_count, 4);
        assert_eq!(records[0].xy_range, [10, 10]);
    }

    #[test]
    fn test_stack_stops_at_failing_layer() {
        let mut stack = LayerStack::from_configs(vec![
            LayerConfig::new("li", 67, 20),
            LayerConfig::new("m1", 68, 20),
        ]);
        if let Some(layer) = stack.get_layer_mut(LayerKey::new(67, 20)) {
            layer.add_polygons(vec![pts(&[(0, 0), (10, 0), (0, 10)])]);
        }
        let err = assemble_stack(&mut stack, &Engines::default()).unwrap_err();
        assert_eq!(err.key(), LayerKey::new(67, 20));
        assert!(matches!(
            stack.get_layer(LayerKey::new(68, 20)).map(Layer::state),
            Some(maskview_core::LayerState::Raw)
        ));
    }
}
