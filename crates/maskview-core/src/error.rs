use thiserror::Error;

use crate::geometry::Point;
use crate::union::ContourKind;

/// Result type for geometry pipeline operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

/// Precondition violations detected by the geometry pipeline.
///
/// None of these are recoverable inside the pipeline: they indicate input
/// geometry the pipeline does not support, or a misbehaving union or
/// triangulation collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Edge {index} from ({}, {}) to ({}, {}) is neither horizontal nor vertical", from.x, from.y, to.x, to.y)]
    NonAxisAlignedEdge { index: usize, from: Point, to: Point },

    #[error("Union hierarchy node {node} is tagged {found:?}, expected {expected:?}")]
    HierarchyTag {
        node: usize,
        expected: ContourKind,
        found: ContourKind,
    },

    #[error("Ring has {0} points, at least 3 are required")]
    DegenerateRing(usize),

    #[error("Coordinate {0} does not fit in a 32-bit integer")]
    CoordinateOverflow(f64),

    #[error("Triangulation failed: {0}")]
    Triangulation(String),
}
