//! # Maskview Core
//!
//! Turns the raw polygons of a mask layer into render geometry: rings are
//! oriented counter-clockwise, fattened and merged by a boolean union,
//! shrunk back, moved to the layout origin, put into a canonical order and
//! triangulated into a single per-layer index space.
//!
//! The union and triangulation algorithms are pluggable through
//! [`UnionEngine`] and [`Triangulator`].

pub mod canonical;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod offset;
pub mod triangulate;
pub mod union;

pub use error::{GeometryError, Result};
pub use geometry::{BBox, Facing, Point, Polygon, Ring};
pub use layer::{Engines, HsvColor, Layer, LayerConfig, LayerKey, LayerStack, LayerState, UnionedLayer};
pub use triangulate::{EarcutTriangulator, EdgeCounts, Triangulation, Triangulator};
pub use union::{ContourKind, ContourTree, OverlayUnion, UnionEngine};
