//! # maskview I/O
//!
//! GDS-II stream reading and writing, plus flattening of the cell
//! hierarchy into per-layer polygons ready for the geometry pipeline.

pub mod gds;
pub mod library;

pub use gds::{GdsError, GdsReader, GdsWriter};
pub use library::{Element, FlatLayout, GdsCell, GdsLibrary, Strans};
