use serde::{Deserialize, Serialize};

/// Render-ready payload of one layer, consumed by the WebGL viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// `"major/minor"`
    pub layer: String,
    pub name: String,
    pub elevation: i32,
    pub thickness: i32,
    /// RGBA, alpha always 1.0.
    pub color: [f64; 4],
    /// Width and height of the shared layout extent.
    pub xy_range: [i64; 2],
    pub xy_nm_per_unit: f64,
    pub points_count: usize,
    /// Base64 of the 4-state encoded points stream.
    pub points_str: String,
    /// Number of triangle indices, three per triangle.
    pub triangles_points_count: usize,
    /// Base64 of the 2-state encoded triangle stream.
    pub triangles_str: String,
    /// `[south, east, north, west]`
    pub edge_counts: [usize; 4],
}
