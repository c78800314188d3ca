use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canonical::canonicalize;
use crate::error::Result;
use crate::geometry::{BBox, Point, Polygon, Ring};
use crate::offset::{offset_polygon, offset_ring, UNION_GROW_FACTOR, UNION_GROW_OFFSET, UNION_SHRINK_FACTOR};
use crate::triangulate::{triangulate_batch, EarcutTriangulator, EdgeCounts, Triangulation, Triangulator};
use crate::union::{union_polygons, OverlayUnion, UnionEngine};

/// GDS layer number and datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerKey {
    pub major: u16,
    pub minor: u16,
}

impl LayerKey {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.major, self.minor)
    }
}

/// Base color of a layer in HSV, each component in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvColor {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

impl Default for HsvColor {
    fn default() -> Self {
        Self { h: 0.0, s: 1.0, v: 1.0 }
    }
}

impl HsvColor {
    pub const fn new(h: f64, s: f64, v: f64) -> Self {
        Self { h, s, v }
    }

    pub fn to_rgb(&self) -> [f64; 3] {
        let Self { h, s, v } = *self;
        if s == 0.0 {
            return [v, v, v];
        }
        let sector = (h * 6.0).floor();
        let f = h * 6.0 - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        match (sector as i64).rem_euclid(6) {
            0 => [v, t, p],
            1 => [q, v, p],
            2 => [p, v, t],
            3 => [p, q, v],
            4 => [t, p, v],
            _ => [v, p, q],
        }
    }

    /// RGB with an opaque alpha channel.
    pub fn to_rgba(&self) -> [f64; 4] {
        let [r, g, b] = self.to_rgb();
        [r, g, b, 1.0]
    }
}

/// Static description of a layer: identity, placement and color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub key: LayerKey,
    /// Height of the layer's top face, in database units.
    pub elevation: i32,
    pub thickness: i32,
    pub color: HsvColor,
}

impl LayerConfig {
    pub fn new(name: &str, major: u16, minor: u16) -> Self {
        Self {
            name: name.to_string(),
            key: LayerKey::new(major, minor),
            elevation: 0,
            thickness: 0,
            color: HsvColor::default(),
        }
    }

    pub fn with_placement(mut self, elevation: i32, thickness: i32) -> Self {
        self.elevation = elevation;
        self.thickness = thickness;
        self
    }

    pub fn with_color(mut self, h: f64, s: f64, v: f64) -> Self {
        self.color = HsvColor::new(h, s, v);
        self
    }
}

/// The union pass and triangulator a layer is processed with.
pub struct Engines {
    pub union: Box<dyn UnionEngine>,
    pub triangulator: Box<dyn Triangulator>,
}

impl Engines {
    pub fn new(union: Box<dyn UnionEngine>, triangulator: Box<dyn Triangulator>) -> Self {
        Self { union, triangulator }
    }
}

impl Default for Engines {
    fn default() -> Self {
        Self::new(Box::new(OverlayUnion), Box::new(EarcutTriangulator))
    }
}

/// Merged, translated and canonically ordered geometry of a layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnionedLayer {
    pub polygons: Vec<Polygon>,
    pub point_count: usize,
    pub edge_counts: EdgeCounts,
}

/// Derived products of a layer. Appending geometry resets it to `Raw`.
#[derive(Debug, Clone, Default)]
pub enum LayerState {
    #[default]
    Raw,
    Unioned(UnionedLayer),
    Triangulated(UnionedLayer, Triangulation),
}

/// A layer's raw geometry plus its lazily computed render geometry.
#[derive(Debug, Clone)]
pub struct Layer {
    pub config: LayerConfig,
    raw: Vec<Ring>,
    extent: Option<BBox>,
    state: LayerState,
}

impl Layer {
    pub fn new(config: LayerConfig) -> Self {
        Self {
            config,
            raw: Vec::new(),
            extent: None,
            state: LayerState::Raw,
        }
    }

    pub fn key(&self) -> LayerKey {
        self.config.key
    }

    /// Append polygons in any winding; they are stored counter-clockwise.
    /// Returns how many were kept.
    pub fn add_polygons<I>(&mut self, polygons: I) -> usize
    where
        I: IntoIterator<Item = Vec<Point>>,
    {
        let before = self.raw.len();
        for points in polygons {
            match Ring::new(points) {
                Ok(mut ring) => {
                    ring.normalize_ccw();
                    self.raw.push(ring);
                }
                Err(e) => log::warn!("Layer {}: skipping polygon: {}", self.config.key, e),
            }
        }
        self.state = LayerState::Raw;
        self.raw.len() - before
    }

    pub fn raw_polygons(&self) -> &[Ring] {
        &self.raw
    }

    /// Set the box whose lower-left corner becomes the origin of the render
    /// coordinates. Layers of one layout share an extent so they stay aligned.
    pub fn set_extent(&mut self, extent: BBox) {
        self.extent = Some(extent);
        self.state = LayerState::Raw;
    }

    /// The configured extent, or else the extent of the raw geometry.
    pub fn extent(&self) -> Option<BBox> {
        self.extent.or_else(|| {
            self.raw
                .iter()
                .map(Ring::bbox)
                .reduce(|acc, bb| acc.union(&bb))
        })
    }

    /// Width and height of [`Layer::extent`].
    pub fn xy_range(&self) -> [i64; 2] {
        self.extent().map_or([0, 0], |bb| [bb.width(), bb.height()])
    }

    pub fn state(&self) -> &LayerState {
        &self.state
    }

    pub fn unioned(&mut self, engines: &Engines) -> Result<&UnionedLayer> {
        self.ensure_unioned(engines)?;
        match &self.state {
            LayerState::Unioned(unioned) | LayerState::Triangulated(unioned, _) => Ok(unioned),
            LayerState::Raw => unreachable!("layer state was advanced past Raw"),
        }
    }

    pub fn triangulated(&mut self, engines: &Engines) -> Result<(&UnionedLayer, &Triangulation)> {
        self.ensure_unioned(engines)?;
        if let LayerState::Unioned(_) = self.state {
            if let LayerState::Unioned(unioned) = std::mem::take(&mut self.state) {
                match triangulate_batch(&unioned.polygons, engines.triangulator.as_ref()) {
                    Ok(triangulation) => self.state = LayerState::Triangulated(unioned, triangulation),
                    Err(e) => {
                        self.state = LayerState::Unioned(unioned);
                        return Err(e);
                    }
                }
            }
        }
        match &self.state {
            LayerState::Triangulated(unioned, triangulation) => Ok((unioned, triangulation)),
            _ => unreachable!("layer state was advanced to Triangulated"),
        }
    }

    fn ensure_unioned(&mut self, engines: &Engines) -> Result<()> {
        if let LayerState::Raw = self.state {
            self.state = LayerState::Unioned(self.compute_union(engines.union.as_ref())?);
        }
        Ok(())
    }

    fn compute_union(&self, union: &dyn UnionEngine) -> Result<UnionedLayer> {
        let Some(extent) = self.extent().filter(|_| !self.raw.is_empty()) else {
            return Ok(UnionedLayer::default());
        };

        let fattened = self
            .raw
            .iter()
            .map(|r| offset_ring(r, UNION_GROW_FACTOR, UNION_GROW_OFFSET))
            .collect::<Result<Vec<_>>>()?;

        let merged = union_polygons(&fattened, union)?;

        let dx = -i64::from(extent.min.x);
        let dy = -i64::from(extent.min.y);
        let mut polygons = merged
            .iter()
            .map(|p| offset_polygon(p, UNION_SHRINK_FACTOR, 0)?.translated(dx, dy))
            .collect::<Result<Vec<_>>>()?;

        canonicalize(&mut polygons);

        let point_count = polygons.iter().map(Polygon::point_count).sum();
        let edge_counts = EdgeCounts::from_polygons(&polygons)?;
        log::debug!(
            "Layer {}: {} raw polygons merged into {} polygons with {} points",
            self.config.key,
            self.raw.len(),
            polygons.len(),
            point_count
        );

        Ok(UnionedLayer {
            polygons,
            point_count,
            edge_counts,
        })
    }
}

/// An ordered collection of layers.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn from_configs<I: IntoIterator<Item = LayerConfig>>(configs: I) -> Self {
        Self {
            layers: configs.into_iter().map(Layer::new).collect(),
        }
    }

    /// The SkyWater 130 nm front-end and metal stack.
    pub fn sky130() -> Self {
        Self::from_configs([
            LayerConfig::new("p-substrate", 235, 4).with_color(0.0 / 3.0, 0.7, 0.35),
            LayerConfig::new("n-well", 64, 20).with_color(2.0 / 3.0, 0.7, 0.35),
            LayerConfig::new("diff (opp.)", 65, 20).with_color(2.0 / 3.0, 0.0, 0.15),
            LayerConfig::new("tap (same)", 65, 44).with_color(2.0 / 3.0, 0.0, 0.15),
            LayerConfig::new("poly", 66, 20).with_placement(500, 400).with_color(1.5 / 3.0, 0.55, 0.25),
            LayerConfig::new("nwell.pin", 64, 16).with_placement(940, 940).with_color(0.4 / 3.0, 0.65, 0.3),
            LayerConfig::new("pwell.pin", 122, 16).with_placement(940, 940).with_color(0.4 / 3.0, 0.65, 0.3),
            LayerConfig::new("licon", 66, 44).with_placement(940, 940).with_color(0.4 / 3.0, 0.65, 0.3),
            LayerConfig::new("li", 67, 20).with_placement(1011, 100).with_color(0.4 / 3.0, 0.65, 0.3),
            LayerConfig::new("mcon", 67, 44).with_placement(1380, 380).with_color(1.0 / 3.0, 0.8, 0.45),
            LayerConfig::new("m1", 68, 20).with_placement(1380 + 360, 360).with_color(1.0 / 3.0, 0.8, 0.45),
            LayerConfig::new("via", 68, 44).with_placement(2000, 270).with_color(1.0 / 3.0, 0.8, 0.6),
            LayerConfig::new("m2", 69, 20).with_placement(2000 + 360, 360).with_color(1.0 / 3.0, 0.8, 0.6),
            LayerConfig::new("via2", 69, 44).with_placement(2790, 420).with_color(1.0 / 3.0, 0.8, 0.7),
            LayerConfig::new("m3", 70, 20).with_placement(2790 + 850, 850).with_color(1.0 / 3.0, 0.8, 0.7),
            LayerConfig::new("via3", 70, 44).with_placement(4020, 390).with_color(1.0 / 3.0, 0.8, 0.8),
            LayerConfig::new("m4", 71, 20).with_placement(4020 + 850, 850).with_color(1.0 / 3.0, 0.8, 0.8),
            LayerConfig::new("via4", 71, 44).with_placement(5370, 510).with_color(1.0 / 3.0, 0.8, 0.9),
            LayerConfig::new("m5", 72, 20).with_placement(5370 + 1260, 1260).with_color(1.0 / 3.0, 0.8, 0.9),
        ])
    }

    pub fn get_layer(&self, key: LayerKey) -> Option<&Layer> {
        self.layers.iter().find(|l| l.key() == key)
    }

    pub fn get_layer_mut(&mut self, key: LayerKey) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.key() == key)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Share one extent across every layer.
    pub fn set_extent(&mut self, extent: BBox) {
        for layer in &mut self.layers {
            layer.set_extent(extent);
        }
    }
}
