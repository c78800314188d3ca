//! In-memory GDS-II library and hierarchy flattening.

use std::collections::{BTreeMap, HashMap, HashSet};

use maskview_core::geometry::{round_coordinate, BBox, Point};
use maskview_core::LayerKey;

use crate::gds::GdsError;

/// Structure transformation of a cell reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strans {
    /// Mirror about the x axis before rotating.
    pub reflect_x: bool,
    pub magnification: f64,
    /// Counter-clockwise rotation in degrees.
    pub angle: f64,
}

impl Default for Strans {
    fn default() -> Self {
        Self {
            reflect_x: false,
            magnification: 1.0,
            angle: 0.0,
        }
    }
}

impl Strans {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// A GDS-II element relevant to mask geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Boundary {
        layer: u16,
        datatype: u16,
        points: Vec<Point>,
    },
    Path {
        layer: u16,
        datatype: u16,
        pathtype: i16,
        width: i32,
        points: Vec<Point>,
    },
    Sref {
        cell: String,
        strans: Strans,
        origin: Point,
    },
    Aref {
        cell: String,
        strans: Strans,
        columns: u16,
        rows: u16,
        origin: Point,
        /// `origin` displaced by `columns` column pitches.
        column_end: Point,
        /// `origin` displaced by `rows` row pitches.
        row_end: Point,
    },
}

impl Element {
    fn referenced_cell(&self) -> Option<&str> {
        match self {
            Element::Sref { cell, .. } | Element::Aref { cell, .. } => Some(cell.as_str()),
            _ => None,
        }
    }
}

/// A named GDS-II structure.
#[derive(Debug, Clone, PartialEq)]
pub struct GdsCell {
    pub name: String,
    pub elements: Vec<Element>,
}

impl GdsCell {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            elements: Vec::new(),
        }
    }

    pub fn add_element(&mut self, element: Element) {
        self.elements.push(element);
    }
}

/// A GDS-II library: units plus cells in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct GdsLibrary {
    pub name: String,
    /// Size of a database unit in user units.
    pub user_units_per_db: f64,
    /// Size of a database unit in meters.
    pub meters_per_db: f64,
    cells: Vec<GdsCell>,
}

impl GdsLibrary {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            user_units_per_db: 0.001,
            meters_per_db: 1e-9,
            cells: Vec::new(),
        }
    }

    pub fn add_cell(&mut self, cell: GdsCell) {
        self.cells.push(cell);
    }

    pub fn cells(&self) -> &[GdsCell] {
        &self.cells
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn find_cell(&self, name: &str) -> Option<&GdsCell> {
        self.cells.iter().find(|c| c.name == name)
    }

    /// Cells not referenced by any other cell, in file order.
    pub fn top_cells(&self) -> Vec<&GdsCell> {
        let referenced: HashSet<&str> = self
            .cells
            .iter()
            .flat_map(|c| c.elements.iter().filter_map(Element::referenced_cell))
            .collect();
        self.cells
            .iter()
            .filter(|c| !referenced.contains(c.name.as_str()))
            .collect()
    }

    pub fn top_cell(&self) -> Option<&GdsCell> {
        self.top_cells().into_iter().next()
    }

    /// Resolve every reference below `top` into flat polygons per layer key.
    pub fn flatten(&self, top: &GdsCell) -> Result<FlatLayout, GdsError> {
        let by_name: HashMap<&str, &GdsCell> =
            self.cells.iter().map(|c| (c.name.as_str(), c)).collect();
        let max_depth = self.cells.len().max(1);

        let mut layout = FlatLayout::default();
        let mut stack: Vec<(&GdsCell, Placement, usize)> = vec![(top, Placement::IDENTITY, 0)];

        while let Some((cell, placement, depth)) = stack.pop() {
            for element in &cell.elements {
                match element {
                    Element::Boundary {
                        layer,
                        datatype,
                        points,
                    } => {
                        let ring = placement.apply_all(points)?;
                        layout.push(LayerKey::new(*layer, *datatype), ring);
                    }
                    Element::Path {
                        layer,
                        datatype,
                        pathtype,
                        width,
                        points,
                    } => {
                        for rect in path_to_rects(points, *width, *pathtype) {
                            let ring = placement.apply_all(&rect)?;
                            layout.push(LayerKey::new(*layer, *datatype), ring);
                        }
                    }
                    Element::Sref {
                        cell: name,
                        strans,
                        origin,
                    } => {
                        let child = resolve(&by_name, name, depth, max_depth)?;
                        let local = Placement::from_strans(strans, origin_of(*origin), name)?;
                        stack.push((child, placement.then(&local), depth + 1));
                    }
                    Element::Aref {
                        cell: name,
                        strans,
                        columns,
                        rows,
                        origin,
                        column_end,
                        row_end,
                    } => {
                        let child = resolve(&by_name, name, depth, max_depth)?;
                        let columns = f64::from((*columns).max(1));
                        let rows = f64::from((*rows).max(1));
                        let col_step = [
                            (f64::from(column_end.x) - f64::from(origin.x)) / columns,
                            (f64::from(column_end.y) - f64::from(origin.y)) / columns,
                        ];
                        let row_step = [
                            (f64::from(row_end.x) - f64::from(origin.x)) / rows,
                            (f64::from(row_end.y) - f64::from(origin.y)) / rows,
                        ];
                        for c in 0..columns as u32 {
                            for r in 0..rows as u32 {
                                let (c, r) = (f64::from(c), f64::from(r));
                                let at = [
                                    f64::from(origin.x) + c * col_step[0] + r * row_step[0],
                                    f64::from(origin.y) + c * col_step[1] + r * row_step[1],
                                ];
                                let local = Placement::from_strans(strans, at, name)?;
                                stack.push((child, placement.then(&local), depth + 1));
                            }
                        }
                    }
                }
            }
        }

        log::debug!(
            "Flattened '{}' into {} polygons on {} layers",
            top.name,
            layout.polygon_count(),
            layout.polygons.len()
        );
        Ok(layout)
    }
}

fn resolve<'a>(
    by_name: &HashMap<&str, &'a GdsCell>,
    name: &str,
    depth: usize,
    max_depth: usize,
) -> Result<&'a GdsCell, GdsError> {
    if depth >= max_depth {
        return Err(GdsError::CyclicReference(name.to_string()));
    }
    by_name
        .get(name)
        .copied()
        .ok_or_else(|| GdsError::UndefinedCell(name.to_string()))
}

fn origin_of(p: Point) -> [f64; 2] {
    [f64::from(p.x), f64::from(p.y)]
}

/// Split a path into one rectangle per axis-aligned segment.
///
/// Segments meeting at a vertex both reach half the width past it, which
/// fills the outer corner of a bend. Pathtype 2 also extends the two path
/// ends by half the width; every other pathtype leaves them flush.
/// Diagonal segments are skipped.
fn path_to_rects(points: &[Point], width: i32, pathtype: i16) -> Vec<Vec<Point>> {
    let half = i64::from(width).abs() / 2;
    if half == 0 {
        return Vec::new();
    }
    if pathtype != 0 && pathtype != 2 {
        log::warn!("Pathtype {} rendered with flush ends", pathtype);
    }
    let end_extend = if pathtype == 2 { half } else { 0 };
    let last = points.len().saturating_sub(2);

    let mut rects = Vec::new();
    for (i, pair) in points.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let start = if i == 0 { end_extend } else { half };
        let end = if i == last { end_extend } else { half };
        let (ax, ay, bx, by) = (i64::from(a.x), i64::from(a.y), i64::from(b.x), i64::from(b.y));
        let (x0, y0, x1, y1) = if a == b {
            continue;
        } else if ay == by {
            let (lo, hi) = if ax < bx { (ax - start, bx + end) } else { (bx - end, ax + start) };
            (lo, ay - half, hi, ay + half)
        } else if ax == bx {
            let (lo, hi) = if ay < by { (ay - start, by + end) } else { (by - end, ay + start) };
            (ax - half, lo, ax + half, hi)
        } else {
            log::warn!("Skipping diagonal path segment ({}, {}) -> ({}, {})", a.x, a.y, b.x, b.y);
            continue;
        };
        let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)];
        let rect: Option<Vec<Point>> = corners
            .iter()
            .map(|&(x, y)| Some(Point::new(i32::try_from(x).ok()?, i32::try_from(y).ok()?)))
            .collect();
        match rect {
            Some(rect) => rects.push(rect),
            None => log::warn!("Skipping path segment outside the coordinate range"),
        }
    }
    rects
}

/// Affine placement of a cell instance: `m * p + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    m: [[f64; 2]; 2],
    t: [f64; 2],
}

impl Placement {
    const IDENTITY: Self = Self {
        m: [[1.0, 0.0], [0.0, 1.0]],
        t: [0.0, 0.0],
    };

    /// Reflection, then magnification, then rotation, then translation.
    fn from_strans(strans: &Strans, origin: [f64; 2], cell: &str) -> Result<Self, GdsError> {
        let quarter_turns = strans.angle / 90.0;
        if (quarter_turns - quarter_turns.round()).abs() > 1e-9 {
            return Err(GdsError::UnsupportedTransform {
                cell: cell.to_string(),
                angle: strans.angle,
            });
        }
        let (cos, sin) = match (quarter_turns.round() as i64).rem_euclid(4) {
            0 => (1.0, 0.0),
            1 => (0.0, 1.0),
            2 => (-1.0, 0.0),
            _ => (0.0, -1.0),
        };
        let flip = if strans.reflect_x { -1.0 } else { 1.0 };
        let mag = strans.magnification;
        Ok(Self {
            m: [[mag * cos, -mag * sin * flip], [mag * sin, mag * cos * flip]],
            t: origin,
        })
    }

    /// `self ∘ child`: apply `child` first.
    fn then(&self, child: &Placement) -> Placement {
        let a = &self.m;
        let b = &child.m;
        Placement {
            m: [
                [a[0][0] * b[0][0] + a[0][1] * b[1][0], a[0][0] * b[0][1] + a[0][1] * b[1][1]],
                [a[1][0] * b[0][0] + a[1][1] * b[1][0], a[1][0] * b[0][1] + a[1][1] * b[1][1]],
            ],
            t: [
                a[0][0] * child.t[0] + a[0][1] * child.t[1] + self.t[0],
                a[1][0] * child.t[0] + a[1][1] * child.t[1] + self.t[1],
            ],
        }
    }

    fn apply(&self, p: Point) -> Result<Point, GdsError> {
        let (x, y) = (f64::from(p.x), f64::from(p.y));
        let tx = self.m[0][0] * x + self.m[0][1] * y + self.t[0];
        let ty = self.m[1][0] * x + self.m[1][1] * y + self.t[1];
        match (round_coordinate(tx), round_coordinate(ty)) {
            (Ok(x), Ok(y)) => Ok(Point::new(x, y)),
            _ => Err(GdsError::InvalidCoordinates),
        }
    }

    fn apply_all(&self, points: &[Point]) -> Result<Vec<Point>, GdsError> {
        points.iter().map(|p| self.apply(*p)).collect()
    }
}

/// Flattened polygons of one top cell, grouped by layer key.
#[derive(Debug, Clone, Default)]
pub struct FlatLayout {
    polygons: BTreeMap<LayerKey, Vec<Vec<Point>>>,
    bbox: Option<BBox>,
}

impl FlatLayout {
    fn push(&mut self, key: LayerKey, points: Vec<Point>) {
        if let Some(bb) = BBox::from_points(&points) {
            self.bbox = Some(match self.bbox {
                Some(acc) => acc.union(&bb),
                None => bb,
            });
        }
        self.polygons.entry(key).or_default().push(points);
    }

    /// Extent over every layer.
    pub fn bbox(&self) -> Option<BBox> {
        self.bbox
    }

    pub fn polygons(&self, key: LayerKey) -> &[Vec<Point>] {
        self.polygons.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Move the polygons of `key` out of the layout.
    pub fn take(&mut self, key: LayerKey) -> Vec<Vec<Point>> {
        self.polygons.remove(&key).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = LayerKey> + '_ {
        self.polygons.keys().copied()
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.values().map(Vec::len).sum()
    }
}
