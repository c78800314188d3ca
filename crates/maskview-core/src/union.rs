//! Boolean union and outer/hole hierarchy reconstruction.
//!
//! The union itself is delegated to a [`UnionEngine`]. Engines report their
//! result as a [`ContourTree`]: root nodes are outer contours, children of an
//! outer are its holes, and children of a hole are islands (outer contours
//! nested inside that hole).

use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};
use crate::geometry::{round_coordinate, Point, Polygon, Ring};

/// Whether a contour bounds material or a cavity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContourKind {
    Outer,
    Hole,
}

/// A node in a [`ContourTree`].
#[derive(Debug, Clone)]
pub struct ContourNode {
    pub kind: ContourKind,
    pub contour: Vec<Point>,
    pub children: Vec<usize>,
}

/// Arena-backed contour hierarchy produced by a union.
#[derive(Debug, Clone, Default)]
pub struct ContourTree {
    nodes: Vec<ContourNode>,
    roots: Vec<usize>,
}

impl ContourTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, kind: ContourKind, contour: Vec<Point>) -> usize {
        let id = self.push(kind, contour);
        self.roots.push(id);
        id
    }

    /// Attach a node below `parent`.
    ///
    /// # Panics
    /// If `parent` was not returned by this tree.
    pub fn add_child(&mut self, parent: usize, kind: ContourKind, contour: Vec<Point>) -> usize {
        let id = self.push(kind, contour);
        self.nodes[parent].children.push(id);
        id
    }

    fn push(&mut self, kind: ContourKind, contour: Vec<Point>) -> usize {
        self.nodes.push(ContourNode {
            kind,
            contour,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn node(&self, id: usize) -> &ContourNode {
        &self.nodes[id]
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A boolean union primitive.
///
/// Input rings are all counter-clockwise and simple. The result must tag
/// root nodes and islands as [`ContourKind::Outer`] and the direct children
/// of outer nodes as [`ContourKind::Hole`].
pub trait UnionEngine {
    fn union(&self, rings: &[Ring]) -> Result<ContourTree>;
}

/// [`UnionEngine`] backed by `i_overlay`.
///
/// Every input ring shares the same winding, so the nonzero fill rule selects
/// exactly the positively wound area. Output contours are rounded back onto
/// the integer grid and reoriented so outers are counter-clockwise and holes
/// clockwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayUnion;

impl UnionEngine for OverlayUnion {
    fn union(&self, rings: &[Ring]) -> Result<ContourTree> {
        let mut tree = ContourTree::new();
        if rings.is_empty() {
            return Ok(tree);
        }

        let subject: Vec<Vec<[f64; 2]>> = rings.iter().map(ring_to_path).collect();
        let clip: Vec<Vec<[f64; 2]>> = Vec::new();
        let shapes = subject.overlay(&clip, OverlayRule::Union, FillRule::NonZero);

        for shape in shapes {
            let mut contours = shape.into_iter();
            let Some(outer) = contours.next() else {
                continue;
            };
            let Some(mut outer) = path_to_ring(&outer)? else {
                log::warn!("Dropping degenerate union contour");
                continue;
            };
            outer.normalize_ccw();
            let root = tree.add_root(ContourKind::Outer, outer.into_points());

            for hole in contours {
                if let Some(mut hole) = path_to_ring(&hole)? {
                    hole.normalize_cw();
                    tree.add_child(root, ContourKind::Hole, hole.into_points());
                }
            }
        }

        log::debug!("Union of {} rings produced {} contours", rings.len(), tree.len());
        Ok(tree)
    }
}

fn ring_to_path(ring: &Ring) -> Vec<[f64; 2]> {
    ring.points()
        .iter()
        .map(|p| [f64::from(p.x), f64::from(p.y)])
        .collect()
}

/// Snap a float contour to the grid, dropping repeated points. `None` when
/// fewer than three distinct points remain.
fn path_to_ring(path: &[[f64; 2]]) -> Result<Option<Ring>> {
    let mut points: Vec<Point> = Vec::with_capacity(path.len());
    for &[x, y] in path {
        let p = Point::new(round_coordinate(x)?, round_coordinate(y)?);
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return Ok(None);
    }
    Ring::new(points).map(Some)
}

/// Group every outer node with its direct holes.
///
/// Islands inside holes become additional polygons. The walk uses an explicit
/// work stack, and a node carrying the wrong tag for its position fails the
/// whole walk.
pub fn collect_polygons(tree: &ContourTree) -> Result<Vec<Polygon>> {
    let mut polygons = Vec::new();
    let mut stack: Vec<usize> = tree.roots().iter().rev().copied().collect();

    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        expect_kind(id, node.kind, ContourKind::Outer)?;

        let mut holes = Vec::with_capacity(node.children.len());
        let mut islands = Vec::new();
        for &child_id in &node.children {
            let child = tree.node(child_id);
            expect_kind(child_id, child.kind, ContourKind::Hole)?;
            holes.push(Ring::new(child.contour.clone())?);
            islands.extend_from_slice(&child.children);
        }

        polygons.push(Polygon::new(Ring::new(node.contour.clone())?, holes));
        stack.extend(islands.into_iter().rev());
    }

    Ok(polygons)
}

fn expect_kind(node: usize, found: ContourKind, expected: ContourKind) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(GeometryError::HierarchyTag {
            node,
            expected,
            found,
        })
    }
}

/// Union `rings` with `engine` and regroup the result into polygons.
pub fn union_polygons(rings: &[Ring], engine: &dyn UnionEngine) -> Result<Vec<Polygon>> {
    let tree = engine.union(rings)?;
    collect_polygons(&tree)
}
