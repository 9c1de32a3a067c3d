/// Decoration renderer: one visual node per decoration, keyed by id
///
/// Each pass reconciles the current decoration list against the mounted
/// nodes. Nodes for surviving decorations keep their `NodeId` and are
/// updated in place; new decorations get fresh nodes; nodes whose
/// decoration is gone are dropped. Z-order follows ascending decoration
/// id. Only the active node carries resize-rotate and close handles.

use std::collections::HashMap;

use cgmath::{Basis2, Deg, Rotation, Rotation2, Vector2};

use crate::geometry::{Point, PreviewScaling, Rect};
use crate::state::decoration::{DecorationId, DecorationKind, DecorationRef, DecorationSet, Justify};

/// Screen radius of the handle hit area
pub const HANDLE_RADIUS: f32 = 12.0;

/// Identity of a mounted node; survives every pass its decoration survives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Sticker { path: String },
    Text { text: String, font: String, color: String, font_size: f32, justify: Justify },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub decoration: DecorationId,
    pub kind: DecorationKind,
    /// Unrotated box in screen pixels
    pub rect: Rect,
    pub rotation: f32,
    pub z_index: usize,
    pub content: NodeContent,
    pub handles: bool,
    pub editing: bool,
}

impl Node {
    /// Map a screen point into the node's unrotated frame
    fn to_local(&self, p: Point) -> Point {
        let c = self.rect.center();
        let rot: Basis2<f32> = Rotation2::from_angle(Deg(-self.rotation));
        let v = rot.rotate_vector(Vector2::new(p.x - c.x, p.y - c.y));
        Point::new(c.x + v.x, c.y + v.y)
    }

    /// Screen position of a corner handle, rotation applied
    pub fn handle_position(&self, handle: HitTarget) -> Point {
        let r = &self.rect;
        let corner = match handle {
            HitTarget::Close => Point::new(r.x + r.width, r.y),
            _ => Point::new(r.x + r.width, r.y + r.height),
        };
        let c = r.center();
        let rot: Basis2<f32> = Rotation2::from_angle(Deg(self.rotation));
        let v = rot.rotate_vector(Vector2::new(corner.x - c.x, corner.y - c.y));
        Point::new(c.x + v.x, c.y + v.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Body,
    ResizeRotate,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub decoration: DecorationId,
    pub target: HitTarget,
}

/// What a pass did, mostly for tests and tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderPass {
    pub created: usize,
    pub reused: usize,
    pub removed: usize,
}

#[derive(Debug, Default)]
pub struct DecorationRenderer {
    nodes: HashMap<DecorationId, Node>,
    next_node: u64,
}

impl DecorationRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(
        &mut self,
        decorations: &DecorationSet,
        active: Option<DecorationId>,
        editing: Option<DecorationId>,
        scaling: &PreviewScaling,
    ) -> RenderPass {
        let mut pass = RenderPass::default();
        let ordered = decorations.ordered();

        let before = self.nodes.len();
        self.nodes.retain(|id, _| ordered.iter().any(|d| d.id() == *id));
        pass.removed = before - self.nodes.len();

        for (z_index, item) in ordered.iter().enumerate() {
            let placement = item.placement();
            let rect = scaling.rect_to_screen(&Rect::new(
                placement.x,
                placement.y,
                placement.width,
                placement.height,
            ));
            let content = match item {
                DecorationRef::Sticker(s) => NodeContent::Sticker { path: s.path.clone() },
                DecorationRef::Text(t) => NodeContent::Text {
                    text: t.text.clone(),
                    font: t.font.clone(),
                    color: t.color.clone(),
                    font_size: scaling.scale_len(t.font_size),
                    justify: t.justify,
                },
            };
            let handles = active == Some(item.id());
            let is_editing = editing == Some(item.id());

            match self.nodes.get_mut(&item.id()) {
                Some(node) => {
                    node.rect = rect;
                    node.rotation = placement.rotation;
                    node.z_index = z_index;
                    node.content = content;
                    node.handles = handles;
                    node.editing = is_editing;
                    pass.reused += 1;
                }
                None => {
                    self.next_node += 1;
                    self.nodes.insert(
                        item.id(),
                        Node {
                            id: NodeId(self.next_node),
                            decoration: item.id(),
                            kind: item.kind(),
                            rect,
                            rotation: placement.rotation,
                            z_index,
                            content,
                            handles,
                            editing: is_editing,
                        },
                    );
                    pass.created += 1;
                }
            }
        }
        pass
    }

    /// Mounted nodes, bottom of the stack first
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.z_index);
        nodes
    }

    pub fn node(&self, id: DecorationId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Topmost node under a screen point. Handles of the active node win
    /// over every body.
    pub fn hit_test(&self, p: Point) -> Option<Hit> {
        let nodes = self.nodes();

        if let Some(active) = nodes.iter().find(|n| n.handles) {
            for target in [HitTarget::ResizeRotate, HitTarget::Close] {
                let h = active.handle_position(target);
                if (h.x - p.x).hypot(h.y - p.y) <= HANDLE_RADIUS {
                    return Some(Hit { decoration: active.decoration, target });
                }
            }
        }

        nodes.iter().rev().find_map(|n| {
            let local = n.to_local(p);
            let r = &n.rect;
            let inside = local.x >= r.x
                && local.x <= r.x + r.width
                && local.y >= r.y
                && local.y <= r.y + r.height;
            inside.then_some(Hit { decoration: n.decoration, target: HitTarget::Body })
        })
    }
}
