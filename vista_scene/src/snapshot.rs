use glam::Mat4;
use vista_ids::ObjectId;

use crate::items::PaintOp;
use crate::node::{Material, Rect};

/// One node's render-ready state, flattened with its world transform baked
/// in. Plain data: safe to ship to a render thread.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    pub object: ObjectId,
    pub world_transform: Mat4,
    pub geometry: Rect,
    pub material: Material,
    pub ops: Vec<PaintOp>,
    pub depth: u32,
}

/// An immutable copy of the scene produced by
/// [`crate::Synchronizer::snapshot`]. Double-buffered: the synchronizer
/// writes the other buffer next time, so a renderer can keep reading this
/// one across a full sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSnapshot {
    pub nodes: Vec<SnapshotNode>,
}

impl RenderSnapshot {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotNode> {
        self.nodes.iter()
    }
}
