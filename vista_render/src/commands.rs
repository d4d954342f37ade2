use std::sync::Arc;

use glam::{Mat4, Vec2};
use vista_ids::ObjectId;
use vista_scene::Rect;

/// One draw call, fully resolved: world transform baked in, keyed by the
/// originating object for backends that cache per-object state.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Rect {
        object: ObjectId,
        transform: Mat4,
        rect: Rect,
        color: [f32; 4],
    },
    Text {
        object: ObjectId,
        transform: Mat4,
        origin: Vec2,
        text: Arc<str>,
        size: f32,
        color: [f32; 4],
    },
    Image {
        object: ObjectId,
        transform: Mat4,
        rect: Rect,
        source: Arc<str>,
        opacity: f32,
    },
}

impl DrawOp {
    pub fn object(&self) -> ObjectId {
        match self {
            DrawOp::Rect { object, .. }
            | DrawOp::Text { object, .. }
            | DrawOp::Image { object, .. } => *object,
        }
    }
}

/// The ops emitted by the most recent frame, in draw order.
#[derive(Debug, Default)]
pub struct RenderList {
    ops: Vec<DrawOp>,
}

impl RenderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: DrawOp) {
        self.ops.push(op);
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn ops_for(&self, object: ObjectId) -> impl Iterator<Item = &DrawOp> {
        self.ops.iter().filter(move |op| op.object() == object)
    }
}
