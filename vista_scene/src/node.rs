use bitflags::bitflags;
use glam::Mat4;
use vista_graph::Aspect;
use vista_ids::{GenArena, ObjectId, SceneNodeId};

use crate::items::{ItemKind, PaintOp};

bitflags! {
    /// Per-aspect dirty state. The renderer consumes and clears these;
    /// `DESCENDANT` is the ancestor rollup that lets clean subtrees be
    /// skipped without walking them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u8 {
        const TRANSFORM  = 1 << 0;
        const GEOMETRY   = 1 << 1;
        const MATERIAL   = 1 << 2;
        const CHILD_LIST = 1 << 3;
        /// Some node below this one is dirty.
        const DESCENDANT = 1 << 4;
    }
}

impl DirtyFlags {
    pub fn from_aspect_bits(bits: u8) -> Self {
        let mut flags = DirtyFlags::empty();
        if bits & Aspect::Transform.bit() != 0 {
            flags |= DirtyFlags::TRANSFORM;
        }
        if bits & Aspect::Geometry.bit() != 0 {
            flags |= DirtyFlags::GEOMETRY;
        }
        if bits & Aspect::Material.bit() != 0 {
            flags |= DirtyFlags::MATERIAL;
        }
        if bits & Aspect::ChildList.bit() != 0 {
            flags |= DirtyFlags::CHILD_LIST;
        }
        flags
    }

    /// Bits that mean this node itself must be redrawn (rollup excluded).
    pub fn own_bits(self) -> Self {
        self & !DirtyFlags::DESCENDANT
    }
}

/// `Clean`: bits consumed, nothing to do. `Dirty`: bits set, waiting for a
/// render. `Syncing`: the synchronizer is visiting; writes landing now
/// re-enter `Dirty` instead of being lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodePhase {
    #[default]
    Clean,
    Dirty,
    Syncing,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub color: [f32; 4],
    pub opacity: f32,
    /// Texture source for image content; empty when untextured.
    pub source: Option<std::sync::Arc<str>>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            opacity: 1.0,
            source: None,
        }
    }
}

/// The render-tree counterpart of one visual object. Owned by the scene
/// tree; destroyed when the object leaves the visual tree, independent of
/// the object's own lifetime.
pub struct SceneNode {
    pub id: SceneNodeId,
    /// Mirrored object; nil for the synthetic tree root.
    pub object: ObjectId,
    pub parent: SceneNodeId,
    pub children: Vec<SceneNodeId>,

    pub geometry: Rect,
    pub transform: Mat4,
    pub material: Material,
    pub item: Option<ItemKind>,
    /// Drawable content produced by the item's paint callback during sync.
    pub paint_ops: Vec<PaintOp>,

    pub dirty: DirtyFlags,
    pub phase: NodePhase,
}

impl SceneNode {
    pub fn new(id: SceneNodeId, object: ObjectId, parent: SceneNodeId) -> Self {
        Self {
            id,
            object,
            parent,
            children: Vec::new(),
            geometry: Rect::default(),
            transform: Mat4::IDENTITY,
            material: Material::default(),
            item: None,
            paint_ops: Vec::new(),
            dirty: DirtyFlags::empty(),
            phase: NodePhase::Clean,
        }
    }

    pub fn mark(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
        if !flags.is_empty() {
            self.phase = NodePhase::Dirty;
        }
    }
}

/// The node arena plus the synthetic root everything hangs off.
pub struct SceneTree {
    nodes: GenArena<SceneNodeId, SceneNode>,
    root: SceneNodeId,
}

impl SceneTree {
    pub fn new() -> Self {
        let mut nodes = GenArena::new();
        let root = nodes.insert_with(|id| SceneNode::new(id, ObjectId::nil(), SceneNodeId::nil()));
        Self { nodes, root }
    }

    #[inline]
    pub fn root(&self) -> SceneNodeId {
        self.root
    }

    #[inline]
    pub fn get(&self, id: SceneNodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: SceneNodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn create_node(&mut self, object: ObjectId, parent: SceneNodeId) -> SceneNodeId {
        let parent = if parent.is_nil() { self.root } else { parent };
        let id = self
            .nodes
            .insert_with(|id| SceneNode::new(id, object, parent));
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
            parent_node.mark(DirtyFlags::CHILD_LIST);
        }
        id
    }

    /// Remove a node and its subtree. Returns the object ids that were
    /// mirrored so the caller can drop its own mappings.
    pub fn remove_subtree(&mut self, id: SceneNodeId) -> Vec<ObjectId> {
        let mut removed = Vec::new();
        let Some(node) = self.nodes.get(id) else {
            return removed;
        };
        let parent = node.parent;

        let mut stack = vec![id];
        while let Some(nid) = stack.pop() {
            if let Some(node) = self.nodes.remove(nid) {
                if !node.object.is_nil() {
                    removed.push(node.object);
                }
                stack.extend(node.children);
            }
        }
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|c| *c != id);
            parent_node.mark(DirtyFlags::CHILD_LIST);
        }
        removed
    }

    /// OR `DESCENDANT` into every ancestor of `id` (exclusive).
    pub fn mark_ancestors(&mut self, id: SceneNodeId) {
        let mut cursor = self.nodes.get(id).map(|n| n.parent);
        while let Some(parent) = cursor {
            if parent.is_nil() {
                break;
            }
            let Some(node) = self.nodes.get_mut(parent) else { break };
            if node.dirty.contains(DirtyFlags::DESCENDANT) {
                break; // already rolled up to the root
            }
            node.dirty |= DirtyFlags::DESCENDANT;
            cursor = Some(node.parent);
        }
    }
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_bits_map_onto_flags() {
        let bits = Aspect::Transform.bit() | Aspect::Material.bit();
        let flags = DirtyFlags::from_aspect_bits(bits);
        assert!(flags.contains(DirtyFlags::TRANSFORM));
        assert!(flags.contains(DirtyFlags::MATERIAL));
        assert!(!flags.contains(DirtyFlags::GEOMETRY));
    }

    #[test]
    fn create_marks_parent_child_list() {
        let mut tree = SceneTree::new();
        let root = tree.root();
        let node = tree.create_node(ObjectId::from_parts(1, 0), root);
        assert!(tree.get(root).unwrap().dirty.contains(DirtyFlags::CHILD_LIST));
        assert_eq!(tree.get(node).unwrap().parent, root);
    }

    #[test]
    fn remove_subtree_detaches_and_reports_objects() {
        let mut tree = SceneTree::new();
        let a = tree.create_node(ObjectId::from_parts(1, 0), tree.root());
        let b = tree.create_node(ObjectId::from_parts(2, 0), a);
        let removed = tree.remove_subtree(a);
        assert_eq!(removed.len(), 2);
        assert!(tree.get(a).is_none());
        assert!(tree.get(b).is_none());
        assert!(tree.get(tree.root()).unwrap().children.is_empty());
    }

    #[test]
    fn ancestor_rollup_stops_when_already_marked() {
        let mut tree = SceneTree::new();
        let a = tree.create_node(ObjectId::from_parts(1, 0), tree.root());
        let b = tree.create_node(ObjectId::from_parts(2, 0), a);
        tree.mark_ancestors(b);
        assert!(tree.get(a).unwrap().dirty.contains(DirtyFlags::DESCENDANT));
        assert!(tree.get(tree.root()).unwrap().dirty.contains(DirtyFlags::DESCENDANT));
    }
}
