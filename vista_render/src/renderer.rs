use glam::Mat4;
use vista_ids::SceneNodeId;
use vista_scene::{DirtyFlags, NodePhase, PaintOp, SceneTree};

use crate::commands::{DrawOp, RenderList};

/// Per-frame traversal counters. `nodes_skipped` is the performance
/// contract: a subtree no write has reached since the last frame costs one
/// visit at its root and nothing below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub nodes_visited: usize,
    pub nodes_skipped: usize,
    pub draw_ops: usize,
}

/// Consumes dirty bits frame by frame. The emitted [`RenderList`] holds the
/// draw ops of the most recent frame only.
pub struct Renderer {
    list: RenderList,
    frame: u64,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            list: RenderList::new(),
            frame: 0,
        }
    }

    pub fn list(&self) -> &RenderList {
        &self.list
    }

    /// Draw everything that changed since the last call, clear the consumed
    /// dirty bits, and return what the traversal did.
    pub fn render_frame(&mut self, tree: &mut SceneTree) -> FrameStats {
        self.list.clear();
        let mut stats = FrameStats {
            frame: self.frame,
            ..FrameStats::default()
        };
        self.frame += 1;

        let root = tree.root();
        self.visit(tree, root, Mat4::IDENTITY, false, &mut stats);
        stats.draw_ops = self.list.len();
        log::trace!(
            "frame {}: visited {} skipped {} ops {}",
            stats.frame,
            stats.nodes_visited,
            stats.nodes_skipped,
            stats.draw_ops
        );
        stats
    }

    fn visit(
        &mut self,
        tree: &mut SceneTree,
        nid: SceneNodeId,
        parent_world: Mat4,
        forced: bool,
        stats: &mut FrameStats,
    ) {
        let (dirty, transform, object, children) = {
            let Some(node) = tree.get(nid) else { return };
            (node.dirty, node.transform, node.object, node.children.clone())
        };

        // Untouched subtree: nothing below can be dirty either, because
        // dirtying always rolls DESCENDANT up to the root.
        if !forced && dirty.is_empty() {
            stats.nodes_skipped += 1;
            return;
        }
        stats.nodes_visited += 1;

        let world = parent_world * transform;
        let redraw = forced || !dirty.own_bits().is_empty();
        if redraw && !object.is_nil() {
            let ops = tree
                .get(nid)
                .map(|node| node.paint_ops.clone())
                .unwrap_or_default();
            for op in ops {
                self.list.push(to_draw_op(op, object, world));
            }
        }

        // Consumed once: the node is clean until the next write reaches it.
        if let Some(node) = tree.get_mut(nid) {
            node.dirty = DirtyFlags::empty();
            node.phase = NodePhase::Clean;
        }

        // An ancestor transform change moves every descendant on screen,
        // so the whole subtree redraws even where its own bits are clean.
        let force_children = forced || dirty.contains(DirtyFlags::TRANSFORM);
        for child in children {
            self.visit(tree, child, world, force_children, stats);
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn to_draw_op(op: PaintOp, object: vista_ids::ObjectId, world: Mat4) -> DrawOp {
    match op {
        PaintOp::FillRect { rect, color } => DrawOp::Rect {
            object,
            transform: world,
            rect,
            color,
        },
        PaintOp::Glyphs {
            origin,
            text,
            size,
            color,
        } => DrawOp::Text {
            object,
            transform: world,
            origin,
            text,
            size,
            color,
        },
        PaintOp::Blit {
            rect,
            source,
            opacity,
        } => DrawOp::Image {
            object,
            transform: world,
            rect,
            source,
            opacity,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_ids::ObjectId;
    use vista_scene::Rect;

    fn painted_node(tree: &mut SceneTree, object_index: u32, parent: SceneNodeId) -> SceneNodeId {
        let object = ObjectId::from_parts(object_index, 0);
        let nid = tree.create_node(object, parent);
        let node = tree.get_mut(nid).unwrap();
        node.geometry = Rect::new(0.0, 0.0, 10.0, 10.0);
        node.paint_ops = vec![PaintOp::FillRect {
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            color: [1.0, 1.0, 1.0, 1.0],
        }];
        node.mark(DirtyFlags::GEOMETRY);
        tree.mark_ancestors(nid);
        nid
    }

    #[test]
    fn dirty_bits_consumed_once() {
        let mut tree = SceneTree::new();
        let root = tree.root();
        let nid = painted_node(&mut tree, 1, root);
        let mut renderer = Renderer::new();

        let first = renderer.render_frame(&mut tree);
        assert_eq!(first.draw_ops, 1);
        assert_eq!(tree.get(nid).unwrap().dirty, DirtyFlags::empty());
        assert_eq!(tree.get(nid).unwrap().phase, NodePhase::Clean);

        // No writes since: the whole tree is pruned at the root.
        let second = renderer.render_frame(&mut tree);
        assert_eq!(second.draw_ops, 0);
        assert_eq!(second.nodes_visited, 0);
        assert_eq!(second.nodes_skipped, 1);
    }

    #[test]
    fn clean_sibling_skipped_dirty_one_drawn() {
        let mut tree = SceneTree::new();
        let root = tree.root();
        let a = painted_node(&mut tree, 1, root);
        let b = painted_node(&mut tree, 2, root);
        let mut renderer = Renderer::new();
        renderer.render_frame(&mut tree);

        // Touch only `a`.
        tree.get_mut(a).unwrap().mark(DirtyFlags::MATERIAL);
        tree.mark_ancestors(a);
        let stats = renderer.render_frame(&mut tree);
        assert_eq!(stats.draw_ops, 1);
        let drawn: Vec<ObjectId> = renderer.list().ops().iter().map(|op| op.object()).collect();
        assert_eq!(drawn, vec![tree.get(a).unwrap().object]);
        let _ = b;
    }

    #[test]
    fn ancestor_transform_forces_subtree() {
        let mut tree = SceneTree::new();
        let root = tree.root();
        let parent = painted_node(&mut tree, 1, root);
        let child = painted_node(&mut tree, 2, parent);
        let mut renderer = Renderer::new();
        renderer.render_frame(&mut tree);

        // Only the parent's transform changes; the child has clean bits but
        // must redraw anyway.
        tree.get_mut(parent).unwrap().mark(DirtyFlags::TRANSFORM);
        tree.mark_ancestors(parent);
        let stats = renderer.render_frame(&mut tree);
        assert_eq!(stats.draw_ops, 2);
        assert_eq!(tree.get(child).unwrap().dirty, DirtyFlags::empty());
    }

    #[test]
    fn descendant_rollup_reaches_deep_nodes() {
        let mut tree = SceneTree::new();
        let root = tree.root();
        let a = painted_node(&mut tree, 1, root);
        let b = painted_node(&mut tree, 2, a);
        let c = painted_node(&mut tree, 3, b);
        let mut renderer = Renderer::new();
        renderer.render_frame(&mut tree);

        tree.get_mut(c).unwrap().mark(DirtyFlags::GEOMETRY);
        tree.mark_ancestors(c);
        let stats = renderer.render_frame(&mut tree);
        // Only the leaf redraws, but the chain above is traversed.
        assert_eq!(stats.draw_ops, 1);
        assert!(stats.nodes_visited >= 3);
        let _ = (a, b);
    }

    #[test]
    fn world_transform_composes_through_chain() {
        let mut tree = SceneTree::new();
        let root = tree.root();
        let parent = painted_node(&mut tree, 1, root);
        let child = painted_node(&mut tree, 2, parent);
        tree.get_mut(parent).unwrap().transform =
            Mat4::from_translation(glam::Vec3::new(5.0, 0.0, 0.0));
        tree.get_mut(child).unwrap().transform =
            Mat4::from_translation(glam::Vec3::new(3.0, 0.0, 0.0));

        let mut renderer = Renderer::new();
        renderer.render_frame(&mut tree);
        let child_object = tree.get(child).unwrap().object;
        let op = renderer
            .list()
            .ops_for(child_object)
            .next()
            .expect("child drew");
        let DrawOp::Rect { transform, .. } = op else {
            panic!("expected rect");
        };
        let origin = transform.transform_point3(glam::Vec3::ZERO);
        assert_eq!(origin.x, 8.0);
    }
}
