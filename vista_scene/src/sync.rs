use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Quat, Vec3};
use rustc_hash::FxHashMap;
use vista_graph::{Object, ObjectGraph, ProfileEvent};
use vista_ids::{ObjectId, SceneNodeId};
use vista_variant::Variant;

use crate::items::{Geometrical, ImageItem, ItemKind, PaintSurface, Paintable, RectItem, TextItem};
use crate::node::{DirtyFlags, Material, NodePhase, Rect, SceneTree};
use crate::snapshot::{RenderSnapshot, SnapshotNode};

/// Writes triggered by binding settles during a sync round land in the
/// touched set again; the drain loop is bounded so a misbehaving binding
/// cannot spin the synchronizer forever.
const MAX_SYNC_ROUNDS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub rounds: usize,
    pub visited: usize,
    pub created: usize,
    pub removed: usize,
}

/// Mirrors touched objects from the binding graph into the scene tree.
/// Owns the tree; the graph owns the objects. The 1:{0,1} object-to-node
/// correspondence lives in `object_nodes`.
pub struct Synchronizer {
    tree: SceneTree,
    object_nodes: FxHashMap<ObjectId, SceneNodeId>,
    buffers: [RenderSnapshot; 2],
    front: usize,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self {
            tree: SceneTree::new(),
            object_nodes: FxHashMap::default(),
            buffers: [RenderSnapshot::default(), RenderSnapshot::default()],
            front: 0,
        }
    }

    #[inline]
    pub fn tree(&self) -> &SceneTree {
        &self.tree
    }

    #[inline]
    pub fn tree_mut(&mut self) -> &mut SceneTree {
        &mut self.tree
    }

    pub fn node_of(&self, object: ObjectId) -> Option<SceneNodeId> {
        self.object_nodes.get(&object).copied()
    }

    /// Mirror every touched object into its scene node. Bindings are
    /// settled through the graph's own read path, so sync always sees
    /// committed values.
    pub fn sync(&mut self, graph: &mut ObjectGraph) -> SyncStats {
        let started = graph.has_listener().then(Instant::now);
        if started.is_some() {
            graph.emit_profile(ProfileEvent::SyncStarted);
        }

        let mut stats = SyncStats::default();
        while graph.has_touched() {
            if stats.rounds == MAX_SYNC_ROUNDS {
                log::warn!(
                    "scene sync did not settle after {MAX_SYNC_ROUNDS} rounds; deferring to next frame"
                );
                break;
            }
            stats.rounds += 1;
            for (oid, aspect_bits) in graph.take_touched() {
                self.sync_object(graph, oid, aspect_bits, &mut stats);
            }
        }

        if let Some(started) = started {
            graph.emit_profile(ProfileEvent::SyncFinished {
                elapsed: started.elapsed(),
            });
        }
        stats
    }

    fn sync_object(
        &mut self,
        graph: &mut ObjectGraph,
        oid: ObjectId,
        aspect_bits: u8,
        stats: &mut SyncStats,
    ) {
        if !graph.is_alive(oid) {
            if let Some(nid) = self.object_nodes.remove(&oid) {
                for removed in self.tree.remove_subtree(nid) {
                    self.object_nodes.remove(&removed);
                    stats.removed += 1;
                }
            }
            return;
        }
        let visual = graph.object(oid).map(is_visual).unwrap_or(false);
        if !visual {
            return;
        }

        let existed = self
            .node_of(oid)
            .map(|nid| self.tree.get(nid).is_some())
            .unwrap_or(false);
        let nid = self.ensure_node(graph, oid);
        if !existed {
            stats.created += 1;
        }
        stats.visited += 1;

        if let Some(node) = self.tree.get_mut(nid) {
            node.phase = NodePhase::Syncing;
        }

        let mut flags = DirtyFlags::from_aspect_bits(aspect_bits);
        if !existed {
            flags |= DirtyFlags::TRANSFORM | DirtyFlags::GEOMETRY | DirtyFlags::MATERIAL;
        }

        if flags.contains(DirtyFlags::TRANSFORM) {
            let transform = pull_transform(graph, oid);
            if let Some(node) = self.tree.get_mut(nid) {
                node.transform = transform;
            }
        }
        if flags.intersects(DirtyFlags::GEOMETRY | DirtyFlags::MATERIAL) {
            let item = pull_item(graph, oid);
            let declared = pull_geometry(graph, oid);
            let material = pull_material(graph, oid);
            let geometry = item
                .as_ref()
                .map(|i| i.calculate_geometry(declared))
                .unwrap_or(declared);
            let mut surface = PaintSurface::new();
            if let Some(item) = &item {
                item.paint(geometry, &material, &mut surface);
            }
            if let Some(node) = self.tree.get_mut(nid) {
                node.item = item;
                node.geometry = geometry;
                node.material = material;
                node.paint_ops = surface.finish();
            }
        }
        if flags.contains(DirtyFlags::CHILD_LIST) {
            self.sync_child_list(graph, oid, nid, stats);
        }

        // Leaving `Syncing`: the accumulated bits wait for the renderer.
        // A write that landed mid-visit has re-touched the object; the
        // drain loop will bring us back here.
        if let Some(node) = self.tree.get_mut(nid) {
            node.mark(flags);
        }
        self.tree.mark_ancestors(nid);
    }

    fn ensure_node(&mut self, graph: &mut ObjectGraph, oid: ObjectId) -> SceneNodeId {
        if let Some(&nid) = self.object_nodes.get(&oid) {
            if self.tree.get(nid).is_some() {
                return nid;
            }
        }
        let parent_obj = graph.object(oid).map(|o| o.parent).unwrap_or(ObjectId::nil());
        let parent_node = self.nearest_visual_ancestor(graph, parent_obj);
        let nid = self.tree.create_node(oid, parent_node);
        self.object_nodes.insert(oid, nid);
        graph.set_scene_node(oid, nid);
        nid
    }

    /// Nodes of visual children hang off the node of their nearest visual
    /// ancestor; non-visual containers are transparent to the scene tree.
    fn nearest_visual_ancestor(
        &mut self,
        graph: &mut ObjectGraph,
        mut cursor: ObjectId,
    ) -> SceneNodeId {
        while !cursor.is_nil() {
            let Some(obj) = graph.object(cursor) else { break };
            let parent = obj.parent;
            if is_visual(obj) {
                return self.ensure_node(graph, cursor);
            }
            cursor = parent;
        }
        self.tree.root()
    }

    fn sync_child_list(
        &mut self,
        graph: &ObjectGraph,
        oid: ObjectId,
        nid: SceneNodeId,
        stats: &mut SyncStats,
    ) {
        let Some(obj) = graph.object(oid) else { return };
        let desired: Vec<SceneNodeId> = obj
            .children
            .iter()
            .filter_map(|child| self.object_nodes.get(child).copied())
            .filter(|child_nid| self.tree.get(*child_nid).is_some())
            .collect();

        let current = match self.tree.get(nid) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child_nid in current {
            let dead = self
                .tree
                .get(child_nid)
                .map(|n| !n.object.is_nil() && !graph.is_alive(n.object))
                .unwrap_or(false);
            if dead {
                for removed in self.tree.remove_subtree(child_nid) {
                    self.object_nodes.remove(&removed);
                    stats.removed += 1;
                }
            }
        }
        if let Some(node) = self.tree.get_mut(nid) {
            // Mapped children in object order; unmapped visual children will
            // attach themselves when their own touch is processed.
            node.children.retain(|c| desired.contains(c));
            let mut ordered: Vec<SceneNodeId> = desired
                .into_iter()
                .filter(|c| node.children.contains(c))
                .collect();
            std::mem::swap(&mut node.children, &mut ordered);
        }
    }

    // ---------------- snapshot double buffer ----------------

    /// Flatten render-ready state into the back buffer and swap. The
    /// returned snapshot is immutable and safe to hand to a render thread;
    /// the next sync never mutates it.
    pub fn snapshot(&mut self) -> &RenderSnapshot {
        let back = 1 - self.front;
        let mut nodes = std::mem::take(&mut self.buffers[back].nodes);
        nodes.clear();
        self.flatten(self.tree.root(), Mat4::IDENTITY, 0, &mut nodes);
        self.buffers[back].nodes = nodes;
        self.front = back;
        &self.buffers[self.front]
    }

    fn flatten(&self, nid: SceneNodeId, parent_world: Mat4, depth: u32, out: &mut Vec<SnapshotNode>) {
        let Some(node) = self.tree.get(nid) else { return };
        let world = parent_world * node.transform;
        if !node.object.is_nil() {
            out.push(SnapshotNode {
                object: node.object,
                world_transform: world,
                geometry: node.geometry,
                material: node.material.clone(),
                ops: node.paint_ops.clone(),
                depth,
            });
        }
        for child in &node.children {
            self.flatten(*child, world, depth + 1, out);
        }
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_visual(obj: &Object) -> bool {
    obj.props().any(|(_, slot)| slot.aspect.is_some())
}

// ---------------- property pulls ----------------

fn read_f32(graph: &mut ObjectGraph, oid: ObjectId, name: &str, default: f32) -> f32 {
    graph
        .read_opt(oid, name)
        .and_then(|v| v.to_real())
        .map(|v| v as f32)
        .unwrap_or(default)
}

fn pull_transform(graph: &mut ObjectGraph, oid: ObjectId) -> Mat4 {
    let x = read_f32(graph, oid, "x", 0.0);
    let y = read_f32(graph, oid, "y", 0.0);
    let rotation = read_f32(graph, oid, "rotation", 0.0);
    let scale = read_f32(graph, oid, "scale", 1.0);
    Mat4::from_scale_rotation_translation(
        Vec3::new(scale, scale, 1.0),
        Quat::from_rotation_z(rotation),
        Vec3::new(x, y, 0.0),
    )
}

fn pull_geometry(graph: &mut ObjectGraph, oid: ObjectId) -> Rect {
    let width = read_f32(graph, oid, "width", 0.0);
    let height = read_f32(graph, oid, "height", 0.0);
    Rect::new(0.0, 0.0, width, height)
}

fn pull_material(graph: &mut ObjectGraph, oid: ObjectId) -> Material {
    let color = graph
        .read_opt(oid, "color")
        .and_then(|v| parse_color(&v))
        .unwrap_or([1.0, 1.0, 1.0, 1.0]);
    let opacity = read_f32(graph, oid, "opacity", 1.0).clamp(0.0, 1.0);
    let source = graph
        .read_opt(oid, "source")
        .and_then(|v| v.as_str().map(Arc::<str>::from));
    Material {
        color,
        opacity,
        source,
    }
}

fn pull_item(graph: &mut ObjectGraph, oid: ObjectId) -> Option<ItemKind> {
    let kind = graph.read_opt(oid, "kind")?;
    match kind.as_str()? {
        "rect" => Some(ItemKind::Rect(RectItem)),
        "text" => {
            let text = graph
                .read_opt(oid, "text")
                .and_then(|v| v.as_str().map(Arc::<str>::from))
                .unwrap_or_else(|| Arc::<str>::from(""));
            let font_size = read_f32(graph, oid, "font_size", 14.0);
            Some(ItemKind::Text(TextItem { text, font_size }))
        }
        "image" => {
            let source = graph
                .read_opt(oid, "source")
                .and_then(|v| v.as_str().map(Arc::<str>::from));
            Some(ItemKind::Image(ImageItem { source }))
        }
        other => {
            log::warn!("unknown item kind '{other}'");
            None
        }
    }
}

/// `#rrggbb` / `#rrggbbaa` strings, or a list of 3-4 reals in 0..=1.
fn parse_color(value: &Variant) -> Option<[f32; 4]> {
    if let Some(text) = value.as_str() {
        let hex = text.strip_prefix('#')?;
        let channel = |i: usize| -> Option<f32> {
            u8::from_str_radix(hex.get(i..i + 2)?, 16)
                .ok()
                .map(|v| v as f32 / 255.0)
        };
        return match hex.len() {
            6 => Some([channel(0)?, channel(2)?, channel(4)?, 1.0]),
            8 => Some([channel(0)?, channel(2)?, channel(4)?, channel(6)?]),
            _ => None,
        };
    }
    if let Some(list) = value.as_list() {
        if list.len() < 3 || list.len() > 4 {
            return None;
        }
        let mut out = [0.0f32, 0.0, 0.0, 1.0];
        for (i, item) in list.iter().enumerate() {
            out[i] = item.to_real()? as f32;
        }
        return Some(out);
    }
    None
}
