use vista_graph::{DiagnosticSink, ObjectGraph};
use vista_ids::ObjectId;
use vista_render::{FrameStats, Renderer};
use vista_scene::{RenderSnapshot, SyncStats, Synchronizer};

use crate::config;
use crate::loader;
use crate::registry::TypeRegistry;

/// What one [`Engine::update`] did, stage by stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Binding evaluations performed by the eager flush.
    pub evaluations: usize,
    pub sync: SyncStats,
    pub frame: FrameStats,
}

/// Owns the whole pipeline. One `update` is: settle eager bindings, mirror
/// touched objects into the scene tree, render the dirty nodes. All three
/// stages run on the calling thread; a render thread only ever receives
/// [`Engine::snapshot`] copies.
pub struct Engine {
    graph: ObjectGraph,
    registry: TypeRegistry,
    sync: Synchronizer,
    renderer: Renderer,
}

impl Engine {
    pub fn new() -> Self {
        let cfg = config();
        let mut graph = ObjectGraph::new();
        graph.set_max_flush_iterations(cfg.max_flush_iterations);
        if !cfg.log_diagnostics {
            graph.set_sink(Box::new(NullSink));
        }
        Self {
            graph,
            registry: TypeRegistry::with_builtins(),
            sync: Synchronizer::new(),
            renderer: Renderer::new(),
        }
    }

    #[inline]
    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    #[inline]
    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        &mut self.graph
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn scene(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Load a scene description (see [`loader::load_scene`]) and return the
    /// roots it created.
    pub fn load_scene(&mut self, source: &str) -> anyhow::Result<Vec<ObjectId>> {
        loader::load_scene(&mut self.graph, &self.registry, source)
    }

    /// One frame: flush eager bindings, sync the scene tree, render.
    pub fn update(&mut self) -> FrameReport {
        let evaluations = self.graph.flush();
        let sync = self.sync.sync(&mut self.graph);
        let frame = self.renderer.render_frame(self.sync.tree_mut());
        FrameReport {
            evaluations,
            sync,
            frame,
        }
    }

    /// Immutable render-ready copy for a consumer on another thread.
    pub fn snapshot(&mut self) -> &RenderSnapshot {
        self.sync.snapshot()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&mut self, _diagnostic: &vista_graph::Diagnostic) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_graph::{Diagnostic, MemorySink};
    use vista_variant::Variant;

    const DEMO: &str = r##"
        object Rectangle frame
          prop width = 320
          prop height = 200
          prop color = "#336699"
          object Rectangle bar
            bind width = parent.width
            prop height = 24
            prop color = "#222222"
          end
          object Text title
            prop text = "vista"
            bind x = (parent.width - width) / 2
          end
        end
    "##;

    #[test]
    fn update_settles_syncs_and_draws() {
        let mut engine = Engine::new();
        engine.load_scene(DEMO).unwrap();
        let report = engine.update();
        assert!(report.sync.created >= 3);
        assert!(report.frame.draw_ops >= 2); // two rects paint; text paints too

        // Steady state: nothing changed, nothing drawn.
        let second = engine.update();
        assert_eq!(second.evaluations, 0);
        assert_eq!(second.frame.draw_ops, 0);
        assert_eq!(second.frame.nodes_visited, 0);
    }

    #[test]
    fn width_follows_parent_through_frames() {
        let mut engine = Engine::new();
        let roots = engine.load_scene(DEMO).unwrap();
        engine.update();

        let frame = roots[0];
        engine
            .graph_mut()
            .write(frame, "width", Variant::Int(640))
            .unwrap();
        let report = engine.update();
        assert!(report.evaluations >= 1);
        assert!(report.frame.draw_ops >= 1);

        let bar = engine.graph().object(frame).unwrap().children[0];
        assert_eq!(
            engine.graph_mut().read(bar, "width").unwrap(),
            Variant::Int(640)
        );
    }

    #[test]
    fn direct_write_breaks_binding_for_good() {
        let mut engine = Engine::new();
        let roots = engine.load_scene(DEMO).unwrap();
        engine.update();
        let frame = roots[0];
        let bar = engine.graph().object(frame).unwrap().children[0];

        engine
            .graph_mut()
            .write(bar, "width", Variant::Int(50))
            .unwrap();
        engine.update();
        engine
            .graph_mut()
            .write(frame, "width", Variant::Int(1000))
            .unwrap();
        engine.update();
        assert_eq!(
            engine.graph_mut().read(bar, "width").unwrap(),
            Variant::Int(50)
        );
    }

    #[test]
    fn loop_in_scene_reports_and_keeps_values() {
        let sink = MemorySink::new();
        let mut engine = Engine::new();
        engine.graph_mut().set_sink(Box::new(sink.clone()));
        let roots = engine
            .load_scene(
                r#"
                object Item a
                  prop first = 1
                  prop second = 2
                  bind first = second + 1
                  bind second = first + 1
                end
                "#,
            )
            .unwrap();
        engine.update();

        let a = roots[0];
        assert_eq!(engine.graph_mut().read(a, "first").unwrap(), Variant::Int(1));
        assert_eq!(engine.graph_mut().read(a, "second").unwrap(), Variant::Int(2));
        let loops = sink
            .entries()
            .iter()
            .filter(|d| matches!(d, Diagnostic::BindingLoop { .. }))
            .count();
        assert_eq!(loops, 1);
    }

    #[test]
    fn unchanged_geometry_skips_node_next_frame() {
        let mut engine = Engine::new();
        let roots = engine.load_scene(DEMO).unwrap();
        engine.update();
        let frame = roots[0];

        // Same value again: no dirty bits anywhere, node skipped entirely.
        engine
            .graph_mut()
            .write(frame, "width", Variant::Int(320))
            .unwrap();
        let report = engine.update();
        assert_eq!(report.frame.draw_ops, 0);
        assert_eq!(report.frame.nodes_visited, 0);
    }

    #[test]
    fn snapshot_is_stable_across_later_writes() {
        let mut engine = Engine::new();
        let roots = engine.load_scene(DEMO).unwrap();
        engine.update();
        let before = engine.snapshot().clone();

        engine
            .graph_mut()
            .write(roots[0], "width", Variant::Int(999))
            .unwrap();
        engine.update();
        let after = engine.snapshot();
        assert_ne!(&before, after);
        assert_eq!(before.len(), after.len());
    }
}
