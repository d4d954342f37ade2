use vista_runtime::{Engine, RuntimeConfig, set_config};
use vista_variant::Variant;

const DEMO_SCENE: &str = r##"
# A resizable frame with a header bar and a centered title.
object Rectangle frame
  prop width = 640
  prop height = 400
  prop color = "#1d2733"
  object Rectangle header
    bind width = parent.width
    prop height = 48
    prop color = "#2f4f73"
  end
  object Text title
    prop text = "vista demo"
    prop font_size = 18
    prop color = "#f0f0f0"
    bind x = (parent.width - width) / 2
    bind y = 12
  end
end
"##;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    set_config(RuntimeConfig::default());

    let mut engine = Engine::new();
    let roots = engine.load_scene(DEMO_SCENE)?;
    let frame = roots[0];

    let report = engine.update();
    log::info!(
        "initial frame: {} evaluations, {} nodes synced, {} draw ops",
        report.evaluations,
        report.sync.visited,
        report.frame.draw_ops
    );

    // Animate the width; bound properties and the scene follow.
    for step in 1..=5i64 {
        let width = 640 + step * 40;
        engine.graph_mut().write(frame, "width", Variant::Int(width))?;
        let report = engine.update();
        log::info!(
            "width={width}: {} evaluations, {} draw ops, {} skipped",
            report.evaluations,
            report.frame.draw_ops,
            report.frame.nodes_skipped
        );
    }

    // A quiet frame costs nothing.
    let idle = engine.update();
    log::info!(
        "idle frame: {} draw ops, {} nodes visited",
        idle.frame.draw_ops,
        idle.frame.nodes_visited
    );

    let snapshot = engine.snapshot();
    log::info!("snapshot carries {} nodes", snapshot.len());
    Ok(())
}
