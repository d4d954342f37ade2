#![forbid(unsafe_code)]

//! Engine facade: type registration, scene description loading and the
//! per-frame `flush -> sync -> render` loop, all on the single thread that
//! owns the graph and scene tree.

mod config;
mod engine;
mod loader;
mod registry;

pub use config::{RuntimeConfig, config, set_config};
pub use engine::{Engine, FrameReport};
pub use loader::load_scene;
pub use registry::{CreateFn, TypeRegistry};
