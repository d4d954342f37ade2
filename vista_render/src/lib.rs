#![forbid(unsafe_code)]

//! The renderer driver: walks the scene tree, redraws only nodes with
//! non-empty dirty bitmasks (or forced by an ancestor transform change),
//! and clears the bits it consumed. Draw operations are plain data for a
//! backend to execute.

mod commands;
mod renderer;

pub use commands::{DrawOp, RenderList};
pub use renderer::{FrameStats, Renderer};
