#![forbid(unsafe_code)]

//! The retained scene tree: one node per visually-relevant object, carrying
//! only what is needed to draw it. The synchronizer mirrors touched objects
//! from the binding graph into nodes and dirty bitmasks; the renderer
//! consumes the bits.

mod items;
mod node;
mod snapshot;
mod sync;

pub use items::{
    Geometrical, ImageItem, ItemKind, PaintOp, PaintSurface, Paintable, RectItem, TextItem,
};
pub use node::{DirtyFlags, Material, NodePhase, Rect, SceneNode, SceneTree};
pub use snapshot::{RenderSnapshot, SnapshotNode};
pub use sync::{SyncStats, Synchronizer};
