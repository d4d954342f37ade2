#![forbid(unsafe_code)]

//! The binding graph: an object tree with variant-typed property slots,
//! expression bindings, exact per-evaluation dependency edges and
//! breadth-first invalidation. Reads are pull-based (a dirty property
//! settles before its value is returned); eager properties additionally
//! settle during [`ObjectGraph::flush`].

mod binding;
mod diag;
mod error;
mod graph;
mod intern;
mod object;

pub use binding::Binding;
pub use diag::{Diagnostic, DiagnosticSink, LogSink, MemorySink, ProfileEvent, ProfileListener};
pub use error::GraphError;
pub use graph::ObjectGraph;
pub use intern::{Interner, Sym};
pub use object::{Aspect, EvalPolicy, Object, PropKey, PropertySlot};
