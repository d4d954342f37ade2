use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use vista_script::ExpressionError;

/// A recovered error condition, reported out-of-band instead of unwinding
/// into caller code. `target` is always "object.property" of the binding
/// that was being settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    BindingLoop {
        target: String,
        chain: String,
    },
    Expression {
        target: String,
        error: ExpressionError,
    },
    StaleReference {
        target: String,
        detail: String,
    },
    UnknownProperty {
        object: String,
        name: String,
    },
}

/// Where recovered conditions go. The graph never blocks on the sink.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: &Diagnostic);
}

/// Default sink: one warn-level line per condition via `log`.
#[derive(Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::BindingLoop { target, chain } => {
                log::warn!("binding loop on {target}: {chain}");
            }
            Diagnostic::Expression { target, error } => {
                log::warn!("binding on {target} failed: {error}");
            }
            Diagnostic::StaleReference { target, detail } => {
                log::warn!("stale reference in binding on {target}: {detail}");
            }
            Diagnostic::UnknownProperty { object, name } => {
                log::warn!("unknown property '{name}' on '{object}'");
            }
        }
    }
}

/// Shared collecting sink, mainly for tests and tooling: clone it, hand one
/// clone to the graph, inspect the other.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Rc<RefCell<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&mut self, diagnostic: &Diagnostic) {
        self.entries.borrow_mut().push(diagnostic.clone());
    }
}

/// Evaluation and synchronization timing events for external profilers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileEvent {
    EvaluationStarted { target: String },
    EvaluationFinished { target: String, elapsed: Duration },
    SyncStarted,
    SyncFinished { elapsed: Duration },
}

/// Optional profiling listener. When none is installed the graph pays a
/// single branch per event.
pub trait ProfileListener {
    fn event(&mut self, event: ProfileEvent);
}
