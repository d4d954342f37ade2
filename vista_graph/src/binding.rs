use std::sync::Arc;

use smallvec::SmallVec;
use vista_ids::BindingId;
use vista_script::Expr;
use vista_variant::Variant;

use crate::object::PropKey;

/// A compiled expression attached to a property slot.
///
/// The dependency set is rebuilt wholesale on every evaluation: edges from
/// the previous run are purged before new reads are recorded, so the set is
/// always exact for the most recent evaluation.
pub struct Binding {
    pub id: BindingId,
    pub target: PropKey,
    /// Original source text, kept for diagnostics.
    pub source: Arc<str>,
    pub(crate) expr: Arc<Expr>,
    /// Guard expression for conditional bindings: while it is falsy the
    /// binding is inactive and the target holds its restore value.
    pub(crate) guard: Option<Arc<Expr>>,
    pub(crate) deps: SmallVec<[PropKey; 4]>,
    /// Cleared when evaluation hits a stale reference or the target slot
    /// vanished; a disabled binding never re-evaluates.
    pub enabled: bool,
    /// Set when an object this binding depended on was destroyed; the next
    /// failed evaluation then counts as a stale reference, not a transient
    /// expression error.
    pub(crate) input_lost: bool,
    /// Guard state from the last evaluation.
    pub(crate) active: bool,
    /// Value the target held before this binding first took effect;
    /// written back when the guard deactivates.
    pub(crate) restore: Variant,
    /// True while queued for an eager flush.
    pub(crate) scheduled: bool,
}

impl Binding {
    pub fn new(
        id: BindingId,
        target: PropKey,
        source: Arc<str>,
        expr: Expr,
        guard: Option<Expr>,
        restore: Variant,
    ) -> Self {
        Self {
            id,
            target,
            source,
            expr: Arc::new(expr),
            guard: guard.map(Arc::new),
            deps: SmallVec::new(),
            enabled: true,
            input_lost: false,
            active: false,
            restore,
            scheduled: false,
        }
    }

    /// Dependency edges recorded by the most recent evaluation.
    pub fn deps(&self) -> &[PropKey] {
        &self.deps
    }

    pub fn is_conditional(&self) -> bool {
        self.guard.is_some()
    }
}
