use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use indexmap::IndexMap;
use vista_ids::{BindingId, GenArena, ObjectId, SceneNodeId};
use vista_script::{ExpressionError, PropRef, PropertyResolver};
use vista_variant::Variant;

use crate::binding::Binding;
use crate::diag::{Diagnostic, DiagnosticSink, LogSink, ProfileEvent, ProfileListener};
use crate::error::GraphError;
use crate::intern::Interner;
use crate::object::{Aspect, EvalPolicy, Object, PropKey, PropertySlot};

const DEFAULT_FLUSH_CAP: usize = 64;

/// The object/property tree plus everything reactive about it: bindings,
/// dependency edges, dirty marking and the evaluation guard. Owned and
/// mutated by a single thread.
pub struct ObjectGraph {
    interner: Interner,
    objects: GenArena<ObjectId, Object>,
    bindings: GenArena<BindingId, Binding>,
    roots: Vec<ObjectId>,

    /// Reverse dependency index: property -> bindings that read it in their
    /// most recent evaluation.
    dependents: FxHashMap<PropKey, SmallVec<[BindingId; 4]>>,

    /// Explicit stack of currently-evaluating bindings; re-entry is a loop.
    eval_stack: Vec<BindingId>,
    /// Loop participants already reported this pass (pass = one write or
    /// one flush plus the evaluations it triggers).
    loop_reported: FxHashSet<BindingId>,

    /// Eager bindings waiting for the next flush, deduped via
    /// `Binding::scheduled`.
    pending_eager: Vec<BindingId>,

    /// Objects whose visual properties changed since the last sync, with
    /// the aspect bits that changed. Insertion-ordered so sync visits in
    /// write order.
    touched: IndexMap<ObjectId, u8>,

    sink: Box<dyn DiagnosticSink>,
    listener: Option<Box<dyn ProfileListener>>,
    max_flush_iterations: usize,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::with_sink(Box::new(LogSink))
    }

    pub fn with_sink(sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            interner: Interner::new(),
            objects: GenArena::new(),
            bindings: GenArena::new(),
            roots: Vec::new(),
            dependents: FxHashMap::default(),
            eval_stack: Vec::new(),
            loop_reported: FxHashSet::default(),
            pending_eager: Vec::new(),
            touched: IndexMap::new(),
            sink,
            listener: None,
            max_flush_iterations: DEFAULT_FLUSH_CAP,
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sink = sink;
    }

    pub fn set_listener(&mut self, listener: Option<Box<dyn ProfileListener>>) {
        self.listener = listener;
    }

    pub fn set_max_flush_iterations(&mut self, cap: usize) {
        self.max_flush_iterations = cap.max(1);
    }

    // ---------------- objects ----------------

    /// Create an object. Pass `ObjectId::nil()` as parent for a root.
    pub fn create_object(&mut self, name: &str, parent: ObjectId) -> Result<ObjectId, GraphError> {
        if !parent.is_nil() && !self.objects.contains(parent) {
            return Err(GraphError::StaleReference { id: parent });
        }
        let id = self
            .objects
            .insert_with(|id| Object::new(id, name, parent));
        if parent.is_nil() {
            self.roots.push(id);
        } else {
            self.objects.get_mut(parent).unwrap().children.push(id);
            self.touch(parent, Aspect::ChildList);
        }
        Ok(id)
    }

    /// Destroy an object and its subtree. Properties and bindings owned by
    /// the subtree go with it; bindings elsewhere that depended on them are
    /// marked dirty and will disable themselves with a diagnostic on their
    /// next evaluation.
    pub fn destroy_object(&mut self, id: ObjectId) -> Result<(), GraphError> {
        if !self.objects.contains(id) {
            return Err(GraphError::StaleReference { id });
        }

        // Collect the subtree before tearing anything down.
        let mut subtree = Vec::new();
        let mut stack = vec![id];
        while let Some(oid) = stack.pop() {
            subtree.push(oid);
            if let Some(obj) = self.objects.get(oid) {
                stack.extend(obj.children.iter().copied());
            }
        }

        // Detach the top object from its parent.
        let parent = self.objects.get(id).unwrap().parent;
        if parent.is_nil() {
            self.roots.retain(|r| *r != id);
        } else if let Some(parent_obj) = self.objects.get_mut(parent) {
            parent_obj.remove_child(id);
            self.touch(parent, Aspect::ChildList);
        }

        for oid in subtree {
            let Some(obj) = self.objects.get(oid) else { continue };
            let keys: Vec<(PropKey, BindingId)> = obj
                .props()
                .map(|(sym, slot)| (PropKey { object: oid, name: sym }, slot.binding))
                .collect();

            for (key, bid) in &keys {
                if !bid.is_nil() {
                    self.remove_binding(*bid);
                }
                // Dependents re-evaluate, fail on the lost input, and
                // disable themselves.
                let dependents: Vec<BindingId> = self
                    .dependents
                    .get(key)
                    .map(|list| list.to_vec())
                    .unwrap_or_default();
                for dependent in dependents {
                    if let Some(binding) = self.bindings.get_mut(dependent) {
                        binding.input_lost = true;
                    }
                }
                self.notify_changed(*key);
                self.dependents.remove(key);
            }

            self.touched.shift_remove(&oid);
            self.objects.remove(oid);
        }
        Ok(())
    }

    #[inline]
    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.objects.contains(id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id)
    }

    pub fn roots(&self) -> &[ObjectId] {
        &self.roots
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn set_scene_node(&mut self, id: ObjectId, node: SceneNodeId) {
        if let Some(obj) = self.objects.get_mut(id) {
            obj.scene_node = node;
        }
    }

    // ---------------- properties ----------------

    /// Declare a plain (lazy, non-visual) property.
    pub fn declare_property(
        &mut self,
        id: ObjectId,
        name: &str,
        value: Variant,
    ) -> Result<(), GraphError> {
        self.declare_property_with(id, name, value, EvalPolicy::Lazy, None)
    }

    /// Declare a property with an explicit policy and scene aspect.
    /// Properties feeding a visual aspect are normally `Eager` so a frame
    /// flush settles them before sync reads them.
    pub fn declare_property_with(
        &mut self,
        id: ObjectId,
        name: &str,
        value: Variant,
        policy: EvalPolicy,
        aspect: Option<Aspect>,
    ) -> Result<(), GraphError> {
        if !self.objects.contains(id) {
            return Err(GraphError::StaleReference { id });
        }
        let sym = self.interner.intern(name);
        let obj = self.objects.get_mut(id).unwrap();
        let slot = obj.declare(sym, PropertySlot::literal(Variant::Null));
        slot.value = value;
        slot.policy = policy;
        slot.aspect = aspect;
        if let Some(aspect) = aspect {
            self.touch(id, aspect);
        }
        Ok(())
    }

    /// Literal write: severs any binding on the slot, stores the value and
    /// invalidates dependents. Writing to an undeclared name declares it
    /// (lazy, non-visual) on the fly.
    pub fn write(&mut self, id: ObjectId, name: &str, value: Variant) -> Result<(), GraphError> {
        if !self.objects.contains(id) {
            return Err(GraphError::StaleReference { id });
        }
        let sym = self.interner.intern(name);
        let key = PropKey { object: id, name: sym };

        let obj = self.objects.get_mut(id).unwrap();
        let slot = obj.declare(sym, PropertySlot::literal(Variant::Null));
        let severed = slot.binding;
        slot.binding = BindingId::nil();
        slot.dirty = false;
        let changed = slot.value != value;
        let aspect = slot.aspect;
        if changed {
            slot.value = value;
        }

        if !severed.is_nil() {
            self.remove_binding(severed);
        }

        // A write starts a new propagation pass.
        self.loop_reported.clear();

        if changed {
            if let Some(aspect) = aspect {
                self.touch(id, aspect);
            }
            self.notify_changed(key);
        }
        Ok(())
    }

    /// Read a property, settling it first if a dirty binding backs it.
    /// Recovered binding failures (loops, expression errors) leave the last
    /// stable value in place, which is what gets returned.
    pub fn read(&mut self, id: ObjectId, name: &str) -> Result<Variant, GraphError> {
        let Some(obj) = self.objects.get(id) else {
            return Err(GraphError::StaleReference { id });
        };
        let sym = match self.interner.get(name) {
            Some(sym) if obj.has_prop(sym) => sym,
            _ => {
                return Err(GraphError::UnknownProperty {
                    object: obj.name.to_string(),
                    name: name.to_string(),
                });
            }
        };
        let key = PropKey { object: id, name: sym };
        match self.read_key(key) {
            Ok(value) => Ok(value),
            // The loop was reported where it was detected; hand back the
            // last stable value instead of unwinding into the caller.
            Err(GraphError::BindingLoop { .. }) => Ok(self
                .objects
                .get(id)
                .and_then(|o| o.prop(sym))
                .map(|s| s.value.clone())
                .unwrap_or(Variant::Null)),
            Err(other) => Err(other),
        }
    }

    /// Read, returning `None` for unknown names. Used by the scene
    /// synchronizer probing optional visual properties.
    pub fn read_opt(&mut self, id: ObjectId, name: &str) -> Option<Variant> {
        match self.read(id, name) {
            Ok(value) => Some(value),
            Err(_) => None,
        }
    }

    fn read_key(&mut self, key: PropKey) -> Result<Variant, GraphError> {
        let bid = {
            let obj = self
                .objects
                .get(key.object)
                .ok_or(GraphError::StaleReference { id: key.object })?;
            let slot = obj.prop(key.name).ok_or_else(|| GraphError::UnknownProperty {
                object: obj.name.to_string(),
                name: self.interner.name(key.name).to_string(),
            })?;
            if !(slot.dirty && slot.is_bound()) {
                return Ok(slot.value.clone());
            }
            slot.binding
        };

        match self.evaluate_binding(bid) {
            Ok(()) => {}
            Err(err @ GraphError::BindingLoop { .. }) => return Err(err),
            Err(_) => {} // recovered inside evaluate_binding
        }

        let obj = self
            .objects
            .get(key.object)
            .ok_or(GraphError::StaleReference { id: key.object })?;
        let slot = obj.prop(key.name).ok_or_else(|| GraphError::UnknownProperty {
            object: obj.name.to_string(),
            name: self.interner.name(key.name).to_string(),
        })?;
        Ok(slot.value.clone())
    }

    // ---------------- bindings ----------------

    /// Bind a property to an expression, replacing any existing binding
    /// wholesale. The target is marked dirty; evaluation happens on the
    /// next read (lazy) or flush (eager).
    pub fn set_binding(
        &mut self,
        id: ObjectId,
        name: &str,
        source: &str,
    ) -> Result<BindingId, GraphError> {
        self.install_binding(id, name, source, None)
    }

    /// Bind with a guard: while `guard_source` evaluates falsy the binding
    /// is inactive and the target holds the value it had before the binding
    /// took effect.
    pub fn set_binding_when(
        &mut self,
        id: ObjectId,
        name: &str,
        source: &str,
        guard_source: &str,
    ) -> Result<BindingId, GraphError> {
        self.install_binding(id, name, source, Some(guard_source))
    }

    fn install_binding(
        &mut self,
        id: ObjectId,
        name: &str,
        source: &str,
        guard_source: Option<&str>,
    ) -> Result<BindingId, GraphError> {
        if !self.objects.contains(id) {
            return Err(GraphError::StaleReference { id });
        }
        // Compile errors go to the caller: a binding that never parsed is a
        // programming error, not a recoverable runtime condition.
        let expr = vista_script::compile(source)?;
        let guard = match guard_source {
            Some(src) => Some(vista_script::compile(src)?),
            None => None,
        };

        let sym = self.interner.intern(name);
        let key = PropKey { object: id, name: sym };
        let obj = self.objects.get_mut(id).unwrap();
        let slot = obj.declare(sym, PropertySlot::literal(Variant::Null));
        let replaced = slot.binding;
        let restore = slot.value.clone();
        let policy = slot.policy;

        if !replaced.is_nil() {
            slot.binding = BindingId::nil();
            self.remove_binding(replaced);
        }

        let bid = self.bindings.insert_with(|bid| {
            Binding::new(bid, key, Arc::<str>::from(source), expr, guard, restore)
        });
        let obj = self.objects.get_mut(id).unwrap();
        let slot = obj.prop_mut(sym).unwrap();
        slot.binding = bid;
        slot.dirty = true;

        self.loop_reported.clear();
        if policy == EvalPolicy::Eager {
            self.schedule(bid);
        }
        Ok(bid)
    }

    pub fn binding(&self, bid: BindingId) -> Option<&Binding> {
        self.bindings.get(bid)
    }

    pub fn binding_of(&self, id: ObjectId, name: &str) -> Option<BindingId> {
        let sym = self.interner.get(name)?;
        let slot = self.objects.get(id)?.prop(sym)?;
        if slot.is_bound() { Some(slot.binding) } else { None }
    }

    fn remove_binding(&mut self, bid: BindingId) {
        self.purge_edges(bid);
        self.bindings.remove(bid);
    }

    fn purge_edges(&mut self, bid: BindingId) {
        let Some(binding) = self.bindings.get_mut(bid) else { return };
        let old = std::mem::take(&mut binding.deps);
        for key in old {
            if let Some(list) = self.dependents.get_mut(&key) {
                list.retain(|b| *b != bid);
                if list.is_empty() {
                    self.dependents.remove(&key);
                }
            }
        }
    }

    fn set_edges(&mut self, bid: BindingId, reads: Vec<PropKey>) {
        let mut seen = FxHashSet::default();
        let mut deps: SmallVec<[PropKey; 4]> = SmallVec::new();
        for key in reads {
            if seen.insert(key) {
                deps.push(key);
            }
        }
        for key in &deps {
            self.dependents.entry(*key).or_default().push(bid);
        }
        if let Some(binding) = self.bindings.get_mut(bid) {
            binding.deps = deps;
        }
    }

    // ---------------- invalidation ----------------

    /// Breadth-first dirty marking over the reverse dependency index. Each
    /// binding is marked at most once per pass; evaluation is deferred to
    /// reads (lazy) or the next flush (eager).
    fn notify_changed(&mut self, key: PropKey) {
        let Some(initial) = self.dependents.get(&key) else { return };
        let mut queue: VecDeque<BindingId> = initial.iter().copied().collect();
        let mut visited = FxHashSet::default();

        while let Some(bid) = queue.pop_front() {
            if !visited.insert(bid) {
                continue;
            }
            let Some(binding) = self.bindings.get(bid) else { continue };
            if !binding.enabled {
                continue;
            }
            let target = binding.target;

            let mut policy = None;
            if let Some(obj) = self.objects.get_mut(target.object) {
                if let Some(slot) = obj.prop_mut(target.name) {
                    if slot.binding == bid {
                        slot.dirty = true;
                        policy = Some(slot.policy);
                    }
                }
            }
            match policy {
                Some(EvalPolicy::Eager) => self.schedule(bid),
                Some(EvalPolicy::Lazy) => {}
                None => continue, // binding no longer attached to its slot
            }

            if let Some(next) = self.dependents.get(&target) {
                queue.extend(next.iter().copied());
            }
        }
    }

    fn schedule(&mut self, bid: BindingId) {
        if let Some(binding) = self.bindings.get_mut(bid) {
            if !binding.scheduled {
                binding.scheduled = true;
                self.pending_eager.push(bid);
            }
        }
    }

    /// Settle all dirty eager bindings: a fixed-point pass, re-running
    /// rounds until nothing is scheduled, bounded by the iteration cap.
    /// Returns the number of evaluations performed.
    pub fn flush(&mut self) -> usize {
        self.loop_reported.clear();
        let mut evaluated = 0usize;
        let mut iterations = 0usize;

        while !self.pending_eager.is_empty() {
            iterations += 1;
            if iterations > self.max_flush_iterations {
                let survivors = std::mem::take(&mut self.pending_eager);
                for bid in survivors {
                    let Some(binding) = self.bindings.get_mut(bid) else { continue };
                    binding.scheduled = false;
                    let target = binding.target;
                    let diag = Diagnostic::BindingLoop {
                        target: self.describe_key(target),
                        chain: format!(
                            "eager flush did not settle after {} iterations",
                            self.max_flush_iterations
                        ),
                    };
                    self.report(diag);
                }
                break;
            }

            let round = std::mem::take(&mut self.pending_eager);
            for bid in round {
                let Some(binding) = self.bindings.get_mut(bid) else { continue };
                binding.scheduled = false;
                let target = binding.target;
                let still_dirty = self
                    .objects
                    .get(target.object)
                    .and_then(|o| o.prop(target.name))
                    .map(|s| s.dirty && s.binding == bid)
                    .unwrap_or(false);
                if still_dirty {
                    evaluated += 1;
                    let _ = self.evaluate_binding(bid);
                }
            }
        }
        evaluated
    }

    /// True when an eager flush is pending.
    pub fn has_pending(&self) -> bool {
        !self.pending_eager.is_empty()
    }

    // ---------------- evaluation ----------------

    fn evaluate_binding(&mut self, bid: BindingId) -> Result<(), GraphError> {
        let Some(binding) = self.bindings.get(bid) else { return Ok(()) };
        let target = binding.target;

        if !binding.enabled {
            self.clear_dirty(target);
            return Ok(());
        }

        // Re-entrancy is a loop: report once per pass, marking every
        // participant so a second read of the same cycle stays quiet.
        if self.eval_stack.contains(&bid) {
            let chain = self.describe_chain(bid);
            let fresh = self.loop_reported.insert(bid);
            let participants = self.eval_stack.clone();
            for participant in participants {
                self.loop_reported.insert(participant);
            }
            if fresh {
                let diag = Diagnostic::BindingLoop {
                    target: self.describe_key(target),
                    chain: chain.clone(),
                };
                self.report(diag);
            }
            return Err(GraphError::BindingLoop { chain });
        }

        let (expr, guard, owner) = {
            let binding = self.bindings.get(bid).unwrap();
            (binding.expr.clone(), binding.guard.clone(), binding.target.object)
        };

        let started = self.listener.as_ref().map(|_| Instant::now());
        if self.listener.is_some() {
            let event = ProfileEvent::EvaluationStarted {
                target: self.describe_key(target),
            };
            self.emit(event);
        }

        self.purge_edges(bid);
        self.eval_stack.push(bid);

        let mut reads = Vec::new();
        let mut saw_stale = false;
        let mut saw_loop = false;
        let mut guard_failure: Option<ExpressionError> = None;
        let outcome = {
            let mut scope = EvalScope {
                graph: self,
                owner,
                reads: &mut reads,
                saw_stale: &mut saw_stale,
                saw_loop: &mut saw_loop,
            };
            let active = match &guard {
                Some(guard_expr) => match vista_script::eval(guard_expr, &mut scope) {
                    Ok(value) => value.is_truthy(),
                    Err(err) => {
                        // A failing guard deactivates the binding.
                        guard_failure = Some(err);
                        false
                    }
                },
                None => true,
            };
            if active {
                vista_script::eval(&expr, &mut scope).map(Some)
            } else {
                Ok(None)
            }
        };

        self.eval_stack.pop();
        self.set_edges(bid, reads);

        if let Some(err) = guard_failure {
            if !saw_loop {
                let diag = Diagnostic::Expression {
                    target: self.describe_key(target),
                    error: err,
                };
                self.report(diag);
            }
        }

        let result = self.apply_outcome(bid, target, outcome, saw_stale, saw_loop);

        if let Some(started) = started {
            let event = ProfileEvent::EvaluationFinished {
                target: self.describe_key(target),
                elapsed: started.elapsed(),
            };
            self.emit(event);
        }
        result
    }

    fn apply_outcome(
        &mut self,
        bid: BindingId,
        target: PropKey,
        outcome: Result<Option<Variant>, ExpressionError>,
        saw_stale: bool,
        saw_loop: bool,
    ) -> Result<(), GraphError> {
        match outcome {
            // Guard inactive: restore the pre-binding value once, then stay
            // passive until the guard flips back.
            Ok(None) => {
                let Some(binding) = self.bindings.get_mut(bid) else { return Ok(()) };
                let was_active = binding.active;
                binding.active = false;
                binding.input_lost = false;
                let restore = binding.restore.clone();
                if was_active {
                    self.commit(target, restore);
                } else {
                    self.clear_dirty(target);
                }
                Ok(())
            }

            Ok(Some(value)) => {
                if let Some(binding) = self.bindings.get_mut(bid) {
                    binding.active = true;
                    binding.input_lost = false;
                }
                self.commit(target, value);
                Ok(())
            }

            Err(err) => {
                if saw_loop {
                    // Reported at the detection point. Keep the slot dirty
                    // so breaking the loop lets it settle.
                    return Err(GraphError::BindingLoop {
                        chain: err.to_string(),
                    });
                }
                let input_lost = self
                    .bindings
                    .get(bid)
                    .map(|b| b.input_lost)
                    .unwrap_or(false);
                if saw_stale || input_lost {
                    // The input is gone for good; stop re-evaluating.
                    if let Some(binding) = self.bindings.get_mut(bid) {
                        binding.enabled = false;
                    }
                    let diag = Diagnostic::StaleReference {
                        target: self.describe_key(target),
                        detail: err.to_string(),
                    };
                    self.report(diag);
                    self.clear_dirty(target);
                    return Ok(());
                }
                // Plain expression failure: retain the last stable value
                // and wait for the next invalidation.
                let diag = Diagnostic::Expression {
                    target: self.describe_key(target),
                    error: err,
                };
                self.report(diag);
                self.clear_dirty(target);
                Ok(())
            }
        }
    }

    /// Write an evaluated (or restored) value into its slot and propagate.
    /// No-op when the value is unchanged, so settling a binding to the same
    /// result does not ripple.
    fn commit(&mut self, key: PropKey, value: Variant) {
        let Some(obj) = self.objects.get_mut(key.object) else { return };
        let Some(slot) = obj.prop_mut(key.name) else { return };
        slot.dirty = false;
        if slot.value == value {
            return;
        }
        slot.value = value;
        let aspect = slot.aspect;
        if let Some(aspect) = aspect {
            self.touch(key.object, aspect);
        }
        self.notify_changed(key);
    }

    fn clear_dirty(&mut self, key: PropKey) {
        if let Some(obj) = self.objects.get_mut(key.object) {
            if let Some(slot) = obj.prop_mut(key.name) {
                slot.dirty = false;
            }
        }
    }

    // ---------------- scene hooks ----------------

    fn touch(&mut self, id: ObjectId, aspect: Aspect) {
        *self.touched.entry(id).or_insert(0) |= aspect.bit();
    }

    /// Drain the touched set: (object, aspect bits) in write order. Called
    /// by the scene synchronizer; writes landing after the drain re-touch.
    pub fn take_touched(&mut self) -> Vec<(ObjectId, u8)> {
        let touched = std::mem::take(&mut self.touched);
        touched.into_iter().collect()
    }

    pub fn has_touched(&self) -> bool {
        !self.touched.is_empty()
    }

    // ---------------- name resolution ----------------

    fn resolve_ref(&self, owner: ObjectId, reference: &PropRef) -> Result<PropKey, GraphError> {
        let obj = self
            .objects
            .get(owner)
            .ok_or(GraphError::StaleReference { id: owner })?;
        match reference {
            PropRef::Own(name) => self.key_on(obj, name),
            PropRef::Parent(name) => {
                let parent = self
                    .objects
                    .get(obj.parent)
                    .ok_or(GraphError::StaleReference { id: obj.parent })?;
                self.key_on(parent, name)
            }
            PropRef::Named { object, prop } => {
                let found = self.lookup_named(owner, object).ok_or_else(|| {
                    GraphError::UnknownProperty {
                        object: object.to_string(),
                        name: prop.to_string(),
                    }
                })?;
                let target = self.objects.get(found).unwrap();
                self.key_on(target, prop)
            }
        }
    }

    fn key_on(&self, obj: &Object, name: &str) -> Result<PropKey, GraphError> {
        match self.interner.get(name) {
            Some(sym) if obj.has_prop(sym) => Ok(PropKey {
                object: obj.id,
                name: sym,
            }),
            _ => Err(GraphError::UnknownProperty {
                object: obj.name.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Document-scoped name lookup: walk up from `from`; at each step the
    /// object itself and its direct children are candidates. First hit wins.
    fn lookup_named(&self, from: ObjectId, name: &str) -> Option<ObjectId> {
        let mut cursor = from;
        while let Some(obj) = self.objects.get(cursor) {
            if obj.name.as_ref() == name {
                return Some(obj.id);
            }
            for child in &obj.children {
                if let Some(child_obj) = self.objects.get(*child) {
                    if child_obj.name.as_ref() == name {
                        return Some(*child);
                    }
                }
            }
            if obj.parent.is_nil() {
                break;
            }
            cursor = obj.parent;
        }
        None
    }

    // ---------------- diagnostics ----------------

    fn report(&mut self, diagnostic: Diagnostic) {
        self.sink.report(&diagnostic);
    }

    fn emit(&mut self, event: ProfileEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener.event(event);
        }
    }

    /// Profiling passthrough for the scene synchronizer.
    pub fn emit_profile(&mut self, event: ProfileEvent) {
        self.emit(event);
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub fn describe_key(&self, key: PropKey) -> String {
        let object = self
            .objects
            .get(key.object)
            .map(|o| o.name.to_string())
            .unwrap_or_else(|| "<stale>".to_string());
        format!("{object}.{}", self.interner.name(key.name))
    }

    fn describe_chain(&self, offender: BindingId) -> String {
        let mut parts: Vec<String> = self
            .eval_stack
            .iter()
            .filter_map(|bid| self.bindings.get(*bid))
            .map(|b| self.describe_key(b.target))
            .collect();
        if let Some(binding) = self.bindings.get(offender) {
            parts.push(self.describe_key(binding.target));
        }
        parts.join(" -> ")
    }
}

impl Default for ObjectGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluation-scoped resolver: records every read into the active read-set
/// and funnels nested settles back through the graph.
struct EvalScope<'a> {
    graph: &'a mut ObjectGraph,
    owner: ObjectId,
    reads: &'a mut Vec<PropKey>,
    saw_stale: &'a mut bool,
    saw_loop: &'a mut bool,
}

impl PropertyResolver for EvalScope<'_> {
    fn resolve(&mut self, reference: &PropRef) -> Result<Variant, ExpressionError> {
        let key = match self.graph.resolve_ref(self.owner, reference) {
            Ok(key) => key,
            Err(GraphError::StaleReference { id }) => {
                *self.saw_stale = true;
                return Err(ExpressionError::ReadAborted {
                    reason: format!("stale reference {id}"),
                });
            }
            Err(GraphError::UnknownProperty { object, name }) => {
                return Err(ExpressionError::UnknownProperty {
                    name: format!("{object}.{name}"),
                });
            }
            Err(GraphError::Expression(err)) => return Err(err),
            Err(GraphError::BindingLoop { chain }) => {
                *self.saw_loop = true;
                return Err(ExpressionError::ReadAborted { reason: chain });
            }
        };

        self.reads.push(key);

        match self.graph.read_key(key) {
            Ok(value) => Ok(value),
            Err(GraphError::BindingLoop { chain }) => {
                *self.saw_loop = true;
                Err(ExpressionError::ReadAborted { reason: chain })
            }
            Err(GraphError::StaleReference { id }) => {
                *self.saw_stale = true;
                Err(ExpressionError::ReadAborted {
                    reason: format!("stale reference {id}"),
                })
            }
            Err(GraphError::UnknownProperty { object, name }) => {
                Err(ExpressionError::UnknownProperty {
                    name: format!("{object}.{name}"),
                })
            }
            Err(GraphError::Expression(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::MemorySink;

    fn graph_with_sink() -> (ObjectGraph, MemorySink) {
        let sink = MemorySink::new();
        let graph = ObjectGraph::with_sink(Box::new(sink.clone()));
        (graph, sink)
    }

    fn root_with(graph: &mut ObjectGraph, props: &[(&str, Variant)]) -> ObjectId {
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        for (name, value) in props {
            graph.declare_property(root, name, value.clone()).unwrap();
        }
        root
    }

    #[test]
    fn read_settles_dirty_binding() {
        let (mut graph, _sink) = graph_with_sink();
        let root = root_with(&mut graph, &[("height", Variant::Int(0))]);
        graph.declare_property(root, "width", Variant::Int(0)).unwrap();
        graph.set_binding(root, "width", "height * 2").unwrap();

        graph.write(root, "height", Variant::Int(5)).unwrap();
        assert_eq!(graph.read(root, "width").unwrap(), Variant::Int(10));
    }

    #[test]
    fn literal_write_severs_binding() {
        let (mut graph, _sink) = graph_with_sink();
        let root = root_with(&mut graph, &[("height", Variant::Int(5))]);
        graph.declare_property(root, "width", Variant::Int(0)).unwrap();
        graph.set_binding(root, "width", "height * 2").unwrap();
        assert_eq!(graph.read(root, "width").unwrap(), Variant::Int(10));

        graph.write(root, "width", Variant::Int(3)).unwrap();
        assert!(graph.binding_of(root, "width").is_none());

        graph.write(root, "height", Variant::Int(50)).unwrap();
        assert_eq!(graph.read(root, "width").unwrap(), Variant::Int(3));
    }

    #[test]
    fn rebinding_replaces_wholesale() {
        let (mut graph, _sink) = graph_with_sink();
        let root = root_with(
            &mut graph,
            &[("a", Variant::Int(1)), ("b", Variant::Int(2))],
        );
        graph.declare_property(root, "out", Variant::Int(0)).unwrap();

        let first = graph.set_binding(root, "out", "a + 10").unwrap();
        assert_eq!(graph.read(root, "out").unwrap(), Variant::Int(11));

        let second = graph.set_binding(root, "out", "b + 20").unwrap();
        assert!(graph.binding(first).is_none());
        assert_eq!(graph.read(root, "out").unwrap(), Variant::Int(22));

        // Old dependency must no longer trigger.
        graph.write(root, "a", Variant::Int(100)).unwrap();
        assert_eq!(graph.read(root, "out").unwrap(), Variant::Int(22));
        assert!(graph.binding(second).is_some());
    }

    #[test]
    fn dependency_edges_are_exact_and_idempotent() {
        let (mut graph, _sink) = graph_with_sink();
        let root = root_with(
            &mut graph,
            &[
                ("flag", Variant::Bool(true)),
                ("a", Variant::Int(1)),
                ("b", Variant::Int(2)),
            ],
        );
        graph.declare_property(root, "out", Variant::Int(0)).unwrap();
        let bid = graph.set_binding(root, "out", "flag ? a : b").unwrap();

        assert_eq!(graph.read(root, "out").unwrap(), Variant::Int(1));
        let deps_first: Vec<PropKey> = graph.binding(bid).unwrap().deps().to_vec();

        // Re-evaluate with no change in reads: identical edge set.
        graph.write(root, "a", Variant::Int(7)).unwrap();
        assert_eq!(graph.read(root, "out").unwrap(), Variant::Int(7));
        assert_eq!(graph.binding(bid).unwrap().deps(), &deps_first[..]);

        // Branch flip: the untaken branch's edge is dropped.
        graph.write(root, "flag", Variant::Bool(false)).unwrap();
        assert_eq!(graph.read(root, "out").unwrap(), Variant::Int(2));
        let deps_after: Vec<String> = graph
            .binding(bid)
            .unwrap()
            .deps()
            .iter()
            .map(|k| graph.describe_key(*k))
            .collect();
        assert_eq!(deps_after, vec!["root.flag", "root.b"]);

        // `a` is no longer an input; writing it must not dirty `out`.
        graph.write(root, "a", Variant::Int(999)).unwrap();
        assert_eq!(graph.read(root, "out").unwrap(), Variant::Int(2));
    }

    #[test]
    fn binding_loop_detected_and_reported_once() {
        let (mut graph, sink) = graph_with_sink();
        let root = root_with(
            &mut graph,
            &[("a", Variant::Int(1)), ("b", Variant::Int(2))],
        );
        graph.set_binding(root, "a", "b + 1").unwrap();
        graph.set_binding(root, "b", "a + 1").unwrap();

        // Both reads recover to the pre-cycle values.
        assert_eq!(graph.read(root, "a").unwrap(), Variant::Int(1));
        assert_eq!(graph.read(root, "b").unwrap(), Variant::Int(2));

        let loops = sink
            .entries()
            .iter()
            .filter(|d| matches!(d, Diagnostic::BindingLoop { .. }))
            .count();
        assert_eq!(loops, 1);
    }

    #[test]
    fn breaking_a_loop_recovers() {
        let (mut graph, sink) = graph_with_sink();
        let root = root_with(
            &mut graph,
            &[("a", Variant::Int(1)), ("b", Variant::Int(2))],
        );
        graph.set_binding(root, "a", "b + 1").unwrap();
        graph.set_binding(root, "b", "a + 1").unwrap();
        let _ = graph.read(root, "a");
        sink.clear();

        // Writing a literal severs one side of the cycle.
        graph.write(root, "b", Variant::Int(10)).unwrap();
        assert_eq!(graph.read(root, "a").unwrap(), Variant::Int(11));
        assert!(sink.is_empty());
    }

    #[test]
    fn eager_flush_settles_chain() {
        let (mut graph, _sink) = graph_with_sink();
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        graph
            .declare_property_with(root, "a", Variant::Int(1), EvalPolicy::Eager, None)
            .unwrap();
        graph
            .declare_property_with(root, "b", Variant::Int(0), EvalPolicy::Eager, None)
            .unwrap();
        graph
            .declare_property_with(root, "c", Variant::Int(0), EvalPolicy::Eager, None)
            .unwrap();
        graph.set_binding(root, "b", "a + 1").unwrap();
        graph.set_binding(root, "c", "b + 1").unwrap();
        graph.flush();

        graph.write(root, "a", Variant::Int(10)).unwrap();
        assert!(graph.has_pending());
        graph.flush();
        assert!(!graph.has_pending());

        // Values were committed by the flush, not by these reads.
        assert_eq!(graph.read(root, "b").unwrap(), Variant::Int(11));
        assert_eq!(graph.read(root, "c").unwrap(), Variant::Int(12));
    }

    #[test]
    fn eager_loop_reports_once_per_flush() {
        let (mut graph, sink) = graph_with_sink();
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        graph
            .declare_property_with(root, "a", Variant::Int(1), EvalPolicy::Eager, None)
            .unwrap();
        graph
            .declare_property_with(root, "b", Variant::Int(2), EvalPolicy::Eager, None)
            .unwrap();
        graph.set_binding(root, "a", "b + 1").unwrap();
        graph.set_binding(root, "b", "a + 1").unwrap();
        graph.flush();

        let loops = sink
            .entries()
            .iter()
            .filter(|d| matches!(d, Diagnostic::BindingLoop { .. }))
            .count();
        assert_eq!(loops, 1);
        assert_eq!(graph.read(root, "a").unwrap(), Variant::Int(1));
        assert_eq!(graph.read(root, "b").unwrap(), Variant::Int(2));
    }

    #[test]
    fn expression_error_keeps_last_good_value() {
        let (mut graph, sink) = graph_with_sink();
        let root = root_with(&mut graph, &[("text", Variant::string("x"))]);
        graph.declare_property(root, "out", Variant::Int(0)).unwrap();
        graph.set_binding(root, "out", "text * 2").unwrap();

        assert_eq!(graph.read(root, "out").unwrap(), Variant::Int(0));
        assert!(sink
            .entries()
            .iter()
            .any(|d| matches!(d, Diagnostic::Expression { .. })));
    }

    #[test]
    fn parent_and_named_references() {
        let (mut graph, _sink) = graph_with_sink();
        let root = root_with(&mut graph, &[("width", Variant::Int(100))]);
        let header = graph.create_object("header", root).unwrap();
        graph.declare_property(header, "height", Variant::Int(20)).unwrap();
        let body = graph.create_object("body", root).unwrap();
        graph.declare_property(body, "height", Variant::Int(0)).unwrap();
        graph.declare_property(body, "width", Variant::Int(0)).unwrap();

        // Sibling lookup by name, parent lookup by keyword.
        graph
            .set_binding(body, "height", "parent.width - header.height")
            .unwrap();
        graph.set_binding(body, "width", "parent.width").unwrap();
        assert_eq!(graph.read(body, "height").unwrap(), Variant::Int(80));
        assert_eq!(graph.read(body, "width").unwrap(), Variant::Int(100));

        graph.write(header, "height", Variant::Int(30)).unwrap();
        assert_eq!(graph.read(body, "height").unwrap(), Variant::Int(70));
    }

    #[test]
    fn conditional_binding_restores_on_deactivate() {
        let (mut graph, _sink) = graph_with_sink();
        let root = root_with(
            &mut graph,
            &[("narrow", Variant::Bool(false)), ("size", Variant::Int(400))],
        );
        graph.declare_property(root, "columns", Variant::Int(3)).unwrap();
        graph
            .set_binding_when(root, "columns", "size / 200", "narrow")
            .unwrap();

        // Guard falsy: the pre-binding value stays.
        assert_eq!(graph.read(root, "columns").unwrap(), Variant::Int(3));

        graph.write(root, "narrow", Variant::Bool(true)).unwrap();
        assert_eq!(graph.read(root, "columns").unwrap(), Variant::Int(2));

        graph.write(root, "size", Variant::Int(600)).unwrap();
        assert_eq!(graph.read(root, "columns").unwrap(), Variant::Int(3));

        // Deactivate: restored to the value before the binding took effect.
        graph.write(root, "narrow", Variant::Bool(false)).unwrap();
        assert_eq!(graph.read(root, "columns").unwrap(), Variant::Int(3));

        // While inactive, input changes do not leak through.
        graph.write(root, "size", Variant::Int(1000)).unwrap();
        assert_eq!(graph.read(root, "columns").unwrap(), Variant::Int(3));

        // Reactivate: bound value again.
        graph.write(root, "narrow", Variant::Bool(true)).unwrap();
        assert_eq!(graph.read(root, "columns").unwrap(), Variant::Int(5));
    }

    #[test]
    fn destroyed_object_reads_report_stale() {
        let (mut graph, _sink) = graph_with_sink();
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        let child = graph.create_object("child", root).unwrap();
        graph.declare_property(child, "x", Variant::Int(1)).unwrap();

        graph.destroy_object(child).unwrap();
        assert!(!graph.is_alive(child));
        assert!(matches!(
            graph.read(child, "x"),
            Err(GraphError::StaleReference { .. })
        ));
    }

    #[test]
    fn binding_on_destroyed_input_disables_with_diagnostic() {
        let (mut graph, sink) = graph_with_sink();
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        let gauge = graph.create_object("gauge", root).unwrap();
        graph.declare_property(gauge, "level", Variant::Int(7)).unwrap();
        graph.declare_property(root, "display", Variant::Int(0)).unwrap();
        let bid = graph.set_binding(root, "display", "gauge.level").unwrap();
        assert_eq!(graph.read(root, "display").unwrap(), Variant::Int(7));

        graph.destroy_object(gauge).unwrap();
        // Dependent keeps its last-good value and disables itself.
        assert_eq!(graph.read(root, "display").unwrap(), Variant::Int(7));
        assert!(!graph.binding(bid).unwrap().enabled);
        assert!(sink
            .entries()
            .iter()
            .any(|d| matches!(d, Diagnostic::StaleReference { .. })));
    }

    #[test]
    fn destroy_subtree_removes_children() {
        let (mut graph, _sink) = graph_with_sink();
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        let mid = graph.create_object("mid", root).unwrap();
        let leaf = graph.create_object("leaf", mid).unwrap();

        graph.destroy_object(mid).unwrap();
        assert!(graph.is_alive(root));
        assert!(!graph.is_alive(mid));
        assert!(!graph.is_alive(leaf));
        assert!(graph.object(root).unwrap().children.is_empty());
    }

    #[test]
    fn visual_writes_touch_with_aspect_bits() {
        let (mut graph, _sink) = graph_with_sink();
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        graph
            .declare_property_with(
                root,
                "width",
                Variant::Int(10),
                EvalPolicy::Eager,
                Some(Aspect::Geometry),
            )
            .unwrap();
        graph.take_touched(); // drop the declare-time touch

        graph.write(root, "width", Variant::Int(20)).unwrap();
        let touched = graph.take_touched();
        assert_eq!(touched.len(), 1);
        assert_eq!(touched[0].0, root);
        assert_eq!(touched[0].1 & Aspect::Geometry.bit(), Aspect::Geometry.bit());

        // Unchanged write: no touch.
        graph.write(root, "width", Variant::Int(20)).unwrap();
        assert!(graph.take_touched().is_empty());
    }

    #[test]
    fn unchanged_result_does_not_ripple() {
        let (mut graph, _sink) = graph_with_sink();
        let root = root_with(&mut graph, &[("a", Variant::Int(6))]);
        graph.declare_property(root, "b", Variant::Int(0)).unwrap();
        graph.declare_property(root, "c", Variant::Int(0)).unwrap();
        graph.set_binding(root, "b", "min(a, 3)").unwrap();
        let chained = graph.set_binding(root, "c", "b * 10").unwrap();
        assert_eq!(graph.read(root, "c").unwrap(), Variant::Int(30));

        // `a` changes but `min(a, 3)` does not: `c` must not re-dirty.
        graph.write(root, "a", Variant::Int(9)).unwrap();
        assert_eq!(graph.read(root, "b").unwrap(), Variant::Int(3));
        let c_slot_dirty = {
            let obj = graph.object(root).unwrap();
            let sym = graph.interner.get("c").unwrap();
            obj.prop(sym).unwrap().dirty
        };
        assert!(!c_slot_dirty);
        assert!(graph.binding(chained).is_some());
    }

    #[test]
    fn dynamic_write_declares_slot() {
        let (mut graph, _sink) = graph_with_sink();
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        graph.write(root, "label", Variant::string("hi")).unwrap();
        assert_eq!(graph.read(root, "label").unwrap(), Variant::string("hi"));
    }

    #[test]
    fn profile_listener_sees_evaluations() {
        use crate::diag::{ProfileEvent, ProfileListener};
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Recorder(Rc<RefCell<Vec<ProfileEvent>>>);
        impl ProfileListener for Recorder {
            fn event(&mut self, event: ProfileEvent) {
                self.0.borrow_mut().push(event);
            }
        }

        let events = Rc::new(RefCell::new(Vec::new()));
        let (mut graph, _sink) = graph_with_sink();
        graph.set_listener(Some(Box::new(Recorder(Rc::clone(&events)))));

        let root = root_with(&mut graph, &[("a", Variant::Int(2))]);
        graph.declare_property(root, "b", Variant::Int(0)).unwrap();
        graph.set_binding(root, "b", "a * 3").unwrap();
        assert_eq!(graph.read(root, "b").unwrap(), Variant::Int(6));

        let events = events.borrow();
        assert!(events.iter().any(|e| matches!(
            e,
            ProfileEvent::EvaluationStarted { target } if target == "root.b"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ProfileEvent::EvaluationFinished { target, .. } if target == "root.b"
        )));
    }

    #[test]
    fn unknown_read_is_an_error() {
        let (mut graph, _sink) = graph_with_sink();
        let root = graph.create_object("root", ObjectId::nil()).unwrap();
        assert!(matches!(
            graph.read(root, "nope"),
            Err(GraphError::UnknownProperty { .. })
        ));
    }
}
