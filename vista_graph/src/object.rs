use std::sync::Arc;

use indexmap::IndexMap;
use vista_ids::{BindingId, ObjectId, SceneNodeId};
use vista_variant::Variant;

use crate::intern::Sym;

/// Which scene-graph aspect a property write dirties, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aspect {
    Transform,
    Geometry,
    Material,
    ChildList,
}

impl Aspect {
    #[inline]
    pub const fn bit(self) -> u8 {
        match self {
            Aspect::Transform => 1 << 0,
            Aspect::Geometry => 1 << 1,
            Aspect::Material => 1 << 2,
            Aspect::ChildList => 1 << 3,
        }
    }
}

/// When a dirty binding re-evaluates.
/// `Lazy`: on the next read of the target property.
/// `Eager`: during the next [`crate::ObjectGraph::flush`] pass (reads still
/// settle it early if they come first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalPolicy {
    #[default]
    Lazy,
    Eager,
}

/// (object, interned name): the identity of one property slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropKey {
    pub object: ObjectId,
    pub name: Sym,
}

/// One property on one object. The slot owns its current value; `binding`
/// is nil while the property holds a plain literal.
#[derive(Debug, Clone)]
pub struct PropertySlot {
    pub value: Variant,
    pub binding: BindingId,
    pub dirty: bool,
    pub policy: EvalPolicy,
    pub aspect: Option<Aspect>,
}

impl PropertySlot {
    pub fn literal(value: Variant) -> Self {
        Self {
            value,
            binding: BindingId::nil(),
            dirty: false,
            policy: EvalPolicy::Lazy,
            aspect: None,
        }
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        !self.binding.is_nil()
    }
}

/// A named bag of properties plus an ordered child list. Parents own their
/// children; the parent id is a non-owning back-reference used for scope
/// resolution.
pub struct Object {
    pub id: ObjectId,
    pub name: Arc<str>,
    pub parent: ObjectId,
    pub children: Vec<ObjectId>,
    /// At most one scene node mirrors this object; nil when the object has
    /// no visual presence.
    pub scene_node: SceneNodeId,
    props: IndexMap<Sym, PropertySlot>,
}

impl Object {
    pub fn new(id: ObjectId, name: &str, parent: ObjectId) -> Self {
        Self {
            id,
            name: Arc::<str>::from(name),
            parent,
            children: Vec::new(),
            scene_node: SceneNodeId::nil(),
            props: IndexMap::new(),
        }
    }

    #[inline]
    pub fn prop(&self, name: Sym) -> Option<&PropertySlot> {
        self.props.get(&name)
    }

    #[inline]
    pub fn prop_mut(&mut self, name: Sym) -> Option<&mut PropertySlot> {
        self.props.get_mut(&name)
    }

    pub fn declare(&mut self, name: Sym, slot: PropertySlot) -> &mut PropertySlot {
        self.props.entry(name).or_insert(slot)
    }

    pub fn has_prop(&self, name: Sym) -> bool {
        self.props.contains_key(&name)
    }

    /// Properties in declaration order.
    pub fn props(&self) -> impl Iterator<Item = (Sym, &PropertySlot)> {
        self.props.iter().map(|(sym, slot)| (*sym, slot))
    }

    pub fn props_mut(&mut self) -> impl Iterator<Item = (Sym, &mut PropertySlot)> {
        self.props.iter_mut().map(|(sym, slot)| (*sym, slot))
    }

    pub fn remove_child(&mut self, child: ObjectId) {
        self.children.retain(|c| *c != child);
    }
}
