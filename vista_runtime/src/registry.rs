use indexmap::IndexMap;
use vista_graph::{Aspect, EvalPolicy, GraphError, ObjectGraph};
use vista_ids::ObjectId;
use vista_variant::Variant;

/// Constructs one object of a registered type under `parent`, declaring its
/// property slots. The core never parses markup; whoever registers the type
/// decides what an instance looks like.
pub type CreateFn = fn(&mut ObjectGraph, parent: ObjectId, name: &str) -> Result<ObjectId, GraphError>;

struct TypeEntry {
    version: (u32, u32),
    ctor: CreateFn,
}

/// Name -> constructor table. Registration order is kept so tooling can
/// list types deterministically.
pub struct TypeRegistry {
    types: IndexMap<String, TypeEntry>,
}

impl TypeRegistry {
    /// An empty registry. Use [`TypeRegistry::with_builtins`] for the
    /// standard visual types.
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("Item", (1, 0), item_ctor);
        registry.register("Rectangle", (1, 0), rectangle_ctor);
        registry.register("Text", (1, 0), text_ctor);
        registry.register("Image", (1, 0), image_ctor);
        registry
    }

    /// Register a type, replacing any previous registration of the name.
    pub fn register(&mut self, name: &str, version: (u32, u32), ctor: CreateFn) {
        if let Some(existing) = self.types.get(name) {
            log::debug!(
                "type '{name}' re-registered ({}.{} -> {}.{})",
                existing.version.0,
                existing.version.1,
                version.0,
                version.1
            );
        }
        self.types
            .insert(name.to_string(), TypeEntry { version, ctor });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn version(&self, name: &str) -> Option<(u32, u32)> {
        self.types.get(name).map(|entry| entry.version)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Instantiate `type_name` under `parent`.
    pub fn create(
        &self,
        graph: &mut ObjectGraph,
        type_name: &str,
        parent: ObjectId,
        object_name: &str,
    ) -> anyhow::Result<ObjectId> {
        let entry = self
            .types
            .get(type_name)
            .ok_or_else(|| anyhow::anyhow!("no registered type '{type_name}'"))?;
        Ok((entry.ctor)(graph, parent, object_name)?)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ---------------- builtin constructors ----------------

/// Shared visual base: transform + geometry + opacity slots, all eager so a
/// frame flush settles them before sync reads them.
fn declare_item_base(graph: &mut ObjectGraph, id: ObjectId) -> Result<(), GraphError> {
    graph.declare_property_with(id, "x", Variant::Real(0.0), EvalPolicy::Eager, Some(Aspect::Transform))?;
    graph.declare_property_with(id, "y", Variant::Real(0.0), EvalPolicy::Eager, Some(Aspect::Transform))?;
    graph.declare_property_with(id, "rotation", Variant::Real(0.0), EvalPolicy::Eager, Some(Aspect::Transform))?;
    graph.declare_property_with(id, "scale", Variant::Real(1.0), EvalPolicy::Eager, Some(Aspect::Transform))?;
    graph.declare_property_with(id, "width", Variant::Real(0.0), EvalPolicy::Eager, Some(Aspect::Geometry))?;
    graph.declare_property_with(id, "height", Variant::Real(0.0), EvalPolicy::Eager, Some(Aspect::Geometry))?;
    graph.declare_property_with(id, "opacity", Variant::Real(1.0), EvalPolicy::Eager, Some(Aspect::Material))?;
    Ok(())
}

fn item_ctor(graph: &mut ObjectGraph, parent: ObjectId, name: &str) -> Result<ObjectId, GraphError> {
    let id = graph.create_object(name, parent)?;
    declare_item_base(graph, id)?;
    Ok(id)
}

fn rectangle_ctor(
    graph: &mut ObjectGraph,
    parent: ObjectId,
    name: &str,
) -> Result<ObjectId, GraphError> {
    let id = item_ctor(graph, parent, name)?;
    graph.declare_property_with(id, "kind", Variant::string("rect"), EvalPolicy::Lazy, Some(Aspect::Material))?;
    graph.declare_property_with(id, "color", Variant::string("#ffffff"), EvalPolicy::Eager, Some(Aspect::Material))?;
    Ok(id)
}

fn text_ctor(graph: &mut ObjectGraph, parent: ObjectId, name: &str) -> Result<ObjectId, GraphError> {
    let id = item_ctor(graph, parent, name)?;
    graph.declare_property_with(id, "kind", Variant::string("text"), EvalPolicy::Lazy, Some(Aspect::Material))?;
    graph.declare_property_with(id, "color", Variant::string("#000000"), EvalPolicy::Eager, Some(Aspect::Material))?;
    // Content changes resize the implicit geometry.
    graph.declare_property_with(id, "text", Variant::string(""), EvalPolicy::Eager, Some(Aspect::Geometry))?;
    graph.declare_property_with(id, "font_size", Variant::Real(14.0), EvalPolicy::Eager, Some(Aspect::Geometry))?;
    Ok(id)
}

fn image_ctor(
    graph: &mut ObjectGraph,
    parent: ObjectId,
    name: &str,
) -> Result<ObjectId, GraphError> {
    let id = item_ctor(graph, parent, name)?;
    graph.declare_property_with(id, "kind", Variant::string("image"), EvalPolicy::Lazy, Some(Aspect::Material))?;
    graph.declare_property_with(id, "source", Variant::string(""), EvalPolicy::Eager, Some(Aspect::Material))?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_present() {
        let registry = TypeRegistry::with_builtins();
        for name in ["Item", "Rectangle", "Text", "Image"] {
            assert!(registry.contains(name), "{name} missing");
        }
    }

    #[test]
    fn create_unknown_type_fails() {
        let registry = TypeRegistry::new();
        let mut graph = ObjectGraph::new();
        assert!(registry
            .create(&mut graph, "Rectangle", ObjectId::nil(), "r")
            .is_err());
    }

    #[test]
    fn rectangle_instance_has_visual_slots() {
        let registry = TypeRegistry::with_builtins();
        let mut graph = ObjectGraph::new();
        let id = registry
            .create(&mut graph, "Rectangle", ObjectId::nil(), "r")
            .unwrap();
        assert_eq!(graph.read(id, "opacity").unwrap(), Variant::Real(1.0));
        assert_eq!(graph.read(id, "kind").unwrap(), Variant::string("rect"));
    }

    #[test]
    fn custom_registration_overrides() {
        fn bare(graph: &mut ObjectGraph, parent: ObjectId, name: &str) -> Result<ObjectId, GraphError> {
            graph.create_object(name, parent)
        }
        let mut registry = TypeRegistry::with_builtins();
        registry.register("Rectangle", (2, 0), bare);
        assert_eq!(registry.version("Rectangle"), Some((2, 0)));

        let mut graph = ObjectGraph::new();
        let id = registry
            .create(&mut graph, "Rectangle", ObjectId::nil(), "r")
            .unwrap();
        assert!(graph.read(id, "kind").is_err());
    }
}
