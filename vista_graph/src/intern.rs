use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Interned property name. Stable for the lifetime of the graph; the same
/// spelling always maps to the same symbol, so slot lookup is an integer
/// compare instead of a string compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(u32);

impl Sym {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Default)]
pub struct Interner {
    map: FxHashMap<Arc<str>, Sym>,
    names: Vec<Arc<str>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Sym {
        if let Some(sym) = self.map.get(name) {
            return *sym;
        }
        let interned = Arc::<str>::from(name);
        let sym = Sym(self.names.len() as u32);
        self.names.push(Arc::clone(&interned));
        self.map.insert(interned, sym);
        sym
    }

    /// Lookup without creating: used on the read path so probing for a
    /// property that was never declared does not grow the table.
    pub fn get(&self, name: &str) -> Option<Sym> {
        self.map.get(name).copied()
    }

    pub fn name(&self, sym: Sym) -> &str {
        &self.names[sym.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_spelling_same_symbol() {
        let mut interner = Interner::new();
        let a = interner.intern("width");
        let b = interner.intern("width");
        let c = interner.intern("height");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.name(a), "width");
    }

    #[test]
    fn get_does_not_create() {
        let mut interner = Interner::new();
        assert_eq!(interner.get("x"), None);
        let sym = interner.intern("x");
        assert_eq!(interner.get("x"), Some(sym));
        assert_eq!(interner.len(), 1);
    }
}
