//! Known implementation types, looked up by identity path.
//!
//! Cache snapshots store type paths. Turning a path back into something the
//! container can construct needs a table of live [`TypeHandle`]s; modules fill
//! that table through [`ServiceModule::register_types`](crate::ServiceModule::register_types).

use std::any::TypeId;
use std::collections::HashMap;

use crate::implementation::{Autowire, TypeHandle};

/// Table of live type handles keyed by path and by `TypeId`.
#[derive(Debug, Default, Clone)]
pub struct TypeCatalog {
    by_path: HashMap<&'static str, TypeHandle>,
    by_id: HashMap<TypeId, TypeHandle>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handle`, replacing any previous handle for the same type.
    pub fn insert(&mut self, handle: TypeHandle) -> &mut Self {
        self.by_path.insert(handle.path(), handle.clone());
        self.by_id.insert(handle.type_id(), handle);
        self
    }

    pub fn add<T: Autowire>(&mut self) -> &mut Self {
        self.insert(TypeHandle::of::<T>())
    }

    pub fn add_interface<I: ?Sized + 'static>(&mut self) -> &mut Self {
        self.insert(TypeHandle::interface::<I>())
    }

    /// Handle recorded under the identity path `path`.
    pub fn resolve_path(&self, path: &str) -> Option<TypeHandle> {
        self.by_path.get(path).cloned()
    }

    pub fn handle(&self, id: TypeId) -> Option<TypeHandle> {
        self.by_id.get(&id).cloned()
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn resolves_by_path_and_id() {
        let mut catalog = TypeCatalog::new();
        catalog.insert(TypeHandle::external::<Marker>());

        let path = std::any::type_name::<Marker>();
        assert!(catalog.resolve_path(path).is_some());
        assert!(catalog.handle(TypeId::of::<Marker>()).is_some());
        assert!(catalog.resolve_path("nowhere::Marker").is_none());
        assert_eq!(catalog.len(), 1);
    }
}
