//! Indexed store of service definitions.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::definition::ServiceDefinition;
use crate::error::{DiError, DiResult};
use crate::key::ServiceType;

/// Counters describing a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub definitions: usize,
    pub public_definitions: usize,
    pub aliases: usize,
    pub tags: usize,
    pub frozen: bool,
}

/// Definitions keyed by implementation type, with alias, tag and interface
/// indexes.
///
/// Name and tag lookups are memoized; every registration invalidates the
/// memo tables.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{Arguments, Autowire, BoxError, ServiceDefinition, ServiceRegistry};
///
/// struct UserRepository;
/// struct OrderRepository;
///
/// impl Autowire for UserRepository {
///     fn construct(_: &Arguments) -> Result<Self, BoxError> { Ok(UserRepository) }
/// }
/// impl Autowire for OrderRepository {
///     fn construct(_: &Arguments) -> Result<Self, BoxError> { Ok(OrderRepository) }
/// }
///
/// let mut registry = ServiceRegistry::new();
/// registry.register_definition(ServiceDefinition::of::<UserRepository>().with_tag("repository")?)?;
/// registry.register_definition(ServiceDefinition::of::<OrderRepository>().with_tag("repository")?)?;
///
/// assert_eq!(registry.get_definitions_by_tag("repository").len(), 2);
/// assert!(registry.get_definitions_by_tag("controller").is_empty());
/// assert!(registry.get_definition_by_name("UserRepository").is_some());
/// # Ok::<(), ferrous_container::DiError>(())
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    order: Vec<TypeId>,
    definitions: HashMap<TypeId, Arc<ServiceDefinition>>,
    aliases: HashMap<String, TypeId>,
    tags: HashMap<String, Vec<TypeId>>,
    implementations: HashMap<TypeId, Vec<TypeId>>,
    name_cache: Mutex<HashMap<String, Option<TypeId>>>,
    tag_cache: Mutex<HashMap<String, Vec<Arc<ServiceDefinition>>>>,
    frozen: bool,
    allow_override: bool,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry in which registering a type twice replaces the first
    /// definition instead of failing.
    pub fn with_allow_override(allow_override: bool) -> Self {
        Self {
            allow_override,
            ..Self::default()
        }
    }

    /// Freezes and stores `definition`.
    ///
    /// Fails with [`DiError::RegistryFrozen`] after [`freeze`](Self::freeze),
    /// [`DiError::InvalidServiceDefinition`] when the definition cannot be
    /// built, and [`DiError::DuplicateService`] when the type is already
    /// registered and overriding is off.
    pub fn register_definition(
        &mut self,
        definition: ServiceDefinition,
    ) -> DiResult<Arc<ServiceDefinition>> {
        let path = definition.path();
        if self.frozen {
            return Err(DiError::RegistryFrozen(path));
        }
        definition.validate()?;

        let id = definition.service_type().id();
        if self.definitions.contains_key(&id) {
            if !self.allow_override {
                return Err(DiError::DuplicateService(path));
            }
            debug!(service = path, "replacing existing definition");
            self.unindex(id);
        } else {
            self.order.push(id);
        }

        let definition = Arc::new(definition.freeze());
        self.index(id, &definition);
        self.definitions.insert(id, Arc::clone(&definition));
        self.invalidate_caches();

        debug!(
            service = path,
            tags = ?definition.tags(),
            public = definition.is_public(),
            "registered service definition"
        );
        Ok(definition)
    }

    fn index(&mut self, id: TypeId, definition: &ServiceDefinition) {
        self.aliases.insert(definition.path().to_string(), id);
        self.aliases.insert(definition.short_name().to_string(), id);
        for alias in definition.aliases() {
            self.aliases.insert(alias.clone(), id);
        }
        for tag in definition.tags() {
            let members = self.tags.entry(tag.clone()).or_default();
            if !members.contains(&id) {
                members.push(id);
            }
        }
        for interface in definition.handle().interfaces() {
            let members = self.implementations.entry(interface.id()).or_default();
            if !members.contains(&id) {
                members.push(id);
            }
        }
    }

    fn unindex(&mut self, id: TypeId) {
        self.aliases.retain(|_, target| *target != id);
        self.tags.retain(|_, members| {
            members.retain(|member| *member != id);
            !members.is_empty()
        });
        self.implementations.retain(|_, members| {
            members.retain(|member| *member != id);
            !members.is_empty()
        });
    }

    fn invalidate_caches(&self) {
        self.name_cache.lock().clear();
        self.tag_cache.lock().clear();
    }

    pub fn get_definition(&self, id: TypeId) -> Option<Arc<ServiceDefinition>> {
        self.definitions.get(&id).cloned()
    }

    pub fn definition_of<T: ?Sized + 'static>(&self) -> Option<Arc<ServiceDefinition>> {
        self.get_definition(TypeId::of::<T>())
    }

    pub fn contains(&self, id: TypeId) -> bool {
        self.definitions.contains_key(&id)
    }

    /// Looks up a definition by alias, falling back to a scan by short type
    /// name. Names are case-sensitive. Misses are memoized too.
    pub fn get_definition_by_name(&self, name: &str) -> Option<Arc<ServiceDefinition>> {
        if let Some(hit) = self.name_cache.lock().get(name) {
            return hit.and_then(|id| self.get_definition(id));
        }

        let found = self.aliases.get(name).copied().or_else(|| {
            self.order
                .iter()
                .rev()
                .find(|id| {
                    self.definitions
                        .get(id)
                        .is_some_and(|def| def.short_name() == name)
                })
                .copied()
        });
        self.name_cache.lock().insert(name.to_string(), found);
        found.and_then(|id| self.get_definition(id))
    }

    /// Definitions tagged `tag`, in registration order.
    pub fn get_definitions_by_tag(&self, tag: &str) -> Vec<Arc<ServiceDefinition>> {
        if let Some(hit) = self.tag_cache.lock().get(tag) {
            return hit.clone();
        }

        let found: Vec<_> = self
            .tags
            .get(tag)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| self.definitions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        self.tag_cache.lock().insert(tag.to_string(), found.clone());
        found
    }

    /// Non-abstract definitions whose type can be viewed as `interface`.
    pub fn implementations_of(&self, interface: ServiceType) -> Vec<Arc<ServiceDefinition>> {
        self.implementations
            .get(&interface.id())
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| self.definitions.get(id))
                    .filter(|def| !def.is_abstract())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rejects any further registration. One-way.
    pub fn freeze(&mut self) {
        if !self.frozen {
            self.frozen = true;
            info!(definitions = self.definitions.len(), "service registry frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn allows_override(&self) -> bool {
        self.allow_override
    }

    /// All definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<ServiceDefinition>> + '_ {
        self.order.iter().filter_map(|id| self.definitions.get(id))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            definitions: self.definitions.len(),
            public_definitions: self.definitions.values().filter(|d| d.is_public()).count(),
            aliases: self.aliases.len(),
            tags: self.tags.len(),
            frozen: self.frozen,
        }
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("definitions", &self.definitions.len())
            .field("aliases", &self.aliases.len())
            .field("tags", &self.tags.len())
            .field("frozen", &self.frozen)
            .field("allow_override", &self.allow_override)
            .finish()
    }
}
