//! The service container: discovery, resolution and the singleton store.
//!
//! Resolving a type goes through these steps:
//!
//! 1. an already built instance is returned as-is
//! 2. otherwise a definition is selected (the exact type, or the single or
//!    primary implementation of an interface), scanning pending modules once
//!    when nothing matches
//! 3. the type is pushed on the thread's resolution stack; finding it there
//!    already is a circular dependency
//! 4. the factory or constructor runs with recursively resolved arguments,
//!    then the definition's method calls
//! 5. the instance is stored, at most once per implementation type

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{now_seconds, ServiceCacheManager};
use crate::catalog::TypeCatalog;
use crate::definition::{MethodCall, ServiceDefinition};
use crate::diagnostics::ServiceReport;
use crate::error::{DiError, DiResult};
use crate::implementation::{AnyArc, Argument, Arguments, Parameter};
use crate::internal::{current_chain, ResolutionFrame};
use crate::key::ServiceType;
use crate::module::ServiceModule;
use crate::registry::ServiceRegistry;
use crate::settings::Settings;
use crate::traits::ResolverCore;

mod builder;
mod context;

pub use builder::ContainerBuilder;
pub use context::ResolverContext;

/// Counters reported by [`ServiceContainer::get_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub total_definitions: usize,
    pub public_definitions: usize,
    pub instances: usize,
    pub aliases: usize,
    pub tags: usize,
    pub scanned_modules: usize,
    pub resolution_cache_entries: usize,
}

#[derive(Debug, Default)]
struct ScanState {
    scanned: BTreeSet<String>,
    /// Modules whose discovery failed; skipped until the scan state is reset
    failed: BTreeSet<String>,
}

pub(crate) struct ContainerInner {
    settings: Settings,
    registry: RwLock<ServiceRegistry>,
    catalog: TypeCatalog,
    modules: Vec<Arc<dyn ServiceModule>>,
    /// Definitions registered outside discovery, re-applied after every rescan
    manual: Mutex<Vec<ServiceDefinition>>,
    cache: ServiceCacheManager,
    instances: RwLock<HashMap<TypeId, AnyArc>>,
    /// Requested interface -> selected implementation
    resolution_cache: RwLock<HashMap<TypeId, TypeId>>,
    scan: Mutex<ScanState>,
    construction: ReentrantMutex<()>,
}

/// Service container.
///
/// Cheap to clone; clones share definitions and instances. Resolution methods
/// come from the [`Resolver`](crate::Resolver) trait.
///
/// # Examples
///
/// ```
/// use ferrous_container::{
///     Arguments, Autowire, BoxError, DiError, Parameter, Resolver, ServiceContainer,
///     ServiceDefinition, Settings,
/// };
/// use std::sync::Arc;
///
/// struct A { _b: Arc<B> }
/// struct B { _a: Arc<A> }
///
/// impl Autowire for A {
///     fn parameters() -> Vec<Parameter> { vec![Parameter::of::<B>("b")] }
///     fn construct(args: &Arguments) -> Result<Self, BoxError> { Ok(A { _b: args.get("b")? }) }
/// }
/// impl Autowire for B {
///     fn parameters() -> Vec<Parameter> { vec![Parameter::of::<A>("a")] }
///     fn construct(args: &Arguments) -> Result<Self, BoxError> { Ok(B { _a: args.get("a")? }) }
/// }
///
/// let container = ServiceContainer::builder(Settings::without_cache())
///     .register(ServiceDefinition::of::<A>())
///     .register(ServiceDefinition::of::<B>())
///     .build()?;
///
/// match container.get::<A>() {
///     Err(DiError::CircularDependencyDetected { chain }) => assert_eq!(chain.len(), 3),
///     other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
/// }
/// # Ok::<(), DiError>(())
/// ```
#[derive(Clone)]
pub struct ServiceContainer {
    inner: Arc<ContainerInner>,
}

impl ServiceContainer {
    /// Starts building a container configured by `settings`.
    pub fn builder(settings: Settings) -> ContainerBuilder {
        ContainerBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Resolves `service` by identity.
    pub fn resolve(&self, service: ServiceType) -> DiResult<AnyArc> {
        self.inner.resolve(service)
    }

    /// Stores an externally built instance of `T`.
    ///
    /// Registers a synthetic definition for `T` when none exists and the
    /// registry is not frozen.
    pub fn set<T: Send + Sync + 'static>(&self, instance: Arc<T>) -> DiResult<()> {
        let id = TypeId::of::<T>();
        {
            let mut registry = self.inner.registry.write();
            if !registry.contains(id) && !registry.is_frozen() {
                let definition = ServiceDefinition::synthetic_of::<T>();
                registry.register_definition(definition.clone())?;
                self.inner.manual.lock().push(definition);
                self.inner.resolution_cache.write().clear();
            }
        }
        self.inner.instances.write().insert(id, instance);
        debug!(service = std::any::type_name::<T>(), "instance set");
        Ok(())
    }

    /// Registers a definition outside module discovery.
    ///
    /// Such definitions are never written to the discovery cache and survive
    /// [`force_complete_scan`](Self::force_complete_scan).
    pub fn register(&self, definition: ServiceDefinition) -> DiResult<Arc<ServiceDefinition>> {
        let registered = self.inner.registry.write().register_definition(definition.clone())?;
        self.inner.manual.lock().push(definition);
        self.inner.resolution_cache.write().clear();
        Ok(registered)
    }

    /// Whether a public service is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.inner.definition_by_name(name, false).is_some()
    }

    /// Definition registered under `name`, public or not.
    pub fn definition(&self, name: &str) -> Option<Arc<ServiceDefinition>> {
        self.inner.definition_by_name(name, true)
    }

    /// Diagnostic description of the service registered under `name`.
    pub fn describe(&self, name: &str) -> Option<ServiceReport> {
        let definition = self.definition(name)?;
        let instantiated = self
            .inner
            .instances
            .read()
            .contains_key(&definition.service_type().id());
        Some(ServiceReport::new(&definition, instantiated))
    }

    /// Discards scan state and rediscovers every module, ignoring the cache.
    ///
    /// Instances are kept. Returns the number of registered definitions.
    pub fn force_complete_scan(&self) -> usize {
        let (mut registry, scan) = self.inner.discover_all(false);
        if let Err(e) = self.inner.apply_manual(&mut registry, false) {
            warn!(error = %e, "manual definitions not re-applied");
        }
        if self.inner.registry.read().is_frozen() {
            registry.freeze();
        }
        let total = registry.len();
        *self.inner.registry.write() = registry;
        *self.inner.scan.lock() = scan;
        self.inner.resolution_cache.write().clear();
        info!(definitions = total, "complete service scan finished");
        total
    }

    /// Forgets inferred state (resolution memo and scanned modules), keeping
    /// instances.
    pub fn cleanup_memory(&self) {
        self.inner.resolution_cache.write().clear();
        self.reset_scanned_modules();
        debug!("container memory cleaned up");
    }

    /// Drops every built instance except those of synthetic services, which
    /// cannot be rebuilt. Returns the number of instances dropped.
    pub fn clear_instances(&self) -> usize {
        let registry = self.inner.registry.read();
        let mut instances = self.inner.instances.write();
        let before = instances.len();
        instances.retain(|id, _| {
            registry
                .get_definition(*id)
                .map_or(true, |definition| definition.is_synthetic())
        });
        before - instances.len()
    }

    pub fn reset_scanned_modules(&self) {
        let mut scan = self.inner.scan.lock();
        scan.scanned.clear();
        scan.failed.clear();
    }

    /// Deletes the discovery snapshots and forgets built instances and
    /// resolution results. Returns the number of snapshot files removed.
    pub fn clear_cache(&self) -> usize {
        let removed = self.inner.cache.clear_cache();
        let dropped = self.clear_instances();
        self.inner.resolution_cache.write().clear();
        info!(files = removed, instances = dropped, "service cache cleared");
        removed
    }

    /// Clears the cache and rebuilds it from a complete scan.
    pub fn warm_up(&self) -> usize {
        self.clear_cache();
        self.force_complete_scan()
    }

    /// Rejects further registration.
    pub fn freeze_registry(&self) {
        self.inner.registry.write().freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.registry.read().is_frozen()
    }

    /// Names of the modules scanned so far.
    pub fn scanned_modules(&self) -> Vec<String> {
        self.inner.scan.lock().scanned.iter().cloned().collect()
    }

    pub fn get_stats(&self) -> ContainerStats {
        let registry = self.inner.registry.read().stats();
        ContainerStats {
            total_definitions: registry.definitions,
            public_definitions: registry.public_definitions,
            instances: self.inner.instances.read().len(),
            aliases: registry.aliases,
            tags: registry.tags,
            scanned_modules: self.inner.scan.lock().scanned.len(),
            resolution_cache_entries: self.inner.resolution_cache.read().len(),
        }
    }

    /// Runs `f` against the registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&ServiceRegistry) -> R) -> R {
        f(&self.inner.registry.read())
    }
}

impl ResolverCore for ServiceContainer {
    fn resolve_any(&self, service: ServiceType) -> DiResult<AnyArc> {
        self.inner.resolve(service)
    }

    fn resolve_named(&self, name: &str) -> DiResult<AnyArc> {
        self.inner.resolve_named(name, false)
    }

    fn resolve_tagged(&self, tag: &str, view: Option<ServiceType>) -> DiResult<Vec<AnyArc>> {
        self.inner.resolve_tagged(tag, view)
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("stats", &self.get_stats())
            .field("modules", &self.inner.modules.len())
            .finish()
    }
}

impl ContainerInner {
    pub(crate) fn resolve(&self, requested: ServiceType) -> DiResult<AnyArc> {
        self.try_resolve(requested)?
            .ok_or_else(|| DiError::ServiceNotFound(requested.name().to_string()))
    }

    /// `Ok(None)` when no definition or instance matches `requested`.
    fn try_resolve(&self, requested: ServiceType) -> DiResult<Option<AnyArc>> {
        if let Some(instance) = self.instances.read().get(&requested.id()) {
            return Ok(Some(Arc::clone(instance)));
        }
        let Some(definition) = self.select_definition(requested)? else {
            return Ok(None);
        };
        self.instance_as(&definition, requested).map(Some)
    }

    /// Resolution for an autowired parameter. An abstract type with no
    /// implementation counts as missing so the parameter default applies.
    fn try_inject(&self, requested: ServiceType) -> DiResult<Option<AnyArc>> {
        if let Some(instance) = self.instances.read().get(&requested.id()) {
            return Ok(Some(Arc::clone(instance)));
        }
        match self.select_definition(requested)? {
            Some(definition) if definition.is_abstract() => {
                debug!(service = definition.path(), "no implementation to inject");
                Ok(None)
            }
            Some(definition) => self.instance_as(&definition, requested).map(Some),
            None => Ok(None),
        }
    }

    fn instance_as(
        &self,
        definition: &Arc<ServiceDefinition>,
        requested: ServiceType,
    ) -> DiResult<AnyArc> {
        let instance = self.instance_of(definition)?;
        view_as(definition, requested, instance)
    }

    /// Instance behind a definition found by name. Abstract definitions go
    /// through implementation selection.
    fn named_instance(&self, definition: &Arc<ServiceDefinition>) -> DiResult<AnyArc> {
        if definition.is_abstract() {
            self.resolve(definition.service_type())
        } else {
            self.instance_of(definition)
        }
    }

    /// Picks the definition that satisfies `requested`, scanning pending
    /// modules once when the registry has no usable match.
    fn select_definition(&self, requested: ServiceType) -> DiResult<Option<Arc<ServiceDefinition>>> {
        let selected = self.try_select(requested)?;
        if let Some(definition) = &selected {
            if !definition.is_abstract() {
                return Ok(selected);
            }
        }
        if self.discover_pending() > 0 {
            self.try_select(requested)
        } else {
            Ok(selected)
        }
    }

    fn try_select(&self, requested: ServiceType) -> DiResult<Option<Arc<ServiceDefinition>>> {
        let registry = self.registry.read();

        let memo = self.resolution_cache.read().get(&requested.id()).copied();
        if let Some(definition) = memo.and_then(|id| registry.get_definition(id)) {
            return Ok(Some(definition));
        }

        let exact = registry.get_definition(requested.id());
        if let Some(definition) = &exact {
            if !definition.is_abstract() {
                return Ok(exact);
            }
        }

        let candidates = registry.implementations_of(requested);
        let chosen = match candidates.as_slice() {
            [] => return Ok(exact),
            [single] => Arc::clone(single),
            _ => {
                let primary: Vec<_> = candidates.iter().filter(|d| d.is_primary()).collect();
                match primary.as_slice() {
                    [single] => Arc::clone(single),
                    _ => {
                        return Err(DiError::AmbiguousDependency {
                            interface: requested.name(),
                            candidates: candidates.iter().map(|d| d.path()).collect(),
                        })
                    }
                }
            }
        };
        drop(registry);

        self.resolution_cache
            .write()
            .insert(requested.id(), chosen.service_type().id());
        Ok(Some(chosen))
    }

    /// Returns the singleton of `definition`, building it on first use.
    fn instance_of(&self, definition: &Arc<ServiceDefinition>) -> DiResult<AnyArc> {
        let id = definition.service_type().id();
        if let Some(instance) = self.instances.read().get(&id) {
            return Ok(Arc::clone(instance));
        }

        let service = definition.path();
        let _frame = ResolutionFrame::enter(service)?;
        if definition.is_abstract() {
            return Err(DiError::AbstractInstantiation(service));
        }
        if definition.is_synthetic() {
            return Err(DiError::ServiceInstantiationFailed {
                service,
                source: "synthetic service has no instance; set it on the container".into(),
            });
        }

        let _guard = self.construction.lock();
        if let Some(instance) = self.instances.read().get(&id) {
            return Ok(Arc::clone(instance));
        }

        debug!(service, chain = ?current_chain(), "constructing service");
        let instance = self.construct(definition)?;
        let stored = Arc::clone(self.instances.write().entry(id).or_insert(instance));
        debug!(service, "service constructed");
        Ok(stored)
    }

    fn construct(&self, definition: &ServiceDefinition) -> DiResult<AnyArc> {
        let service = definition.path();
        let instance = match definition.factory() {
            Some(factory) => {
                let context = ResolverContext::new(self);
                factory(&context).map_err(|e| DiError::from_construction(service, e))?
            }
            None => {
                let args = self.constructor_arguments(definition)?;
                match definition.handle().construct(&args) {
                    Some(result) => result.map_err(|e| DiError::from_construction(service, e))?,
                    None => {
                        return Err(DiError::InvalidServiceDefinition(format!(
                            "{service} has neither a constructor nor a factory"
                        )))
                    }
                }
            }
        };

        for call in definition.method_calls() {
            let args = self.call_arguments(service, call)?;
            call.invoke(&instance, &args)
                .map_err(|e| DiError::from_construction(service, e))?;
        }
        Ok(instance)
    }

    fn constructor_arguments(&self, definition: &ServiceDefinition) -> DiResult<Arguments> {
        let service = definition.path();
        let explicit = definition.arguments().unwrap_or(&[]);
        let mut args = Arguments::new(service);
        for (index, parameter) in definition.handle().parameters().iter().enumerate() {
            let value = match explicit.get(index) {
                Some(Argument::Value(value)) => Arc::clone(value),
                Some(Argument::Service(name)) => {
                    let target = self
                        .definition_by_name(name, true)
                        .ok_or_else(|| DiError::ServiceNotFound(name.clone()))?;
                    let instance = self.named_instance(&target)?;
                    view_as(&target, parameter.service(), instance)?
                }
                Some(Argument::Autowired) | None => self.autowire_parameter(definition, parameter)?,
            };
            args.push(Some(parameter.name()), value);
        }
        Ok(args)
    }

    fn autowire_parameter(
        &self,
        definition: &ServiceDefinition,
        parameter: &Parameter,
    ) -> DiResult<AnyArc> {
        let resolved = if definition.is_autowire() {
            self.try_inject(parameter.service())?
        } else {
            None
        };
        resolved
            .or_else(|| parameter.default_value())
            .ok_or_else(|| DiError::UnresolvableDependency {
                service: definition.path(),
                parameter: parameter.name().to_string(),
                expected: parameter.service().name(),
            })
    }

    fn call_arguments(&self, service: &'static str, call: &MethodCall) -> DiResult<Arguments> {
        let mut args = Arguments::new(service);
        for (index, argument) in call.arguments().iter().enumerate() {
            let value = match argument {
                Argument::Value(value) => Arc::clone(value),
                Argument::Service(name) => {
                    let target = self
                        .definition_by_name(name, true)
                        .ok_or_else(|| DiError::ServiceNotFound(name.clone()))?;
                    self.named_instance(&target)?
                }
                Argument::Autowired => {
                    return Err(DiError::UnresolvableDependency {
                        service,
                        parameter: format!("{}#{index}", call.name()),
                        expected: "an explicit argument",
                    })
                }
            };
            args.push(None, value);
        }
        Ok(args)
    }

    pub(crate) fn resolve_named(&self, name: &str, include_private: bool) -> DiResult<AnyArc> {
        let definition = self
            .definition_by_name(name, include_private)
            .ok_or_else(|| DiError::ServiceNotFound(name.to_string()))?;
        self.named_instance(&definition)
    }

    pub(crate) fn resolve_tagged(
        &self,
        tag: &str,
        view: Option<ServiceType>,
    ) -> DiResult<Vec<AnyArc>> {
        self.discover_pending();
        let definitions = self.registry.read().get_definitions_by_tag(tag);
        definitions
            .iter()
            .filter(|definition| !definition.is_abstract())
            .map(|definition| {
                let instance = self.instance_of(definition)?;
                match view {
                    Some(view) => view_as(definition, view, instance),
                    None => Ok(instance),
                }
            })
            .collect()
    }

    fn definition_by_name(&self, name: &str, include_private: bool) -> Option<Arc<ServiceDefinition>> {
        let found = self.registry.read().get_definition_by_name(name);
        let found = match found {
            Some(definition) => Some(definition),
            None if self.discover_pending() > 0 => self.registry.read().get_definition_by_name(name),
            None => None,
        };
        found.filter(|definition| include_private || definition.is_public())
    }

    /// Scans modules that were neither scanned nor failed. Returns the number
    /// of definitions added.
    fn discover_pending(&self) -> usize {
        if self.registry.read().is_frozen() {
            return 0;
        }
        let pending: Vec<_> = {
            let scan = self.scan.lock();
            self.modules
                .iter()
                .filter(|m| !scan.scanned.contains(m.name()) && !scan.failed.contains(m.name()))
                .cloned()
                .collect()
        };
        if pending.is_empty() {
            return 0;
        }

        let mut added = 0;
        for module in pending {
            let name = module.name().to_string();
            match scan_module(module.as_ref()) {
                Ok(definitions) => {
                    let mut registry = self.registry.write();
                    for definition in definitions {
                        if registry.contains(definition.service_type().id()) {
                            continue;
                        }
                        match registry.register_definition(definition) {
                            Ok(_) => added += 1,
                            Err(e) => warn!(module = %name, error = %e, "discovered service rejected"),
                        }
                    }
                    drop(registry);
                    self.scan.lock().scanned.insert(name);
                }
                Err(e) => {
                    warn!(module = %name, error = %e, "module discovery failed, skipping module");
                    self.scan.lock().failed.insert(name);
                }
            }
        }
        if added > 0 {
            self.resolution_cache.write().clear();
            debug!(definitions = added, "auto-discovered service definitions");
        }
        added
    }

    /// Builds a registry from the cache or, failing that, from scanning every
    /// module.
    fn discover_all(&self, use_cache: bool) -> (ServiceRegistry, ScanState) {
        let mut registry = ServiceRegistry::with_allow_override(self.settings.allow_override);
        let mut scan = ScanState::default();

        if use_cache {
            if let Some(snapshot) = self.cache.load_cache() {
                if !self.cache.is_cache_valid(&snapshot) {
                    info!("service cache is stale, rescanning");
                } else if self.cache.load_services_from_cache(
                    &snapshot,
                    &self.catalog,
                    &mut registry,
                    &mut scan.scanned,
                ) {
                    info!(definitions = registry.len(), "service definitions loaded from cache");
                    return (registry, scan);
                }
            }
        }

        let started = now_seconds();
        for module in &self.modules {
            let name = module.name().to_string();
            debug!(module = %name, "scanning module");
            match scan_module(module.as_ref()) {
                Ok(definitions) => {
                    for definition in definitions {
                        if let Err(e) = registry.register_definition(definition) {
                            warn!(module = %name, error = %e, "discovered service rejected");
                        }
                    }
                    scan.scanned.insert(name);
                }
                Err(e) => {
                    warn!(module = %name, error = %e, "module discovery failed, skipping module");
                    scan.failed.insert(name);
                }
            }
        }
        info!(
            definitions = registry.len(),
            modules = scan.scanned.len(),
            failed = scan.failed.len(),
            "service scan finished"
        );

        let snapshot = self
            .cache
            .create_cache_snapshot(&registry)
            .with_modules(scan.scanned.iter().cloned())
            .with_scan_timestamp(started);
        if snapshot.services.iter().any(|service| service.customized) {
            debug!("discovered definitions carry closures, snapshot not written");
        } else {
            self.cache.save_cache(&snapshot);
        }
        (registry, scan)
    }

    /// Registers the manual definitions into `registry`. Synthetic ones are
    /// skipped when the type already has a definition. With `strict` the first
    /// failure is returned; otherwise failures are logged.
    fn apply_manual(&self, registry: &mut ServiceRegistry, strict: bool) -> DiResult<()> {
        let manual = self.manual.lock().clone();
        for definition in manual {
            if definition.is_synthetic() && registry.contains(definition.service_type().id()) {
                continue;
            }
            if let Err(e) = registry.register_definition(definition) {
                if strict {
                    return Err(e);
                }
                warn!(error = %e, "manual service definition rejected");
            }
        }
        Ok(())
    }
}

fn scan_module(module: &dyn ServiceModule) -> DiResult<Vec<ServiceDefinition>> {
    let name = module.name();
    module
        .discover()?
        .into_iter()
        .map(|definition| match definition.module() {
            Some(_) => Ok(definition),
            None => definition.with_module(name),
        })
        .collect()
}

/// Converts an instance of `definition`'s type into the `requested` view.
fn view_as(
    definition: &ServiceDefinition,
    requested: ServiceType,
    instance: AnyArc,
) -> DiResult<AnyArc> {
    definition.handle().upcast(requested, instance)
}
