//! Container construction and bootstrap.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::info;

use crate::cache::ServiceCacheManager;
use crate::catalog::TypeCatalog;
use crate::container::{ContainerInner, ScanState, ServiceContainer};
use crate::definition::ServiceDefinition;
use crate::error::DiResult;
use crate::implementation::AnyArc;
use crate::module::ServiceModule;
use crate::registry::ServiceRegistry;
use crate::settings::Settings;

/// Builder for [`ServiceContainer`].
///
/// Registration errors are reported by [`build`](Self::build).
pub struct ContainerBuilder {
    settings: Settings,
    modules: Vec<Arc<dyn ServiceModule>>,
    definitions: Vec<ServiceDefinition>,
    instances: Vec<(ServiceDefinition, AnyArc)>,
}

impl ContainerBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            modules: Vec::new(),
            definitions: Vec::new(),
            instances: Vec::new(),
        }
    }

    /// Adds a module to discover services from.
    pub fn module<M: ServiceModule + 'static>(mut self, module: M) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    /// Registers a definition after discovery. Never cached.
    pub fn register(mut self, definition: ServiceDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Presets the instance of `T`, registering a synthetic definition for it
    /// unless discovery produced one.
    pub fn instance<T: Send + Sync + 'static>(mut self, instance: Arc<T>) -> Self {
        self.instances
            .push((ServiceDefinition::synthetic_of::<T>(), instance as AnyArc));
        self
    }

    /// Runs discovery (cache first, scanning otherwise) and registers the
    /// manual definitions.
    pub fn build(self) -> DiResult<ServiceContainer> {
        self.settings.validate()?;

        let mut catalog = TypeCatalog::new();
        let mut cache = ServiceCacheManager::new(&self.settings);
        for module in &self.modules {
            module.register_types(&mut catalog);
            cache.track_sources(module.source_files());
        }

        let mut manual = self.definitions;
        let mut preset = HashMap::new();
        for (definition, instance) in self.instances {
            preset.insert(definition.service_type().id(), instance);
            manual.push(definition);
        }

        let inner = ContainerInner {
            registry: RwLock::new(ServiceRegistry::with_allow_override(self.settings.allow_override)),
            catalog,
            modules: self.modules,
            manual: Mutex::new(manual),
            cache,
            instances: RwLock::new(HashMap::<TypeId, AnyArc>::new()),
            resolution_cache: RwLock::new(HashMap::new()),
            scan: Mutex::new(ScanState::default()),
            construction: ReentrantMutex::new(()),
            settings: self.settings,
        };

        let (mut registry, scan) = inner.discover_all(true);
        inner.apply_manual(&mut registry, true)?;
        if inner.settings.freeze_after_boot {
            registry.freeze();
        }
        info!(
            definitions = registry.len(),
            modules = scan.scanned.len(),
            "service container ready"
        );
        *inner.registry.write() = registry;
        *inner.scan.lock() = scan;
        inner.instances.write().extend(preset);

        Ok(ServiceContainer { inner: Arc::new(inner) })
    }
}

impl std::fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("settings", &self.settings)
            .field("modules", &self.modules.len())
            .field("definitions", &self.definitions.len())
            .field("instances", &self.instances.len())
            .finish()
    }
}
