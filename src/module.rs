//! Service modules: units of service discovery.
//!
//! A module stands in for a scanned source package. It declares the types it
//! knows how to build (so cached snapshots can be rehydrated without scanning)
//! and, when scanned, produces its service definitions.

use std::fmt;
use std::path::PathBuf;

use crate::catalog::TypeCatalog;
use crate::definition::ServiceDefinition;
use crate::error::DiResult;

/// A source of service definitions.
///
/// # Example
///
/// ```rust
/// use ferrous_container::{
///     Arguments, Autowire, BoxError, DiResult, ServiceDefinition, ServiceModule, TypeCatalog,
/// };
///
/// struct Mailer;
///
/// impl Autowire for Mailer {
///     fn construct(_: &Arguments) -> Result<Self, BoxError> {
///         Ok(Mailer)
///     }
/// }
///
/// struct MailModule;
///
/// impl ServiceModule for MailModule {
///     fn name(&self) -> &str {
///         "mail"
///     }
///
///     fn register_types(&self, catalog: &mut TypeCatalog) {
///         catalog.add::<Mailer>();
///     }
///
///     fn discover(&self) -> DiResult<Vec<ServiceDefinition>> {
///         Ok(vec![ServiceDefinition::of::<Mailer>().with_tag("mail")?])
///     }
/// }
/// ```
pub trait ServiceModule: Send + Sync {
    /// Unique module name, recorded in `scanned_modules` and cache snapshots.
    fn name(&self) -> &str;

    /// Declares every implementation type the module can produce.
    fn register_types(&self, catalog: &mut TypeCatalog);

    /// Produces the module's definitions. An error skips the module.
    fn discover(&self) -> DiResult<Vec<ServiceDefinition>>;

    /// Files whose modification invalidates cached discovery results.
    fn source_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// A module defined by an explicit list of definitions.
///
/// ```rust
/// use ferrous_container::{Arguments, Autowire, BoxError, ServiceDefinition, ServiceManifest, ServiceModule};
///
/// struct Clock;
///
/// impl Autowire for Clock {
///     fn construct(_: &Arguments) -> Result<Self, BoxError> {
///         Ok(Clock)
///     }
/// }
///
/// let manifest = ServiceManifest::new("core")
///     .service(ServiceDefinition::of::<Clock>())
///     .source("src/clock.rs");
///
/// assert_eq!(manifest.name(), "core");
/// assert_eq!(manifest.discover().unwrap().len(), 1);
/// ```
#[derive(Clone)]
pub struct ServiceManifest {
    name: String,
    definitions: Vec<ServiceDefinition>,
    sources: Vec<PathBuf>,
}

impl ServiceManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definitions: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn service(mut self, definition: ServiceDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Tracks a source file for cache invalidation.
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(path.into());
        self
    }
}

impl ServiceModule for ServiceManifest {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_types(&self, catalog: &mut TypeCatalog) {
        for definition in &self.definitions {
            catalog.insert(definition.handle().clone());
        }
    }

    fn discover(&self) -> DiResult<Vec<ServiceDefinition>> {
        Ok(self.definitions.clone())
    }

    fn source_files(&self) -> Vec<PathBuf> {
        self.sources.clone()
    }
}

impl fmt::Debug for ServiceManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceManifest")
            .field("name", &self.name)
            .field("definitions", &self.definitions.len())
            .field("sources", &self.sources)
            .finish()
    }
}
