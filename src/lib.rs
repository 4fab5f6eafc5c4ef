//! # ferrous-container
//!
//! Service container with autowiring, tagged lookup, cycle detection and a
//! persistent discovery cache.
//!
//! ## Features
//!
//! - **Explicit autowiring**: constructors declare their parameters through [`Autowire`]
//!   or a [`TypeHandle`]; no runtime reflection
//! - **Singletons only**: every implementation type is built at most once, also under
//!   concurrent first use
//! - **Circular dependency detection**: per-thread resolution stack, errors carry the chain
//! - **Lookup by type, interface, name or tag** with memoized indexes
//! - **Module discovery with a disk cache**: discovery results are stored as JSON and
//!   reused while the tracked sources are unchanged
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_container::{
//!     Arguments, Autowire, BoxError, Parameter, Resolver, ServiceContainer, ServiceDefinition,
//!     ServiceManifest, Settings,
//! };
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! impl Autowire for Logger {
//!     fn construct(_: &Arguments) -> Result<Self, BoxError> {
//!         Ok(Logger)
//!     }
//! }
//!
//! struct UserService {
//!     logger: Arc<Logger>,
//! }
//!
//! impl Autowire for UserService {
//!     fn parameters() -> Vec<Parameter> {
//!         vec![Parameter::of::<Logger>("logger")]
//!     }
//!
//!     fn construct(args: &Arguments) -> Result<Self, BoxError> {
//!         Ok(UserService { logger: args.get("logger")? })
//!     }
//! }
//!
//! let app = ServiceManifest::new("app")
//!     .service(ServiceDefinition::of::<Logger>())
//!     .service(ServiceDefinition::of::<UserService>().with_tag("controller")?);
//!
//! let container = ServiceContainer::builder(Settings::without_cache())
//!     .module(app)
//!     .build()?;
//!
//! let users = container.get::<UserService>()?;
//! assert!(Arc::ptr_eq(&users.logger, &container.get::<Logger>()?));
//! assert_eq!(container.get_all_by_tag("controller")?.len(), 1);
//! assert!(container.get_by_name("UserService").is_ok());
//! # Ok::<(), ferrous_container::DiError>(())
//! ```
//!
//! ## Interfaces
//!
//! ```rust
//! use ferrous_container::{Resolver, ServiceContainer, ServiceDefinition, Settings, TypeHandle};
//! use std::sync::Arc;
//!
//! trait Mailer: Send + Sync {
//!     fn send(&self, to: &str) -> String;
//! }
//!
//! struct SmtpMailer;
//!
//! impl Mailer for SmtpMailer {
//!     fn send(&self, to: &str) -> String {
//!         format!("smtp:{to}")
//!     }
//! }
//!
//! let smtp = TypeHandle::builder::<SmtpMailer>()
//!     .constructor(vec![], |_| Ok(SmtpMailer))
//!     .implements::<dyn Mailer, _>(|m| m as Arc<dyn Mailer>)
//!     .build();
//!
//! let container = ServiceContainer::builder(Settings::without_cache())
//!     .register(ServiceDefinition::new(smtp))
//!     .build()?;
//!
//! let mailer = container.get_trait::<dyn Mailer>()?;
//! assert_eq!(mailer.send("ops"), "smtp:ops");
//! # Ok::<(), ferrous_container::DiError>(())
//! ```

pub mod cache;
pub mod catalog;
pub mod container;
pub mod definition;
pub mod diagnostics;
pub mod error;
pub mod implementation;
pub mod key;
pub mod module;
pub mod registry;
pub mod settings;
pub mod traits;

// Internal modules
mod internal;

pub use cache::{CacheSnapshot, CacheVariant, CachedService, ServiceCacheManager, CACHE_FORMAT_VERSION};
pub use catalog::TypeCatalog;
pub use container::{ContainerBuilder, ContainerStats, ResolverContext, ServiceContainer};
pub use definition::{Factory, MethodCall, ServiceDefinition};
pub use diagnostics::{render_error, ServiceReport};
pub use error::{BoxError, DiError, DiResult, ErrorKind};
pub use implementation::{AnyArc, Argument, Arguments, Autowire, Parameter, TypeHandle, TypeHandleBuilder};
pub use key::{short_type_name, ServiceType};
pub use module::{ServiceManifest, ServiceModule};
pub use registry::{RegistryStats, ServiceRegistry};
pub use settings::{AppEnv, Settings, SettingsLoader};
pub use traits::{Resolver, ResolverCore};
