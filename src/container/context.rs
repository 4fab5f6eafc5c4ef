//! Resolver context for factories.

use crate::container::ContainerInner;
use crate::error::DiResult;
use crate::implementation::AnyArc;
use crate::key::ServiceType;
use crate::traits::ResolverCore;

/// Context passed to factory functions for resolving dependencies.
///
/// Unlike the container itself, a context can also resolve private
/// services by name: factories run inside the container.
///
/// # Examples
///
/// ```
/// use ferrous_container::{
///     Resolver, ServiceContainer, ServiceDefinition, Settings, TypeHandle,
/// };
/// use std::sync::Arc;
///
/// struct Database {
///     url: String,
/// }
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// let users = ServiceDefinition::new(TypeHandle::external::<UserService>())
///     .with_factory::<UserService, _>(|resolver| {
///         Ok(UserService { db: resolver.get::<Database>()? })
///     })?;
///
/// let container = ServiceContainer::builder(Settings::without_cache())
///     .instance(Arc::new(Database { url: "postgres://localhost".into() }))
///     .register(users)
///     .build()?;
///
/// assert_eq!(container.get::<UserService>()?.db.url, "postgres://localhost");
/// # Ok::<(), ferrous_container::DiError>(())
/// ```
pub struct ResolverContext<'a> {
    inner: &'a ContainerInner,
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(inner: &'a ContainerInner) -> Self {
        Self { inner }
    }
}

impl ResolverCore for ResolverContext<'_> {
    fn resolve_any(&self, service: ServiceType) -> DiResult<AnyArc> {
        self.inner.resolve(service)
    }

    fn resolve_named(&self, name: &str) -> DiResult<AnyArc> {
        self.inner.resolve_named(name, true)
    }

    fn resolve_tagged(&self, tag: &str, view: Option<ServiceType>) -> DiResult<Vec<AnyArc>> {
        self.inner.resolve_tagged(tag, view)
    }
}
