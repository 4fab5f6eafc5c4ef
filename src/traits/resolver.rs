//! Resolver traits for service resolution.

use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::implementation::{downcast, downcast_trait, AnyArc};
use crate::key::ServiceType;

/// Core resolver trait for object-safe service resolution.
///
/// Implemented by [`ServiceContainer`](crate::ServiceContainer) and by the
/// [`ResolverContext`](crate::ResolverContext) handed to factories. All three
/// methods share the calling thread's resolution stack, so cycles through
/// factories are detected like any other.
///
/// Most callers use the generic [`Resolver`] methods instead.
pub trait ResolverCore: Send + Sync {
    /// Resolves `service`, constructing it on first use.
    ///
    /// For a concrete type the result holds an `Arc<T>`; for a trait object
    /// `dyn I` it holds an `Arc<Arc<dyn I>>`.
    fn resolve_any(&self, service: ServiceType) -> DiResult<AnyArc>;

    /// Resolves the service registered under `name`.
    fn resolve_named(&self, name: &str) -> DiResult<AnyArc>;

    /// Resolves every non-abstract service tagged `tag`, in registration
    /// order, optionally viewed as the interface `view`.
    fn resolve_tagged(&self, tag: &str, view: Option<ServiceType>) -> DiResult<Vec<AnyArc>>;
}

/// Typed resolution on top of [`ResolverCore`].
///
/// # Examples
///
/// ```
/// use ferrous_container::{
///     Arguments, Autowire, BoxError, Parameter, Resolver, ServiceContainer, ServiceDefinition,
///     Settings,
/// };
/// use std::sync::Arc;
///
/// struct Logger;
/// struct Service {
///     logger: Arc<Logger>,
/// }
///
/// impl Autowire for Logger {
///     fn construct(_: &Arguments) -> Result<Self, BoxError> {
///         Ok(Logger)
///     }
/// }
///
/// impl Autowire for Service {
///     fn parameters() -> Vec<Parameter> {
///         vec![Parameter::of::<Logger>("logger")]
///     }
///     fn construct(args: &Arguments) -> Result<Self, BoxError> {
///         Ok(Service { logger: args.get("logger")? })
///     }
/// }
///
/// let container = ServiceContainer::builder(Settings::without_cache())
///     .register(ServiceDefinition::of::<Logger>())
///     .register(ServiceDefinition::of::<Service>())
///     .build()?;
///
/// let service = container.get::<Service>()?;
/// let logger = container.get::<Logger>()?;
/// assert!(Arc::ptr_eq(&service.logger, &logger));
/// # Ok::<(), ferrous_container::DiError>(())
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves the concrete service `T`.
    fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let service = ServiceType::of::<T>();
        let any = self.resolve_any(service)?;
        downcast::<T>(&any, || service.name().to_string())
    }

    /// Resolves the single implementation of the trait object `I`.
    ///
    /// Fails with [`DiError::AmbiguousDependency`] when several
    /// implementations are registered and none is primary.
    fn get_trait<I: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<I>> {
        let service = ServiceType::of::<I>();
        let any = self.resolve_any(service)?;
        downcast_trait::<I>(&any, || service.name().to_string())
    }

    /// Resolves a service by alias or short type name.
    fn get_by_name(&self, name: &str) -> DiResult<AnyArc> {
        self.resolve_named(name)
    }

    /// Resolves a service by name and downcasts it to `T`.
    fn get_by_name_as<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        let any = self.resolve_named(name)?;
        downcast::<T>(&any, || format!("service `{name}`"))
    }

    /// Resolves every service tagged `tag`.
    fn get_all_by_tag(&self, tag: &str) -> DiResult<Vec<AnyArc>> {
        self.resolve_tagged(tag, None)
    }

    /// Resolves every service tagged `tag` as the trait object `I`.
    ///
    /// Every tagged service must implement `I`; otherwise the call fails with
    /// [`DiError::TypeMismatch`].
    fn get_tagged<I: ?Sized + Send + Sync + 'static>(&self, tag: &str) -> DiResult<Vec<Arc<I>>> {
        let view = ServiceType::of::<I>();
        self.resolve_tagged(tag, Some(view))?
            .iter()
            .map(|any| downcast_trait::<I>(any, || format!("service tagged `{tag}`")))
            .collect()
    }

    /// Like [`get`](Self::get), but `Ok(None)` when no service of type `T`
    /// exists.
    fn get_optional<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.get::<T>() {
            Ok(service) => Ok(Some(service)),
            Err(DiError::ServiceNotFound(name)) if name == std::any::type_name::<T>() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}
