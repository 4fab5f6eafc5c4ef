//! Construction metadata for service implementations.
//!
//! A [`TypeHandle`] is what the container knows about a type it may have to
//! build: the constructor parameters it declares, how to call the constructor
//! with resolved [`Arguments`], and which trait objects the type can be viewed
//! as. Handles replace runtime inspection of constructor signatures; they are
//! written once per type, usually through the [`Autowire`] trait.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BoxError, DiError, DiResult};
use crate::key::ServiceType;

/// Type-erased shared service instance.
///
/// A concrete `T` is stored as `Arc<T>`; a trait-object view `dyn I` is stored
/// as `Arc<Arc<dyn I>>`.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type ConstructFn = Arc<dyn Fn(&Arguments) -> Result<AnyArc, BoxError> + Send + Sync>;
type DefaultFn = Arc<dyn Fn() -> AnyArc + Send + Sync>;
type UpcastFn = Arc<dyn Fn(AnyArc) -> DiResult<AnyArc> + Send + Sync>;

/// Types the container can construct from their declared parameters.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{Arguments, Autowire, BoxError, Parameter};
/// use std::sync::Arc;
///
/// struct Logger;
///
/// impl Autowire for Logger {
///     fn construct(_: &Arguments) -> Result<Self, BoxError> {
///         Ok(Logger)
///     }
/// }
///
/// struct UserService {
///     logger: Arc<Logger>,
///     page_size: Arc<usize>,
/// }
///
/// impl Autowire for UserService {
///     fn parameters() -> Vec<Parameter> {
///         vec![
///             Parameter::of::<Logger>("logger"),
///             Parameter::optional("page_size", || 50usize),
///         ]
///     }
///
///     fn construct(args: &Arguments) -> Result<Self, BoxError> {
///         Ok(UserService {
///             logger: args.get("logger")?,
///             page_size: args.get("page_size")?,
///         })
///     }
/// }
/// ```
pub trait Autowire: Sized + Send + Sync + 'static {
    /// Declared constructor parameters, in order.
    fn parameters() -> Vec<Parameter> {
        Vec::new()
    }

    /// Builds the instance from resolved arguments.
    fn construct(args: &Arguments) -> Result<Self, BoxError>;
}

/// A declared constructor parameter.
#[derive(Clone)]
pub struct Parameter {
    name: &'static str,
    service: ServiceType,
    default: Option<DefaultFn>,
}

impl Parameter {
    /// Parameter expecting the concrete service `T`, injected as `Arc<T>`.
    pub fn of<T: Send + Sync + 'static>(name: &'static str) -> Self {
        Self {
            name,
            service: ServiceType::of::<T>(),
            default: None,
        }
    }

    /// Parameter expecting any implementation of the trait object `I`.
    pub fn of_trait<I: ?Sized + Send + Sync + 'static>(name: &'static str) -> Self {
        Self {
            name,
            service: ServiceType::of::<I>(),
            default: None,
        }
    }

    /// Parameter of type `T` that falls back to `default()` when no service
    /// of that type is registered.
    pub fn optional<T, F>(name: &'static str, default: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::of::<T>(name).with_default(default)
    }

    /// Sets the fallback value. `T` must be the parameter's type.
    pub fn with_default<T, F>(mut self, default: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        debug_assert!(self.service.is::<T>(), "default value type differs from parameter type");
        self.default = Some(Arc::new(move || Arc::new(default()) as AnyArc));
        self
    }

    /// Sets the fallback value of a trait-object parameter.
    pub fn with_default_trait<I, F>(mut self, default: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<I> + Send + Sync + 'static,
    {
        debug_assert!(self.service.is::<I>(), "default value type differs from parameter type");
        self.default = Some(Arc::new(move || Arc::new(default()) as AnyArc));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type this parameter expects.
    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub(crate) fn default_value(&self) -> Option<AnyArc> {
        self.default.as_ref().map(|make| make())
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("service", &self.service.name())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// An explicit argument attached to a service definition.
///
/// Constructor arguments bind to declared parameters by position;
/// [`Argument::Autowired`] keeps the normal resolution for that position.
#[derive(Clone)]
pub enum Argument {
    /// A literal value, already in its stored representation
    Value(AnyArc),
    /// Another service, looked up by name
    Service(String),
    /// Resolve the parameter at this position as if no argument was given
    Autowired,
}

impl Argument {
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Argument::Value(Arc::new(value))
    }

    pub fn shared<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Argument::Value(value)
    }

    pub fn trait_object<I: ?Sized + Send + Sync + 'static>(value: Arc<I>) -> Self {
        Argument::Value(Arc::new(value))
    }

    pub fn service(name: impl Into<String>) -> Self {
        Argument::Service(name.into())
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(_) => f.write_str("Value(..)"),
            Argument::Service(name) => f.debug_tuple("Service").field(name).finish(),
            Argument::Autowired => f.write_str("Autowired"),
        }
    }
}

struct ResolvedArgument {
    name: Option<&'static str>,
    value: AnyArc,
}

/// Resolved arguments handed to a constructor or method call.
pub struct Arguments {
    owner: &'static str,
    entries: Vec<ResolvedArgument>,
}

impl Arguments {
    pub(crate) fn new(owner: &'static str) -> Self {
        Self { owner, entries: Vec::new() }
    }

    pub(crate) fn push(&mut self, name: Option<&'static str>, value: AnyArc) {
        self.entries.push(ResolvedArgument { name, value });
    }

    /// The concrete argument bound to parameter `name`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        let value = self.named(name)?;
        downcast::<T>(value, || format!("argument `{name}` of {}", self.owner))
    }

    /// The trait-object argument bound to parameter `name`.
    pub fn get_trait<I: ?Sized + Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<I>> {
        let value = self.named(name)?;
        downcast_trait::<I>(value, || format!("argument `{name}` of {}", self.owner))
    }

    /// The concrete argument at `index`.
    pub fn at<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        let value = self.positional(index)?;
        downcast::<T>(value, || format!("argument #{index} of {}", self.owner))
    }

    /// The trait-object argument at `index`.
    pub fn at_trait<I: ?Sized + Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<I>> {
        let value = self.positional(index)?;
        downcast_trait::<I>(value, || format!("argument #{index} of {}", self.owner))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the bound parameters, in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().filter_map(|e| e.name)
    }

    fn named(&self, name: &str) -> DiResult<&AnyArc> {
        self.entries
            .iter()
            .find(|e| e.name == Some(name))
            .map(|e| &e.value)
            .ok_or_else(|| DiError::TypeMismatch(format!("{} has no argument `{name}`", self.owner)))
    }

    fn positional(&self, index: usize) -> DiResult<&AnyArc> {
        self.entries
            .get(index)
            .map(|e| &e.value)
            .ok_or_else(|| DiError::TypeMismatch(format!("{} has no argument #{index}", self.owner)))
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("owner", &self.owner)
            .field("len", &self.entries.len())
            .finish()
    }
}

pub(crate) fn downcast<T: Send + Sync + 'static>(
    value: &AnyArc,
    what: impl FnOnce() -> String,
) -> DiResult<Arc<T>> {
    value.clone().downcast::<T>().map_err(|_| {
        DiError::TypeMismatch(format!("{} is not a {}", what(), std::any::type_name::<T>()))
    })
}

pub(crate) fn downcast_trait<I: ?Sized + Send + Sync + 'static>(
    value: &AnyArc,
    what: impl FnOnce() -> String,
) -> DiResult<Arc<I>> {
    value
        .clone()
        .downcast::<Arc<I>>()
        .map(|view| Arc::clone(&*view))
        .map_err(|_| {
            DiError::TypeMismatch(format!("{} is not a {}", what(), std::any::type_name::<I>()))
        })
}

#[derive(Clone)]
struct InterfaceBinding {
    interface: ServiceType,
    upcast: UpcastFn,
}

struct HandleInner {
    service: ServiceType,
    parameters: Vec<Parameter>,
    constructor: Option<ConstructFn>,
    interfaces: Vec<InterfaceBinding>,
    is_abstract: bool,
}

/// Handle to an implementation type: identity plus construction metadata.
///
/// Cheap to clone. Two handles are equal when they describe the same type.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{Arguments, BoxError, Parameter, TypeHandle};
/// use std::sync::Arc;
///
/// trait Mailer: Send + Sync {
///     fn send(&self, to: &str) -> bool;
/// }
///
/// struct SmtpMailer {
///     host: Arc<String>,
/// }
///
/// impl Mailer for SmtpMailer {
///     fn send(&self, _to: &str) -> bool {
///         !self.host.is_empty()
///     }
/// }
///
/// let handle = TypeHandle::builder::<SmtpMailer>()
///     .constructor(vec![Parameter::optional("host", || "localhost".to_string())], |args| {
///         Ok(SmtpMailer { host: args.get("host")? })
///     })
///     .implements::<dyn Mailer, _>(|mailer| mailer as Arc<dyn Mailer>)
///     .build();
///
/// assert!(handle.is_constructible());
/// assert!(handle.implements(&ferrous_container::ServiceType::of::<dyn Mailer>()));
/// assert_eq!(handle.parameters()[0].name(), "host");
/// ```
#[derive(Clone)]
pub struct TypeHandle {
    inner: Arc<HandleInner>,
}

impl TypeHandle {
    /// Handle for an [`Autowire`] type.
    pub fn of<T: Autowire>() -> Self {
        Self::builder::<T>().autowired().build()
    }

    /// Starts a handle for `T` with explicit construction metadata.
    pub fn builder<T: Send + Sync + 'static>() -> TypeHandleBuilder<T> {
        TypeHandleBuilder {
            parameters: Vec::new(),
            constructor: None,
            interfaces: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Handle for a type the container never constructs itself: services that
    /// are set externally or built by a definition-level factory.
    pub fn external<T: Send + Sync + 'static>() -> Self {
        Self::builder::<T>().build()
    }

    /// Handle for an interface or abstract type.
    pub fn interface<I: ?Sized + 'static>() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                service: ServiceType::of::<I>(),
                parameters: Vec::new(),
                constructor: None,
                interfaces: Vec::new(),
                is_abstract: true,
            }),
        }
    }

    pub fn service_type(&self) -> ServiceType {
        self.inner.service
    }

    /// Identity path of the type, as recorded in cache snapshots.
    pub fn path(&self) -> &'static str {
        self.inner.service.name()
    }

    pub fn short_name(&self) -> &'static str {
        self.inner.service.short_name()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.inner.parameters
    }

    pub fn is_abstract(&self) -> bool {
        self.inner.is_abstract
    }

    /// Whether the handle carries a constructor.
    pub fn is_constructible(&self) -> bool {
        self.inner.constructor.is_some()
    }

    /// Interfaces the type can be viewed as.
    pub fn interfaces(&self) -> impl Iterator<Item = ServiceType> + '_ {
        self.inner.interfaces.iter().map(|b| b.interface)
    }

    pub fn implements(&self, interface: &ServiceType) -> bool {
        self.inner.interfaces.iter().any(|b| b.interface == *interface)
    }

    pub(crate) fn construct(&self, args: &Arguments) -> Option<Result<AnyArc, BoxError>> {
        self.inner.constructor.as_ref().map(|ctor| ctor(args))
    }

    /// Converts an instance of this type into its `requested` view.
    pub(crate) fn upcast(&self, requested: ServiceType, instance: AnyArc) -> DiResult<AnyArc> {
        if requested == self.inner.service {
            return Ok(instance);
        }
        let binding = self
            .inner
            .interfaces
            .iter()
            .find(|b| b.interface == requested)
            .ok_or_else(|| {
                DiError::TypeMismatch(format!(
                    "{} does not implement {}",
                    self.inner.service.name(),
                    requested.name()
                ))
            })?;
        (binding.upcast)(instance)
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.inner.service.id()
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.service == other.inner.service
    }
}

impl Eq for TypeHandle {}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandle")
            .field("service", &self.inner.service.name())
            .field("parameters", &self.inner.parameters)
            .field("interfaces", &self.interfaces().map(|i| i.name()).collect::<Vec<_>>())
            .field("constructible", &self.is_constructible())
            .field("abstract", &self.inner.is_abstract)
            .finish()
    }
}

/// Builder for a [`TypeHandle`] of `T`.
pub struct TypeHandleBuilder<T> {
    parameters: Vec<Parameter>,
    constructor: Option<ConstructFn>,
    interfaces: Vec<InterfaceBinding>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> TypeHandleBuilder<T> {
    /// Declares the constructor and its parameters.
    pub fn constructor<F>(mut self, parameters: Vec<Parameter>, constructor: F) -> Self
    where
        F: Fn(&Arguments) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.parameters = parameters;
        self.constructor = Some(Arc::new(move |args: &Arguments| {
            constructor(args).map(|value| Arc::new(value) as AnyArc)
        }));
        self
    }

    /// Uses the [`Autowire`] implementation of `T` as constructor.
    pub fn autowired(self) -> Self
    where
        T: Autowire,
    {
        self.constructor(T::parameters(), T::construct)
    }

    /// Declares that `T` can be injected where `I` is expected.
    pub fn implements<I, F>(mut self, cast: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        let upcast = move |instance: AnyArc| -> DiResult<AnyArc> {
            let concrete = instance.downcast::<T>().map_err(|_| {
                DiError::TypeMismatch(format!("instance is not a {}", std::any::type_name::<T>()))
            })?;
            Ok(Arc::new(cast(concrete)) as AnyArc)
        };
        self.interfaces.retain(|b| !b.interface.is::<I>());
        self.interfaces.push(InterfaceBinding {
            interface: ServiceType::of::<I>(),
            upcast: Arc::new(upcast),
        });
        self
    }

    pub fn build(self) -> TypeHandle {
        TypeHandle {
            inner: Arc::new(HandleInner {
                service: ServiceType::of::<T>(),
                parameters: self.parameters,
                constructor: self.constructor,
                interfaces: self.interfaces,
                is_abstract: false,
            }),
        }
    }
}
