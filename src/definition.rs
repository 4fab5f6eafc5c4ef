//! Service definitions.
//!
//! A [`ServiceDefinition`] describes how one service is built. Definitions are
//! values: every `with_*` call returns a new definition and leaves the original
//! unchanged. Once [frozen](ServiceDefinition::freeze), which the registry does
//! on registration, the `with_*` methods refuse to derive from it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::container::ResolverContext;
use crate::error::{BoxError, DiError, DiResult};
use crate::implementation::{AnyArc, Argument, Arguments, Autowire, TypeHandle};
use crate::key::ServiceType;

/// Factory used in place of the implementation's constructor.
pub type Factory =
    Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> Result<AnyArc, BoxError> + Send + Sync>;

type InvokeFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &Arguments) -> Result<(), BoxError> + Send + Sync>;

/// A method invoked on a freshly built instance, before it is cached.
///
/// ```rust
/// use ferrous_container::{Argument, MethodCall};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct Pool {
///     size: AtomicUsize,
/// }
///
/// let call = MethodCall::new::<Pool, _>("resize", vec![Argument::value(16usize)], |pool, args| {
///     pool.size.store(*args.at::<usize>(0)?, Ordering::SeqCst);
///     Ok(())
/// });
/// assert_eq!(call.name(), "resize");
/// assert_eq!(call.arguments().len(), 1);
/// ```
#[derive(Clone)]
pub struct MethodCall {
    name: String,
    target: ServiceType,
    arguments: Vec<Argument>,
    invoke: InvokeFn,
}

impl MethodCall {
    pub fn new<T, F>(name: impl Into<String>, arguments: Vec<Argument>, call: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &Arguments) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        let invoke = move |instance: &(dyn Any + Send + Sync), args: &Arguments| -> Result<(), BoxError> {
            let target = instance.downcast_ref::<T>().ok_or_else(|| {
                DiError::TypeMismatch(format!(
                    "method `{method}` expects a {}",
                    std::any::type_name::<T>()
                ))
            })?;
            call(target, args)
        };
        Self {
            name,
            target: ServiceType::of::<T>(),
            arguments,
            invoke: Arc::new(invoke),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn target(&self) -> ServiceType {
        self.target
    }

    pub(crate) fn invoke(&self, instance: &AnyArc, args: &Arguments) -> Result<(), BoxError> {
        (self.invoke)(instance.as_ref(), args)
    }
}

impl fmt::Debug for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCall")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// Describes how to build one registrable service.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{Arguments, Autowire, BoxError, ServiceDefinition, DiError};
///
/// struct UserRepository;
///
/// impl Autowire for UserRepository {
///     fn construct(_: &Arguments) -> Result<Self, BoxError> {
///         Ok(UserRepository)
///     }
/// }
///
/// let base = ServiceDefinition::of::<UserRepository>();
/// let tagged = base.with_tag("repository").unwrap();
/// assert!(!base.has_tag("repository"));
/// assert!(tagged.has_tag("repository"));
///
/// let frozen = tagged.freeze().freeze();
/// assert!(frozen.is_frozen());
/// assert!(matches!(frozen.with_tag("other"), Err(DiError::InvalidServiceDefinition(_))));
/// ```
#[derive(Clone)]
pub struct ServiceDefinition {
    handle: TypeHandle,
    public: bool,
    tags: Vec<String>,
    autowire: bool,
    factory: Option<Factory>,
    arguments: Option<Vec<Argument>>,
    method_calls: Vec<MethodCall>,
    synthetic: bool,
    is_abstract: bool,
    primary: bool,
    aliases: Vec<String>,
    module: Option<String>,
    frozen: bool,
}

impl ServiceDefinition {
    pub fn new(handle: TypeHandle) -> Self {
        let is_abstract = handle.is_abstract();
        Self {
            handle,
            public: true,
            tags: Vec::new(),
            autowire: true,
            factory: None,
            arguments: None,
            method_calls: Vec::new(),
            synthetic: false,
            is_abstract,
            primary: false,
            aliases: Vec::new(),
            module: None,
            frozen: false,
        }
    }

    /// Definition built from the [`Autowire`] implementation of `T`.
    pub fn of<T: Autowire>() -> Self {
        Self::new(TypeHandle::of::<T>())
    }

    /// Synthetic definition: the instance of `T` must be set on the container.
    pub fn synthetic_of<T: Send + Sync + 'static>() -> Self {
        let mut definition = Self::new(TypeHandle::external::<T>());
        definition.synthetic = true;
        definition
    }

    /// Abstract definition of the interface `I`.
    pub fn interface<I: ?Sized + 'static>() -> Self {
        Self::new(TypeHandle::interface::<I>())
    }

    fn derive(&self) -> DiResult<Self> {
        if self.frozen {
            return Err(DiError::InvalidServiceDefinition(format!(
                "definition of {} is frozen and cannot be modified",
                self.handle.path()
            )));
        }
        Ok(self.clone())
    }

    pub fn with_tag(&self, tag: impl Into<String>) -> DiResult<Self> {
        let mut next = self.derive()?;
        let tag = tag.into();
        if !next.tags.contains(&tag) {
            next.tags.push(tag);
        }
        Ok(next)
    }

    pub fn with_tags<I, S>(&self, tags: I) -> DiResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.derive()?;
        for tag in tags {
            let tag = tag.into();
            if !next.tags.contains(&tag) {
                next.tags.push(tag);
            }
        }
        Ok(next)
    }

    pub fn with_public(&self, public: bool) -> DiResult<Self> {
        let mut next = self.derive()?;
        next.public = public;
        Ok(next)
    }

    pub fn with_autowire(&self, autowire: bool) -> DiResult<Self> {
        let mut next = self.derive()?;
        next.autowire = autowire;
        Ok(next)
    }

    /// Replaces direct construction with `factory`. `T` must be the
    /// implementation type.
    pub fn with_factory<T, F>(&self, factory: F) -> DiResult<Self>
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&ResolverContext<'a>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let mut next = self.derive()?;
        next.expect_target::<T>("factory")?;
        next.factory = Some(Arc::new(move |ctx: &ResolverContext<'_>| {
            factory(ctx).map(|value| Arc::new(value) as AnyArc)
        }));
        Ok(next)
    }

    /// Explicit constructor arguments, bound to parameters by position.
    pub fn with_arguments(&self, arguments: Vec<Argument>) -> DiResult<Self> {
        let mut next = self.derive()?;
        next.arguments = Some(arguments);
        Ok(next)
    }

    pub fn with_method_call(&self, call: MethodCall) -> DiResult<Self> {
        let mut next = self.derive()?;
        if call.target() != next.handle.service_type() {
            return Err(DiError::InvalidServiceDefinition(format!(
                "method `{}` targets {} but the definition implements {}",
                call.name(),
                call.target().name(),
                next.handle.path()
            )));
        }
        next.method_calls.push(call);
        Ok(next)
    }

    pub fn with_synthetic(&self, synthetic: bool) -> DiResult<Self> {
        let mut next = self.derive()?;
        next.synthetic = synthetic;
        Ok(next)
    }

    pub fn with_abstract(&self, is_abstract: bool) -> DiResult<Self> {
        let mut next = self.derive()?;
        next.is_abstract = is_abstract;
        Ok(next)
    }

    /// Marks the definition as the preferred implementation of its interfaces.
    pub fn with_primary(&self, primary: bool) -> DiResult<Self> {
        let mut next = self.derive()?;
        next.primary = primary;
        Ok(next)
    }

    /// Extra name the registry indexes for this definition.
    pub fn with_alias(&self, alias: impl Into<String>) -> DiResult<Self> {
        let mut next = self.derive()?;
        let alias = alias.into();
        if !next.aliases.contains(&alias) {
            next.aliases.push(alias);
        }
        Ok(next)
    }

    pub fn with_module(&self, module: impl Into<String>) -> DiResult<Self> {
        let mut next = self.derive()?;
        next.module = Some(module.into());
        Ok(next)
    }

    /// Marks the definition immutable. Idempotent.
    pub fn freeze(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn expect_target<T: 'static>(&self, what: &str) -> DiResult<()> {
        if self.handle.service_type().is::<T>() {
            Ok(())
        } else {
            Err(DiError::InvalidServiceDefinition(format!(
                "{what} builds {} but the definition implements {}",
                std::any::type_name::<T>(),
                self.handle.path()
            )))
        }
    }

    /// Checks that the definition can be registered.
    pub(crate) fn validate(&self) -> DiResult<()> {
        let path = self.handle.path();
        if self.is_abstract && self.factory.is_some() {
            return Err(DiError::InvalidServiceDefinition(format!(
                "abstract service {path} cannot have a factory"
            )));
        }
        if self.synthetic && self.factory.is_some() {
            return Err(DiError::InvalidServiceDefinition(format!(
                "synthetic service {path} cannot have a factory"
            )));
        }
        if !self.is_abstract && !self.synthetic {
            if self.factory.is_none() && !self.handle.is_constructible() {
                return Err(DiError::InvalidServiceDefinition(format!(
                    "{path} has neither a constructor nor a factory"
                )));
            }
            if let (None, Some(arguments)) = (&self.factory, &self.arguments) {
                let declared = self.handle.parameters().len();
                if arguments.len() > declared {
                    return Err(DiError::InvalidServiceDefinition(format!(
                        "{path} declares {declared} parameters but {} arguments were given",
                        arguments.len()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn handle(&self) -> &TypeHandle {
        &self.handle
    }

    pub fn service_type(&self) -> ServiceType {
        self.handle.service_type()
    }

    /// Identity path of the implementation type.
    pub fn path(&self) -> &'static str {
        self.handle.path()
    }

    pub fn short_name(&self) -> &'static str {
        self.handle.short_name()
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_autowire(&self) -> bool {
        self.autowire
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    pub(crate) fn factory(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }

    pub fn arguments(&self) -> Option<&[Argument]> {
        self.arguments.as_deref()
    }

    pub fn method_calls(&self) -> &[MethodCall] {
        &self.method_calls
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Always true: services are built on first use.
    pub fn is_lazy(&self) -> bool {
        true
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Whether the definition carries closures or values a cache snapshot
    /// cannot record.
    pub fn is_customized(&self) -> bool {
        self.factory.is_some() || self.arguments.is_some() || !self.method_calls.is_empty()
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("implementation", &self.handle.path())
            .field("public", &self.public)
            .field("tags", &self.tags)
            .field("autowire", &self.autowire)
            .field("factory", &self.factory.is_some())
            .field("arguments", &self.arguments)
            .field("method_calls", &self.method_calls)
            .field("synthetic", &self.synthetic)
            .field("abstract", &self.is_abstract)
            .field("primary", &self.primary)
            .field("aliases", &self.aliases)
            .field("module", &self.module)
            .field("frozen", &self.frozen)
            .finish()
    }
}
