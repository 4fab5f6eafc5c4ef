//! Error types for the service container.

use thiserror::Error;

/// Boxed error returned by constructors, factories and method calls.
///
/// Anything that converts into a `Box<dyn Error>` can be propagated with `?`
/// from inside a constructor, including a [`DiError`] produced by a nested
/// resolution. The container recovers `DiError` values unchanged and wraps
/// everything else in [`DiError::ServiceInstantiationFailed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Service container errors
///
/// Every failure the container can report has its own variant so calling code
/// can branch on the cause instead of parsing messages.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{DiError, ErrorKind};
///
/// let err = DiError::CircularDependencyDetected {
///     chain: vec!["app::A", "app::B", "app::A"],
/// };
/// assert_eq!(err.kind(), ErrorKind::CircularDependency);
/// assert_eq!(err.to_string(), "circular dependency detected: app::A -> app::B -> app::A");
/// ```
#[derive(Debug, Error)]
pub enum DiError {
    /// No definition matches the requested type or name
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// The type being resolved is already on the resolution stack
    #[error("circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependencyDetected {
        /// Stack contents followed by the repeated type
        chain: Vec<&'static str>,
    },

    /// The constructor, factory or a method call returned an error
    #[error("failed to instantiate service {service}: {source}")]
    ServiceInstantiationFailed {
        service: &'static str,
        #[source]
        source: BoxError,
    },

    /// A definition failed validation or a frozen definition was modified
    #[error("invalid service definition: {0}")]
    InvalidServiceDefinition(String),

    /// Registration attempted after the registry was frozen
    #[error("service registry is frozen, cannot register {0}")]
    RegistryFrozen(&'static str),

    /// The definition describes an interface or abstract type
    #[error("cannot instantiate abstract service {0}")]
    AbstractInstantiation(&'static str),

    /// A constructor parameter has no matching service and no default
    #[error("unresolvable dependency: parameter `{parameter}` of {service} expects {expected}")]
    UnresolvableDependency {
        service: &'static str,
        parameter: String,
        expected: &'static str,
    },

    /// A definition for the type exists and overriding is disabled
    #[error("service {0} is already registered")]
    DuplicateService(&'static str),

    /// Several implementations satisfy an interface and none is primary
    #[error("ambiguous dependency {interface}: candidates {}", .candidates.join(", "))]
    AmbiguousDependency {
        interface: &'static str,
        candidates: Vec<&'static str>,
    },

    /// A resolved value did not have the requested type
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Maximum resolution depth exceeded
    #[error("max resolution depth {0} exceeded")]
    DepthExceeded(usize),

    /// Settings could not be loaded or failed validation
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Cause of a [`DiError`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ServiceNotFound,
    CircularDependency,
    InstantiationFailed,
    InvalidDefinition,
    RegistryFrozen,
    AbstractInstantiation,
    UnresolvableDependency,
    DuplicateService,
    AmbiguousDependency,
    TypeMismatch,
    DepthExceeded,
    Configuration,
}

impl DiError {
    /// Returns the cause of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiError::ServiceNotFound(_) => ErrorKind::ServiceNotFound,
            DiError::CircularDependencyDetected { .. } => ErrorKind::CircularDependency,
            DiError::ServiceInstantiationFailed { .. } => ErrorKind::InstantiationFailed,
            DiError::InvalidServiceDefinition(_) => ErrorKind::InvalidDefinition,
            DiError::RegistryFrozen(_) => ErrorKind::RegistryFrozen,
            DiError::AbstractInstantiation(_) => ErrorKind::AbstractInstantiation,
            DiError::UnresolvableDependency { .. } => ErrorKind::UnresolvableDependency,
            DiError::DuplicateService(_) => ErrorKind::DuplicateService,
            DiError::AmbiguousDependency { .. } => ErrorKind::AmbiguousDependency,
            DiError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            DiError::DepthExceeded(_) => ErrorKind::DepthExceeded,
            DiError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// The dependency chain of a circular dependency error, if any.
    pub fn chain(&self) -> Option<&[&'static str]> {
        match self {
            DiError::CircularDependencyDetected { chain } => Some(chain),
            _ => None,
        }
    }

    /// Wraps an arbitrary constructor error.
    ///
    /// A boxed `DiError` is unwrapped and returned as-is so resolution errors
    /// raised by nested lookups keep their kind.
    pub(crate) fn from_construction(service: &'static str, error: BoxError) -> Self {
        match error.downcast::<DiError>() {
            Ok(inner) => *inner,
            Err(source) => DiError::ServiceInstantiationFailed { service, source },
        }
    }
}

/// Result type for container operations
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{DiResult, DiError};
///
/// fn lookup(name: &str) -> DiResult<()> {
///     Err(DiError::ServiceNotFound(name.to_string()))
/// }
///
/// assert!(lookup("mailer").is_err());
/// ```
pub type DiResult<T> = Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_errors_keep_resolution_kind() {
        let boxed: BoxError = Box::new(DiError::ServiceNotFound("Mailer".into()));
        let err = DiError::from_construction("app::Service", boxed);
        assert_eq!(err.kind(), ErrorKind::ServiceNotFound);
    }

    #[test]
    fn foreign_errors_are_wrapped() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = DiError::from_construction("app::Store", Box::new(io));
        match err {
            DiError::ServiceInstantiationFailed { service, source } => {
                assert_eq!(service, "app::Store");
                assert_eq!(source.to_string(), "disk gone");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn circular_message_lists_chain() {
        let err = DiError::CircularDependencyDetected { chain: vec!["A", "B", "A"] };
        assert_eq!(err.chain(), Some(&["A", "B", "A"][..]));
        assert!(err.to_string().contains("A -> B -> A"));
    }
}
