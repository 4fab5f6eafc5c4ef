//! Service type identity.

use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a service type.
///
/// Pairs the `TypeId` used for lookups with the `std::any::type_name` used as
/// the type's identity path in diagnostics, aliases and cache snapshots.
/// Works for concrete types as well as trait objects (`dyn Trait`).
///
/// # Examples
///
/// ```rust
/// use ferrous_container::ServiceType;
///
/// trait Mailer: Send + Sync {}
/// struct SmtpMailer;
///
/// let smtp = ServiceType::of::<SmtpMailer>();
/// assert_eq!(smtp.short_name(), "SmtpMailer");
/// assert!(smtp.name().ends_with("::SmtpMailer"));
///
/// let mailer = ServiceType::of::<dyn Mailer>();
/// assert_eq!(mailer.short_name(), "Mailer");
/// assert_ne!(smtp, mailer);
/// ```
#[derive(Clone, Copy)]
pub struct ServiceType {
    id: TypeId,
    name: &'static str,
}

impl ServiceType {
    /// Identity of `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully-qualified type path.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, without generics or `dyn`.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }

    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

// TypeId-only comparison; the name is diagnostic
impl PartialEq for ServiceType {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ServiceType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name).then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceType({})", self.name)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Short class-style name of a type path.
///
/// ```rust
/// use ferrous_container::short_type_name;
///
/// assert_eq!(short_type_name("app::repo::UserRepository"), "UserRepository");
/// assert_eq!(short_type_name("dyn app::Mailer"), "Mailer");
/// assert_eq!(short_type_name("app::Cache<alloc::string::String>"), "Cache");
/// assert_eq!(short_type_name("u32"), "u32");
/// ```
pub fn short_type_name(name: &str) -> &str {
    let base = match name.find('<') {
        Some(pos) => &name[..pos],
        None => name,
    };
    let base = base.strip_prefix("dyn ").unwrap_or(base);
    let base = match base.find(" + ") {
        Some(pos) => &base[..pos],
        None => base,
    };
    match base.rfind("::") {
        Some(pos) => &base[pos + 2..],
        None => base,
    }
}
