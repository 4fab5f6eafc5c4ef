//! Human-readable rendering of container errors and service definitions.

use std::fmt;

use serde::Serialize;

use crate::definition::ServiceDefinition;
use crate::error::DiError;
use crate::key::short_type_name;

/// Renders `error` for a terminal, with the dependency chain and the
/// offending type spelled out.
///
/// ```rust
/// use ferrous_container::{render_error, DiError};
///
/// let err = DiError::CircularDependencyDetected {
///     chain: vec!["app::A", "app::B", "app::A"],
/// };
/// let text = render_error(&err);
/// assert!(text.contains("A -> B -> A"));
/// assert!(text.contains("app::A"));
/// ```
pub fn render_error(error: &DiError) -> String {
    let mut out = String::new();
    match error {
        DiError::CircularDependencyDetected { chain } => {
            out.push_str("Circular dependency detected\n");
            let short: Vec<&str> = chain.iter().map(|name| short_type_name(name)).collect();
            out.push_str(&format!("  chain: {}\n", short.join(" -> ")));
            if let Some(repeated) = chain.last() {
                out.push_str(&format!("  repeated: {repeated}\n"));
            }
        }
        DiError::UnresolvableDependency {
            service,
            parameter,
            expected,
        } => {
            out.push_str(&format!("Cannot resolve parameter `{parameter}` of {service}\n"));
            out.push_str(&format!("  expected: {expected}\n"));
            out.push_str("  register a service of that type or give the parameter a default\n");
        }
        DiError::AmbiguousDependency {
            interface,
            candidates,
        } => {
            out.push_str(&format!("Ambiguous dependency {interface}\n"));
            for candidate in candidates {
                out.push_str(&format!("  candidate: {candidate}\n"));
            }
            out.push_str("  mark one implementation as primary\n");
        }
        DiError::ServiceInstantiationFailed { service, source } => {
            out.push_str(&format!("Failed to instantiate {service}\n"));
            let first: &(dyn std::error::Error + 'static) = &**source;
            let mut cause = Some(first);
            while let Some(err) = cause {
                out.push_str(&format!("  caused by: {err}\n"));
                cause = err.source();
            }
        }
        other => {
            out.push_str(&other.to_string());
            out.push('\n');
        }
    }
    out
}

/// Description of one registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub path: String,
    pub short_name: String,
    pub aliases: Vec<String>,
    pub public: bool,
    pub tags: Vec<String>,
    pub autowire: bool,
    pub is_abstract: bool,
    pub synthetic: bool,
    pub primary: bool,
    pub module: Option<String>,
    /// `(name, expected type)` per constructor parameter
    pub parameters: Vec<(String, String)>,
    pub interfaces: Vec<String>,
    pub instantiated: bool,
}

impl ServiceReport {
    pub fn new(definition: &ServiceDefinition, instantiated: bool) -> Self {
        let handle = definition.handle();
        Self {
            path: definition.path().to_string(),
            short_name: definition.short_name().to_string(),
            aliases: definition.aliases().to_vec(),
            public: definition.is_public(),
            tags: definition.tags().to_vec(),
            autowire: definition.is_autowire(),
            is_abstract: definition.is_abstract(),
            synthetic: definition.is_synthetic(),
            primary: definition.is_primary(),
            module: definition.module().map(str::to_string),
            parameters: handle
                .parameters()
                .iter()
                .map(|p| (p.name().to_string(), p.service().name().to_string()))
                .collect(),
            interfaces: handle.interfaces().map(|i| i.name().to_string()).collect(),
            instantiated,
        }
    }
}

impl fmt::Display for ServiceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.short_name, self.path)?;
        writeln!(f, "  public:       {}", self.public)?;
        writeln!(f, "  autowire:     {}", self.autowire)?;
        writeln!(f, "  abstract:     {}", self.is_abstract)?;
        writeln!(f, "  synthetic:    {}", self.synthetic)?;
        writeln!(f, "  instantiated: {}", self.instantiated)?;
        if let Some(module) = &self.module {
            writeln!(f, "  module:       {module}")?;
        }
        if !self.tags.is_empty() {
            writeln!(f, "  tags:         {}", self.tags.join(", "))?;
        }
        if !self.aliases.is_empty() {
            writeln!(f, "  aliases:      {}", self.aliases.join(", "))?;
        }
        for (name, expected) in &self.parameters {
            writeln!(f, "  param {name}: {expected}")?;
        }
        for interface in &self.interfaces {
            writeln!(f, "  implements {interface}")?;
        }
        Ok(())
    }
}
