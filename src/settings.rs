//! Container settings.
//!
//! Values are merged, later sources overriding earlier ones:
//! 1. `Settings::default()`
//! 2. a TOML file, when one is given and exists
//! 3. environment variables prefixed with `FERROUS_CONTAINER_`
//!    (e.g. `FERROUS_CONTAINER_APP_ENV=prod`)

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DiError, DiResult};

/// Environment variable prefix read by [`SettingsLoader`].
pub const ENV_PREFIX: &str = "FERROUS_CONTAINER_";

/// Application mode; governs cache freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    #[serde(alias = "development")]
    Dev,
    #[serde(alias = "production")]
    Prod,
}

impl AppEnv {
    pub fn is_dev(self) -> bool {
        matches!(self, AppEnv::Dev)
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppEnv::Dev => "dev",
            AppEnv::Prod => "prod",
        })
    }
}

/// Settings consumed by the container and its cache manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_env: AppEnv,
    /// Read and write discovery snapshots
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
    /// Lifetime of the development snapshot, in seconds
    pub dev_cache_ttl_secs: u64,
    /// Let a second registration of a type replace the first
    pub allow_override: bool,
    /// Freeze the registry once bootstrap completes
    pub freeze_after_boot: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_env: AppEnv::Dev,
            cache_enabled: true,
            cache_dir: PathBuf::from("var/cache/container"),
            dev_cache_ttl_secs: 300,
            allow_override: false,
            freeze_after_boot: false,
        }
    }
}

impl Settings {
    /// Settings with caching turned off, handy for tests and tools.
    pub fn without_cache() -> Self {
        Self {
            cache_enabled: false,
            ..Self::default()
        }
    }

    pub fn dev_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dev_cache_ttl_secs)
    }

    pub fn validate(&self) -> DiResult<()> {
        if self.dev_cache_ttl_secs == 0 {
            return Err(DiError::Configuration(
                "dev_cache_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.cache_enabled && self.cache_dir.as_os_str().is_empty() {
            return Err(DiError::Configuration(
                "cache_dir cannot be empty when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads [`Settings`] through figment.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(file) = &self.file {
            if file.exists() {
                debug!(path = %file.display(), "loading container settings file");
                figment = figment.merge(Toml::file(file));
            } else {
                debug!(path = %file.display(), "container settings file not found");
            }
        }
        figment.merge(Env::prefixed(&self.env_prefix))
    }

    pub fn load(&self) -> DiResult<Settings> {
        let settings: Settings = self
            .figment()
            .extract()
            .map_err(|e| DiError::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}
