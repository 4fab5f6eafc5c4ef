//! Persistent snapshot of discovered service definitions.
//!
//! Scanning modules is the expensive part of startup, so the result of
//! discovery (definitions, never instances) is written to disk and reused on
//! the next start while it stays valid. Every failure here degrades to "no
//! cache": nothing in this module returns an error.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::catalog::TypeCatalog;
use crate::definition::ServiceDefinition;
use crate::error::{DiError, DiResult};
use crate::registry::ServiceRegistry;
use crate::settings::{AppEnv, Settings};

/// Snapshot format version. Snapshots with any other version are ignored.
pub const CACHE_FORMAT_VERSION: &str = "1";

/// Which snapshot file is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheVariant {
    /// Short-lived snapshot, expires after the configured TTL
    Development,
    /// Snapshot without expiry; only source changes invalidate it
    Production,
}

impl CacheVariant {
    pub fn for_env(env: AppEnv) -> Self {
        match env {
            AppEnv::Dev => CacheVariant::Development,
            AppEnv::Prod => CacheVariant::Production,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            CacheVariant::Development => "services.dev.json",
            CacheVariant::Production => "services.prod.json",
        }
    }
}

/// Cached record of one definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedService {
    /// Identity path of the implementation type
    pub path: String,
    pub public: bool,
    pub autowire: bool,
    pub tags: Vec<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// The definition carried a factory, arguments or method calls
    #[serde(default)]
    pub customized: bool,
}

impl CachedService {
    fn from_definition(definition: &ServiceDefinition) -> Self {
        Self {
            path: definition.path().to_string(),
            public: definition.is_public(),
            autowire: definition.is_autowire(),
            tags: definition.tags().to_vec(),
            module: definition.module().map(str::to_string),
            aliases: definition.aliases().to_vec(),
            primary: definition.is_primary(),
            synthetic: definition.is_synthetic(),
            is_abstract: definition.is_abstract(),
            customized: definition.is_customized(),
        }
    }

    fn rehydrate(&self, catalog: &TypeCatalog) -> DiResult<ServiceDefinition> {
        if self.customized {
            return Err(DiError::InvalidServiceDefinition(format!(
                "{} has a factory, arguments or method calls and cannot be restored",
                self.path
            )));
        }
        let handle = catalog
            .resolve_path(&self.path)
            .ok_or_else(|| DiError::ServiceNotFound(self.path.clone()))?;

        let mut definition = ServiceDefinition::new(handle)
            .with_public(self.public)?
            .with_autowire(self.autowire)?
            .with_tags(self.tags.iter().cloned())?
            .with_primary(self.primary)?
            .with_synthetic(self.synthetic)?
            .with_abstract(self.is_abstract)?;
        for alias in &self.aliases {
            definition = definition.with_alias(alias.clone())?;
        }
        if let Some(module) = &self.module {
            definition = definition.with_module(module.clone())?;
        }
        Ok(definition)
    }
}

/// Serialized discovery result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: String,
    /// Wall-clock seconds when the snapshot was written
    pub timestamp: f64,
    /// Wall-clock seconds when the scan producing it started
    pub scan_timestamp: f64,
    /// Modules scanned to produce the snapshot
    #[serde(default)]
    pub modules: Vec<String>,
    pub services: Vec<CachedService>,
}

impl CacheSnapshot {
    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scan_timestamp(mut self, scan_timestamp: f64) -> Self {
        self.scan_timestamp = scan_timestamp;
        self
    }
}

/// Current wall-clock time in fractional seconds.
pub fn now_seconds() -> f64 {
    to_seconds(Utc::now())
}

fn to_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

fn mtime_seconds(path: &Path) -> Option<f64> {
    let modified: SystemTime = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(to_seconds(DateTime::<Utc>::from(modified)))
}

/// Reads, validates and writes discovery snapshots.
#[derive(Debug, Clone)]
pub struct ServiceCacheManager {
    dir: PathBuf,
    variant: CacheVariant,
    enabled: bool,
    dev_ttl: Duration,
    tracked: Vec<PathBuf>,
}

impl ServiceCacheManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            dir: settings.cache_dir.clone(),
            variant: CacheVariant::for_env(settings.app_env),
            enabled: settings.cache_enabled,
            dev_ttl: settings.dev_cache_ttl(),
            tracked: Vec::new(),
        }
    }

    /// Adds files whose modification invalidates the snapshot.
    pub fn track_sources<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        for path in paths {
            if !self.tracked.contains(&path) {
                self.tracked.push(path);
            }
        }
    }

    pub fn tracked_sources(&self) -> &[PathBuf] {
        &self.tracked
    }

    pub fn variant(&self) -> CacheVariant {
        self.variant
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the active snapshot file.
    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(self.variant.file_name())
    }

    /// Whether `snapshot` may be used instead of scanning.
    pub fn is_cache_valid(&self, snapshot: &CacheSnapshot) -> bool {
        if snapshot.version != CACHE_FORMAT_VERSION {
            debug!(version = %snapshot.version, "cache version mismatch");
            return false;
        }

        let now = now_seconds();
        if snapshot.timestamp > now {
            debug!(timestamp = snapshot.timestamp, "cache timestamp is in the future");
            return false;
        }
        if self.variant == CacheVariant::Development
            && now - snapshot.timestamp > self.dev_ttl.as_secs_f64()
        {
            debug!(age = now - snapshot.timestamp, "development cache expired");
            return false;
        }

        for path in &self.tracked {
            match mtime_seconds(path) {
                Some(modified) if modified > snapshot.scan_timestamp => {
                    debug!(path = %path.display(), "tracked source changed since scan");
                    return false;
                }
                Some(_) => {}
                None => debug!(path = %path.display(), "tracked source not readable, ignored"),
            }
        }
        true
    }

    /// Reads the active snapshot. Any I/O or parse failure yields `None`.
    pub fn load_cache(&self) -> Option<CacheSnapshot> {
        if !self.enabled {
            return None;
        }
        let path = self.cache_path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no service cache");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable service cache ignored");
                None
            }
        }
    }

    /// Writes `snapshot` to the active file. Failures are logged, not returned.
    pub fn save_cache(&self, snapshot: &CacheSnapshot) -> bool {
        if !self.enabled {
            return false;
        }
        let path = self.cache_path();
        match self.write_atomically(&path, snapshot) {
            Ok(()) => {
                debug!(path = %path.display(), services = snapshot.services.len(), "service cache written");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write service cache");
                false
            }
        }
    }

    fn write_atomically(&self, path: &Path, snapshot: &CacheSnapshot) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut file, snapshot)?;
        file.persist(path).map(drop).map_err(|e| e.error)
    }

    /// Serializes every definition in `registry`.
    pub fn create_cache_snapshot(&self, registry: &ServiceRegistry) -> CacheSnapshot {
        let now = now_seconds();
        let mut modules = BTreeSet::new();
        let services = registry
            .definitions()
            .map(|definition| {
                if let Some(module) = definition.module() {
                    modules.insert(module.to_string());
                }
                CachedService::from_definition(definition)
            })
            .collect();
        CacheSnapshot {
            version: CACHE_FORMAT_VERSION.to_string(),
            timestamp: now,
            scan_timestamp: now,
            modules: modules.into_iter().collect(),
            services,
        }
    }

    /// Registers the snapshot's definitions into `registry`.
    ///
    /// Either every record is restored or none is: the registry is left
    /// untouched and `false` is returned when any record cannot be resolved
    /// through `catalog` or would be rejected by the registry.
    pub fn load_services_from_cache(
        &self,
        snapshot: &CacheSnapshot,
        catalog: &TypeCatalog,
        registry: &mut ServiceRegistry,
        scanned_modules: &mut BTreeSet<String>,
    ) -> bool {
        let mut definitions = Vec::with_capacity(snapshot.services.len());
        for record in &snapshot.services {
            match record.rehydrate(catalog) {
                Ok(definition) => definitions.push(definition),
                Err(e) => {
                    info!(service = %record.path, error = %e, "cache entry cannot be restored, discarding cache");
                    return false;
                }
            }
        }

        if registry.is_frozen() && !definitions.is_empty() {
            info!("registry frozen, discarding cache");
            return false;
        }
        let mut seen = HashSet::new();
        for definition in &definitions {
            let id = definition.service_type().id();
            let duplicate = !seen.insert(id) || registry.contains(id);
            if duplicate && !registry.allows_override() {
                info!(service = definition.path(), "duplicate cache entry, discarding cache");
                return false;
            }
            if let Err(e) = definition.validate() {
                info!(service = definition.path(), error = %e, "invalid cache entry, discarding cache");
                return false;
            }
        }

        for definition in definitions {
            if let Err(e) = registry.register_definition(definition) {
                warn!(error = %e, "cache registration failed after validation");
                return false;
            }
        }
        scanned_modules.extend(snapshot.modules.iter().cloned());
        true
    }

    /// Deletes both snapshot variants. Returns the number of files removed.
    pub fn clear_cache(&self) -> usize {
        [CacheVariant::Development, CacheVariant::Production]
            .into_iter()
            .map(|variant| self.dir.join(variant.file_name()))
            .filter(|path| match fs::remove_file(path) {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove service cache");
                    false
                }
            })
            .count()
    }
}
