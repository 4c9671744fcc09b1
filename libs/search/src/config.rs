//! Static and runtime configuration.
//!
//! Static limits come from a layered file + environment load; runtime
//! overrides go through `ConfigService`, the injected replacement for an
//! ambient global configuration map. Every write bumps a version counter so
//! callers can detect that the configuration they read has moved on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{Error, Result};

/// Static search limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result limit applied when the caller does not set one.
    pub default_limit: usize,
    /// Hard ceiling on the result limit.
    pub max_limit: usize,
    /// Frontier rounds before an under/over closure expansion is truncated.
    pub max_closure_depth: usize,
    /// Entries kept in the closure expansion cache.
    pub closure_cache_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 1000,
            max_closure_depth: 50,
            closure_cache_size: 256,
        }
    }
}

impl SearchConfig {
    /// Load from `stockpile.toml` (optional) and `STOCKPILE_*` environment
    /// variables, on top of the defaults.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("stockpile").required(false))
            .add_source(config::Environment::with_prefix("STOCKPILE").separator("__"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        match settings.try_deserialize::<SearchConfig>() {
            Ok(config) => Ok(config),
            // An empty source set deserializes to nothing; fall back to defaults.
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(Error::Config(e.to_string())),
        }
    }
}

/// Typed keys for runtime-overridable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    SearchDefaultLimit,
    SearchMaxLimit,
    HierarchyMaxDepth,
    HierarchyCacheSize,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchDefaultLimit => "search.default_limit",
            Self::SearchMaxLimit => "search.max_limit",
            Self::HierarchyMaxDepth => "hierarchy.max_depth",
            Self::HierarchyCacheSize => "hierarchy.cache_size",
        }
    }
}

/// Runtime configuration with versioned accessors.
///
/// Reads fall back to the static configuration when no override is set.
#[derive(Debug)]
pub struct ConfigService {
    static_config: SearchConfig,
    overrides: RwLock<HashMap<String, JsonValue>>,
    version: AtomicU64,
}

impl ConfigService {
    pub fn new(static_config: SearchConfig) -> Self {
        Self {
            static_config,
            overrides: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
        }
    }

    /// Monotonic counter, bumped by every write.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn get<T: DeserializeOwned>(&self, key: ConfigKey) -> T {
        {
            let overrides = self.overrides.read().unwrap();
            if let Some(value) = overrides.get(key.as_str()) {
                if let Ok(parsed) = serde_json::from_value(value.clone()) {
                    return parsed;
                }
            }
        }
        serde_json::from_value(self.static_default(key))
            .expect("static default should be valid")
    }

    pub fn set(&self, key: ConfigKey, value: JsonValue) {
        self.overrides
            .write()
            .unwrap()
            .insert(key.as_str().to_string(), value);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Remove an override (reset to the static default).
    pub fn remove(&self, key: ConfigKey) {
        self.overrides.write().unwrap().remove(key.as_str());
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn clear(&self) {
        self.overrides.write().unwrap().clear();
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    fn static_default(&self, key: ConfigKey) -> JsonValue {
        match key {
            ConfigKey::SearchDefaultLimit => self.static_config.default_limit.into(),
            ConfigKey::SearchMaxLimit => self.static_config.max_limit.into(),
            ConfigKey::HierarchyMaxDepth => self.static_config.max_closure_depth.into(),
            ConfigKey::HierarchyCacheSize => self.static_config.closure_cache_size.into(),
        }
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_fall_back_to_static_defaults() {
        let service = ConfigService::default();
        let limit: usize = service.get(ConfigKey::SearchDefaultLimit);
        assert_eq!(limit, 20);
        assert_eq!(service.version(), 0);
    }

    #[test]
    fn overrides_are_versioned() {
        let service = ConfigService::default();
        service.set(ConfigKey::SearchDefaultLimit, json!(50));
        assert_eq!(service.version(), 1);
        let limit: usize = service.get(ConfigKey::SearchDefaultLimit);
        assert_eq!(limit, 50);

        service.remove(ConfigKey::SearchDefaultLimit);
        assert_eq!(service.version(), 2);
        let limit: usize = service.get(ConfigKey::SearchDefaultLimit);
        assert_eq!(limit, 20);
    }

    #[test]
    fn malformed_override_falls_back_to_default() {
        let service = ConfigService::default();
        service.set(ConfigKey::HierarchyMaxDepth, json!("not a number"));
        let depth: usize = service.get(ConfigKey::HierarchyMaxDepth);
        assert_eq!(depth, 50);
    }
}
