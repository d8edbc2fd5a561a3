//! Configuration management for hashpass.
//!
//! This module provides multi-layer configuration support with:
//! - File-based configuration (YAML)
//! - Environment variable overrides (`HASHPASS_*`)
//! - Programmatic updates
//! - Schema validation
//!
//! ## Configuration Layers
//!
//! Configuration values are resolved in this priority order:
//! 1. Environment variables
//! 2. Programmatically set values
//! 3. Values loaded from file
//! 4. Default values
//!
//! ## Example
//!
//! ```no_run
//! use hashpass_core::config::HashpassConfig;
//!
//! let config = HashpassConfig::load().unwrap();
//! println!("default source: {}", config.default_source);
//! for source in config.effective_sources() {
//!     println!("{} ({})", source.name, source.kind);
//! }
//! ```

use hashpass_types::config::{LogConfig, SourceConfig};
use hashpass_types::{HashpassError, Result, SourceKind, SourceName};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "HASHPASS_";

/// Keys that may be overridden from the environment.
const ENV_KEYS: [&str; 4] = ["store_path", "default_source", "cipher_work", "query_timeout_ms"];

/// Environment keys whose values are numbers; the rest stay strings.
const NUMERIC_ENV_KEYS: [&str; 2] = ["cipher_work", "query_timeout_ms"];

/// Default PBKDF2 work factor for the settings cipher.
pub const DEFAULT_CIPHER_WORK: u32 = 10_000;

/// Default bound on a single source query during fan-out.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;

static CONFIG_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "store_path": { "type": "string" },
            "default_source": { "type": "string", "pattern": "^[a-z0-9][a-z0-9_-]*$" },
            "cipher_work": { "type": "integer", "minimum": 1 },
            "query_timeout_ms": { "type": "integer", "minimum": 1 },
            "sources": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "kind"],
                    "properties": {
                        "name": { "type": "string" },
                        "kind": { "enum": ["local", "remote", "memory"] },
                        "path": { "type": "string" },
                        "url": { "type": "string" },
                        "token": { "type": "string" }
                    }
                }
            },
            "log": { "type": "object" }
        }
    })
});

/// Configuration layer priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigLayer {
    /// Default values
    Default = 0,
    /// Values loaded from file
    Loaded = 1,
    /// Values set programmatically
    Set = 2,
    /// Values from environment variables
    Environment = 3,
}

const LAYERS_ASCENDING: [ConfigLayer; 4] = [
    ConfigLayer::Default,
    ConfigLayer::Loaded,
    ConfigLayer::Set,
    ConfigLayer::Environment,
];

/// Main configuration structure with multi-layer support.
///
/// This is the low-level configuration type. For the typed view, see
/// [`HashpassConfig`].
#[derive(Clone, Debug)]
pub struct Config {
    layers: HashMap<ConfigLayer, Value>,
    file_path: Option<PathBuf>,
    schema: Option<Value>,
}

impl Config {
    /// Create a new configuration from a file path.
    ///
    /// If the file doesn't exist, an empty configuration is created.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut layers = HashMap::new();

        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| HashpassError::Config(format!("Failed to read config file: {}", e)))?;

            if !content.trim().is_empty() {
                let value: Value = serde_yaml::from_str(&content)
                    .map_err(|e| HashpassError::Config(format!("Failed to parse config: {}", e)))?;
                layers.insert(ConfigLayer::Loaded, value);
            }
        }

        Ok(Self {
            layers,
            file_path: Some(path.to_path_buf()),
            schema: None,
        })
    }

    /// Create an empty configuration with no backing file.
    pub fn empty() -> Self {
        Self {
            layers: HashMap::new(),
            file_path: None,
            schema: None,
        }
    }

    /// Install the default layer.
    pub fn with_defaults(mut self, defaults: impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(defaults)
            .map_err(|e| HashpassError::Config(format!("Failed to serialize defaults: {}", e)))?;
        self.layers.insert(ConfigLayer::Default, value);
        Ok(self)
    }

    /// Fill the environment layer from `HASHPASS_*` variables.
    ///
    /// Values that parse as JSON scalars (numbers, booleans) keep that type;
    /// everything else is taken as a string.
    pub fn with_env<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env = serde_json::Map::new();
        for (name, raw) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            if !ENV_KEYS.contains(&key.as_str()) {
                continue;
            }
            let value = if NUMERIC_ENV_KEYS.contains(&key.as_str()) {
                match serde_json::from_str::<Value>(raw.trim()) {
                    Ok(v @ Value::Number(_)) => v,
                    _ => Value::String(raw),
                }
            } else {
                Value::String(raw)
            };
            env.insert(key, value);
        }
        if !env.is_empty() {
            self.layers.insert(ConfigLayer::Environment, Value::Object(env));
        }
        self
    }

    /// Get a configuration value by key, respecting layer priority.
    ///
    /// Returns None if the key doesn't exist in any layer.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        for layer in LAYERS_ASCENDING.iter().rev() {
            if let Some(layer_data) = self.layers.get(layer) {
                if let Some(value) = Self::get_value_at_path(layer_data, key) {
                    if let Ok(typed_value) = serde_json::from_value(value.clone()) {
                        return Some(typed_value);
                    }
                }
            }
        }

        None
    }

    /// Set a configuration value programmatically.
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| HashpassError::Config(format!("Failed to serialize value: {}", e)))?;

        let set_layer = self
            .layers
            .entry(ConfigLayer::Set)
            .or_insert_with(|| Value::Object(Default::default()));

        Self::set_value_at_path(set_layer, key, value)
    }

    /// Save the loaded and set layers to file.
    ///
    /// Defaults and environment overrides are not persisted.
    pub fn save(&self) -> Result<()> {
        let path = self.file_path.as_ref().ok_or_else(|| {
            HashpassError::Config("Cannot save: no file path set".to_string())
        })?;

        let mut merged = Value::Object(Default::default());
        for layer in [ConfigLayer::Loaded, ConfigLayer::Set] {
            if let Some(layer_data) = self.layers.get(&layer) {
                merged = crate::util::data::deep_merge(merged, layer_data.clone());
            }
        }

        let yaml = serde_yaml::to_string(&merged)
            .map_err(|e| HashpassError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, yaml)
            .map_err(|e| HashpassError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get merged data from all layers.
    pub fn merged_data(&self) -> Value {
        let mut merged = Value::Object(serde_json::Map::new());

        for layer in &LAYERS_ASCENDING {
            if let Some(layer_data) = self.layers.get(layer) {
                merged = crate::util::data::deep_merge(merged, layer_data.clone());
            }
        }

        merged
    }

    /// Validate configuration against schema (if set).
    pub fn validate(&self) -> Result<()> {
        if let Some(schema) = &self.schema {
            let instance = self.merged_data();

            let compiled = jsonschema::JSONSchema::compile(schema)
                .map_err(|e| HashpassError::Config(format!("Invalid schema: {}", e)))?;

            let result = compiled.validate(&instance);
            if let Err(errors) = result {
                let error_msgs: Vec<String> = errors.map(|e| format!("{}", e)).collect();
                return Err(HashpassError::Config(format!(
                    "Validation failed: {}",
                    error_msgs.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Set validation schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    fn get_value_at_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
        path.split('.').try_fold(data, |current, part| current.get(part))
    }

    fn set_value_at_path(data: &mut Value, path: &str, value: Value) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return Err(HashpassError::Config("Empty path".to_string()));
        };
        if last.is_empty() {
            return Err(HashpassError::Config(format!("Invalid config key: '{}'", path)));
        }

        // Navigate to parent, creating intermediate objects as needed
        let mut current = data;
        for part in parents {
            if !current.is_object() {
                *current = Value::Object(Default::default());
            }
            current = match current {
                Value::Object(map) => map
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Default::default())),
                _ => hashpass_types::bug!("config layer is not an object after normalisation"),
            };
        }

        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        if let Value::Object(map) = current {
            map.insert(last.to_string(), value);
        }

        Ok(())
    }
}

/// Typed hashpass configuration (`~/.hashpass/config.yml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashpassConfig {
    /// Path of the local encrypted settings store
    pub store_path: PathBuf,

    /// Source that wins ambiguous reads and receives unpinned writes
    pub default_source: SourceName,

    /// Configured sources; a local source at `store_path` is implied when empty
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// PBKDF2 work factor for the settings cipher
    pub cipher_work: u32,

    /// Upper bound on a single source query, in milliseconds
    pub query_timeout_ms: u64,

    /// Log output
    #[serde(default)]
    pub log: LogConfig,
}

impl HashpassConfig {
    /// Load configuration from the default location, with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path, with environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::load(path)?.with_env(std::env::vars());
        Self::from_config(&config)
    }

    /// Build the typed view from a layered config, applying defaults and validation.
    pub fn from_config(config: &Config) -> Result<Self> {
        let config = config
            .clone()
            .with_defaults(Self::default())?
            .with_schema(CONFIG_SCHEMA.clone());
        config.validate()?;

        let mut parsed: HashpassConfig = serde_json::from_value(config.merged_data())
            .map_err(|e| HashpassError::Config(format!("Failed to parse config: {}", e)))?;
        parsed.store_path = crate::util::fs::expand_path(&parsed.store_path);
        for source in &mut parsed.sources {
            if let Some(path) = &source.path {
                source.path = Some(crate::util::fs::expand_path(path));
            }
        }
        parsed.check()?;
        Ok(parsed)
    }

    /// Get the default path for the configuration file.
    pub fn default_path() -> PathBuf {
        crate::util::fs::home_dir().join(".hashpass").join("config.yml")
    }

    /// Configured sources, with the implied local source added when needed.
    pub fn effective_sources(&self) -> Vec<SourceConfig> {
        let mut sources = self.sources.clone();
        if !sources.iter().any(|s| s.name == self.default_source) {
            sources.insert(
                0,
                SourceConfig {
                    name: self.default_source.clone(),
                    kind: SourceKind::Local,
                    path: Some(self.store_path.clone()),
                    url: None,
                    token: None,
                },
            );
        }
        sources
    }

    /// Per-query timeout for resolver fan-out.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(HashpassError::Config(format!(
                    "Duplicate source name: {}",
                    source.name
                )));
            }
            match source.kind {
                SourceKind::Local if source.path.is_none() => {
                    return Err(HashpassError::Config(format!(
                        "Local source '{}' needs a path",
                        source.name
                    )));
                }
                SourceKind::Remote if source.url.is_none() => {
                    return Err(HashpassError::Config(format!(
                        "Remote source '{}' needs a url",
                        source.name
                    )));
                }
                _ => {}
            }
        }
        if !self.sources.is_empty() && !seen.contains(self.default_source.as_str()) {
            tracing::debug!(
                "default source '{}' not listed; using implied local store",
                self.default_source
            );
        }
        Ok(())
    }
}

impl Default for HashpassConfig {
    fn default() -> Self {
        Self {
            store_path: crate::util::fs::home_dir().join(".hashpass").join("store"),
            default_source: SourceName::local(),
            sources: Vec::new(),
            cipher_work: DEFAULT_CIPHER_WORK,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            log: LogConfig::default(),
        }
    }
}
