//! The configuration data model: keys, typed values, and source-attributed snapshots.
//!
//! The merge algorithm that produces a [`ConfigSnapshot`] lives in `km-config`;
//! this module only defines the vocabulary so every crate can read a snapshot
//! without depending on the resolver itself.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A recognized configuration key. Stable identifiers, never renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    /// API key presented to the entitlement service and to plugins.
    ApiKey,
    /// Base URL of the entitlement service.
    ApiEndpoint,
    /// Framer read-buffer capacity, in bytes.
    BufferSize,
    /// Advisory batch size for batching plugins.
    BatchSize,
    /// Log verbosity.
    LogLevel,
    /// Whether to emit diagnostics to stderr.
    Debug,
    /// Directory containing plugin binaries.
    PluginsDir,
    /// Whether to skip interactive install prompts.
    AutoProvision,
    /// Default timeout for HTTP operations.
    DefaultTimeout,
}

impl ConfigKey {
    /// All recognized keys, in a stable order.
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::ApiKey,
        ConfigKey::ApiEndpoint,
        ConfigKey::BufferSize,
        ConfigKey::BatchSize,
        ConfigKey::LogLevel,
        ConfigKey::Debug,
        ConfigKey::PluginsDir,
        ConfigKey::AutoProvision,
        ConfigKey::DefaultTimeout,
    ];

    /// The stable string identifier used in env var suffixes and file keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ConfigKey::ApiKey => "api_key",
            ConfigKey::ApiEndpoint => "api_endpoint",
            ConfigKey::BufferSize => "buffer_size",
            ConfigKey::BatchSize => "batch_size",
            ConfigKey::LogLevel => "log_level",
            ConfigKey::Debug => "debug",
            ConfigKey::PluginsDir => "plugins_dir",
            ConfigKey::AutoProvision => "auto_provision",
            ConfigKey::DefaultTimeout => "default_timeout",
        }
    }

    /// The `KM_*` environment variable name for this key.
    #[must_use]
    pub fn env_var(self) -> &'static str {
        match self {
            ConfigKey::ApiKey => "KM_API_KEY",
            ConfigKey::ApiEndpoint => "KM_API_ENDPOINT",
            ConfigKey::BufferSize => "KM_BUFFER_SIZE",
            ConfigKey::BatchSize => "KM_BATCH_SIZE",
            ConfigKey::LogLevel => "KM_LOG_LEVEL",
            ConfigKey::Debug => "KM_DEBUG",
            ConfigKey::PluginsDir => "KM_PLUGINS_DIR",
            ConfigKey::AutoProvision => "KM_AUTO_PROVISION",
            ConfigKey::DefaultTimeout => "KM_TIMEOUT",
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// UTF-8 string value.
    String(String),
    /// Signed integer value (buffer/batch sizes).
    Int(i64),
    /// Boolean flag.
    Bool(bool),
    /// Filesystem path.
    Path(PathBuf),
    /// A duration, stored in milliseconds on the wire.
    Duration(#[serde(with = "duration_millis")] Duration),
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        #[allow(clippy::cast_possible_truncation)]
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

impl ConfigValue {
    /// Borrow as a string, if this value holds one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Copy out as an `i64`, if this value holds one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Copy out as a `bool`, if this value holds one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow as a path, if this value holds one.
    #[must_use]
    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            ConfigValue::Path(p) => Some(p.as_path()),
            _ => None,
        }
    }

    /// Copy out as a [`Duration`], if this value holds one.
    #[must_use]
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            ConfigValue::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

/// Where an effective configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// A command-line flag on this invocation. Priority 1 (strongest).
    Cli,
    /// A `KM_*` process environment variable. Priority 2.
    Env,
    /// The saved configuration file. Priority 3.
    File,
    /// The encrypted credential store, consulted only for `api_key` when
    /// still unset after the file layer. Priority 4.
    Credential,
    /// A `.env` file in the working directory or user config directory. Priority 5.
    EnvFile,
    /// A compiled-in default. Priority 6 (weakest).
    Default,
}

impl ConfigSource {
    /// Lower is stronger; this is the merge-resolution priority.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            ConfigSource::Cli => 1,
            ConfigSource::Env => 2,
            ConfigSource::File => 3,
            ConfigSource::Credential => 4,
            ConfigSource::EnvFile => 5,
            ConfigSource::Default => 6,
        }
    }

    /// Whether values from this layer are eligible to be written back by `config save`.
    #[must_use]
    pub const fn is_persistable(self) -> bool {
        matches!(self, ConfigSource::Cli | ConfigSource::File)
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfigSource::Cli => "cli",
            ConfigSource::Env => "env",
            ConfigSource::File => "file",
            ConfigSource::Credential => "credential_store",
            ConfigSource::EnvFile => "env_file",
            ConfigSource::Default => "default",
        };
        f.write_str(s)
    }
}

/// One effective configuration value with full provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// The recognized key this entry resolves.
    pub key: ConfigKey,
    /// The effective typed value.
    pub value: ConfigValue,
    /// Which layer produced this value.
    pub source: ConfigSource,
    /// Free-text origin, e.g. `"KM_API_KEY"` or a file path.
    pub source_path: String,
    /// Merge priority (lower = stronger); mirrors `source.priority()`.
    pub priority: u8,
}

/// An immutable, fully resolved configuration for one command invocation.
///
/// Constructed once by the resolver in `km-config`; every component holds
/// it behind an `Arc` and never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    entries: BTreeMap<ConfigKey, ConfigEntry>,
}

impl ConfigSnapshot {
    /// Build a snapshot from a complete set of entries, one per [`ConfigKey`].
    #[must_use]
    pub fn new(entries: BTreeMap<ConfigKey, ConfigEntry>) -> Self {
        Self { entries }
    }

    /// Look up the effective entry for a key.
    #[must_use]
    pub fn entry(&self, key: ConfigKey) -> Option<&ConfigEntry> {
        self.entries.get(&key)
    }

    /// Iterate all effective entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.values()
    }

    /// The effective `api_key`, or empty string if unset.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.entry(ConfigKey::ApiKey)
            .and_then(|e| e.value.as_str())
            .unwrap_or("")
    }

    /// The effective `api_endpoint`.
    #[must_use]
    pub fn api_endpoint(&self) -> &str {
        self.entry(ConfigKey::ApiEndpoint)
            .and_then(|e| e.value.as_str())
            .unwrap_or("https://api.kilometers.ai")
    }

    /// The effective `buffer_size`, in bytes.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.entry(ConfigKey::BufferSize)
            .and_then(|e| e.value.as_int())
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(1024 * 1024)
    }

    /// The effective `batch_size`.
    #[must_use]
    pub fn batch_size(&self) -> i64 {
        self.entry(ConfigKey::BatchSize)
            .and_then(|e| e.value.as_int())
            .unwrap_or(10)
    }

    /// The effective `log_level`.
    #[must_use]
    pub fn log_level(&self) -> &str {
        self.entry(ConfigKey::LogLevel)
            .and_then(|e| e.value.as_str())
            .unwrap_or("info")
    }

    /// The effective `debug` flag.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.entry(ConfigKey::Debug)
            .and_then(|e| e.value.as_bool())
            .unwrap_or(false)
    }

    /// The effective `plugins_dir`.
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.entry(ConfigKey::PluginsDir)
            .and_then(|e| e.value.as_path())
            .map(std::path::Path::to_path_buf)
            .unwrap_or_else(|| crate::dirs::KilometersHome::resolve().plugins_dir())
    }

    /// The effective `auto_provision` flag.
    #[must_use]
    pub fn auto_provision(&self) -> bool {
        self.entry(ConfigKey::AutoProvision)
            .and_then(|e| e.value.as_bool())
            .unwrap_or(false)
    }

    /// The effective `default_timeout`.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.entry(ConfigKey::DefaultTimeout)
            .and_then(|e| e.value.as_duration())
            .unwrap_or(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: ConfigKey, value: ConfigValue, source: ConfigSource) -> ConfigEntry {
        ConfigEntry {
            key,
            value,
            source,
            source_path: "test".into(),
            priority: source.priority(),
        }
    }

    #[test]
    fn priority_ordering() {
        assert!(ConfigSource::Cli.priority() < ConfigSource::Env.priority());
        assert!(ConfigSource::Env.priority() < ConfigSource::File.priority());
        assert!(ConfigSource::File.priority() < ConfigSource::Credential.priority());
        assert!(ConfigSource::Credential.priority() < ConfigSource::EnvFile.priority());
        assert!(ConfigSource::EnvFile.priority() < ConfigSource::Default.priority());
    }

    #[test]
    fn snapshot_accessors_fall_back_to_defaults() {
        let snapshot = ConfigSnapshot::default();
        assert_eq!(snapshot.api_key(), "");
        assert_eq!(snapshot.batch_size(), 10);
        assert!(!snapshot.debug());
        assert_eq!(snapshot.default_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn snapshot_reads_effective_values() {
        let mut entries = BTreeMap::new();
        entries.insert(
            ConfigKey::Debug,
            entry(ConfigKey::Debug, ConfigValue::Bool(true), ConfigSource::Env),
        );
        let snapshot = ConfigSnapshot::new(entries);
        assert!(snapshot.debug());
        assert_eq!(snapshot.entry(ConfigKey::Debug).unwrap().source, ConfigSource::Env);
    }

    #[test]
    fn persistable_sources() {
        assert!(ConfigSource::Cli.is_persistable());
        assert!(ConfigSource::File.is_persistable());
        assert!(!ConfigSource::Env.is_persistable());
        assert!(!ConfigSource::EnvFile.is_persistable());
        assert!(!ConfigSource::Default.is_persistable());
    }
}
