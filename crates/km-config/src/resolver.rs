//! The layered merge itself: CLI > env > file > credential store > `.env` >
//! defaults, per §4.1.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use km_core::{ConfigEntry, ConfigKey, ConfigSnapshot, ConfigSource, ConfigValue, KilometersHome};
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::error::ConfigResult;
use crate::{coerce, defaults, env, file};

/// What a caller supplies going into a resolve pass: parsed CLI flags and
/// any path overrides. Everything else is discovered from `home`.
#[derive(Debug, Clone, Default)]
pub struct ResolveInput {
    /// Flags parsed from `argv` on this invocation. Highest priority.
    pub cli: BTreeMap<ConfigKey, ConfigValue>,
    /// Overrides the saved config file's path (tests, `--config`).
    pub config_path: Option<PathBuf>,
    /// The current workspace root, if any; consulted for a `.env` file
    /// there in addition to the one in the user config directory.
    pub workspace_root: Option<PathBuf>,
}

/// One file location the resolver checked, for `config path` provenance
/// display.
#[derive(Debug, Clone)]
pub struct CheckedFile {
    /// The path that was checked.
    pub path: PathBuf,
    /// Whether the file existed at resolve time.
    pub existed: bool,
}

/// A completed resolve pass: the snapshot plus every file location
/// consulted, in precedence order.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The effective, source-attributed configuration.
    pub snapshot: ConfigSnapshot,
    /// Every path checked, in the order the layers were considered.
    pub checked_files: Vec<CheckedFile>,
}

/// Resolve a [`ConfigSnapshot`] by merging every layer in decreasing
/// strength. Unset keys fall back to compiled-in defaults.
///
/// # Errors
///
/// Returns a [`crate::error::ConfigError`] if the config file or a `.env`
/// file exists but can't be read, or if the saved config file exceeds the
/// size limit.
pub fn resolve(input: &ResolveInput, home: &KilometersHome) -> ConfigResult<Resolved> {
    resolve_with_env(input, home, &env::collect_env_vars())
}

/// Like [`resolve`], but takes the environment-variable layer as an
/// explicit argument instead of reading the process environment. Used by
/// tests so concurrent test runs don't race on global env state.
pub fn resolve_with_env(
    input: &ResolveInput,
    home: &KilometersHome,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Resolved> {
    let mut checked_files = Vec::new();

    let config_path = input
        .config_path
        .clone()
        .unwrap_or_else(|| home.config_file());
    let file_layer = file::load(&config_path)?;
    checked_files.push(CheckedFile {
        path: config_path.clone(),
        existed: file_layer.is_some(),
    });
    debug!(path = %config_path.display(), exists = file_layer.is_some(), "considered file layer");

    let credentials = CredentialStore::new(home.credentials_file());

    let mut dotenv_paths = Vec::new();
    if let Some(ws) = &input.workspace_root {
        dotenv_paths.push(ws.join(".env"));
    }
    dotenv_paths.push(home.config_dir().join(".env"));

    let mut env_file_values: HashMap<String, String> = HashMap::new();
    for path in &dotenv_paths {
        let loaded = env::load_env_file(path)?;
        checked_files.push(CheckedFile {
            path: path.clone(),
            existed: loaded.is_some(),
        });
        if let Some(values) = loaded {
            debug!(path = %path.display(), keys = values.len(), "considered .env layer");
            for (k, v) in values {
                env_file_values.entry(k).or_insert(v);
            }
        }
    }

    let mut entries = BTreeMap::new();
    for key in ConfigKey::ALL {
        let entry = resolve_key(
            key,
            input,
            env_vars,
            file_layer.as_ref(),
            &config_path,
            &credentials,
            &env_file_values,
        );
        entries.insert(key, entry);
    }

    info!(keys = entries.len(), "resolved configuration");
    Ok(Resolved {
        snapshot: ConfigSnapshot::new(entries),
        checked_files,
    })
}

#[allow(clippy::too_many_arguments)]
fn resolve_key(
    key: ConfigKey,
    input: &ResolveInput,
    env_vars: &HashMap<String, String>,
    file_layer: Option<&BTreeMap<ConfigKey, ConfigValue>>,
    config_path: &Path,
    credentials: &CredentialStore,
    env_file_values: &HashMap<String, String>,
) -> ConfigEntry {
    if let Some(value) = input.cli.get(&key) {
        return entry(key, value.clone(), ConfigSource::Cli, "cli".to_owned());
    }

    if let Some(raw) = env_vars.get(key.env_var()) {
        match coerce::from_str(key, raw) {
            Some(value) => return entry(key, value, ConfigSource::Env, key.env_var().to_owned()),
            None => warn!(key = %key, var = key.env_var(), "failed to parse environment variable; falling through"),
        }
    }

    if let Some(value) = file_layer.and_then(|f| f.get(&key)) {
        return entry(
            key,
            value.clone(),
            ConfigSource::File,
            config_path.display().to_string(),
        );
    }

    if key == ConfigKey::ApiKey {
        match credentials.load() {
            Ok(Some(api_key)) => {
                return entry(
                    key,
                    ConfigValue::String(api_key),
                    ConfigSource::Credential,
                    credentials.path().display().to_string(),
                )
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read credential store; falling through"),
        }
    }

    if let Some(raw) = env_file_values.get(key.env_var()) {
        match coerce::from_str(key, raw) {
            Some(value) => return entry(key, value, ConfigSource::EnvFile, ".env".to_owned()),
            None => warn!(key = %key, "failed to parse .env value; falling through"),
        }
    }

    entry(key, defaults::default_value(key), ConfigSource::Default, "<default>".to_owned())
}

fn entry(key: ConfigKey, value: ConfigValue, source: ConfigSource, source_path: String) -> ConfigEntry {
    ConfigEntry {
        key,
        value,
        source,
        source_path,
        priority: source.priority(),
    }
}

/// Persist the snapshot's `cli`- and `file`-sourced entries to the saved
/// config file. Environment- and default-sourced values are never
/// written, per §4.1's save contract.
///
/// # Errors
///
/// Returns a [`crate::error::ConfigError`] if the file can't be written.
pub fn save(snapshot: &ConfigSnapshot, path: &Path) -> ConfigResult<()> {
    let values: BTreeMap<ConfigKey, ConfigValue> = ConfigKey::ALL
        .into_iter()
        .filter_map(|key| snapshot.entry(key))
        .filter(|e| e.source.is_persistable())
        .map(|e| (e.key, e.value.clone()))
        .collect();

    file::save(path, &values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home(dir: &std::path::Path) -> KilometersHome {
        KilometersHome::with_paths(dir.join("config"), dir.join("km"))
    }

    #[test]
    fn cli_override_wins_over_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = BTreeMap::new();
        cli.insert(ConfigKey::Debug, ConfigValue::Bool(true));
        let input = ResolveInput {
            cli,
            ..Default::default()
        };

        let resolved = resolve(&input, &home(dir.path())).unwrap();
        let debug_entry = resolved.snapshot.entry(ConfigKey::Debug).unwrap();
        assert_eq!(debug_entry.source, ConfigSource::Cli);
        assert!(resolved.snapshot.debug());
    }

    #[test]
    fn unset_key_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve(&ResolveInput::default(), &home(dir.path())).unwrap();
        let entry = resolved.snapshot.entry(ConfigKey::BatchSize).unwrap();
        assert_eq!(entry.source, ConfigSource::Default);
        assert_eq!(resolved.snapshot.batch_size(), 10);
    }

    #[test]
    fn file_layer_wins_over_env_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let km_home = home(dir.path());
        std::fs::create_dir_all(km_home.config_dir()).unwrap();
        std::fs::write(km_home.config_file(), r#"{"batch_size": 99}"#).unwrap();
        std::fs::write(km_home.config_dir().join(".env"), "KM_BATCH_SIZE=7\n").unwrap();

        let resolved = resolve(&ResolveInput::default(), &km_home).unwrap();
        let entry = resolved.snapshot.entry(ConfigKey::BatchSize).unwrap();
        assert_eq!(entry.source, ConfigSource::File);
        assert_eq!(resolved.snapshot.batch_size(), 99);
    }

    #[test]
    fn credential_store_fills_api_key_between_file_and_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let km_home = home(dir.path());
        CredentialStore::new(km_home.credentials_file())
            .save("km_live_cached")
            .unwrap();
        std::fs::create_dir_all(km_home.config_dir()).unwrap();
        std::fs::write(km_home.config_dir().join(".env"), "KM_API_KEY=from_dotenv\n").unwrap();

        let resolved = resolve(&ResolveInput::default(), &km_home).unwrap();
        let entry = resolved.snapshot.entry(ConfigKey::ApiKey).unwrap();
        assert_eq!(entry.source, ConfigSource::Credential);
        assert_eq!(resolved.snapshot.api_key(), "km_live_cached");
    }

    #[test]
    fn save_persists_only_cli_and_file_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut cli = BTreeMap::new();
        cli.insert(ConfigKey::Debug, ConfigValue::Bool(true));
        let mut env_vars = HashMap::new();
        env_vars.insert("KM_LOG_LEVEL".to_owned(), "trace".to_owned());
        let input = ResolveInput {
            cli,
            config_path: Some(path.clone()),
            ..Default::default()
        };
        let resolved = resolve_with_env(&input, &home(dir.path()), &env_vars).unwrap();

        save(&resolved.snapshot, &path).unwrap();
        let on_disk = file::load(&path).unwrap().unwrap();
        assert_eq!(on_disk.get(&ConfigKey::Debug), Some(&ConfigValue::Bool(true)));
        assert!(!on_disk.contains_key(&ConfigKey::LogLevel));
    }
}
