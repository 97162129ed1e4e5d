//! On-disk persistence for installed plugins, per §4.7's registry
//! persistence contract: write-temp + rename, shared reads, exclusive
//! writes.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use km_core::InstalledPlugin;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProvisioningError, ProvisioningResult};

const SCHEMA_VERSION: u32 = 1;

/// `<config_dir>/plugin-registry.json`: every plugin installed locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    version: u32,
    last_updated: DateTime<Utc>,
    plugins: BTreeMap<String, InstalledPlugin>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            last_updated: Utc::now(),
            plugins: BTreeMap::new(),
        }
    }
}

impl Registry {
    /// Installed plugins, by name.
    #[must_use]
    pub fn plugins(&self) -> &BTreeMap<String, InstalledPlugin> {
        &self.plugins
    }

    /// All installed plugins as a flat list, for reconciliation.
    #[must_use]
    pub fn installed(&self) -> Vec<InstalledPlugin> {
        self.plugins.values().cloned().collect()
    }

    /// Record (or replace) one plugin's installed state.
    pub fn insert(&mut self, installed: InstalledPlugin) {
        self.plugins.insert(installed.manifest.name.clone(), installed);
        self.last_updated = Utc::now();
    }

    /// Remove a plugin's record. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.plugins.remove(name).is_some();
        if removed {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Load the registry, or an empty one if the file doesn't exist yet.
    /// Takes a shared file lock to coordinate with concurrent writers.
    pub fn load_or_default(path: &Path) -> ProvisioningResult<Self> {
        let _guard = acquire_lock(path, LockMode::Shared)?;
        Self::read_unlocked(path)
    }

    fn read_unlocked(path: &Path) -> ProvisioningResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ProvisioningError::RegistryError {
                    path: path.to_path_buf(),
                    message: format!("failed to parse registry: {e}"),
                }
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ProvisioningError::RegistryError {
                path: path.to_path_buf(),
                message: format!("failed to read registry: {e}"),
            }),
        }
    }

    /// Atomically load, mutate, and persist the registry under a single
    /// exclusive lock, avoiding a TOCTOU window between an install and a
    /// concurrent remove.
    pub fn update<F>(path: &Path, f: F) -> ProvisioningResult<()>
    where
        F: FnOnce(&mut Self),
    {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProvisioningError::RegistryError {
                path: path.to_path_buf(),
                message: format!("failed to create parent directory: {e}"),
            })?;
        }

        let _guard = acquire_lock(path, LockMode::Exclusive)?;
        let mut registry = Self::read_unlocked(path)?;
        f(&mut registry);
        registry.write_unlocked(path)
    }

    fn write_unlocked(&self, path: &Path) -> ProvisioningResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let body = serde_json::to_string_pretty(self).map_err(|e| ProvisioningError::RegistryError {
            path: path.to_path_buf(),
            message: format!("failed to serialize registry: {e}"),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
            ProvisioningError::RegistryError {
                path: path.to_path_buf(),
                message: format!("failed to create temp file for atomic write: {e}"),
            }
        })?;

        tmp.write_all(body.as_bytes())
            .map_err(|e| ProvisioningError::RegistryError {
                path: path.to_path_buf(),
                message: format!("failed to write temp registry: {e}"),
            })?;

        tmp.as_file()
            .sync_all()
            .map_err(|e| ProvisioningError::RegistryError {
                path: path.to_path_buf(),
                message: format!("failed to sync temp registry to disk: {e}"),
            })?;

        tmp.persist(path).map_err(|e| ProvisioningError::RegistryError {
            path: path.to_path_buf(),
            message: format!("failed to atomically replace registry: {e}"),
        })?;

        debug!(path = %path.display(), plugins = self.plugins.len(), "wrote plugin registry");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Acquire an advisory lock on a `.lk` sibling of `path`. In shared mode,
/// a missing lock file means there's no concurrent writer to coordinate
/// with, so no lock is taken.
fn acquire_lock(path: &Path, mode: LockMode) -> ProvisioningResult<Option<std::fs::File>> {
    let lock_path = path.with_extension("lk");

    match mode {
        LockMode::Shared => match std::fs::OpenOptions::new().read(true).open(&lock_path) {
            Ok(file) => {
                file.lock_shared().map_err(|e| ProvisioningError::RegistryError {
                    path: path.to_path_buf(),
                    message: format!("failed to acquire shared lock: {e}"),
                })?;
                Ok(Some(file))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProvisioningError::RegistryError {
                path: path.to_path_buf(),
                message: format!("failed to open lock file: {e}"),
            }),
        },
        LockMode::Exclusive => {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ProvisioningError::RegistryError {
                    path: path.to_path_buf(),
                    message: format!("failed to create lock file directory: {e}"),
                })?;
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .read(true)
                .open(&lock_path)
                .map_err(|e| ProvisioningError::RegistryError {
                    path: path.to_path_buf(),
                    message: format!("failed to open lock file: {e}"),
                })?;

            file.lock_exclusive().map_err(|e| ProvisioningError::RegistryError {
                path: path.to_path_buf(),
                message: format!("failed to acquire exclusive lock: {e}"),
            })?;

            Ok(Some(file))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_core::{PluginManifest, Tier};

    fn manifest(name: &str) -> PluginManifest {
        PluginManifest {
            name: name.into(),
            version: semver::Version::new(1, 0, 0),
            description: String::new(),
            required_tier: Tier::Free,
            size: 0,
            checksum: "deadbeef".into(),
            signature: None,
            download_url: "https://example.com".into(),
        }
    }

    fn installed(name: &str) -> InstalledPlugin {
        InstalledPlugin {
            manifest: manifest(name),
            local_path: format!("/plugins/{name}").into(),
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn missing_registry_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin-registry.json");
        let registry = Registry::load_or_default(&path).unwrap();
        assert!(registry.plugins().is_empty());
    }

    #[test]
    fn update_persists_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin-registry.json");

        Registry::update(&path, |r| r.insert(installed("console-logger"))).unwrap();

        let reloaded = Registry::load_or_default(&path).unwrap();
        assert!(reloaded.plugins().contains_key("console-logger"));
    }

    #[test]
    fn remove_then_reload_drops_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin-registry.json");

        Registry::update(&path, |r| r.insert(installed("p"))).unwrap();
        Registry::update(&path, |r| {
            r.remove("p");
        })
        .unwrap();

        let reloaded = Registry::load_or_default(&path).unwrap();
        assert!(!reloaded.plugins().contains_key("p"));
    }
}
