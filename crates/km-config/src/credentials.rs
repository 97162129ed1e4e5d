//! The machine-bound credential cache, per §4.9.
//!
//! `~/.km/.credentials.enc` holds the API key XOR-obfuscated with a stream
//! derived from machine identifiers via BLAKE3. This deters casual
//! disclosure in backups or screen-shares; it is not a substitute for an
//! OS keychain, which this store does not attempt to integrate with.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Reads and writes the encrypted credential cache at a fixed path.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Bind a store to `path` (normally [`km_core::KilometersHome::credentials_file`]).
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read and decrypt the cached API key, or `None` if no cache exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file exists but is corrupt or
    /// unreadable.
    pub fn load(&self) -> ConfigResult<Option<String>> {
        let encoded = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let bytes = hex::decode(encoded.trim()).map_err(|e| ConfigError::CredentialError {
            path: self.path.clone(),
            message: format!("not valid hex: {e}"),
        })?;

        let plain = xor_with_machine_key(&bytes);
        String::from_utf8(plain).map(Some).map_err(|e| ConfigError::CredentialError {
            path: self.path.clone(),
            message: format!("decoded bytes are not valid UTF-8: {e}"),
        })
    }

    /// Encrypt and persist `api_key`, replacing any existing cache.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the cache directory or file can't be
    /// written.
    pub fn save(&self, api_key: &str) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveError {
                path: self.path.clone(),
                source: e,
            })?;
        }

        let cipher = xor_with_machine_key(api_key.as_bytes());
        std::fs::write(&self.path, hex::encode(cipher)).map_err(|e| ConfigError::SaveError {
            path: self.path.clone(),
            source: e,
        })?;

        debug!(path = %self.path.display(), "saved credential cache");
        Ok(())
    }

    /// Remove the cache, if present. Not an error if it's already gone.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file exists but can't be removed.
    pub fn remove(&self) -> ConfigResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::SaveError {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// The path this store reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// XOR `data` against a repeating BLAKE3-derived keystream. XOR is its own
/// inverse, so this function both encrypts and decrypts.
fn xor_with_machine_key(data: &[u8]) -> Vec<u8> {
    let key = machine_key();
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len()])
        .collect()
}

/// A 32-byte key derived from identifiers stable across a machine's
/// reboots but not shared with any other machine: hostname plus, on Unix,
/// `/etc/machine-id` content when present.
fn machine_key() -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    if let Ok(hostname) = std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")) {
        hasher.update(hostname.as_bytes());
    }
    if let Ok(machine_id) = std::fs::read_to_string("/etc/machine-id") {
        hasher.update(machine_id.trim().as_bytes());
    }
    hasher.update(b"kilometers-credential-store");
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".credentials.enc"));

        store.save("km_live_abc123").unwrap();
        assert_eq!(store.load().unwrap(), Some("km_live_abc123".to_owned()));
    }

    #[test]
    fn missing_cache_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".credentials.enc"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn remove_then_load_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".credentials.enc"));
        store.save("key").unwrap();
        store.remove().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn on_disk_cache_does_not_contain_the_plaintext_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".credentials.enc"));
        store.save("super-secret-api-key").unwrap();

        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert!(!on_disk.contains("super-secret-api-key"));
    }
}
