//! The saved configuration file layer, per §4.1 layer 3.
//!
//! Format is a flat JSON object keyed by [`ConfigKey::as_str`]. Unknown
//! keys are ignored (forward compatibility); a key present but unparseable
//! for its declared type is dropped with a `tracing::warn!`, not a hard
//! failure, so one bad field doesn't block every other field in the file.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use km_core::ConfigKey;
use tracing::{debug, warn};

use crate::coerce;
use crate::error::{ConfigError, ConfigResult};

/// Config files larger than this are rejected outright.
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load the config file's recognized keys, or `None` if it doesn't exist.
///
/// Reads the file once and classifies "not found" from that single read,
/// to avoid a stat-then-read TOCTOU window.
pub fn load(path: &Path) -> ConfigResult<Option<BTreeMap<ConfigKey, km_core::ConfigValue>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        }
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let document: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let object = document.as_object().ok_or_else(|| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: "config file must contain a JSON object".to_owned(),
    })?;

    let mut values = BTreeMap::new();
    for key in ConfigKey::ALL {
        let Some(raw) = object.get(key.as_str()) else {
            continue;
        };
        match coerce::from_json(key, raw) {
            Some(value) => {
                values.insert(key, value);
            }
            None => warn!(key = %key, path = %path.display(), "failed to parse config key from file; skipping"),
        }
    }

    Ok(Some(values))
}

/// Atomically write `values` as the config file's new contents: staged in
/// a temp file in the same directory, synced, then renamed into place.
pub fn save(path: &Path, values: &BTreeMap<ConfigKey, km_core::ConfigValue>) -> ConfigResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut object = serde_json::Map::new();
    for (key, value) in values {
        object.insert(key.as_str().to_owned(), coerce::to_json(value));
    }
    let body = serde_json::to_string_pretty(&serde_json::Value::Object(object))
        .expect("a flat map of primitives always serializes");

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| ConfigError::SaveError {
        path: path.to_path_buf(),
        source: e,
    })?;
    tmp.write_all(body.as_bytes())
        .map_err(|e| ConfigError::SaveError {
            path: path.to_path_buf(),
            source: e,
        })?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ConfigError::SaveError {
            path: path.to_path_buf(),
            source: e,
        })?;
    tmp.persist(path)
        .map_err(|e| ConfigError::SaveError {
            path: path.to_path_buf(),
            source: e.error,
        })?;

    debug!(path = %path.display(), keys = values.len(), "saved config file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_core::ConfigValue;

    #[test]
    fn missing_file_loads_as_none() {
        let result = load(Path::new("/nonexistent/config.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn unparseable_key_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"buffer_size": "not a number", "batch_size": 5}"#).unwrap();

        let values = load(&path).unwrap().unwrap();
        assert!(!values.contains_key(&ConfigKey::BufferSize));
        assert_eq!(values.get(&ConfigKey::BatchSize), Some(&ConfigValue::Int(5)));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut values = BTreeMap::new();
        values.insert(ConfigKey::ApiKey, ConfigValue::String("km_live_abc".into()));
        values.insert(ConfigKey::Debug, ConfigValue::Bool(true));
        save(&path, &values).unwrap();

        let reloaded = load(&path).unwrap().unwrap();
        assert_eq!(reloaded, values);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let huge = format!(r#"{{"api_key": "{}"}}"#, "a".repeat(1_100_000));
        std::fs::write(&path, huge).unwrap();

        let result = load(&path);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }
}
