//! Process environment variables and `.env` files, per §4.1 layers 2 and 4.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::ConfigResult;

/// Collect every `KM_*` process environment variable.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("KM_"))
        .collect()
}

/// Parse a `.env`-style file into a flat key/value map, or `None` if the
/// file doesn't exist. Lines that are blank, start with `#`, or don't
/// contain `=` are skipped; surrounding single or double quotes on the
/// value are stripped.
///
/// # Errors
///
/// Returns a [`crate::error::ConfigError`] if the file exists but cannot be read.
pub fn load_env_file(path: &Path) -> ConfigResult<Option<HashMap<String, String>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "env file not found, skipping");
            return Ok(None);
        }
        Err(e) => {
            return Err(crate::error::ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let mut values = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = raw_value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        values.insert(key.to_owned(), value.to_owned());
    }

    debug!(path = %path.display(), keys = values.len(), "loaded env file");
    Ok(Some(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let result = load_env_file(Path::new("/nonexistent/.env")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn parses_quoted_and_bare_values_and_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# a comment\n\nKM_API_KEY=\"secret\"\nKM_DEBUG=true\nmalformed line\n",
        )
        .unwrap();

        let values = load_env_file(&path).unwrap().unwrap();
        assert_eq!(values.get("KM_API_KEY").map(String::as_str), Some("secret"));
        assert_eq!(values.get("KM_DEBUG").map(String::as_str), Some("true"));
        assert_eq!(values.len(), 2);
    }
}
