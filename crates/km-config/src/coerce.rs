//! Per-key typed parsing, shared by the file, environment, and `.env` layers.
//!
//! Every recognized key has exactly one target [`ConfigValue`] variant; a
//! layer that can't coerce its raw representation into that variant omits
//! the key rather than guessing, and the caller logs a `tracing::warn!`.

use std::path::PathBuf;
use std::time::Duration;

use km_core::{ConfigKey, ConfigValue};

/// Coerce a JSON value from the config file into `key`'s declared type.
#[must_use]
pub fn from_json(key: ConfigKey, raw: &serde_json::Value) -> Option<ConfigValue> {
    match key {
        ConfigKey::ApiKey | ConfigKey::ApiEndpoint | ConfigKey::LogLevel => {
            raw.as_str().map(|s| ConfigValue::String(s.to_owned()))
        }
        ConfigKey::BufferSize | ConfigKey::BatchSize => raw.as_i64().map(ConfigValue::Int),
        ConfigKey::Debug | ConfigKey::AutoProvision => raw.as_bool().map(ConfigValue::Bool),
        ConfigKey::PluginsDir => raw.as_str().map(|s| ConfigValue::Path(PathBuf::from(s))),
        ConfigKey::DefaultTimeout => raw
            .as_u64()
            .map(|secs| ConfigValue::Duration(Duration::from_secs(secs))),
    }
}

/// Coerce a raw string (environment variable, `.env` line, credential
/// store) into `key`'s declared type.
#[must_use]
pub fn from_str(key: ConfigKey, raw: &str) -> Option<ConfigValue> {
    match key {
        ConfigKey::ApiKey | ConfigKey::ApiEndpoint | ConfigKey::LogLevel => {
            Some(ConfigValue::String(raw.to_owned()))
        }
        ConfigKey::BufferSize | ConfigKey::BatchSize => raw.parse().ok().map(ConfigValue::Int),
        ConfigKey::Debug | ConfigKey::AutoProvision => raw.parse().ok().map(ConfigValue::Bool),
        ConfigKey::PluginsDir => Some(ConfigValue::Path(PathBuf::from(raw))),
        ConfigKey::DefaultTimeout => raw
            .parse()
            .ok()
            .map(|secs| ConfigValue::Duration(Duration::from_secs(secs))),
    }
}

/// Render a [`ConfigValue`] back to JSON for the saved config file.
#[must_use]
pub fn to_json(value: &ConfigValue) -> serde_json::Value {
    match value {
        ConfigValue::String(s) => serde_json::Value::String(s.clone()),
        ConfigValue::Int(i) => serde_json::Value::Number((*i).into()),
        ConfigValue::Bool(b) => serde_json::Value::Bool(*b),
        ConfigValue::Path(p) => serde_json::Value::String(p.display().to_string()),
        ConfigValue::Duration(d) => serde_json::Value::Number(d.as_secs().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_int_parses_for_buffer_size() {
        let raw = serde_json::json!(2048);
        assert_eq!(
            from_json(ConfigKey::BufferSize, &raw),
            Some(ConfigValue::Int(2048))
        );
    }

    #[test]
    fn json_string_is_rejected_for_int_key() {
        let raw = serde_json::json!("not a number");
        assert_eq!(from_json(ConfigKey::BufferSize, &raw), None);
    }

    #[test]
    fn str_bool_parses_case_sensitively() {
        assert_eq!(
            from_str(ConfigKey::Debug, "true"),
            Some(ConfigValue::Bool(true))
        );
        assert_eq!(from_str(ConfigKey::Debug, "yes"), None);
    }

    #[test]
    fn round_trip_through_json() {
        let value = ConfigValue::Int(42);
        let json = to_json(&value);
        assert_eq!(from_json(ConfigKey::BatchSize, &json), Some(value));
    }
}
