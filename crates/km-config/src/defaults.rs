//! Compiled-in defaults, priority 6 (weakest layer).

use std::path::PathBuf;
use std::time::Duration;

use km_core::{ConfigKey, ConfigValue, KilometersHome};

/// The default value for `key`, used when every other layer is silent.
#[must_use]
pub fn default_value(key: ConfigKey) -> ConfigValue {
    match key {
        ConfigKey::ApiKey => ConfigValue::String(String::new()),
        ConfigKey::ApiEndpoint => ConfigValue::String("https://api.kilometers.ai".to_owned()),
        ConfigKey::BufferSize => ConfigValue::Int(1024 * 1024),
        ConfigKey::BatchSize => ConfigValue::Int(10),
        ConfigKey::LogLevel => ConfigValue::String("info".to_owned()),
        ConfigKey::Debug => ConfigValue::Bool(false),
        ConfigKey::PluginsDir => ConfigValue::Path(default_plugins_dir()),
        ConfigKey::AutoProvision => ConfigValue::Bool(false),
        ConfigKey::DefaultTimeout => ConfigValue::Duration(Duration::from_secs(30)),
    }
}

fn default_plugins_dir() -> PathBuf {
    KilometersHome::resolve().plugins_dir()
}
