//! Config commands — provenance-annotated display of the resolved
//! configuration, per §4.1's "Provenance display" contract.

use anyhow::Result;
use km_config::Resolved;
use km_core::ConfigValue;

use crate::theme::Theme;

/// `config show`: the resolved configuration with a source annotation per
/// key, either as an aligned table (`text`) or a `_sources`-annotated JSON
/// document (`json`).
pub(crate) fn show(resolved: &Resolved, format: &str) -> Result<i32> {
    if format.eq_ignore_ascii_case("json") {
        let mut document = serde_json::Map::new();
        let mut sources = serde_json::Map::new();
        for entry in resolved.snapshot.entries() {
            document.insert(entry.key.as_str().to_owned(), value_to_json(&entry.value));
            sources.insert(entry.key.as_str().to_owned(), serde_json::Value::String(entry.source.to_string()));
        }
        document.insert("_sources".to_owned(), serde_json::Value::Object(sources));
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(0);
    }

    println!("{}", Theme::header("resolved configuration"));
    println!("{}", Theme::separator());
    for entry in resolved.snapshot.entries() {
        let display_value = if entry.key == km_core::ConfigKey::ApiKey {
            mask(entry.value.as_str().unwrap_or_default())
        } else {
            value_to_text(&entry.value)
        };
        println!("{}", Theme::kv_sourced(entry.key.as_str(), &display_value, &entry.source.to_string()));
    }
    Ok(0)
}

/// `config path`: every file location the resolver checked, in precedence
/// order, whether or not it exists.
pub(crate) fn path(resolved: &Resolved) -> Result<i32> {
    println!("{}", Theme::header("config file locations checked"));
    for checked in &resolved.checked_files {
        let status = if checked.existed {
            Theme::success("found")
        } else {
            Theme::dimmed("absent")
        };
        println!("  {} {}", checked.path.display(), status);
    }
    Ok(0)
}

fn value_to_text(value: &ConfigValue) -> String {
    match value {
        ConfigValue::String(s) => s.clone(),
        ConfigValue::Int(i) => i.to_string(),
        ConfigValue::Bool(b) => b.to_string(),
        ConfigValue::Path(p) => p.display().to_string(),
        ConfigValue::Duration(d) => format!("{}s", d.as_secs()),
    }
}

fn value_to_json(value: &ConfigValue) -> serde_json::Value {
    match value {
        ConfigValue::String(s) => serde_json::Value::String(s.clone()),
        ConfigValue::Int(i) => serde_json::Value::from(*i),
        ConfigValue::Bool(b) => serde_json::Value::Bool(*b),
        ConfigValue::Path(p) => serde_json::Value::String(p.display().to_string()),
        ConfigValue::Duration(d) => {
            #[allow(clippy::cast_possible_truncation)]
            serde_json::Value::from(d.as_millis() as u64)
        }
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible = secret.len().min(4);
    format!("{}***", &secret[..visible])
}
