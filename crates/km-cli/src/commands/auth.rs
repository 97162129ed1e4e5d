//! Auth commands — manage the cached API key credential, per §4.9.

use anyhow::{Context, Result};
use km_config::CredentialStore;
use km_core::{ConfigKey, ConfigSnapshot, KilometersHome};
use km_entitlement::Client;

use crate::theme::Theme;

/// `auth login`: validate an API key against the entitlement service, then
/// cache it. Prompts interactively if not supplied on the command line.
pub(crate) async fn login(snapshot: &ConfigSnapshot, home: &KilometersHome, api_key: Option<String>) -> Result<i32> {
    let api_key = match api_key {
        Some(k) => k,
        None => dialoguer::Password::new()
            .with_prompt("API key")
            .interact()
            .context("reading API key")?,
    };

    let client = Client::new(snapshot.api_endpoint(), &api_key);
    println!("{}", Theme::info("validating API key..."));
    let subscription = match client.validate_key().await {
        Ok(s) => s,
        Err(e) => {
            println!("{}", Theme::error(&format!("invalid API key: {e}")));
            return Ok(2);
        }
    };

    CredentialStore::new(home.credentials_file()).save(&api_key)?;
    println!(
        "{}",
        Theme::success(&format!(
            "logged in as {} ({} tier)",
            subscription.customer_name, subscription.tier
        ))
    );
    Ok(0)
}

/// `auth logout`: drop the cached credential. A no-op if none is cached.
pub(crate) fn logout(home: &KilometersHome) -> Result<i32> {
    CredentialStore::new(home.credentials_file()).remove()?;
    println!("{}", Theme::success("logged out"));
    Ok(0)
}

/// `auth status`: report whether an API key is effectively set, and
/// where it came from, without ever printing the key itself.
pub(crate) fn status(snapshot: &ConfigSnapshot) -> Result<i32> {
    match snapshot.entry(ConfigKey::ApiKey) {
        Some(entry) if !entry.value.as_str().unwrap_or_default().is_empty() => {
            println!(
                "{}",
                Theme::success(&format!("API key set (source: {})", entry.source))
            );
            Ok(0)
        }
        _ => {
            println!("{}", Theme::warning("no API key set; run `km auth login`"));
            Ok(1)
        }
    }
}
