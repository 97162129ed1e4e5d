//! Reconciles a customer's entitled plugins against what's installed
//! locally and mutates local state to match, per §4.7.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod install;
mod reconcile;
mod registry;

pub use error::{ProvisioningError, ProvisioningResult};
pub use reconcile::{reconcile, Plan};
pub use registry::Registry;

use km_core::{InstalledPlugin, Subscription};
use tracing::{info, warn};

/// One plugin's outcome from a provisioning run, for driver reporting.
#[derive(Debug)]
pub enum Outcome {
    /// Installed successfully.
    Installed(InstalledPlugin),
    /// Updated successfully.
    Updated(InstalledPlugin),
    /// Removed from the registry (caller already confirmed intent).
    Removed(String),
    /// Failed; reconciliation continues with the remaining plugins.
    Failed {
        /// The plugin's name.
        name: String,
        /// Why it failed.
        error: ProvisioningError,
    },
}

/// Drive the full install/update protocol for a reconciliation [`Plan`]
/// against a validated entitlement client, persisting results to the
/// registry at `registry_path`. One plugin's failure never aborts the
/// rest (§7).
pub async fn apply(
    plan: &Plan,
    client: &km_entitlement::Client,
    platform: &str,
    plugins_dir: &std::path::Path,
    registry_path: &std::path::Path,
) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(plan.to_install.len() + plan.to_update.len());

    let installs = plan.to_install.iter().map(|m| (m, false));
    let updates = plan.to_update.iter().map(|m| (m, true));

    for (manifest, is_update) in installs.chain(updates) {
        let outcome = install_one(manifest, is_update, client, platform, plugins_dir).await;
        match &outcome {
            Outcome::Installed(p) | Outcome::Updated(p) => {
                let result = Registry::update(registry_path, |r| r.insert(p.clone()));
                if let Err(e) = result {
                    warn!(plugin = manifest.name, error = %e, "failed to persist registry after install");
                }
                info!(plugin = manifest.name, "plugin installed");
            }
            Outcome::Failed { name, error } => {
                warn!(plugin = name, error = %error, "provisioning failed for plugin");
            }
            Outcome::Removed(_) => unreachable!("install_one never returns Removed"),
        }
        outcomes.push(outcome);
    }

    outcomes
}

async fn install_one(
    manifest: &km_core::PluginManifest,
    is_update: bool,
    client: &km_entitlement::Client,
    platform: &str,
    plugins_dir: &std::path::Path,
) -> Outcome {
    let bytes = match client.download_plugin(manifest, platform).await {
        Ok(bytes) => bytes,
        Err(source) => {
            return Outcome::Failed {
                name: manifest.name.clone(),
                error: ProvisioningError::DownloadFailed {
                    name: manifest.name.clone(),
                    source,
                },
            }
        }
    };

    match install::install(manifest, &bytes, plugins_dir) {
        Ok(installed) if is_update => Outcome::Updated(installed),
        Ok(installed) => Outcome::Installed(installed),
        Err(error) => Outcome::Failed {
            name: manifest.name.clone(),
            error,
        },
    }
}

/// Remove plugins the caller has confirmed should be uninstalled: deletes
/// the binary and drops the registry entry.
pub fn remove(
    to_remove: &[InstalledPlugin],
    registry_path: &std::path::Path,
) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(to_remove.len());

    for plugin in to_remove {
        let name = plugin.manifest.name.clone();
        if let Err(e) = std::fs::remove_file(&plugin.local_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                outcomes.push(Outcome::Failed {
                    name: name.clone(),
                    error: ProvisioningError::InstallFailed {
                        name: name.clone(),
                        message: format!("failed to remove binary: {e}"),
                    },
                });
                continue;
            }
        }

        match Registry::update(registry_path, |r| {
            r.remove(&name);
        }) {
            Ok(()) => outcomes.push(Outcome::Removed(name)),
            Err(error) => outcomes.push(Outcome::Failed {
                name: name.clone(),
                error,
            }),
        }
    }

    outcomes
}

/// Filter an entitlement listing down to plugins the subscription's tier
/// can run, per the tier-monotonicity invariant (§8).
#[must_use]
pub fn tier_compatible(
    subscription: &Subscription,
    available: Vec<km_core::PluginManifest>,
) -> Vec<km_core::PluginManifest> {
    available
        .into_iter()
        .filter(|m| subscription.can_access(m.required_tier))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_core::Tier;
    use std::collections::BTreeSet;

    #[test]
    fn tier_compatible_drops_plugins_above_subscription_tier() {
        let subscription = Subscription {
            tier: Tier::Free,
            customer_id: "c".into(),
            customer_name: "n".into(),
            features: BTreeSet::new(),
        };
        let free = km_core::PluginManifest {
            name: "free-plugin".into(),
            version: semver::Version::new(1, 0, 0),
            description: String::new(),
            required_tier: Tier::Free,
            size: 0,
            checksum: "a".into(),
            signature: None,
            download_url: "https://example.com".into(),
        };
        let mut pro = free.clone();
        pro.name = "pro-plugin".into();
        pro.required_tier = Tier::Pro;

        let result = tier_compatible(&subscription, vec![free.clone(), pro]);
        assert_eq!(result, vec![free]);
    }
}
