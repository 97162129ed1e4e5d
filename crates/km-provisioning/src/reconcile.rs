//! Reconciliation of entitled plugins against what's installed locally,
//! per §4.7.

use km_core::{InstalledPlugin, PluginManifest};

/// What reconciling `entitled` against `installed` requires doing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Entitled plugins with no local install at all.
    pub to_install: Vec<PluginManifest>,
    /// Entitled plugins whose installed version differs (by semver, not
    /// lexicographic comparison) from the entitled manifest's version.
    pub to_update: Vec<PluginManifest>,
    /// Installed plugins no longer entitled. Presented for confirmation;
    /// never removed without consent.
    pub to_remove: Vec<InstalledPlugin>,
}

impl Plan {
    /// Whether there's nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the reconciliation plan. `entitled` is already filtered to
/// tier-compatible plugins by the caller.
#[must_use]
pub fn reconcile(entitled: &[PluginManifest], installed: &[InstalledPlugin]) -> Plan {
    let mut to_install = Vec::new();
    let mut to_update = Vec::new();

    for manifest in entitled {
        match installed.iter().find(|p| p.manifest.name == manifest.name) {
            None => to_install.push(manifest.clone()),
            Some(current) if current.manifest.version != manifest.version => {
                to_update.push(manifest.clone());
            }
            Some(_) => {}
        }
    }

    let to_remove = installed
        .iter()
        .filter(|p| !entitled.iter().any(|m| m.name == p.manifest.name))
        .cloned()
        .collect();

    Plan {
        to_install,
        to_update,
        to_remove,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use km_core::Tier;

    fn manifest(name: &str, version: &str) -> PluginManifest {
        PluginManifest {
            name: name.into(),
            version: version.parse().unwrap(),
            description: String::new(),
            required_tier: Tier::Free,
            size: 0,
            checksum: "deadbeef".into(),
            signature: None,
            download_url: "https://example.com".into(),
        }
    }

    fn installed(name: &str, version: &str) -> InstalledPlugin {
        InstalledPlugin {
            manifest: manifest(name, version),
            local_path: format!("/plugins/{name}").into(),
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn plugin_with_no_local_install_is_to_install() {
        let entitled = vec![manifest("console-logger", "1.0.0")];
        let plan = reconcile(&entitled, &[]);
        assert_eq!(plan.to_install, entitled);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn version_mismatch_is_semver_not_lexicographic() {
        // "1.9.0" > "1.10.0" lexicographically but not semver.
        let entitled = vec![manifest("p", "1.10.0")];
        let current = vec![installed("p", "1.9.0")];
        let plan = reconcile(&entitled, &current);
        assert_eq!(plan.to_update, entitled);
        assert!(plan.to_install.is_empty());
    }

    #[test]
    fn matching_version_is_neither_install_nor_update() {
        let entitled = vec![manifest("p", "1.0.0")];
        let current = vec![installed("p", "1.0.0")];
        let plan = reconcile(&entitled, &current);
        assert!(plan.is_empty());
    }

    #[test]
    fn installed_but_not_entitled_is_to_remove() {
        let current = vec![installed("stale-plugin", "1.0.0")];
        let plan = reconcile(&[], &current);
        assert_eq!(plan.to_remove, current);
    }
}
