//! Resolution of the on-disk layout: config directory, plugins directory,
//! credential cache, and registry file.

use std::path::PathBuf;

/// The set of well-known paths kilometers reads and writes.
///
/// Mirrors §6 of the design: config lives under the platform config
/// directory as `kilometers/`, plugin binaries and the credential cache
/// live under `~/.km/`.
#[derive(Debug, Clone)]
pub struct KilometersHome {
    config_dir: PathBuf,
    km_dir: PathBuf,
}

impl KilometersHome {
    /// Resolve paths from the platform's standard directories, honoring
    /// `KM_PLUGINS_DIR`-style overrides only at the config-resolver layer,
    /// not here — this is the unconditional platform default.
    #[must_use]
    pub fn resolve() -> Self {
        let config_dir = directories::BaseDirs::new()
            .map(|b| b.config_dir().join("kilometers"))
            .unwrap_or_else(|| PathBuf::from(".config/kilometers"));
        let km_dir = directories::BaseDirs::new()
            .map(|b| b.home_dir().join(".km"))
            .unwrap_or_else(|| PathBuf::from(".km"));
        Self { config_dir, km_dir }
    }

    /// Build from explicit paths, bypassing platform detection (tests).
    #[must_use]
    pub fn with_paths(config_dir: PathBuf, km_dir: PathBuf) -> Self {
        Self { config_dir, km_dir }
    }

    /// `~/.config/kilometers/`
    #[must_use]
    pub fn config_dir(&self) -> &std::path::Path {
        &self.config_dir
    }

    /// `~/.config/kilometers/config.json`
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// `~/.config/kilometers/plugin-registry.json`
    #[must_use]
    pub fn registry_file(&self) -> PathBuf {
        self.config_dir.join("plugin-registry.json")
    }

    /// `~/.km/plugins/`
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.km_dir.join("plugins")
    }

    /// `~/.km/.credentials.enc`
    #[must_use]
    pub fn credentials_file(&self) -> PathBuf {
        self.km_dir.join(".credentials.enc")
    }

    /// `~/.km/`
    #[must_use]
    pub fn km_dir(&self) -> &std::path::Path {
        &self.km_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_joined_under_the_right_roots() {
        let home = KilometersHome::with_paths(PathBuf::from("/cfg"), PathBuf::from("/km"));
        assert_eq!(home.config_file(), PathBuf::from("/cfg/config.json"));
        assert_eq!(home.registry_file(), PathBuf::from("/cfg/plugin-registry.json"));
        assert_eq!(home.plugins_dir(), PathBuf::from("/km/plugins"));
        assert_eq!(home.credentials_file(), PathBuf::from("/km/.credentials.enc"));
    }
}
