//! Scans `plugins_dir` for installed plugin binaries, per §4.5.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Prefix every plugin executable must carry.
pub const PLUGIN_PREFIX: &str = "km-plugin-";

/// One discovered candidate: a binary that looks like a plugin, not yet
/// spawned or verified.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The plugin name, derived from the filename with the prefix stripped.
    pub name: String,
    /// Full path to the executable.
    pub path: PathBuf,
}

/// List plugin candidates under `plugins_dir`.
///
/// A failure to read one directory entry (permission error, broken
/// symlink) is logged and skipped; it never aborts discovery of the
/// rest. A failure to read `plugins_dir` itself returns an empty list
/// (there is nothing to discover) and is logged.
pub fn discover(plugins_dir: &Path) -> Vec<Candidate> {
    let entries = match std::fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %plugins_dir.display(), error = %e, "could not read plugins directory");
            return Vec::new();
        }
    };

    let mut candidates = Vec::new();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };

        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let Some(name) = file_name.strip_prefix(PLUGIN_PREFIX) else {
            continue;
        };

        match is_executable(&path) {
            Ok(true) => candidates.push(Candidate {
                name: name.to_owned(),
                path,
            }),
            Ok(false) => {
                warn!(path = %path.display(), "plugin candidate is not executable, skipping");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not stat plugin candidate");
            }
        }
    }

    candidates
}

#[cfg(unix)]
fn is_executable(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)?;
    Ok(metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> std::io::Result<bool> {
    let metadata = std::fs::metadata(path)?;
    Ok(metadata.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_no_candidates() {
        let candidates = discover(Path::new("/nonexistent/path/for/test"));
        assert!(candidates.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn finds_prefixed_executables_and_skips_others() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();

        let plugin_path = dir.path().join("km-plugin-logger");
        std::fs::write(&plugin_path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&plugin_path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let non_plugin_path = dir.path().join("notes.txt");
        std::fs::write(&non_plugin_path, b"hello").unwrap();

        let unexecutable_path = dir.path().join("km-plugin-disabled");
        std::fs::write(&unexecutable_path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&unexecutable_path, std::fs::Permissions::from_mode(0o644))
            .unwrap();

        let candidates = discover(dir.path());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "logger");
    }
}
