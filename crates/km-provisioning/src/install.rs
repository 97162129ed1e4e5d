//! Install/update protocol: archive detection, safe extraction, and
//! atomic placement into `plugins_dir`, per §4.7 steps (4)-(6).

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use km_core::{InstalledPlugin, PluginManifest};

use crate::error::{ProvisioningError, ProvisioningResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_ENTRY_COUNT: usize = 10_000;
const MAX_EXTRACTED_SIZE: u64 = 500_000_000;

/// Resolve the plugin's executable bytes: extract a single entry from a
/// gzip-prefixed archive, or pass raw bytes through unchanged.
fn resolve_binary(name: &str, bytes: &[u8]) -> ProvisioningResult<Vec<u8>> {
    if bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC {
        extract_single_executable(name, bytes)
    } else {
        Ok(bytes.to_vec())
    }
}

/// Extract a gzip-compressed tar archive and return the bytes of its one
/// expected regular file entry. Refuses any entry whose path, after
/// normalization, would escape the staging directory.
fn extract_single_executable(name: &str, data: &[u8]) -> ProvisioningResult<Vec<u8>> {
    let staging = tempfile::tempdir().map_err(|e| ProvisioningError::InstallFailed {
        name: name.to_owned(),
        message: format!("failed to create staging directory: {e}"),
    })?;
    let dest = staging.path().canonicalize().map_err(|e| ProvisioningError::InstallFailed {
        name: name.to_owned(),
        message: format!("failed to canonicalize staging directory: {e}"),
    })?;

    let decoder = flate2::read::GzDecoder::new(data);
    let mut archive = tar::Archive::new(decoder);

    let mut entry_count = 0usize;
    let mut total_size = 0u64;
    let mut extracted: Vec<PathBuf> = Vec::new();

    let entries = archive.entries().map_err(|e| ProvisioningError::InstallFailed {
        name: name.to_owned(),
        message: format!("failed to read archive entries: {e}"),
    })?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| ProvisioningError::InstallFailed {
            name: name.to_owned(),
            message: format!("failed to read archive entry: {e}"),
        })?;

        entry_count = entry_count.saturating_add(1);
        if entry_count > MAX_ENTRY_COUNT {
            return Err(ProvisioningError::InstallFailed {
                name: name.to_owned(),
                message: format!("archive exceeds maximum entry count ({MAX_ENTRY_COUNT})"),
            });
        }

        let entry_type = entry.header().entry_type();
        if !matches!(entry_type, tar::EntryType::Regular | tar::EntryType::Directory) {
            let path = entry
                .path()
                .map_or_else(|_| "<unknown>".to_string(), |p| p.display().to_string());
            return Err(ProvisioningError::UnsafeArchivePath {
                name: name.to_owned(),
                path,
            });
        }

        let entry_size = entry.header().size().map_err(|e| ProvisioningError::InstallFailed {
            name: name.to_owned(),
            message: format!("failed to read entry size: {e}"),
        })?;
        total_size = total_size.saturating_add(entry_size);
        if total_size > MAX_EXTRACTED_SIZE {
            return Err(ProvisioningError::InstallFailed {
                name: name.to_owned(),
                message: format!("archive exceeds maximum extracted size ({MAX_EXTRACTED_SIZE} bytes)"),
            });
        }

        let entry_path = entry
            .path()
            .map_err(|e| ProvisioningError::InstallFailed {
                name: name.to_owned(),
                message: format!("failed to read entry path: {e}"),
            })?
            .into_owned();

        if entry_path.is_absolute() {
            return Err(ProvisioningError::UnsafeArchivePath {
                name: name.to_owned(),
                path: entry_path.display().to_string(),
            });
        }
        for component in entry_path.components() {
            if matches!(
                component,
                std::path::Component::ParentDir
                    | std::path::Component::Prefix(_)
                    | std::path::Component::RootDir
            ) {
                return Err(ProvisioningError::UnsafeArchivePath {
                    name: name.to_owned(),
                    path: entry_path.display().to_string(),
                });
            }
        }

        let target = dest.join(&entry_path);
        if let Some(canonical_parent) = target.parent().and_then(|p| p.canonicalize().ok()) {
            let canonical_target = canonical_parent.join(target.file_name().unwrap_or_default());
            if !canonical_target.starts_with(&dest) {
                return Err(ProvisioningError::UnsafeArchivePath {
                    name: name.to_owned(),
                    path: entry_path.display().to_string(),
                });
            }
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProvisioningError::InstallFailed {
                name: name.to_owned(),
                message: format!("failed to create directory {}: {e}", parent.display()),
            })?;
        }

        if entry_type == tar::EntryType::Regular {
            entry.unpack(&target).map_err(|e| ProvisioningError::InstallFailed {
                name: name.to_owned(),
                message: format!("failed to unpack {}: {e}", entry_path.display()),
            })?;
            extracted.push(target);
        }
    }

    match extracted.as_slice() {
        [single] => std::fs::read(single).map_err(|e| ProvisioningError::InstallFailed {
            name: name.to_owned(),
            message: format!("failed to read extracted binary: {e}"),
        }),
        [] => Err(ProvisioningError::InstallFailed {
            name: name.to_owned(),
            message: "archive contained no regular file entries".into(),
        }),
        _ => Err(ProvisioningError::InstallFailed {
            name: name.to_owned(),
            message: format!(
                "archive contained {} regular files, expected exactly one executable",
                extracted.len()
            ),
        }),
    }
}

/// Write `bytes` into `plugins_dir` under `manifest.name`'s final path,
/// atomically: staged in a temp file in the same directory (same
/// filesystem), executable bit set, then renamed into place. A reader can
/// never observe a partially written file at the final path.
pub fn install(
    manifest: &PluginManifest,
    bytes: &[u8],
    plugins_dir: &Path,
) -> ProvisioningResult<InstalledPlugin> {
    std::fs::create_dir_all(plugins_dir).map_err(|e| ProvisioningError::InstallFailed {
        name: manifest.name.clone(),
        message: format!("failed to create plugins directory: {e}"),
    })?;

    let binary = resolve_binary(&manifest.name, bytes)?;

    let final_path = plugins_dir.join(format!("km-plugin-{}", manifest.name));

    let mut tmp = tempfile::NamedTempFile::new_in(plugins_dir).map_err(|e| {
        ProvisioningError::InstallFailed {
            name: manifest.name.clone(),
            message: format!("failed to create staging file: {e}"),
        }
    })?;

    tmp.write_all(&binary).map_err(|e| ProvisioningError::InstallFailed {
        name: manifest.name.clone(),
        message: format!("failed to write staging file: {e}"),
    })?;
    tmp.as_file().sync_all().map_err(|e| ProvisioningError::InstallFailed {
        name: manifest.name.clone(),
        message: format!("failed to sync staging file: {e}"),
    })?;

    set_executable(tmp.path()).map_err(|e| ProvisioningError::InstallFailed {
        name: manifest.name.clone(),
        message: format!("failed to set executable permissions: {e}"),
    })?;

    tmp.persist(&final_path).map_err(|e| ProvisioningError::InstallFailed {
        name: manifest.name.clone(),
        message: format!("failed to atomically install binary: {e}"),
    })?;

    Ok(InstalledPlugin {
        manifest: manifest.clone(),
        local_path: final_path,
        installed_at: Utc::now(),
    })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use km_core::Tier;

    fn manifest() -> PluginManifest {
        PluginManifest {
            name: "console-logger".into(),
            version: semver::Version::new(1, 0, 0),
            description: String::new(),
            required_tier: Tier::Free,
            size: 0,
            checksum: "deadbeef".into(),
            signature: None,
            download_url: "https://example.com".into(),
        }
    }

    #[test]
    fn raw_bytes_install_to_named_path() {
        let dir = tempfile::tempdir().unwrap();
        let installed = install(&manifest(), b"#!/bin/sh\necho hi\n", dir.path()).unwrap();
        assert_eq!(installed.local_path, dir.path().join("km-plugin-console-logger"));
        assert!(installed.local_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn installed_binary_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let installed = install(&manifest(), b"#!/bin/sh\n", dir.path()).unwrap();
        let mode = std::fs::metadata(&installed.local_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn no_staging_artifacts_survive_a_successful_install() {
        let dir = tempfile::tempdir().unwrap();
        install(&manifest(), b"binary", dir.path()).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn path_traversal_entry_is_rejected() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"pwned";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "../escape", &data[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, &tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let result = extract_single_executable("evil", &gz_bytes);
        assert!(matches!(result, Err(ProvisioningError::UnsafeArchivePath { .. })));
    }
}
