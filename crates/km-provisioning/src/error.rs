//! Failure taxonomy for the provisioning orchestrator, per §7.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can arise installing, updating, or persisting one plugin.
/// The orchestrator isolates these per plugin; one failure never aborts
/// reconciliation of the rest.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Fetching the plugin's bytes from the entitlement service failed.
    #[error("download failed for {name}: {source}")]
    DownloadFailed {
        /// The plugin's name.
        name: String,
        /// The underlying entitlement client error.
        #[source]
        source: km_entitlement::EntitlementError,
    },

    /// An archive entry's path escaped the destination directory, or used
    /// an unsafe entry type, after normalization.
    #[error("unsafe archive path for {name}: {path}")]
    UnsafeArchivePath {
        /// The plugin's name.
        name: String,
        /// The offending entry path, as recorded in the archive.
        path: String,
    },

    /// The archive or binary could not be written into place.
    #[error("install failed for {name}: {message}")]
    InstallFailed {
        /// The plugin's name.
        name: String,
        /// A human-readable description of the failure.
        message: String,
    },

    /// The registry file at `path` could not be read, parsed, or written.
    #[error("registry error at {path}: {message}")]
    RegistryError {
        /// The registry file's path.
        path: PathBuf,
        /// A human-readable description of the failure.
        message: String,
    },
}

/// Result type for `km-provisioning` operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
