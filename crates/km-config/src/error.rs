//! Failure taxonomy for the configuration resolver, per §7.

use std::path::PathBuf;

use thiserror::Error;

/// Errors the resolver and credential store can surface.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config or `.env` file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadError {
        /// The file's path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A config file's contents could not be parsed.
    #[error("failed to parse {path}: {message}")]
    ParseError {
        /// The file's path.
        path: PathBuf,
        /// A human-readable description of the failure.
        message: String,
    },

    /// A resolved value failed a documented constraint.
    #[error("invalid value for {field}: {message}")]
    ValidationError {
        /// The offending field.
        field: String,
        /// A human-readable description of the failure.
        message: String,
    },

    /// The config file, or the credential store, could not be written.
    #[error("failed to write {path}: {source}")]
    SaveError {
        /// The file's path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The platform home directory could not be determined.
    #[error("could not determine home directory")]
    NoHomeDir,

    /// The credential cache exists but could not be decoded.
    #[error("credential store at {path} is corrupt: {message}")]
    CredentialError {
        /// The credential file's path.
        path: PathBuf,
        /// A human-readable description of the failure.
        message: String,
    },
}

/// Result type for `km-config` operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
