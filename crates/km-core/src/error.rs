//! Error kinds shared across crates, plus the core-level taxonomy entries
//! that don't belong to any single subsystem (missing required config,
//! subprocess forwarding).

use thiserror::Error;

/// Errors originating from `km-core` itself: config/dir resolution that
/// has no single owning subsystem.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A downstream operation needed a config key that has no effective value.
    #[error("missing required configuration: {key}")]
    MissingRequired {
        /// The config key that was required.
        key: String,
    },

    /// The subprocess being proxied exited; its code should become ours.
    #[error("subprocess exited with code {0}")]
    SubprocessFailed(i32),

    /// Wraps an I/O error with the path it occurred on, for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path the operation was performed on.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for `km-core` operations.
pub type CoreResult<T> = Result<T, CoreError>;
