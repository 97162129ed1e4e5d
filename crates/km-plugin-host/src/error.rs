//! Plugin host error taxonomy.

use thiserror::Error;

/// Errors raised while discovering, spawning, or authenticating a plugin.
///
/// These are per-plugin: one plugin's [`HostError`] never aborts
/// discovery or initialization of the rest (§4.5).
#[derive(Debug, Error)]
pub enum HostError {
    /// Reading `plugins_dir` failed outright (the directory itself, not a
    /// single candidate inside it).
    #[error("failed to read plugins directory {path}: {source}")]
    PluginsDirUnreadable {
        /// The directory that could not be read.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The handshake or RPC transport failed.
    #[error(transparent)]
    Transport(#[from] km_plugin_transport::TransportError),

    /// `Authenticate()` succeeded but the subscription's tier does not
    /// satisfy the plugin's `required_tier`.
    #[error("plugin {name} requires tier {required} but subscription is {actual}")]
    InsufficientTier {
        /// The plugin's name.
        name: String,
        /// The tier the plugin requires.
        required: km_core::Tier,
        /// The authenticated subscription's actual tier.
        actual: km_core::Tier,
    },

    /// `Authenticate()` returned a failure.
    #[error("plugin {name} rejected authentication: {reason}")]
    AuthRejected {
        /// The plugin's name.
        name: String,
        /// The reason the plugin gave, if any.
        reason: String,
    },

    /// No plugin is registered under this name.
    #[error("no plugin named {0} is registered with the host")]
    UnknownPlugin(String),
}

/// Result type for plugin host operations.
pub type HostResult<T> = Result<T, HostError>;
