//! Proxy-level error types.

use thiserror::Error;

/// Errors that can occur starting or running the stdio proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The server command vector (after `--`) was empty.
    #[error("no server command given after `--`")]
    EmptyServerCommand,

    /// Spawning the subprocess failed.
    #[error("failed to spawn server process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The subprocess's stdio handles were not piped as expected.
    #[error("subprocess stdio handle unavailable")]
    MissingStdioHandle,
}
