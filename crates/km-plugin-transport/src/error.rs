//! Transport-level error taxonomy, per §4.4.

use thiserror::Error;

/// Errors establishing or using a plugin's RPC transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No handshake line arrived before the deadline.
    #[error("handshake timeout waiting for plugin to print its connect line")]
    HandshakeTimeout,

    /// The handshake line didn't match `PROTO|NET|ADDR|PID|CERT`.
    #[error("malformed handshake line: {0}")]
    MalformedHandshake(String),

    /// The host and child disagree on protocol version.
    #[error("protocol version mismatch: host speaks {host}, child reported {child}")]
    VersionMismatch {
        /// The host's protocol version.
        host: u32,
        /// The version the child reported.
        child: u32,
    },

    /// The child's handshake line implied it rejected our magic cookie.
    #[error("plugin rejected magic cookie")]
    CookieMismatch,

    /// Connecting to the address the handshake advertised failed.
    #[error("failed to connect to plugin transport: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The transport closed (socket EOF) mid-RPC.
    #[error("plugin transport closed")]
    TransportClosed,

    /// An RPC did not complete before `default_timeout`.
    #[error("rpc deadline exceeded: {method}")]
    RpcDeadlineExceeded {
        /// The RPC method that timed out.
        method: &'static str,
    },

    /// The plugin process exited unexpectedly.
    #[error("plugin child process exited unexpectedly")]
    ChildExited,

    /// The plugin returned a JSON-RPC error response.
    #[error("plugin RPC error ({code}): {message}")]
    RpcError {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// (De)serializing an RPC frame failed.
    #[error("RPC serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Spawning the plugin child process failed.
    #[error("failed to spawn plugin process: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result type for plugin transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
