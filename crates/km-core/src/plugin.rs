//! Plugin data model: manifests, installed records, and the runtime
//! [`PluginInstance`] the plugin host owns through its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable metadata describing one plugin, as returned by the
/// entitlement service or read back from a local manifest cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin name (unique across the manifest list).
    pub name: String,
    /// Semver version string.
    pub version: semver::Version,
    /// Human-readable description.
    pub description: String,
    /// Minimum subscription tier required to run this plugin.
    pub required_tier: crate::subscription::Tier,
    /// Binary size in bytes, as advertised by the entitlement service.
    pub size: u64,
    /// Hex-encoded sha-256 digest of the binary bytes.
    pub checksum: String,
    /// Optional base64 Ed25519 signature over the binary bytes.
    pub signature: Option<String>,
    /// URL to fetch the binary (or archive) from.
    pub download_url: String,
}

/// A plugin that has been installed locally, persisted in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    /// The manifest this install was performed against.
    pub manifest: PluginManifest,
    /// Where the installed binary lives on disk.
    pub local_path: std::path::PathBuf,
    /// When the install (or most recent update) completed.
    pub installed_at: DateTime<Utc>,
}

/// The plugin host's runtime lifecycle states for one [`PluginInstance`].
///
/// See SPEC_FULL.md §4.5 for the full transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Child process started; handshake line not yet received.
    Spawning,
    /// RPC transport established; awaiting `Metadata()`.
    Handshaking,
    /// `Metadata()` succeeded; awaiting `Authenticate()`.
    Authenticating,
    /// Authenticated, tier-satisfied, and receiving fan-out dispatch.
    Ready,
    /// A dispatch failed or re-verification lapsed; messages are dropped
    /// silently while re-authentication is attempted in the background.
    Degraded,
    /// Shutdown requested or auth unrecoverable; winding down.
    Terminating,
    /// Child process is gone; terminal state.
    Terminated,
}

impl PluginState {
    /// Whether the host should fan out messages to a plugin in this state.
    #[must_use]
    pub const fn receives_dispatch(self) -> bool {
        matches!(self, PluginState::Ready)
    }

    /// Whether this is a terminal state (no further transitions).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, PluginState::Terminated)
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PluginState::Spawning => "spawning",
            PluginState::Handshaking => "handshaking",
            PluginState::Authenticating => "authenticating",
            PluginState::Ready => "ready",
            PluginState::Degraded => "degraded",
            PluginState::Terminating => "terminating",
            PluginState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Why a plugin instance reached `Terminated` (or `Degraded`), recorded
/// for diagnostics and for `plugins list` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The handshake line never arrived within the timeout.
    HandshakeTimeout,
    /// The child's magic cookie did not match.
    CookieMismatch,
    /// The child reported an incompatible protocol version.
    VersionMismatch,
    /// `Authenticate()` failed (bad token, service rejected it).
    AuthFailed,
    /// The subscription's tier does not satisfy `required_tier`.
    InsufficientTier,
    /// `Shutdown()` was requested by the driver.
    Requested,
    /// The child process exited on its own.
    ChildExited {
        /// The child's exit code, if known.
        code: Option<i32>,
    },
    /// A repeated RPC deadline was exceeded with no recovery.
    RpcDeadlineExceeded,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::HandshakeTimeout => write!(f, "handshake timeout"),
            TerminationReason::CookieMismatch => write!(f, "cookie mismatch"),
            TerminationReason::VersionMismatch => write!(f, "protocol version mismatch"),
            TerminationReason::AuthFailed => write!(f, "authentication failed"),
            TerminationReason::InsufficientTier => write!(f, "insufficient subscription tier"),
            TerminationReason::Requested => write!(f, "shutdown requested"),
            TerminationReason::ChildExited { code } => match code {
                Some(c) => write!(f, "child exited with code {c}"),
                None => write!(f, "child exited"),
            },
            TerminationReason::RpcDeadlineExceeded => write!(f, "rpc deadline exceeded"),
        }
    }
}

/// The plugin host's runtime record for one spawned plugin.
///
/// A value type: there is no inheritance or dynamic dispatch here, only a
/// fixed set of RPC operations (`km-plugin-transport::PluginRpcClient`)
/// the host calls against the handle it holds.
#[derive(Debug, Clone)]
pub struct PluginInstance {
    /// The manifest this instance was spawned from.
    pub manifest: PluginManifest,
    /// Current lifecycle state.
    pub state: PluginState,
    /// When the plugin was last successfully (re-)verified.
    pub last_verified_at: Option<DateTime<Utc>>,
    /// The bearer token presented at `Authenticate()`, once known.
    pub auth_token: Option<String>,
    /// The most recent non-fatal error or termination reason, if any.
    pub last_error: Option<TerminationReason>,
    /// Process ID of the spawned child, once known.
    pub pid: Option<u32>,
}

impl PluginInstance {
    /// Construct a fresh instance in the `Spawning` state.
    #[must_use]
    pub fn spawning(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            state: PluginState::Spawning,
            last_verified_at: None,
            auth_token: None,
            last_error: None,
            pid: None,
        }
    }

    /// Re-verification interval: 5 minutes, per §4.5.
    pub const REVERIFY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);

    /// Whether this instance's verification has lapsed and it should move
    /// to `Degraded` even absent an RPC failure.
    #[must_use]
    pub fn verification_lapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_verified_at {
            None => true,
            Some(t) => {
                let elapsed = now.signed_duration_since(t);
                elapsed
                    .to_std()
                    .map(|d| d > Self::REVERIFY_INTERVAL)
                    .unwrap_or(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> PluginManifest {
        PluginManifest {
            name: "console-logger".into(),
            version: semver::Version::new(1, 0, 0),
            description: "logs to console".into(),
            required_tier: crate::subscription::Tier::Free,
            size: 1024,
            checksum: "deadbeef".into(),
            signature: None,
            download_url: "https://example.com/plugin".into(),
        }
    }

    #[test]
    fn only_ready_receives_dispatch() {
        assert!(PluginState::Ready.receives_dispatch());
        for s in [
            PluginState::Spawning,
            PluginState::Handshaking,
            PluginState::Authenticating,
            PluginState::Degraded,
            PluginState::Terminating,
            PluginState::Terminated,
        ] {
            assert!(!s.receives_dispatch());
        }
    }

    #[test]
    fn fresh_instance_verification_lapsed() {
        let instance = PluginInstance::spawning(manifest());
        assert!(instance.verification_lapsed(Utc::now()));
    }

    #[test]
    fn verification_within_interval_not_lapsed() {
        let mut instance = PluginInstance::spawning(manifest());
        instance.last_verified_at = Some(Utc::now());
        assert!(!instance.verification_lapsed(Utc::now()));
    }

    #[test]
    fn verification_past_interval_lapsed() {
        let mut instance = PluginInstance::spawning(manifest());
        instance.last_verified_at = Some(Utc::now() - chrono::Duration::minutes(6));
        assert!(instance.verification_lapsed(Utc::now()));
    }
}
