//! The plugin host: owns every spawned plugin and fans captured messages
//! out to the ones currently `Ready`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use km_core::{
    FramedMessage, InstalledPlugin, PluginInstance, PluginState, RetryConfig, Subscription,
    TerminationReason,
};
use km_plugin_transport::{perform_handshake, HandshakeConfig, PluginRpcClient};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::discovery::{self, Candidate};
use crate::error::{HostError, HostResult};
use crate::managed::PluginHandle;

/// How often a supervisor task polls a spawned plugin's state to detect
/// unexpected termination. The delivery task updates state immediately on
/// exit; this only bounds how promptly the host notices.
const SUPERVISION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Deadline given to every plugin's `Shutdown()` RPC during host shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Configuration the host needs to discover and spawn plugins.
#[derive(Debug, Clone)]
pub struct PluginHostConfig {
    /// Directory scanned for `km-plugin-<name>` executables.
    pub plugins_dir: PathBuf,
    /// Deadline applied to every RPC call against a plugin.
    pub default_timeout: Duration,
    /// Handshake cookie/protocol-version configuration.
    pub handshake: HandshakeConfig,
}

/// A snapshot of fan-out drop counters, for `plugins list`/diagnostics.
#[derive(Debug, Clone)]
pub struct DispatchStats {
    /// Plugin name.
    pub name: String,
    /// Current lifecycle state.
    pub state: PluginState,
    /// Messages dropped because this plugin's queue was full.
    pub dropped: u64,
}

/// Owns every spawned [`PluginHandle`] and the entitled subscription used
/// for tier enforcement.
pub struct PluginHost {
    config: PluginHostConfig,
    subscription: Subscription,
    plugins: DashMap<String, PluginHandle>,
    cancel: CancellationToken,
}

impl PluginHost {
    /// Construct a host for a given subscription. Discovery and spawning
    /// happen afterward via [`PluginHost::initialize`].
    #[must_use]
    pub fn new(config: PluginHostConfig, subscription: Subscription) -> Arc<Self> {
        Arc::new(Self {
            config,
            subscription,
            plugins: DashMap::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// The subscription this host was constructed with.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Discover all installed plugins and spawn/initialize each one.
    /// Each plugin is supervised independently afterward; one plugin's
    /// initialization failure never aborts the others (§4.5).
    pub async fn initialize(self: &Arc<Self>, registry: &[InstalledPlugin], auth_token: &str) {
        let candidates = discovery::discover(&self.config.plugins_dir);

        for candidate in candidates {
            let Some(installed) = registry.iter().find(|p| p.manifest.name == candidate.name)
            else {
                warn!(
                    plugin = candidate.name,
                    "discovered binary has no matching registry entry, skipping"
                );
                continue;
            };

            let host = Arc::clone(self);
            let manifest = installed.manifest.clone();
            let token = auth_token.to_owned();

            tokio::spawn(async move {
                host.supervise(candidate, manifest, token).await;
            });
        }
    }

    /// Spawn one plugin and keep restarting it under the exponential
    /// backoff schedule for as long as it keeps dying unexpectedly and
    /// the host isn't shutting down.
    async fn supervise(
        self: Arc<Self>,
        candidate: Candidate,
        manifest: km_core::PluginManifest,
        auth_token: String,
    ) {
        let backoff = RetryConfig::plugin_restart();
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            match self
                .spawn_one(&candidate, manifest.clone(), &auth_token)
                .await
            {
                Ok(()) => {
                    attempt = 0;
                    let reason = self.wait_for_termination(&candidate.name).await;
                    self.plugins.remove(&candidate.name);

                    let restart_eligible = !matches!(
                        reason,
                        Some(TerminationReason::Requested)
                            | Some(TerminationReason::AuthFailed)
                            | Some(TerminationReason::InsufficientTier)
                            | Some(TerminationReason::CookieMismatch)
                            | Some(TerminationReason::VersionMismatch)
                            | Some(TerminationReason::HandshakeTimeout)
                    );

                    if self.cancel.is_cancelled() || !restart_eligible {
                        return;
                    }
                }
                Err(e) => {
                    warn!(plugin = candidate.name, error = %e, "plugin initialization failed");
                    return;
                }
            }

            attempt += 1;
            let delay = backoff.delay_for_attempt(attempt);
            info!(plugin = candidate.name, attempt, delay_secs = delay.as_secs(), "scheduling plugin restart");
            tokio::time::sleep(delay).await;
        }
    }

    async fn wait_for_termination(&self, name: &str) -> Option<TerminationReason> {
        loop {
            let Some(handle) = self.plugins.get(name) else {
                return None;
            };
            let instance = handle.instance.clone();
            drop(handle);

            let guard = instance.read().await;
            if guard.state == PluginState::Terminated {
                return guard.last_error.clone();
            }
            drop(guard);

            tokio::time::sleep(SUPERVISION_POLL_INTERVAL).await;
        }
    }

    /// Spawn one plugin through the full lifecycle: handshake, metadata,
    /// authenticate, tier check. On success the plugin is registered and
    /// receiving fan-out dispatch; on failure the child is already
    /// terminated.
    async fn spawn_one(
        &self,
        candidate: &Candidate,
        manifest: km_core::PluginManifest,
        auth_token: &str,
    ) -> HostResult<()> {
        let mut instance = PluginInstance::spawning(manifest.clone());

        let (mut child, handshake_info) =
            perform_handshake(&candidate.path, &[], &self.config.handshake).await?;
        instance.pid = child.id();
        instance.state = PluginState::Handshaking;

        let mut rpc =
            PluginRpcClient::connect(&handshake_info.network, self.config.default_timeout).await?;

        if let Err(e) = rpc.metadata().await {
            let _ = child.start_kill();
            return Err(e.into());
        }
        instance.state = PluginState::Authenticating;

        let auth = match rpc.authenticate(auth_token).await {
            Ok(auth) => auth,
            Err(km_plugin_transport::TransportError::RpcError { message, .. }) => {
                let _ = child.start_kill();
                return Err(HostError::AuthRejected {
                    name: manifest.name.clone(),
                    reason: message,
                });
            }
            Err(e) => {
                let _ = child.start_kill();
                return Err(e.into());
            }
        };

        if auth.subscription_tier < manifest.required_tier {
            let _ = child.start_kill();
            return Err(HostError::InsufficientTier {
                name: manifest.name.clone(),
                required: manifest.required_tier,
                actual: auth.subscription_tier,
            });
        }

        instance.state = PluginState::Ready;
        instance.last_verified_at = Some(chrono::Utc::now());
        instance.auth_token = Some(auth_token.to_owned());

        info!(plugin = manifest.name, "plugin ready");

        let handle = PluginHandle::spawn(
            candidate.name.clone(),
            instance,
            child,
            rpc,
            self.config.default_timeout,
        );
        self.plugins.insert(candidate.name.clone(), handle);

        Ok(())
    }

    /// Fan a captured message out to every plugin currently `Ready`.
    /// Never blocks: each plugin's bounded queue absorbs the message or
    /// drops its oldest entry (§4.5, §6).
    pub fn dispatch(&self, message: &FramedMessage) {
        for entry in &self.plugins {
            entry.value().enqueue(message.clone());
        }
    }

    /// Current dispatch stats for every known plugin, regardless of
    /// state, for diagnostics.
    pub async fn stats(&self) -> Vec<DispatchStats> {
        let mut stats = Vec::with_capacity(self.plugins.len());
        for entry in &self.plugins {
            let handle = entry.value();
            stats.push(DispatchStats {
                name: handle.name.clone(),
                state: handle.state().await,
                dropped: handle.dropped_count(),
            });
        }
        stats
    }

    /// Signal `Shutdown()` to every plugin in parallel with a bounded
    /// deadline, then let each delivery task finish tearing down its
    /// child process.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let names: Vec<String> = self.plugins.iter().map(|e| e.key().clone()).collect();
        let mut tasks = Vec::with_capacity(names.len());

        for name in names {
            if let Some((_, handle)) = self.plugins.remove(&name) {
                tasks.push(tokio::spawn(handle.shutdown(SHUTDOWN_DEADLINE)));
            }
        }

        for task in tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_host_discovers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = PluginHostConfig {
            plugins_dir: dir.path().to_owned(),
            default_timeout: Duration::from_secs(1),
            handshake: HandshakeConfig::default(),
        };
        let subscription = Subscription {
            tier: km_core::Tier::Free,
            customer_id: "cus_1".into(),
            customer_name: "Test".into(),
            features: Default::default(),
        };
        let host = PluginHost::new(config, subscription);
        host.initialize(&[], "token").await;
        assert!(host.stats().await.is_empty());
    }
}
