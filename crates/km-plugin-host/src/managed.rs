//! A single spawned plugin's runtime handle: its lifecycle record, its
//! bounded delivery queue, and the task servicing that queue.

use std::sync::Arc;
use std::time::Duration;

use km_core::{FramedMessage, PluginInstance, PluginState, TerminationReason};
use km_plugin_transport::PluginRpcClient;
use tokio::process::Child;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::queue::{self, QueueSender};

/// Default bound for a plugin's delivery queue, per §4.5.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A live plugin: its lifecycle record, the channel fan-out feeds, and
/// the task driving `HandleMessage` calls against it.
pub struct PluginHandle {
    /// The plugin's name (matches its manifest and binary suffix).
    pub name: String,
    /// The lifecycle record, shared with the delivery task.
    pub instance: Arc<RwLock<PluginInstance>>,
    queue_tx: QueueSender<FramedMessage>,
    delivery_task: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl PluginHandle {
    /// Spawn the delivery task for an already-authenticated plugin and
    /// return its handle. `child` and `rpc` are moved into the task; the
    /// host interacts with the plugin only through this handle from here
    /// on.
    pub fn spawn(
        name: String,
        instance: PluginInstance,
        child: Child,
        rpc: PluginRpcClient,
        default_timeout: Duration,
    ) -> Self {
        let (queue_tx, queue_rx) = queue::channel(DEFAULT_QUEUE_CAPACITY);
        let instance = Arc::new(RwLock::new(instance));
        let cancel = CancellationToken::new();

        let delivery_task = tokio::spawn(run_delivery(
            name.clone(),
            instance.clone(),
            child,
            rpc,
            queue_rx,
            default_timeout,
            cancel.clone(),
        ));

        Self {
            name,
            instance,
            queue_tx,
            delivery_task,
            cancel,
        }
    }

    /// Enqueue a captured message for this plugin, dropping the oldest
    /// queued message if the bounded queue is full. Never blocks: this is
    /// called from the fan-out path, which must never stall the proxy
    /// (§4.5, §6 backpressure).
    pub fn enqueue(&self, message: FramedMessage) {
        self.queue_tx.enqueue(message);
    }

    /// Count of messages dropped because the queue was full.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.queue_tx.dropped_count()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> PluginState {
        self.instance.read().await.state
    }

    /// Ask the plugin to shut down, then tear down its delivery task.
    pub async fn shutdown(self, deadline: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(deadline, self.delivery_task).await.is_err() {
            warn!(plugin = %self.name, "delivery task did not exit within shutdown deadline");
        }
    }
}

async fn run_delivery(
    name: String,
    instance: Arc<RwLock<PluginInstance>>,
    mut child: Child,
    mut rpc: PluginRpcClient,
    mut queue_rx: crate::queue::QueueReceiver<FramedMessage>,
    default_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut reverify_tick = tokio::time::interval(PluginInstance::REVERIFY_INTERVAL);
    reverify_tick.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                let _ = tokio::time::timeout(default_timeout, rpc.shutdown()).await;
                let _ = child.start_kill();
                let _ = child.wait().await;
                let mut guard = instance.write().await;
                guard.state = PluginState::Terminated;
                guard.last_error = Some(TerminationReason::Requested);
                return;
            }

            exit = child.wait() => {
                let code = exit.ok().and_then(|s| s.code());
                let mut guard = instance.write().await;
                let was_active = matches!(guard.state, PluginState::Ready | PluginState::Degraded);
                guard.state = PluginState::Terminated;
                guard.last_error = Some(TerminationReason::ChildExited { code });
                drop(guard);
                if was_active {
                    info!(plugin = %name, ?code, "plugin process exited unexpectedly");
                }
                return;
            }

            _ = reverify_tick.tick() => {
                let (should_reverify, token) = {
                    let guard = instance.read().await;
                    let active = matches!(guard.state, PluginState::Ready | PluginState::Degraded);
                    (active && guard.verification_lapsed(chrono::Utc::now()), guard.auth_token.clone())
                };

                if !should_reverify {
                    continue;
                }

                let Some(token) = token else { continue };

                match rpc.authenticate(&token).await {
                    Ok(_auth) => {
                        let mut guard = instance.write().await;
                        guard.state = PluginState::Ready;
                        guard.last_verified_at = Some(chrono::Utc::now());
                        info!(plugin = %name, "re-verification succeeded");
                    }
                    Err(e) => {
                        warn!(plugin = %name, error = %e, "re-verification failed, marking degraded");
                        let mut guard = instance.write().await;
                        guard.state = PluginState::Degraded;
                    }
                }
            }

            message = queue_rx.recv() => {
                let Some(message) = message else { return };

                let state = instance.read().await.state;
                if state != PluginState::Ready {
                    continue;
                }

                let result = rpc
                    .handle_message(&message.bytes, message.direction, &message.correlation_id)
                    .await;

                if let Err(e) = result {
                    warn!(plugin = %name, error = %e, "HandleMessage failed, marking degraded");
                    let mut guard = instance.write().await;
                    guard.state = PluginState::Degraded;
                    drop(guard);
                }
            }
        }
    }
}
