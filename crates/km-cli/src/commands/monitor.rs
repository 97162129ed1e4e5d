//! Monitor driver — proxies an MCP server's stdio while fanning captured
//! messages out to installed plugins, per §4.8.

use anyhow::{bail, Result};
use chrono::Utc;
use km_core::{ConfigSnapshot, CorrelationId, KilometersHome};
use km_plugin_host::{PluginHost, PluginHostConfig};
use km_plugin_transport::HandshakeConfig;
use km_provisioning::Registry;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::theme::Theme;

/// Run one monitor session against `server_command`. Returns the exit code
/// to forward: the subprocess's own code, or a synthetic non-zero code if
/// it had to be force-killed.
pub(crate) async fn run_monitor(
    snapshot: &ConfigSnapshot,
    home: &KilometersHome,
    server_command: &[String],
) -> Result<i32> {
    if server_command.is_empty() {
        bail!("monitor requires a server command after `--`");
    }

    let correlation_id = CorrelationId::generate(Utc::now());
    info!(correlation_id = %correlation_id, "starting monitor run");

    let registry = Registry::load_or_default(&home.registry_file())?;

    // The plugin host's own tier gate is defense in depth; real
    // authorization happens per-plugin via its Authenticate RPC response
    // (km-plugin-host::host::spawn_one). Plugins already on disk were
    // tier-checked against the customer's real subscription at `init`
    // time, so the bookkeeping subscription passed here doesn't need to
    // re-derive that tier locally.
    let subscription = km_core::Subscription {
        tier: km_core::Tier::Enterprise,
        customer_id: String::new(),
        customer_name: String::new(),
        features: std::collections::BTreeSet::new(),
    };

    let host_config = PluginHostConfig {
        plugins_dir: snapshot.plugins_dir(),
        default_timeout: snapshot.default_timeout(),
        handshake: HandshakeConfig::default(),
    };
    let host = PluginHost::new(host_config, subscription);
    host.initialize(&registry.installed(), snapshot.api_key()).await;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_cancel.cancel();
    });

    let dispatch_host = host.clone();
    let mut proxy = km_proxy::StdioProxy::spawn(
        server_command,
        snapshot.buffer_size(),
        correlation_id,
        move |message| dispatch_host.dispatch(&message),
        cancel,
    )?;

    match proxy.wait().await {
        km_proxy::ProxyExit::SubprocessExited(_) => info!("subprocess exited on its own"),
        km_proxy::ProxyExit::Shutdown => println!("{}", Theme::info("shutting down...")),
    }

    let code = proxy.shutdown().await;
    host.shutdown().await;

    Ok(code)
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
