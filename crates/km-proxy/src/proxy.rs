//! Subprocess spawn, the three concurrent pipelines, and graceful shutdown.

use std::process::Stdio;
use std::time::Duration;

use km_core::{CorrelationId, Direction, FramedMessage};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProxyError;

/// Grace interval before escalating to a soft-terminate signal, per §4.3.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Further interval before escalating to an unconditional kill.
pub const SHUTDOWN_KILL_AFTER: Duration = Duration::from_secs(5);

/// How the proxied subprocess finished.
#[derive(Debug, Clone, Copy)]
pub enum ProxyExit {
    /// The subprocess exited on its own; this is the exit code to forward.
    SubprocessExited(i32),
    /// Shutdown was requested (signal/cancellation) before the subprocess exited.
    Shutdown,
}

/// A running stdio proxy: the spawned server child plus its three
/// concurrent pipeline tasks.
pub struct StdioProxy {
    child: Child,
    client_to_server: JoinHandle<()>,
    server_to_client: JoinHandle<()>,
    stderr_passthrough: JoinHandle<()>,
    cancel: CancellationToken,
}

impl StdioProxy {
    /// Spawn `server_cmd` and start all three pipelines. `on_message` is
    /// invoked (from either pipeline's task) for every complete message the
    /// framer detects, tagged with its direction and the run's correlation
    /// ID; it must never block the pipeline it's called from.
    pub fn spawn(
        server_cmd: &[String],
        buffer_size: usize,
        correlation_id: CorrelationId,
        on_message: impl Fn(FramedMessage) + Send + Sync + 'static,
        cancel: CancellationToken,
    ) -> Result<Self, ProxyError> {
        let (program, args) = server_cmd
            .split_first()
            .ok_or(ProxyError::EmptyServerCommand)?;

        info!(program = %program, args = ?args, "spawning MCP server subprocess");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProxyError::Spawn)?;

        let child_stdin = child.stdin.take().ok_or(ProxyError::MissingStdioHandle)?;
        let child_stdout = child.stdout.take().ok_or(ProxyError::MissingStdioHandle)?;
        let child_stderr = child.stderr.take().ok_or(ProxyError::MissingStdioHandle)?;

        let on_message = std::sync::Arc::new(on_message);

        let request_correlation = correlation_id.clone();
        let request_sink = on_message.clone();
        let client_to_server = tokio::spawn(async move {
            let outcome = km_framer::pump(
                tokio::io::stdin(),
                BufWriter::new(child_stdin),
                buffer_size,
                km_framer::DEFAULT_CAP_BYTES,
                move |bytes| {
                    request_sink(FramedMessage::new(
                        bytes,
                        Direction::Request,
                        request_correlation.clone(),
                    ));
                },
            )
            .await;
            log_pump_outcome("client->server", outcome);
        });

        let response_correlation = correlation_id;
        let response_sink = on_message;
        let server_to_client = tokio::spawn(async move {
            let outcome = km_framer::pump(
                child_stdout,
                BufWriter::new(tokio::io::stdout()),
                buffer_size,
                km_framer::DEFAULT_CAP_BYTES,
                move |bytes| {
                    response_sink(FramedMessage::new(
                        bytes,
                        Direction::Response,
                        response_correlation.clone(),
                    ));
                },
            )
            .await;
            log_pump_outcome("server->client", outcome);
        });

        let stderr_passthrough = tokio::spawn(async move {
            let mut reader = child_stderr;
            let mut writer = tokio::io::stderr();
            if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
                debug!(error = %e, "stderr passthrough ended");
            }
        });

        Ok(Self {
            child,
            client_to_server,
            server_to_client,
            stderr_passthrough,
            cancel,
        })
    }

    /// Wait for either the subprocess to exit or the run's cancellation
    /// token to fire, whichever happens first.
    pub async fn wait(&mut self) -> ProxyExit {
        tokio::select! {
            status = self.child.wait() => {
                let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
                ProxyExit::SubprocessExited(code)
            }
            () = self.cancel.cancelled() => ProxyExit::Shutdown,
        }
    }

    /// Graceful shutdown per §4.3/§5: close our outbound stream, wait
    /// `SHUTDOWN_GRACE` for the subprocess to exit, escalate to a soft
    /// terminate signal, then after `SHUTDOWN_KILL_AFTER` force-kill.
    ///
    /// Returns the subprocess's exit code (forwarded as ours), or a
    /// synthetic non-zero code if it had to be killed.
    pub async fn shutdown(mut self) -> i32 {
        self.cancel.cancel();

        if let Ok(Some(status)) = tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait())
            .await
            .map(|r| r.ok())
        {
            return status.code().unwrap_or(0);
        }

        self.send_soft_terminate();

        if let Ok(Ok(status)) =
            tokio::time::timeout(SHUTDOWN_KILL_AFTER, self.child.wait()).await
        {
            return status.code().unwrap_or(1);
        }

        warn!("subprocess did not exit after soft terminate; killing");
        let _ = self.child.kill().await;
        let _ = self.client_to_server.await;
        let _ = self.server_to_client.await;
        let _ = self.stderr_passthrough.await;
        1
    }

    #[cfg(unix)]
    fn send_soft_terminate(&self) {
        if let Some(pid) = self.child.id() {
            let pid = nix::unistd::Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                warn!(error = %e, "failed to send SIGTERM to subprocess");
            }
        }
    }

    #[cfg(not(unix))]
    fn send_soft_terminate(&mut self) {
        // No portable soft-terminate outside unix signals; the subsequent
        // hard kill after SHUTDOWN_KILL_AFTER is the fallback.
    }
}

fn log_pump_outcome(direction: &str, outcome: Result<km_framer::PumpOutcome, km_framer::PumpError>) {
    match outcome {
        Ok(km_framer::PumpOutcome::SourceClosed) => debug!(direction, "pipeline source closed"),
        Ok(km_framer::PumpOutcome::SinkClosed) => debug!(direction, "pipeline sink closed"),
        Err(e) => warn!(direction, error = %e, "pipeline terminated with error"),
    }
}
