//! Typed RPC client over the socket a handshake identified, per the
//! method table in §4.4.

use std::pin::Pin;
use std::time::Duration;

use km_core::{CorrelationId, Direction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::time::timeout;
use tracing::warn;

use crate::error::{TransportError, TransportResult};
use crate::handshake::Network;
use crate::wire::{read_frame, write_frame};

/// Either half of the connection the handshake advertised. Boxed as a
/// trait object since the concrete stream type depends on `Network`.
type BoxedStream = Pin<Box<dyn DuplexStream>>;

trait DuplexStream: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> DuplexStream for T {}

/// A single outstanding JSON-RPC request/response pair, framed per
/// [`crate::wire`].
#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// What a plugin returned from `Authenticate`.
/// What a plugin returned from a successful `Authenticate`. Rejection is
/// signaled as a JSON-RPC error instead of a response body, per §4.4's
/// method table.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// When the plugin considers this authentication to expire.
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Feature flags the plugin says this authentication unlocks.
    pub authorized_features: Vec<String>,
    /// The subscription tier the plugin resolved for the offered token.
    pub subscription_tier: km_core::Tier,
}

/// An out-of-band event a plugin pushed without a matching request, such
/// as a log line or a progress notification.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEvent {
    /// Event discriminant, e.g. `"log"` or `"progress"`.
    pub kind: String,
    /// Event payload, shape dependent on `kind`.
    pub payload: Value,
}

/// An RPC client bound to one plugin subprocess's transport.
///
/// Every method is bound by `default_timeout`; a plugin that doesn't
/// answer in time surfaces as [`TransportError::RpcDeadlineExceeded`]
/// rather than hanging the caller.
pub struct PluginRpcClient {
    stream: BoxedStream,
    default_timeout: Duration,
    next_id: u64,
}

impl PluginRpcClient {
    /// Connect to the address a handshake advertised.
    pub async fn connect(network: &Network, default_timeout: Duration) -> TransportResult<Self> {
        let stream: BoxedStream = match network {
            Network::Unix(path) => {
                let s = UnixStream::connect(path)
                    .await
                    .map_err(TransportError::ConnectFailed)?;
                Box::pin(s)
            }
            Network::Tcp(addr) => {
                let s = TcpStream::connect(addr)
                    .await
                    .map_err(TransportError::ConnectFailed)?;
                Box::pin(s)
            }
        };

        Ok(Self {
            stream,
            default_timeout,
            next_id: 1,
        })
    }

    async fn call<P: Serialize, R: for<'de> Deserialize<'de>>(
        &mut self,
        method: &'static str,
        params: P,
    ) -> TransportResult<R> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request {
            jsonrpc: "2.0",
            id,
            method,
            params: serde_json::to_value(params)?,
        };

        let call = async {
            write_frame(&mut self.stream, &request).await?;
            let response: Response = read_frame(&mut self.stream).await?;

            if let Some(err) = response.error {
                return Err(TransportError::RpcError {
                    code: err.code,
                    message: err.message,
                });
            }

            let result = response.result.unwrap_or(Value::Null);
            serde_json::from_value(result).map_err(TransportError::from)
        };

        match timeout(self.default_timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(TransportError::RpcDeadlineExceeded { method }),
        }
    }

    /// `Metadata()`: ask the plugin to describe itself.
    pub async fn metadata(&mut self) -> TransportResult<Value> {
        self.call("Metadata", Value::Null).await
    }

    /// `Authenticate(token)`: offer a credential for tier/auth checks.
    pub async fn authenticate(&mut self, token: &str) -> TransportResult<AuthResponse> {
        self.call("Authenticate", serde_json::json!({ "token": token }))
            .await
    }

    /// `Initialize(config)`: hand the plugin its resolved configuration.
    pub async fn initialize(&mut self, config: Value) -> TransportResult<Value> {
        self.call("Initialize", config).await
    }

    /// `HandleMessage(bytes, direction, correlation_id)`: forward one
    /// framed MCP message for the plugin to observe or transform.
    pub async fn handle_message(
        &mut self,
        bytes: &[u8],
        direction: Direction,
        correlation_id: &CorrelationId,
    ) -> TransportResult<Value> {
        self.call(
            "HandleMessage",
            serde_json::json!({
                "bytes": bytes,
                "direction": direction,
                "correlation_id": correlation_id.to_string(),
            }),
        )
        .await
    }

    /// `HandleError(error_description)`: notify the plugin of a host-side
    /// failure it may want to react to.
    pub async fn handle_error(&mut self, error_description: &str) -> TransportResult<()> {
        self.call(
            "HandleError",
            serde_json::json!({ "error": error_description }),
        )
        .await
    }

    /// `HandleStreamEvent(event)`: deliver an out-of-band event to the
    /// plugin.
    pub async fn handle_stream_event(&mut self, event: &StreamEvent) -> TransportResult<()> {
        self.call("HandleStreamEvent", event).await
    }

    /// `Shutdown()`: ask the plugin to wind down cleanly before the host
    /// proceeds to terminate the process.
    pub async fn shutdown(&mut self) -> TransportResult<()> {
        match self.call("Shutdown", Value::Null).await {
            Ok(()) => Ok(()),
            Err(TransportError::RpcDeadlineExceeded { .. }) => {
                warn!("plugin did not acknowledge shutdown before deadline");
                Err(TransportError::RpcDeadlineExceeded { method: "Shutdown" })
            }
            Err(e) => Err(e),
        }
    }
}

