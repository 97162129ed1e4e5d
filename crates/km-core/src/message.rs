//! Captured-message data model: [`FramedMessage`], [`Direction`], [`CorrelationId`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the proxy a captured message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Client → server (our stdin → subprocess stdin).
    Request,
    /// Server → client (subprocess stdout → our stdout).
    Response,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Request => "request",
            Direction::Response => "response",
        })
    }
}

/// A run-scoped identifier attached to every message captured in one
/// `monitor` invocation, letting downstream plugins group by run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an already-generated identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a correlation ID monotonic with process start time: a
    /// UUIDv4 prefixed with the Unix-epoch millisecond the run began,
    /// so correlation IDs sort roughly by run start even across runs.
    #[must_use]
    pub fn generate(run_started_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}-{}",
            run_started_at.timestamp_millis(),
            uuid::Uuid::new_v4()
        ))
    }

    /// Borrow the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One complete JSON-RPC message captured by a framer, on its way to the
/// plugin host's fan-out.
#[derive(Debug, Clone)]
pub struct FramedMessage {
    /// The exact byte span of the message as it appeared on the wire.
    pub bytes: Vec<u8>,
    /// Which direction this message travelled.
    pub direction: Direction,
    /// The correlation ID of the run that captured this message.
    pub correlation_id: CorrelationId,
    /// When the framer completed this message.
    pub arrived_at: DateTime<Utc>,
}

impl FramedMessage {
    /// Construct a captured message, stamping the arrival time as now.
    #[must_use]
    pub fn new(bytes: Vec<u8>, direction: Direction, correlation_id: CorrelationId) -> Self {
        Self {
            bytes,
            direction,
            correlation_id,
            arrived_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_is_stable_within_a_run() {
        let started = Utc::now();
        let id = CorrelationId::generate(started);
        let msg1 = FramedMessage::new(b"{}".to_vec(), Direction::Request, id.clone());
        let msg2 = FramedMessage::new(b"{}".to_vec(), Direction::Response, id.clone());
        assert_eq!(msg1.correlation_id, msg2.correlation_id);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Request.to_string(), "request");
        assert_eq!(Direction::Response.to_string(), "response");
    }
}
