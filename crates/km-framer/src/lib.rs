//! A brace-counting JSON-RPC message framer.
//!
//! [`Framer`] is a pure state machine: feed it bytes, it tells you which
//! byte spans were complete JSON object messages. It never owns the I/O —
//! [`pump`] wires it to an `AsyncRead`/`AsyncWrite` pair for the stdio
//! proxy, but the state machine itself is trivially unit-testable without
//! any async runtime.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod pump;
mod state;

pub use pump::{pump, PumpError, PumpOutcome};
pub use state::Framer;

/// Default accumulated-bytes cap before the framer resets mid-message, per
/// §4.2 ("suggested 10 MiB").
pub const DEFAULT_CAP_BYTES: usize = 10 * 1024 * 1024;
