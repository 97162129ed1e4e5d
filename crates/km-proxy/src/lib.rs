//! The transparent stdio proxy: spawns the MCP server subprocess, wires
//! three concurrent pipelines (client→server, server→client, stderr
//! passthrough), and forwards every captured message to a sink supplied
//! by the plugin host.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod proxy;

pub use error::ProxyError;
pub use proxy::{ProxyExit, StdioProxy};
