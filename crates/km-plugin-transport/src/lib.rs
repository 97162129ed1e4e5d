//! Launches a plugin subprocess, performs the magic-cookie handshake, and
//! exposes a typed RPC client over the resulting socket — see SPEC_FULL.md
//! §4.4.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod handshake;
mod rpc;
mod wire;

pub use error::TransportError;
pub use handshake::{perform_handshake, HandshakeConfig, HandshakeInfo, Network};
pub use rpc::{AuthResponse, PluginRpcClient, StreamEvent};
