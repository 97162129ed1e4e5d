//! Discovers plugin binaries, spawns them, drives their lifecycle state
//! machine, and fans out captured messages — see SPEC_FULL.md §4.5.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod discovery;
mod error;
mod host;
mod managed;
mod queue;

pub use discovery::{discover, Candidate, PLUGIN_PREFIX};
pub use error::{HostError, HostResult};
pub use host::{DispatchStats, PluginHost, PluginHostConfig};
