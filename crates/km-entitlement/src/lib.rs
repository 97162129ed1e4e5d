//! HTTP client for the kilometers entitlement service: key validation,
//! plugin listing, and checksum/signature-verified downloads, per §4.6.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod client;
mod error;

pub use client::Client;
pub use error::{EntitlementError, EntitlementResult};
