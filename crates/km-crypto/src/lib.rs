//! Checksum and signature verification for plugin binaries downloaded by
//! the provisioning orchestrator.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod error;
pub mod signature;

pub use checksum::{checksum_hex, verify_checksum};
pub use error::{CryptoError, CryptoResult};
pub use signature::TrustAnchor;
