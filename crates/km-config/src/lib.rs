//! Layered configuration resolution: CLI overrides, `KM_*` environment
//! variables, a saved config file, an encrypted credential cache, and
//! `.env` files, falling back to compiled-in defaults, per §4.1.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod coerce;
pub mod credentials;
mod defaults;
mod env;
pub mod error;
mod file;
mod resolver;

pub use credentials::CredentialStore;
pub use error::{ConfigError, ConfigResult};
pub use resolver::{resolve, resolve_with_env, save, CheckedFile, Resolved, ResolveInput};
