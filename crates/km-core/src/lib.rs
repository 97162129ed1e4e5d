//! Shared data model and error taxonomy for the kilometers MCP proxy.
//!
//! This crate has no async runtime dependency and no I/O of its own; it is
//! the vocabulary every other `km-*` crate speaks: [`ConfigSnapshot`],
//! [`Subscription`], [`PluginManifest`], [`PluginInstance`] and friends.
//!
//! ```
//! use km_core::{Tier, Subscription};
//!
//! let sub = Subscription {
//!     tier: Tier::Pro,
//!     customer_id: "cus_1".into(),
//!     customer_name: "Ada".into(),
//!     features: Default::default(),
//! };
//! assert!(sub.can_access(Tier::Free));
//! assert!(!sub.can_access(Tier::Enterprise));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dirs;
pub mod error;
pub mod message;
pub mod plugin;
pub mod retry;
pub mod subscription;

pub mod prelude {
    //! Common imports for downstream `km-*` crates.
    pub use crate::config::{ConfigEntry, ConfigKey, ConfigSnapshot, ConfigSource, ConfigValue};
    pub use crate::dirs::KilometersHome;
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::message::{CorrelationId, Direction, FramedMessage};
    pub use crate::plugin::{
        InstalledPlugin, PluginInstance, PluginManifest, PluginState, TerminationReason,
    };
    pub use crate::retry::{retry, RetryConfig, RetryOutcome};
    pub use crate::subscription::{Subscription, Tier};
}

pub use config::{ConfigEntry, ConfigKey, ConfigSnapshot, ConfigSource, ConfigValue};
pub use dirs::KilometersHome;
pub use error::{CoreError, CoreResult};
pub use message::{CorrelationId, Direction, FramedMessage};
pub use plugin::{InstalledPlugin, PluginInstance, PluginManifest, PluginState, TerminationReason};
pub use retry::{retry, RetryConfig, RetryOutcome};
pub use subscription::{Subscription, Tier};
