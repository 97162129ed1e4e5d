//! Installs the process-wide `tracing` subscriber exactly once, per §4.9.
//!
//! Verbosity comes from the resolved `log_level`; `debug` additionally
//! switches the formatter from compact single-line (so stdout stays clean
//! for the proxied protocol — everything here goes to stderr regardless)
//! to pretty multi-line output.

use km_core::ConfigSnapshot;
use tracing_subscriber::EnvFilter;

/// Build an `EnvFilter` from the snapshot's `log_level`, then install the
/// subscriber. Safe to call only once per process; a second call is a bug
/// in the caller, not something this function guards against.
pub(crate) fn init(snapshot: &ConfigSnapshot) {
    let filter = EnvFilter::try_new(snapshot.log_level()).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if snapshot.debug() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().with_target(false).init();
    }
}
