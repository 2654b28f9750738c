//! Test tracing setup

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Install a subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// `RUST_LOG` overrides the default `swapindex=debug` filter.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swapindex=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
        tracing::debug!(target: "swapindex.test", "test tracing initialized");
    });
}
