//! Tracing setup for embedding applications.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes the global subscriber with the default filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_filter("facturo=info");
}

/// Initializes the global subscriber, honoring `RUST_LOG` when set and
/// falling back to `default_filter` otherwise.
pub fn init_with_filter(default_filter: &str) {
    // The persistence layer logs through the `log` facade; bridge those
    // records into tracing.
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();
}
