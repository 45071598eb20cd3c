//! Ambient logging setup, shared by every `cbuild` subcommand.
//!
//! Grounded on `casparian_sentinel/src/main.rs`: `EnvFilter` seeded from a
//! per-binary default target, one `fmt` layer, assembled through
//! `registry().with(...).with(...).init()`.

/// Initializes the global `tracing` subscriber. `default_target` seeds
/// `RUST_LOG` when unset, e.g. `"cbuild=info"`.
pub fn init(default_target: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_target.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
