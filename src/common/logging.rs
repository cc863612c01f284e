//! Tracing setup for the server binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr.
///
/// The level comes from `VISIRIDE_LOG` (e.g. `VISIRIDE_LOG=debug`), falling
/// back to `default_filter` when unset or unparsable.
pub fn init(default_filter: &str) {
    let env_filter = EnvFilter::try_from_env("VISIRIDE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
