//! Structured logging.
//!
//! Uses the `tracing` ecosystem. The level comes from config, and `RUST_LOG`
//! overrides it when set. Events go to stderr; stdout is left for command output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter used by [`init`].
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("evm_node_client={default_level},node_client={default_level},warn"))
    })
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
