//! Tracing bootstrap.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,chatgate=info";

/// Initialize the global tracing subscriber, writing to stderr.
///
/// Filter precedence:
/// 1) `RUST_LOG`
/// 2) `CHATGATE_LOG`
/// 3) built-in default
///
/// Calling it more than once is harmless.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter_from_env())
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let custom = env::var("CHATGATE_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok());
    if let Some(filter) = custom {
        return filter;
    }

    EnvFilter::new(DEFAULT_FILTER)
}
