//! Tracing bootstrap for binaries embedding the client.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,messenger_stream=debug,messenger_core=info";

/// Initialize the global tracing subscriber with severity gating from environment.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `MESSENGER_LOG`
/// 3) internal default filter
///
/// Calling this more than once is harmless.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_names(true)
        .with_env_filter(filter_from_env())
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    filter_from_value(env::var("MESSENGER_LOG").ok())
}

fn filter_from_value(value: Option<String>) -> EnvFilter {
    if let Some(value) = value.filter(|v| !v.trim().is_empty())
        && let Ok(filter) = EnvFilter::try_new(value)
    {
        return filter;
    }

    EnvFilter::new(DEFAULT_FILTER)
}
