//! Logging initialization (§10.1): an environment-variable-driven filter,
//! human-readable by default, JSON when `LOG_FORMAT=json` so production
//! deployments can ship structured lines to their aggregator of choice.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info,vodpipe=debug";

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
