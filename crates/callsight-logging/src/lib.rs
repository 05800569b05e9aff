//! # callsight-logging
//!
//! Structured logging with `tracing`.
//!
//! One `init` call at process start installs the global subscriber. The
//! filter comes from `RUST_LOG` when set, falling back to `info` for the
//! pipeline's own crates.

#![deny(unsafe_code)]

use tracing_subscriber::{fmt, EnvFilter};

/// Default directive applied when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// `json` selects newline-delimited JSON output for log shippers; the
/// default is human-readable text. Calling this twice is a no-op (the
/// second install fails quietly), which keeps tests that each init
/// logging from panicking.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };

    if let Err(err) = result {
        tracing::debug!("logging already initialized: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
