//! Tracing initialisation for processes embedding the execution core.
//!
//! Call [`init_tracing`] once at startup. The `RUST_LOG` environment
//! variable takes precedence over the supplied default directive, so
//! operators can turn individual modules up or down without a rebuild.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json` — emit newline-delimited JSON lines for log aggregation
///   instead of the human-readable format.
/// * `default_directive` — filter applied when `RUST_LOG` is unset,
///   e.g. `"info"` or `"gridagent_core=debug,info"`.
///
/// The global subscriber can only be installed once per process; later
/// calls are silently ignored, so library consumers and tests may both
/// call this without coordination.
pub fn init_tracing(json: bool, default_directive: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
