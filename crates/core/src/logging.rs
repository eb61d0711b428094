//! Structured logging infrastructure for wsbind.
//!
//! Policy decisions (asserted / not asserted), skipped tokens and provider
//! failures are emitted as `tracing` events under the `wsbind` targets. This
//! module installs a subscriber for binaries and tests that want to see them.

use crate::error::{CoreError, CoreResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event, for log aggregation
    Json,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install a global subscriber, failing if one is already installed.
pub fn try_init(format: LogFormat) -> CoreResult<()> {
    let registry = tracing_subscriber::registry().with(filter());
    let result = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init(),
    };
    result.map_err(|e| CoreError::Config(format!("logging already initialised: {}", e)))
}

/// Initialize the logging system with structured output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level. Calling it twice is harmless.
///
/// # Example
/// ```no_run
/// use wsbind_core::logging;
///
/// logging::init();
/// tracing::info!("Binding pass started");
/// ```
pub fn init() {
    let _ = try_init(LogFormat::Pretty);
}

/// Initialize the logging system with JSON output for production environments.
///
/// # Example
/// ```no_run
/// use wsbind_core::logging;
///
/// logging::init_json();
/// tracing::info!(component = "binding", "Binding pass started");
/// ```
pub fn init_json() {
    let _ = try_init(LogFormat::Json);
}
