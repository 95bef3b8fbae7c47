//! Structured logging initialization, shared by every binary/test harness in
//! the workspace.

use tracing_subscriber::{fmt, EnvFilter};

/// Output format for the process-wide logging subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Install a global `tracing` subscriber. Idempotent: a second call is a
/// no-op if a subscriber is already installed.
///
/// `level` is an env-filter directive (e.g. `"info"`, `"ragengine_agent=debug"`);
/// the `RUST_LOG` environment variable, if set, always takes precedence.
pub fn init(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Pretty => subscriber.try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };
    if result.is_err() {
        tracing::trace!("tracing subscriber already initialized");
    }
}
