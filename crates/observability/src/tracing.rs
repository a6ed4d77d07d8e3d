//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Output format of the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    #[default]
    Json,
    /// Single-line human-readable output for local runs.
    Compact,
}

impl LogFormat {
    /// Reads `COSTBOOK_LOG_FORMAT` (`json` or `compact`); anything else is JSON.
    pub fn from_env() -> Self {
        match std::env::var("COSTBOOK_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Install the global subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"` or `"costbook_infra=debug"`).
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(default_directive: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}
