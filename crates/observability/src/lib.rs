//! Process-wide tracing setup for costbook binaries and tests.

/// Initialize structured logging at the default `info` level, in the format
/// chosen by `COSTBOOK_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with("info", tracing::LogFormat::from_env());
}

/// Subscriber configuration (filters, formatting).
pub mod tracing;
