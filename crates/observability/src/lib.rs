//! Tracing and logging setup shared by cardlink binaries and tests.

/// Initialize process-wide tracing with the configuration from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&tracing::LogConfig::from_env());
}

/// Initialize tracing for tests: human-readable output captured by the test
/// harness. Safe to call from every test.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use tracing::{LogConfig, LogFormat};
