//! Tracing setup shared by SolBurn binaries.

/// Subscriber configuration (filter, output format).
pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize process-wide tracing from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
