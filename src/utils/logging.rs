//! Logging utilities
//!
//! Provides logging setup and configuration.

/// Setup logging for the server (env_logger picks up RUST_LOG)
pub fn setup_logging() {
    let _ = env_logger::try_init();
}
