//! Utility functions
//!
//! Provides logging utilities for embedders.

pub mod logging;

pub use logging::setup_logging;
