//! Server core functionality
//!
//! This module contains the lifecycle controller, configuration,
//! and core infrastructure for the relay server.

pub mod config;
pub mod core;

pub use config::{ServerConfig, DEFAULT_MAX_CLIENTS};
pub use core::{Server, SERVICE_INTERVAL};
