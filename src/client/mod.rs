//! Client management system
//!
//! Handles client records, identity, and the thread-safe registry that
//! owns every connected session.

pub mod record;
pub mod registry;

pub use record::{ClientId, ClientRecord, UserData};
pub use registry::ClientRegistry;
