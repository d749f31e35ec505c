//! Buffered transmission
//!
//! Implements the per-client transmit buffer with its static/dynamic
//! sizing policy and single-pending-send discipline.

pub mod buffer;

pub use buffer::{BufferKind, FlushFrame, TransmitState, STATIC_CAPACITY, TX_BLOCK, TX_PRE};
