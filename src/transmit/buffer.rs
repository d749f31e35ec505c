//! Module `buffer`
//!
//! Per-client transmit buffering with a static/dynamic sizing policy and a
//! single-slot pending discipline: each client may have at most one
//! scheduled, not-yet-flushed payload. A second send while one is pending
//! is rejected, never queued, which keeps per-client memory bounded.

use crate::error::SendError;

/// Protocol headroom reserved at the front of every staged frame, so an
/// engine that prepends framing headers can work in contiguous memory.
pub const TX_PRE: usize = 16;

/// Size of the inline transmit block carried by every client record.
pub const TX_BLOCK: usize = 4096;

/// Largest payload served from the inline block without a per-send
/// allocation. A payload of exactly this size still takes the static path.
pub const STATIC_CAPACITY: usize = TX_BLOCK - TX_PRE;

/// Storage class chosen for the currently staged payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Inline fixed block, no allocation per send.
    Static,
    /// Heap buffer sized exactly to the payload plus headroom.
    Dynamic,
}

/// Transmit state of one client.
///
/// All fields are mutated only under the registry's lock; the flush path
/// moves the staged bytes out before any engine call is made.
pub struct TransmitState {
    kind: BufferKind,
    inline: Box<[u8; TX_BLOCK]>,
    heap: Option<Vec<u8>>,
    len: usize,
    pending: bool,
}

/// One staged frame handed from `take_frame` to the flush path.
///
/// Holding the frame releases the client's pending slot, so the actual
/// engine write can happen with the registry lock dropped.
pub enum FlushFrame {
    Inline { block: [u8; TX_BLOCK], len: usize },
    Heap(Vec<u8>),
}

impl FlushFrame {
    /// The payload bytes to hand to the transport engine.
    pub fn payload(&self) -> &[u8] {
        match self {
            FlushFrame::Inline { block, len } => &block[TX_PRE..TX_PRE + len],
            FlushFrame::Heap(buf) => &buf[TX_PRE..],
        }
    }
}

impl TransmitState {
    pub fn new() -> Self {
        Self {
            kind: BufferKind::Static,
            inline: Box::new([0u8; TX_BLOCK]),
            heap: None,
            len: 0,
            pending: false,
        }
    }

    /// Whether a scheduled payload is awaiting its writable event.
    pub fn is_busy(&self) -> bool {
        self.pending
    }

    /// Storage class of the staged payload. Meaningful while busy.
    pub fn buffer_kind(&self) -> BufferKind {
        self.kind
    }

    /// Stages one payload for transmission.
    ///
    /// Rejects with `SendError::Busy` if a payload is already pending,
    /// leaving the staged frame untouched. Payloads up to
    /// `STATIC_CAPACITY` are copied into the inline block; larger ones
    /// allocate a heap buffer sized exactly to the payload plus headroom.
    pub fn stage(&mut self, payload: &[u8]) -> Result<(), SendError> {
        if self.pending {
            return Err(SendError::Busy);
        }

        if payload.len() <= STATIC_CAPACITY {
            self.inline[TX_PRE..TX_PRE + payload.len()].copy_from_slice(payload);
            self.kind = BufferKind::Static;
        } else {
            let mut buf = Vec::new();
            buf.try_reserve_exact(TX_PRE + payload.len())
                .map_err(|_| SendError::AllocationFailed)?;
            buf.resize(TX_PRE, 0);
            buf.extend_from_slice(payload);
            self.heap = Some(buf);
            self.kind = BufferKind::Dynamic;
        }

        self.len = payload.len();
        self.pending = true;
        Ok(())
    }

    /// Takes the staged frame for flushing, clearing the pending slot.
    ///
    /// Returns `None` on a spurious writable event. A dynamic buffer is
    /// moved out with the frame and therefore released once the flush
    /// completes; the inline block stays with the record for reuse.
    pub fn take_frame(&mut self) -> Option<FlushFrame> {
        if !self.pending {
            return None;
        }
        self.pending = false;

        match self.kind {
            BufferKind::Static => Some(FlushFrame::Inline {
                block: *self.inline,
                len: self.len,
            }),
            BufferKind::Dynamic => self.heap.take().map(FlushFrame::Heap),
        }
    }

}

impl Default for TransmitState {
    fn default() -> Self {
        Self::new()
    }
}
