//! Chunk transfer: one fixed-size payload exchange per bus transaction.

use crate::error::{LinkError, Result};
use crate::link::bus::{Bus, Transaction};
use crate::link::CHUNK_SIZE;
use std::fmt;

/// Direction of a chunk relative to this (host) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// host -> peer
    Send,
    /// peer -> host
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Receive => f.write_str("receive"),
        }
    }
}

/// Size of the next chunk for a transaction with `pending` bytes left.
pub fn chunk_len(pending: u32) -> usize {
    usize::try_from(pending).map_or(CHUNK_SIZE, |p| p.min(CHUNK_SIZE))
}

/// One chunk of payload. Only the first `len` bytes are meaningful; the rest
/// is zero padding clocked to fill the fixed-width data phase.
#[derive(Clone)]
pub struct Chunk {
    buf: [u8; CHUNK_SIZE],
    len: usize,
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            buf: [0u8; CHUNK_SIZE],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Resize to `len` meaningful bytes, zero the padding, and return the
    /// meaningful region for filling.
    pub fn prepare(&mut self, len: usize) -> &mut [u8] {
        let len = len.min(CHUNK_SIZE);
        self.buf[len..].fill(0);
        self.len = len;
        &mut self.buf[..len]
    }

    /// Shrink to the first `len` bytes after a short fill.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.buf[len..self.len].fill(0);
            self.len = len;
        }
    }

    fn padded(&self) -> &[u8; CHUNK_SIZE] {
        &self.buf
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk").field("len", &self.len).finish()
    }
}

/// Move exactly one chunk across the bus.
///
/// For `Send`, `chunk` already holds the payload. For `Receive`, `chunk` must
/// be prepared to the expected length and is filled from the MISO phase.
/// No retry: a failed exchange is returned to the caller as-is.
pub fn transfer_chunk<B: Bus + ?Sized>(
    bus: &mut B,
    direction: Direction,
    chunk: &mut Chunk,
) -> Result<()> {
    debug_assert!(!chunk.is_empty(), "chunk transfer with nothing pending");

    match direction {
        Direction::Send => {
            bus.transact(&Transaction::write_data(chunk.padded()))?;
        }
        Direction::Receive => {
            let miso = bus.transact(&Transaction::read_data())?;
            let expected = chunk.len();
            if miso.len() < expected {
                return Err(LinkError::ShortTransfer {
                    direction,
                    expected,
                    actual: miso.len(),
                });
            }
            chunk.prepare(expected).copy_from_slice(&miso[..expected]);
        }
    }
    Ok(())
}
