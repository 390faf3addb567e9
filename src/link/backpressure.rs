//! Inbound backpressure.
//!
//! The state machine pauses a receive when the inbound stream cannot hold a
//! full chunk. The consumer resumes it once room is back by self-asserting
//! the handshake line; the paused transaction then continues where it left off.

use crate::link::handshake::HandshakeLine;
use crate::link::stream::ByteStream;
use crate::link::CHUNK_SIZE;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
pub struct Backpressure {
    waiting: AtomicBool,
    pauses: AtomicU64,
    resumes: AtomicU64,
}

impl Backpressure {
    pub fn new() -> Self {
        Self {
            waiting: AtomicBool::new(false),
            pauses: AtomicU64::new(0),
            resumes: AtomicU64::new(0),
        }
    }

    /// Whether `inbound` currently has room for one more chunk.
    pub fn has_room(&self, inbound: &ByteStream) -> bool {
        inbound.free() >= CHUNK_SIZE
    }

    /// Mark the receive as paused. Returns `true` on the first pause.
    pub fn pause(&self) -> bool {
        let first = !self.waiting.swap(true, Ordering::AcqRel);
        if first {
            self.pauses.fetch_add(1, Ordering::Relaxed);
        }
        first
    }

    pub fn is_paused(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    /// Clear a pause if `inbound` has room again, re-asserting `line` so the
    /// paused receive continues. Returns `true` if it resumed.
    pub fn try_resume(&self, inbound: &ByteStream, line: &HandshakeLine) -> bool {
        if !self.is_paused() || !self.has_room(inbound) {
            return false;
        }
        if !self.waiting.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.resumes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(free = inbound.free(), "inbound room restored, resuming receive");
        line.assert();
        true
    }

    pub fn pause_count(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }

    pub fn resume_count(&self) -> u64 {
        self.resumes.load(Ordering::Relaxed)
    }
}

impl Default for Backpressure {
    fn default() -> Self {
        Self::new()
    }
}
