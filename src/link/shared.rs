//! State shared between the worker and the producer/consumer tasks.

use crate::config::LinkConfig;
use crate::link::backpressure::Backpressure;
use crate::link::handshake::HandshakeLine;
use crate::link::machine::TransactionMode;
use crate::link::stream::ByteStream;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, ignoring poisoning. None of the guarded state can be left
/// half-updated by a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters for one link.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Chunks moved host -> peer
    pub chunks_sent: u64,

    /// Chunks moved peer -> host
    pub chunks_received: u64,

    /// Payload bytes moved host -> peer
    pub bytes_sent: u64,

    /// Payload bytes moved peer -> host
    pub bytes_received: u64,

    /// Send transactions that ran to completion
    pub sends_completed: u64,

    /// Receive transactions that ran to completion
    pub receives_completed: u64,

    /// Idle wake-ups where neither side had anything pending
    pub idle_polls: u64,

    /// Receives paused for lack of inbound room
    pub backpressure_pauses: u64,

    /// Paused receives resumed by the consumer
    pub backpressure_resumes: u64,

    /// Invocations aborted on a short pop/push
    pub short_transfers: u64,

    /// Invocations aborted on a bus failure or malformed response
    pub bus_errors: u64,
}

#[derive(Debug)]
pub struct LinkShared {
    /// host -> peer bytes, filled by producers
    pub outbound: ByteStream,
    /// peer -> host bytes, drained by the consumer
    pub inbound: ByteStream,
    pub handshake: HandshakeLine,
    pub backpressure: Backpressure,
    mode: Mutex<TransactionMode>,
    stats: Mutex<LinkStats>,
}

impl LinkShared {
    pub fn new(config: &LinkConfig, handshake: HandshakeLine) -> Self {
        Self {
            outbound: ByteStream::new(config.outbound_capacity),
            inbound: ByteStream::new(config.inbound_capacity),
            handshake,
            backpressure: Backpressure::new(),
            mode: Mutex::new(TransactionMode::Idle),
            stats: Mutex::new(LinkStats::default()),
        }
    }

    pub fn mode(&self) -> TransactionMode {
        *lock(&self.mode)
    }

    /// Run `f` inside the mode critical section.
    ///
    /// Every "check mode, then maybe assert the line" sequence goes through
    /// here so a producer's idle check cannot interleave with the state
    /// machine finishing a transaction.
    pub fn with_mode<R>(&self, f: impl FnOnce(&mut TransactionMode) -> R) -> R {
        let mut mode = lock(&self.mode);
        f(&mut mode)
    }

    pub(crate) fn record(&self, f: impl FnOnce(&mut LinkStats)) {
        f(&mut lock(&self.stats));
    }

    pub fn stats(&self) -> LinkStats {
        let mut stats = lock(&self.stats).clone();
        stats.backpressure_pauses = self.backpressure.pause_count();
        stats.backpressure_resumes = self.backpressure.resume_count();
        stats
    }
}
