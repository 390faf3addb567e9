//! Transaction state machine.
//!
//! Runs once per handshake wake-up and never blocks: every stream operation
//! here is the non-waiting variant. It is the only writer of the transaction
//! mode and the pending length.
//!
//! ```text
//!            outbound non-empty: announce N            chunk_size == 0
//!   +------+ -------------------------------> +---------------+ ----+
//!   |      |                                  | SendingToPeer |     |
//!   | Idle | <------------------------------- +---------------+ <---+
//!   |      |   (self-assert if more outbound,   one chunk per wake-up
//!   |      |    else announce 0)
//!   |      | peer reports N > 0               +-------------------+
//!   |      | -------------------------------> | ReceivingFromPeer | -- inbound full:
//!   +------+ <------------------------------- +-------------------+    withhold, pause
//!             pending reaches 0 (self-assert
//!             if outbound non-empty)
//! ```

use crate::error::{LinkError, Result};
use crate::link::bus::Bus;
use crate::link::chunk::{chunk_len, transfer_chunk, Chunk, Direction};
use crate::link::length::{announce_length, query_length};
use crate::link::shared::LinkShared;
use serde::Serialize;
use std::sync::Arc;

/// Current direction of the half-duplex link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionMode {
    Idle,
    SendingToPeer,
    ReceivingFromPeer,
}

/// What one invocation did.
#[derive(Debug)]
pub enum Step {
    /// Idle and neither side had anything pending
    Nothing,
    /// Announced this many outbound bytes; send phase begins next wake-up
    SendArmed(u32),
    /// Peer reported this many pending bytes; receive phase begins next wake-up
    ReceiveArmed(u32),
    /// Moved one chunk to the peer
    Sent { len: usize, remaining: u32 },
    /// Moved one chunk from the peer. When `remaining` hits 0 the link is
    /// idle again and `chained` says whether a send was self-triggered.
    Received {
        len: usize,
        remaining: u32,
        chained: bool,
    },
    /// Inbound stream lacks room for a chunk; nothing was read
    Withheld,
    /// Send phase finished; `chained` if more outbound data self-triggered
    /// another one, otherwise length 0 was announced
    SendCompleted { chained: bool },
    /// Invocation abandoned; mode and pending length are left as they were.
    /// A chunk already taken from the outbound stream stays staged and is
    /// written again on the next wake-up.
    Aborted(LinkError),
}

pub struct TransactionStateMachine<B> {
    bus: B,
    shared: Arc<LinkShared>,
    pending: u32,
    chunk: Chunk,
    // Outbound chunk popped but not yet written to the peer
    staged: bool,
}

impl<B: Bus> TransactionStateMachine<B> {
    pub fn new(bus: B, shared: Arc<LinkShared>) -> Self {
        Self {
            bus,
            shared,
            pending: 0,
            chunk: Chunk::new(),
            staged: false,
        }
    }

    pub fn mode(&self) -> TransactionMode {
        self.shared.mode()
    }

    /// Bytes left in the active transaction. 0 whenever the link is idle.
    pub fn pending_len(&self) -> u32 {
        self.pending
    }

    pub fn shared(&self) -> &Arc<LinkShared> {
        &self.shared
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Handle one handshake wake-up.
    pub fn on_handshake(&mut self) -> Step {
        match self.shared.mode() {
            TransactionMode::Idle => self.start(),
            TransactionMode::SendingToPeer => self.continue_send(),
            TransactionMode::ReceivingFromPeer => self.continue_receive(),
        }
    }

    fn start(&mut self) -> Step {
        let available = self.shared.outbound.available();
        if available > 0 {
            // Outbound bytes stay queued; the first chunk moves next wake-up.
            let len = u32::try_from(available).unwrap_or(u32::MAX);
            if let Err(e) = announce_length(&mut self.bus, len) {
                return self.abort(e);
            }
            self.pending = len;
            self.shared
                .with_mode(|mode| *mode = TransactionMode::SendingToPeer);
            tracing::debug!(len, "announced outbound length");
            return Step::SendArmed(len);
        }

        let len = match query_length(&mut self.bus) {
            Ok(len) => len,
            Err(e) => return self.abort(e),
        };
        if len == 0 {
            tracing::trace!("handshake with nothing to do");
            self.shared.record(|s| s.idle_polls += 1);
            return Step::Nothing;
        }

        self.pending = len;
        self.shared
            .with_mode(|mode| *mode = TransactionMode::ReceivingFromPeer);
        tracing::debug!(len, "peer has data pending");
        Step::ReceiveArmed(len)
    }

    fn continue_receive(&mut self) -> Step {
        let size = chunk_len(self.pending);
        if size == 0 {
            return self.finish_receive(0);
        }

        let shared = &self.shared;
        if !shared.backpressure.has_room(&shared.inbound) {
            if shared.backpressure.pause() {
                tracing::warn!(
                    free = shared.inbound.free(),
                    pending = self.pending,
                    "inbound stream full, withholding chunk"
                );
            }
            // The consumer may have drained between the check and the pause.
            shared
                .backpressure
                .try_resume(&shared.inbound, &shared.handshake);
            return Step::Withheld;
        }

        self.chunk.prepare(size);
        if let Err(e) = transfer_chunk(&mut self.bus, Direction::Receive, &mut self.chunk) {
            return self.abort(e);
        }

        let pushed = self.shared.inbound.try_push(self.chunk.as_slice());
        if pushed != size {
            return self.abort(LinkError::ShortTransfer {
                direction: Direction::Receive,
                expected: size,
                actual: pushed,
            });
        }

        self.pending -= size as u32;
        self.shared.record(|s| {
            s.chunks_received += 1;
            s.bytes_received += size as u64;
        });
        tracing::debug!(len = size, remaining = self.pending, "chunk received");

        if self.pending == 0 {
            return self.finish_receive(size);
        }
        Step::Received {
            len: size,
            remaining: self.pending,
            chained: false,
        }
    }

    fn finish_receive(&mut self, len: usize) -> Step {
        let shared = &self.shared;
        let chained = shared.with_mode(|mode| {
            *mode = TransactionMode::Idle;
            // Data the producer queued during the receive goes out now.
            if shared.outbound.is_empty() {
                return false;
            }
            shared.handshake.assert();
            true
        });
        shared.record(|s| s.receives_completed += 1);
        tracing::debug!(chained, "receive complete");

        Step::Received {
            len,
            remaining: 0,
            chained,
        }
    }

    fn continue_send(&mut self) -> Step {
        let size = chunk_len(self.pending);
        if size == 0 {
            return self.finish_send();
        }

        if !self.staged {
            let popped = self.shared.outbound.try_pop(self.chunk.prepare(size));
            if popped != size {
                self.chunk.truncate(popped);
                return self.abort(LinkError::ShortTransfer {
                    direction: Direction::Send,
                    expected: size,
                    actual: popped,
                });
            }
            self.staged = true;
        }

        if let Err(e) = transfer_chunk(&mut self.bus, Direction::Send, &mut self.chunk) {
            return self.abort(e);
        }
        self.staged = false;

        self.pending -= size as u32;
        self.shared.record(|s| {
            s.chunks_sent += 1;
            s.bytes_sent += size as u64;
        });
        tracing::debug!(len = size, remaining = self.pending, "chunk sent");
        Step::Sent {
            len: size,
            remaining: self.pending,
        }
    }

    fn finish_send(&mut self) -> Step {
        let shared = &self.shared;
        let bus = &mut self.bus;
        let finished: Result<bool> = shared.with_mode(|mode| {
            if !shared.outbound.is_empty() {
                *mode = TransactionMode::Idle;
                shared.handshake.assert();
                return Ok(true);
            }
            // Tell the peer the send phase is over; stay in it if that fails.
            announce_length(bus, 0)?;
            *mode = TransactionMode::Idle;
            Ok(false)
        });
        let chained = match finished {
            Ok(chained) => chained,
            Err(e) => return self.abort(e),
        };

        self.shared.record(|s| s.sends_completed += 1);
        tracing::debug!(chained, "send complete");
        Step::SendCompleted { chained }
    }

    fn abort(&mut self, err: LinkError) -> Step {
        if matches!(err, LinkError::ShortTransfer { .. }) {
            self.shared.record(|s| s.short_transfers += 1);
        } else if err.is_transfer_fault() {
            self.shared.record(|s| s.bus_errors += 1);
        }
        tracing::error!(
            mode = ?self.shared.mode(),
            pending = self.pending,
            "transaction aborted: {}",
            err
        );
        Step::Aborted(err)
    }
}
