//! Simulated co-processor.
//!
//! An in-memory peer that answers the bus command set at the wire-frame level
//! and drives the handshake line the way a slave does: it raises the line when
//! it is ready for the next exchange or has data of its own. Used by the tests,
//! the benches and the demo binary in place of real hardware.

use crate::error::{LinkError, Result};
use crate::link::bus::{Bus, Command, Transaction};
use crate::link::handshake::HandshakeLine;
use crate::link::shared::lock;
use crate::link::CHUNK_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One exchange as the peer saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Host announced this many bytes
    LengthAnnounced(u32),
    /// Host wrote a chunk; this many bytes were meaningful
    DataWritten(usize),
    /// Host queried; peer reported this many bytes
    LengthQueried(u32),
    /// Host read a chunk; this many bytes were meaningful
    DataRead(usize),
}

#[derive(Debug, Default)]
struct PeerState {
    line: Option<HandshakeLine>,
    echo: bool,
    /// Bytes still expected in the host's current send phase
    rx_expected: u32,
    rx_current: Vec<u8>,
    received: Vec<u8>,
    tx: VecDeque<u8>,
    /// Bytes promised to the host by the last length query
    tx_latched: u32,
    fail_next: Option<Command>,
    events: Vec<PeerEvent>,
}

impl PeerState {
    fn raise(&self) {
        if let Some(line) = &self.line {
            line.assert();
        }
    }

    fn idle(&self) -> bool {
        self.rx_expected == 0 && self.tx_latched == 0
    }
}

/// Cloneable handle to a simulated peer.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPeer {
    state: Arc<Mutex<PeerState>>,
}

impl SimulatedPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect the peer's side of the handshake line.
    pub fn attach(&self, line: HandshakeLine) {
        lock(&self.state).line = Some(line);
    }

    /// Queue every completed host transfer back toward the host.
    pub fn set_echo(&self, echo: bool) {
        lock(&self.state).echo = echo;
    }

    /// Queue bytes for the host, raising the line if no exchange is under way.
    pub fn offer(&self, bytes: &[u8]) {
        let mut state = lock(&self.state);
        state.tx.extend(bytes);
        if !bytes.is_empty() && state.idle() {
            state.raise();
        }
    }

    /// Fail the next exchange carrying `command` with a bus error.
    pub fn fail_next(&self, command: Command) {
        lock(&self.state).fail_next = Some(command);
    }

    /// Everything the host has sent so far, in order.
    pub fn received(&self) -> Vec<u8> {
        lock(&self.state).received.clone()
    }

    pub fn take_received(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.state).received)
    }

    /// Bytes still queued for the host.
    pub fn pending_tx(&self) -> usize {
        lock(&self.state).tx.len()
    }

    pub fn events(&self) -> Vec<PeerEvent> {
        lock(&self.state).events.clone()
    }

    /// Answer one wire frame. Returns the MISO bytes.
    pub fn respond(&self, frame: Bytes) -> Result<Bytes> {
        let txn = Transaction::decode(frame)?;
        let mut state = lock(&self.state);

        if state.fail_next == Some(txn.command) {
            state.fail_next = None;
            return Err(LinkError::Bus(format!("{:?} not acknowledged", txn.command)));
        }

        match txn.command {
            Command::WriteLength => {
                let len = txn.announced_length().unwrap_or(0);
                state.events.push(PeerEvent::LengthAnnounced(len));
                if state.rx_expected > 0 {
                    tracing::warn!(
                        missing = state.rx_expected,
                        "host re-announced before finishing its transfer"
                    );
                    state.rx_current.clear();
                }
                state.rx_expected = len;
                if len > 0 || !state.tx.is_empty() {
                    state.raise();
                }
                Ok(Bytes::new())
            }
            Command::WriteData => {
                let take = usize::try_from(state.rx_expected)
                    .map_or(CHUNK_SIZE, |n| n.min(CHUNK_SIZE));
                let data = &txn.mosi[..take];
                state.received.extend_from_slice(data);
                state.rx_current.extend_from_slice(data);
                state.rx_expected -= take as u32;
                state.events.push(PeerEvent::DataWritten(take));

                if take == 0 {
                    tracing::warn!("host wrote data without announcing a length");
                    return Ok(Bytes::new());
                }
                if state.rx_expected == 0 && state.echo {
                    let echoed = std::mem::take(&mut state.rx_current);
                    state.tx.extend(echoed);
                } else if state.rx_expected == 0 {
                    state.rx_current.clear();
                }
                state.raise();
                Ok(Bytes::new())
            }
            Command::ReadLength => {
                let len = u32::try_from(state.tx.len()).unwrap_or(u32::MAX);
                state.tx_latched = len;
                state.events.push(PeerEvent::LengthQueried(len));
                if len > 0 {
                    state.raise();
                }
                Ok(Bytes::copy_from_slice(&len.to_le_bytes()))
            }
            Command::ReadData => {
                let n = usize::try_from(state.tx_latched)
                    .map_or(CHUNK_SIZE, |n| n.min(CHUNK_SIZE))
                    .min(state.tx.len());
                let mut miso = BytesMut::with_capacity(CHUNK_SIZE);
                miso.extend(state.tx.drain(..n));
                miso.put_bytes(0, CHUNK_SIZE - n);
                state.tx_latched -= n as u32;
                state.events.push(PeerEvent::DataRead(n));

                if state.tx_latched > 0 || !state.tx.is_empty() {
                    state.raise();
                }
                Ok(miso.freeze())
            }
        }
    }
}

impl Bus for SimulatedPeer {
    fn transact(&mut self, txn: &Transaction) -> Result<Bytes> {
        let miso = self.respond(txn.encode())?;
        debug_assert_eq!(miso.len(), txn.miso_len());
        Ok(miso)
    }
}
