//! spilink: host-side half-duplex SPI transport.
//!
//! Carries two byte streams (host -> peer and peer -> host) over a bus that
//! moves one 64-byte chunk per exchange, paced by a handshake line the peer
//! raises whenever it is ready or has data. See [`link`] for the transfer
//! model.

pub mod config;
pub mod error;
pub mod link;
pub mod peer;

pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use link::{
    pump_lines, Bus, HandshakeLine, Link, LinkStats, Producer, TransactionMode,
    TransactionStateMachine, CHUNK_SIZE,
};
pub use peer::{PeerEvent, SimulatedPeer};
