//! Half-duplex chunked SPI transport.
//!
//! A host-side master moves byte streams to and from a co-processor over a
//! bus that can only go one way at a time. The peer paces every exchange by
//! raising a handshake line; each wake-up runs one non-blocking step of the
//! transaction state machine.
//!
//! # Architecture
//!
//! ```text
//!  producers                worker task                       consumer task
//! +----------+  outbound  +--------------------------+  inbound  +----------+
//! | submit() | ---------> | TransactionStateMachine  | --------> |  sink    |
//! +----------+ ByteStream |  one step per wake-up    | ByteStream+----------+
//!      |                  +--------------------------+                |
//!      | assert if idle        ^          |  Bus                      | try_resume
//!      v                       |          v                           v
//! +---------------------------------------------------------------------------+
//! |                             HandshakeLine                                 |
//! +---------------------------------------------------------------------------+
//!                              ^
//!                              | ready / has data
//!                         +---------+
//!                         |  peer   |
//!                         +---------+
//! ```
//!
//! # Transfer
//!
//! 1. Announce or query the total length (32-bit little-endian)
//! 2. Move the data in 64-byte chunks, one per handshake
//! 3. Return to idle when the pending length reaches zero

pub mod backpressure;
pub mod bus;
pub mod chunk;
pub mod consumer;
pub mod handshake;
pub mod length;
pub mod machine;
pub mod pipeline;
pub mod producer;
pub mod shared;
pub mod stream;

/// Bytes clocked per data exchange; the final chunk is zero padded
pub const CHUNK_SIZE: usize = 64;

pub use backpressure::Backpressure;
pub use bus::{Bus, Command, Transaction, TransactionPhases};
pub use chunk::{Chunk, Direction};
pub use consumer::Consumer;
pub use handshake::HandshakeLine;
pub use machine::{Step, TransactionMode, TransactionStateMachine};
pub use pipeline::Link;
pub use producer::{pump_lines, Producer};
pub use shared::{LinkShared, LinkStats};
pub use stream::ByteStream;
