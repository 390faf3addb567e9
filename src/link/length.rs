//! Length exchange: announce or query the pending byte count of a transaction.

use crate::error::Result;
use crate::link::bus::{decode_length, Bus, Transaction};

/// Tell the peer how many bytes this side is about to send.
/// Announcing 0 ends a send phase.
pub fn announce_length<B: Bus + ?Sized>(bus: &mut B, len: u32) -> Result<()> {
    bus.transact(&Transaction::write_length(len))?;
    Ok(())
}

/// Ask the peer how many bytes it has queued for this side.
pub fn query_length<B: Bus + ?Sized>(bus: &mut B) -> Result<u32> {
    let miso = bus.transact(&Transaction::read_length())?;
    decode_length(&miso)
}
