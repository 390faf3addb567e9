//! Bus command set and wire frames.
//!
//! Wire format: `command:u8 | address:u8 (data commands only) | mosi payload`,
//! followed by a MISO phase of fixed length. Lengths are 32-bit little-endian.
//! Data phases always clock a full chunk; the pending length tells the
//! receiver how many of those bytes are meaningful.

use crate::error::{LinkError, Result};
use crate::link::CHUNK_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Width of a length payload on the wire
pub const LENGTH_WIDTH: usize = 4;

/// Address used by every data exchange
pub const DATA_ADDRESS: u8 = 0x00;

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// host -> peer: announce pending length
    WriteLength = 0x01,
    /// host -> peer: one chunk of payload
    WriteData = 0x02,
    /// peer -> host: one chunk of payload
    ReadData = 0x03,
    /// peer -> host: query pending length
    ReadLength = 0x04,
}

impl Command {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::WriteLength),
            0x02 => Some(Self::WriteData),
            0x03 => Some(Self::ReadData),
            0x04 => Some(Self::ReadLength),
            _ => None,
        }
    }

    /// Phases clocked for this command.
    pub fn phases(self) -> TransactionPhases {
        match self {
            Self::WriteLength => TransactionPhases::COMMAND | TransactionPhases::MOSI,
            Self::ReadLength => TransactionPhases::COMMAND | TransactionPhases::MISO,
            Self::WriteData => {
                TransactionPhases::COMMAND | TransactionPhases::ADDRESS | TransactionPhases::MOSI
            }
            Self::ReadData => {
                TransactionPhases::COMMAND | TransactionPhases::ADDRESS | TransactionPhases::MISO
            }
        }
    }

    /// Payload bytes clocked in the data phase (MOSI or MISO).
    pub fn payload_len(self) -> usize {
        match self {
            Self::WriteLength | Self::ReadLength => LENGTH_WIDTH,
            Self::WriteData | Self::ReadData => CHUNK_SIZE,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransactionPhases: u8 {
        const COMMAND = 1 << 0;
        const ADDRESS = 1 << 1;
        const MOSI = 1 << 2;
        const MISO = 1 << 3;
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// One half-duplex bus exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub command: Command,
    pub address: Option<u8>,
    /// Bytes driven host -> peer (empty for read commands)
    pub mosi: Bytes,
}

impl Transaction {
    pub fn write_length(len: u32) -> Self {
        Self {
            command: Command::WriteLength,
            address: None,
            mosi: Bytes::copy_from_slice(&len.to_le_bytes()),
        }
    }

    pub fn read_length() -> Self {
        Self {
            command: Command::ReadLength,
            address: None,
            mosi: Bytes::new(),
        }
    }

    /// A full chunk is always driven; bytes past the meaningful ones are padding.
    pub fn write_data(chunk: &[u8; CHUNK_SIZE]) -> Self {
        Self {
            command: Command::WriteData,
            address: Some(DATA_ADDRESS),
            mosi: Bytes::copy_from_slice(chunk),
        }
    }

    pub fn read_data() -> Self {
        Self {
            command: Command::ReadData,
            address: Some(DATA_ADDRESS),
            mosi: Bytes::new(),
        }
    }

    /// Bytes the peer drives back during the MISO phase.
    pub fn miso_len(&self) -> usize {
        if self.command.phases().contains(TransactionPhases::MISO) {
            self.command.payload_len()
        } else {
            0
        }
    }

    /// The announced length of a `WriteLength` exchange.
    pub fn announced_length(&self) -> Option<u32> {
        if self.command != Command::WriteLength {
            return None;
        }
        let mut mosi = self.mosi.clone();
        (mosi.remaining() >= LENGTH_WIDTH).then(|| mosi.get_u32_le())
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.mosi.len());
        buf.put_u8(self.command as u8);
        if let Some(addr) = self.address {
            buf.put_u8(addr);
        }
        buf.put_slice(&self.mosi);
        buf.freeze()
    }

    pub fn decode(mut frame: Bytes) -> Result<Self> {
        if frame.remaining() < 1 {
            return Err(LinkError::Frame("empty frame".into()));
        }
        let raw = frame.get_u8();
        let command = Command::from_u8(raw)
            .ok_or_else(|| LinkError::Frame(format!("unknown command 0x{:02x}", raw)))?;
        let phases = command.phases();

        let address = if phases.contains(TransactionPhases::ADDRESS) {
            if frame.remaining() < 1 {
                return Err(LinkError::Frame(format!("{:?} address truncated", command)));
            }
            let addr = frame.get_u8();
            if addr != DATA_ADDRESS {
                return Err(LinkError::Frame(format!(
                    "{:?} address must be 0x{:02x}, got 0x{:02x}",
                    command, DATA_ADDRESS, addr
                )));
            }
            Some(addr)
        } else {
            None
        };

        let mosi_len = if phases.contains(TransactionPhases::MOSI) {
            command.payload_len()
        } else {
            0
        };
        if frame.remaining() != mosi_len {
            return Err(LinkError::Frame(format!(
                "{:?} payload: expected {} bytes, got {}",
                command,
                mosi_len,
                frame.remaining()
            )));
        }

        Ok(Self {
            command,
            address,
            mosi: frame,
        })
    }
}

/// Decode a little-endian length from a MISO phase.
pub fn decode_length(miso: &[u8]) -> Result<u32> {
    let raw: [u8; LENGTH_WIDTH] = miso
        .get(..LENGTH_WIDTH)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            LinkError::Frame(format!(
                "length response: expected {} bytes, got {}",
                LENGTH_WIDTH,
                miso.len()
            ))
        })?;
    Ok(u32::from_le_bytes(raw))
}

// =============================================================================
// Bus
// =============================================================================

/// A half-duplex bus master.
///
/// Called from the state machine, which must not block: implementations are
/// expected to complete one exchange in bounded time. Failures are not
/// retried by the caller.
pub trait Bus: Send {
    /// Clock out `txn` and return exactly `txn.miso_len()` bytes clocked in.
    fn transact(&mut self, txn: &Transaction) -> Result<Bytes>;
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn transact(&mut self, txn: &Transaction) -> Result<Bytes> {
        (**self).transact(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_u8() {
        assert_eq!(Command::from_u8(0x01), Some(Command::WriteLength));
        assert_eq!(Command::from_u8(0x04), Some(Command::ReadLength));
        assert_eq!(Command::from_u8(0x00), None);
        assert_eq!(Command::from_u8(0x05), None);
    }

    #[test]
    fn test_write_length_frame_layout() {
        let frame = Transaction::write_length(200).encode();
        // command, then 200 little-endian, no address phase
        assert_eq!(&frame[..], &[0x01, 200, 0, 0, 0]);
    }

    #[test]
    fn test_write_data_frame_layout() {
        let mut chunk = [0u8; CHUNK_SIZE];
        chunk[0] = 0xAA;
        let frame = Transaction::write_data(&chunk).encode();

        assert_eq!(frame.len(), 2 + CHUNK_SIZE);
        assert_eq!(frame[0], Command::WriteData as u8);
        assert_eq!(frame[1], DATA_ADDRESS);
        assert_eq!(frame[2], 0xAA);
    }

    #[test]
    fn test_decode_write_data() {
        let chunk = [5u8; CHUNK_SIZE];
        let txn = Transaction::decode(Transaction::write_data(&chunk).encode()).unwrap();
        assert_eq!(txn.command, Command::WriteData);
        assert_eq!(txn.address, Some(DATA_ADDRESS));
        assert_eq!(&txn.mosi[..], &chunk[..]);
        assert_eq!(txn.miso_len(), 0);
    }

    #[test]
    fn test_read_commands_expect_miso() {
        assert_eq!(Transaction::read_length().miso_len(), LENGTH_WIDTH);
        assert_eq!(Transaction::read_data().miso_len(), CHUNK_SIZE);
        assert_eq!(Transaction::write_length(1).miso_len(), 0);
    }

    #[test]
    fn test_announced_length() {
        assert_eq!(Transaction::write_length(4096).announced_length(), Some(4096));
        assert_eq!(Transaction::read_length().announced_length(), None);
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        let err = Transaction::decode(Bytes::from_static(&[0x7F])).unwrap_err();
        assert!(matches!(err, LinkError::Frame(_)));
    }

    #[test]
    fn test_decode_rejects_nonzero_address() {
        let frame = vec![Command::ReadData as u8, 0x01];
        let err = Transaction::decode(Bytes::from(frame)).unwrap_err();
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn test_decode_rejects_truncated_length() {
        let err = Transaction::decode(Bytes::from_static(&[0x01, 10, 0])).unwrap_err();
        assert!(matches!(err, LinkError::Frame(_)));
    }

    #[test]
    fn test_decode_length() {
        assert_eq!(decode_length(&100u32.to_le_bytes()).unwrap(), 100);
        assert!(decode_length(&[1, 2]).is_err());
    }
}
