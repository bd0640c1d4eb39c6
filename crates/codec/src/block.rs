//! UDP data channel: block header + datagram framing.
//!
//! A datagram is `HEADER_SIZE` bytes of header followed by exactly
//! `block_size` bytes of payload. Block 0 never appears on the wire; it is
//! reserved by `ttp-core`'s ring buffer as an end-of-stream sentinel.

use bytes::{BufMut, BytesMut};

use crate::Error;

/// `{ u64 block, u16 block_type }`, network byte order, no padding.
pub const HEADER_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockType {
    Original = 1,
    Retransmission = 2,
    Terminate = 3,
}

impl TryFrom<u16> for BlockType {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Error> {
        Ok(match value {
            1 => Self::Original,
            2 => Self::Retransmission,
            3 => Self::Terminate,
            _ => return Err(Error::MalformedMessage),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub block: u64,
    pub block_type: BlockType,
}

impl BlockHeader {
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use ttp_codec::block::{BlockHeader, BlockType};
    ///
    /// let mut bytes = BytesMut::with_capacity(ttp_codec::block::HEADER_SIZE);
    /// BlockHeader { block: 42, block_type: BlockType::Original }.encode(&mut bytes);
    ///
    /// let header = BlockHeader::decode(&bytes).unwrap();
    /// assert_eq!(header.block, 42);
    /// assert_eq!(header.block_type, BlockType::Original);
    /// ```
    pub fn encode(self, bytes: &mut BytesMut) {
        bytes.put_u64(self.block);
        bytes.put_u16(self.block_type as u16);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != HEADER_SIZE {
            return Err(Error::MalformedMessage);
        }

        Ok(Self {
            block: u64::from_be_bytes(bytes[0..8].try_into()?),
            block_type: BlockType::try_from(u16::from_be_bytes(bytes[8..10].try_into()?))?,
        })
    }
}

/// Encodes a full `HEADER_SIZE + block_size` datagram into `bytes`.
pub fn encode_datagram(header: BlockHeader, payload: &[u8], bytes: &mut BytesMut) {
    bytes.clear();
    header.encode(bytes);
    bytes.extend_from_slice(payload);
}

/// Splits a received datagram into its header and payload slice.
///
/// `block_size` is the negotiated payload length for the transfer; a
/// datagram of any other total length is malformed.
pub fn decode_datagram(bytes: &[u8], block_size: usize) -> Result<(BlockHeader, &[u8]), Error> {
    if bytes.len() != HEADER_SIZE + block_size {
        return Err(Error::MalformedMessage);
    }

    Ok((BlockHeader::decode(&bytes[..HEADER_SIZE])?, &bytes[HEADER_SIZE..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_block_type() {
        for (block, block_type) in [
            (1u64, BlockType::Original),
            (2, BlockType::Retransmission),
            (u64::MAX, BlockType::Terminate),
        ] {
            let mut bytes = BytesMut::with_capacity(HEADER_SIZE);
            BlockHeader { block, block_type }.encode(&mut bytes);
            assert_eq!(BlockHeader::decode(&bytes).unwrap(), BlockHeader { block, block_type });
        }
    }

    #[test]
    fn rejects_unknown_block_type() {
        let mut bytes = BytesMut::with_capacity(HEADER_SIZE);
        bytes.put_u64(1);
        bytes.put_u16(9);
        assert_eq!(BlockHeader::decode(&bytes), Err(Error::MalformedMessage));
    }

    #[test]
    fn datagram_round_trip() {
        let header = BlockHeader { block: 7, block_type: BlockType::Original };
        let payload = vec![0xAB; 128];
        let mut bytes = BytesMut::new();
        encode_datagram(header, &payload, &mut bytes);

        let (decoded_header, decoded_payload) = decode_datagram(&bytes, 128).unwrap();
        assert_eq!(decoded_header, header);
        assert_eq!(decoded_payload, payload.as_slice());
    }
}
