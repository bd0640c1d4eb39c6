//! TCP control channel: retransmission request records.
//!
//! Records are packed with no padding and sent back-to-back; the receiver
//! batches several into one write when flushing the retransmit table.

use bytes::{BufMut, BytesMut};

use crate::Error;

/// `{ u16 request_type, u64 block, u32 error_rate }`, network byte order.
pub const RECORD_SIZE: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestType {
    Retransmit = 1,
    Restart = 2,
    Stop = 3,
    ErrorRate = 4,
}

impl TryFrom<u16> for RequestType {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Error> {
        Ok(match value {
            1 => Self::Retransmit,
            2 => Self::Restart,
            3 => Self::Stop,
            4 => Self::ErrorRate,
            _ => return Err(Error::MalformedMessage),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmissionRecord {
    pub request_type: RequestType,
    pub block: u64,
    pub error_rate: u32,
}

impl RetransmissionRecord {
    pub fn retransmit(block: u64) -> Self {
        Self { request_type: RequestType::Retransmit, block, error_rate: 0 }
    }

    pub fn restart(block: u64) -> Self {
        Self { request_type: RequestType::Restart, block, error_rate: 0 }
    }

    pub fn stop() -> Self {
        Self { request_type: RequestType::Stop, block: 0, error_rate: 0 }
    }

    pub fn error_rate(error_rate: u32) -> Self {
        Self { request_type: RequestType::ErrorRate, block: 0, error_rate }
    }

    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use ttp_codec::retransmission::RetransmissionRecord;
    ///
    /// let mut bytes = BytesMut::with_capacity(ttp_codec::retransmission::RECORD_SIZE);
    /// RetransmissionRecord::retransmit(1000).encode(&mut bytes);
    ///
    /// let record = RetransmissionRecord::decode(&bytes).unwrap();
    /// assert_eq!(record.block, 1000);
    /// ```
    pub fn encode(self, bytes: &mut BytesMut) {
        bytes.put_u16(self.request_type as u16);
        bytes.put_u64(self.block);
        bytes.put_u32(self.error_rate);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != RECORD_SIZE {
            return Err(Error::MalformedMessage);
        }

        Ok(Self {
            request_type: RequestType::try_from(u16::from_be_bytes(bytes[0..2].try_into()?))?,
            block: u64::from_be_bytes(bytes[2..10].try_into()?),
            error_rate: u32::from_be_bytes(bytes[10..14].try_into()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_request_type() {
        for record in [
            RetransmissionRecord::retransmit(42),
            RetransmissionRecord::restart(1000),
            RetransmissionRecord::stop(),
            RetransmissionRecord::error_rate(50_000),
        ] {
            let mut bytes = BytesMut::with_capacity(RECORD_SIZE);
            record.encode(&mut bytes);
            assert_eq!(RetransmissionRecord::decode(&bytes).unwrap(), record);
        }
    }

    #[test]
    fn rejects_short_record() {
        let bytes = BytesMut::from(&[0u8; 4][..]);
        assert_eq!(RetransmissionRecord::decode(&bytes), Err(Error::MalformedMessage));
    }
}
