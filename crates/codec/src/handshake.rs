//! TCP control channel: fixed-layout records exchanged during negotiation.
//!
//! The filename, the single status bytes, and the auth challenge/response
//! are plain byte buffers and have no dedicated type here; only the
//! multi-field records get a packed layout.

use bytes::{BufMut, BytesMut};

use crate::Error;

/// Current TTP protocol revision, compared verbatim by both sides.
pub const PROTOCOL_REVISION: u32 = 1;

pub const MAX_FILENAME_LENGTH: usize = 1024;

pub const AUTH_CHALLENGE_LEN: usize = 64;
pub const AUTH_DIGEST_LEN: usize = 16;

/// Receiver -> sender, once per transfer.
///
/// `{ u32 block_size, u32 target_rate, u32 error_rate,
///    u16 slower_num, u16 slower_den, u16 faster_num, u16 faster_den }`
pub const CLIENT_PARAMETERS_SIZE: usize = 4 + 4 + 4 + 2 + 2 + 2 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientParameters {
    pub block_size: u32,
    pub target_rate: u32,
    pub error_rate: u32,
    pub slower_num: u16,
    pub slower_den: u16,
    pub faster_num: u16,
    pub faster_den: u16,
}

impl ClientParameters {
    pub fn encode(self, bytes: &mut BytesMut) {
        bytes.put_u32(self.block_size);
        bytes.put_u32(self.target_rate);
        bytes.put_u32(self.error_rate);
        bytes.put_u16(self.slower_num);
        bytes.put_u16(self.slower_den);
        bytes.put_u16(self.faster_num);
        bytes.put_u16(self.faster_den);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != CLIENT_PARAMETERS_SIZE {
            return Err(Error::MalformedMessage);
        }

        Ok(Self {
            block_size: u32::from_be_bytes(bytes[0..4].try_into()?),
            target_rate: u32::from_be_bytes(bytes[4..8].try_into()?),
            error_rate: u32::from_be_bytes(bytes[8..12].try_into()?),
            slower_num: u16::from_be_bytes(bytes[12..14].try_into()?),
            slower_den: u16::from_be_bytes(bytes[14..16].try_into()?),
            faster_num: u16::from_be_bytes(bytes[16..18].try_into()?),
            faster_den: u16::from_be_bytes(bytes[18..20].try_into()?),
        })
    }
}

/// Sender -> receiver, echoing the file being opened.
///
/// `{ u64 file_size, u32 block_size, u64 block_count, u64 epoch }`
pub const SERVER_PARAMETERS_SIZE: usize = 8 + 4 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerParameters {
    pub file_size: u64,
    pub block_size: u32,
    pub block_count: u64,
    pub epoch: u64,
}

impl ServerParameters {
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use ttp_codec::handshake::ServerParameters;
    ///
    /// let params = ServerParameters { file_size: 102_400, block_size: 4096, block_count: 26, epoch: 1_700_000_000 };
    /// let mut bytes = BytesMut::with_capacity(ttp_codec::handshake::SERVER_PARAMETERS_SIZE);
    /// params.encode(&mut bytes);
    ///
    /// assert_eq!(ServerParameters::decode(&bytes).unwrap(), params);
    /// ```
    pub fn encode(self, bytes: &mut BytesMut) {
        bytes.put_u64(self.file_size);
        bytes.put_u32(self.block_size);
        bytes.put_u64(self.block_count);
        bytes.put_u64(self.epoch);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != SERVER_PARAMETERS_SIZE {
            return Err(Error::MalformedMessage);
        }

        Ok(Self {
            file_size: u64::from_be_bytes(bytes[0..8].try_into()?),
            block_size: u32::from_be_bytes(bytes[8..12].try_into()?),
            block_count: u64::from_be_bytes(bytes[12..20].try_into()?),
            epoch: u64::from_be_bytes(bytes[20..28].try_into()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_parameters_round_trip() {
        let params = ClientParameters {
            block_size: 32768,
            target_rate: 100_000_000,
            error_rate: 5_000,
            slower_num: 11,
            slower_den: 10,
            faster_num: 9,
            faster_den: 10,
        };

        let mut bytes = BytesMut::with_capacity(CLIENT_PARAMETERS_SIZE);
        params.encode(&mut bytes);
        assert_eq!(ClientParameters::decode(&bytes).unwrap(), params);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(ClientParameters::decode(&[0u8; 4]), Err(Error::MalformedMessage));
        assert_eq!(ServerParameters::decode(&[0u8; 4]), Err(Error::MalformedMessage));
    }
}
