//! ## Tsunami Transfer Protocol (TTP) wire codec
//!
//! TTP splits a transfer into a TCP control channel (handshake, parameter
//! negotiation, retransmission requests) and a UDP data channel (block
//! datagrams). Every record on both channels has a fixed, packed,
//! network-byte-order layout, so the codec exposes plain encode/decode
//! pairs over byte slices rather than a streaming parser.

pub mod block;
pub mod crypto;
pub mod handshake;
pub mod retransmission;

use std::{array::TryFromSliceError, fmt};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// A record was short, long, or carried an unrecognized tag.
    MalformedMessage,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage => write!(f, "malformed message"),
        }
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_: TryFromSliceError) -> Self {
        Self::MalformedMessage
    }
}
