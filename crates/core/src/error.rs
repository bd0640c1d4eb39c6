use std::{fmt, io};

/// Error kinds per the protocol's error handling design: errors internal to
/// a single file transfer close that transfer and return the session to the
/// filename-wait state; errors at the session layer (version, auth) close
/// the session.
#[derive(Debug)]
pub enum Error {
    MalformedMessage,
    VersionMismatch { ours: u32, theirs: u32 },
    BlockSizeMismatch { requested: u32, echoed: u32 },
    AuthRead(io::Error),
    AuthWrite(io::Error),
    AuthMismatch,
    FileOpenFailure(String),
    NetworkIo(io::Error),
    HeartbeatTimeout,
    DiskWrite(io::Error),
    Io(io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AuthRead(e) | Self::AuthWrite(e) | Self::NetworkIo(e) | Self::DiskWrite(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage => write!(f, "malformed control-channel message"),
            Self::VersionMismatch { ours, theirs } => {
                write!(f, "protocol revision mismatch: ours={ours}, theirs={theirs}")
            }
            Self::BlockSizeMismatch { requested, echoed } => {
                write!(f, "sender echoed block_size={echoed}, but we requested block_size={requested}")
            }
            Self::AuthRead(e) => write!(f, "could not read authentication exchange: {e}"),
            Self::AuthWrite(e) => write!(f, "could not write authentication exchange: {e}"),
            Self::AuthMismatch => write!(f, "shared secret did not match"),
            Self::FileOpenFailure(name) => write!(f, "could not open file: {name}"),
            Self::NetworkIo(e) => write!(f, "network I/O error: {e}"),
            Self::HeartbeatTimeout => write!(f, "no heartbeat received from receiver within timeout"),
            Self::DiskWrite(e) => write!(f, "disk write error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<codec::Error> for Error {
    fn from(_: codec::Error) -> Self {
        Self::MalformedMessage
    }
}

pub type Result<T> = std::result::Result<T, Error>;
