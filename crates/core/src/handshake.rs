//! Control-channel handshake and per-transfer negotiation (spec.md §4.7,
//! C7): version check, MD5 challenge/response authentication, parameter
//! exchange, and the UDP port hand-off.

use std::{
    io::{Read, Write},
    net::TcpStream,
};

use bytes::BytesMut;
use codec::{
    crypto::auth_digest,
    handshake::{
        AUTH_CHALLENGE_LEN, AUTH_DIGEST_LEN, ClientParameters, PROTOCOL_REVISION, ServerParameters,
    },
};
use rand::RngCore;

use crate::{
    config::{MAX_FILENAME_LENGTH, SessionParams},
    error::{Error, Result},
};

/// Both sides send their revision, then read the peer's; a mismatch is
/// fatal to the session (spec.md §4.7 step 1).
pub fn check_version(stream: &mut TcpStream) -> Result<()> {
    stream.write_all(&PROTOCOL_REVISION.to_be_bytes())?;
    stream.flush()?;

    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    let theirs = u32::from_be_bytes(buf);

    if theirs != PROTOCOL_REVISION {
        return Err(Error::VersionMismatch { ours: PROTOCOL_REVISION, theirs });
    }

    Ok(())
}

/// Sender side of §4.2: send a random challenge, compare the receiver's
/// digest, and report the outcome as a single status byte.
pub fn authenticate_as_sender(stream: &mut TcpStream, secret: &[u8]) -> Result<()> {
    let mut challenge = [0u8; AUTH_CHALLENGE_LEN];
    rand::rng().fill_bytes(&mut challenge);

    stream.write_all(&challenge).map_err(Error::AuthWrite)?;
    stream.flush().map_err(Error::AuthWrite)?;

    let mut response = [0u8; AUTH_DIGEST_LEN];
    stream.read_exact(&mut response).map_err(Error::AuthRead)?;

    let expected = auth_digest(secret, &challenge);
    let ok = expected == response;

    stream.write_all(&[if ok { 0 } else { 1 }]).map_err(Error::AuthWrite)?;
    stream.flush().map_err(Error::AuthWrite)?;

    if ok { Ok(()) } else { Err(Error::AuthMismatch) }
}

/// Receiver side of §4.2: read the challenge, respond with the digest, and
/// read back the sender's verdict.
pub fn authenticate_as_receiver(stream: &mut TcpStream, secret: &[u8]) -> Result<()> {
    let mut challenge = [0u8; AUTH_CHALLENGE_LEN];
    stream.read_exact(&mut challenge).map_err(Error::AuthRead)?;

    let digest = auth_digest(secret, &challenge);
    stream.write_all(&digest).map_err(Error::AuthWrite)?;
    stream.flush().map_err(Error::AuthWrite)?;

    let mut result = [0u8; 1];
    stream.read_exact(&mut result).map_err(Error::AuthRead)?;

    if result[0] == 0 { Ok(()) } else { Err(Error::AuthMismatch) }
}

/// Receiver side of §4.7 step 3a/3b/3c: request `remote_filename`, read the
/// open-result byte, then send the client parameters and read back the
/// negotiated server parameters.
pub fn request_transfer(
    stream: &mut TcpStream,
    remote_filename: &str,
    params: &SessionParams,
) -> Result<ServerParameters> {
    if remote_filename.len() > MAX_FILENAME_LENGTH {
        return Err(Error::FileOpenFailure(remote_filename.to_string()));
    }

    stream.write_all(remote_filename.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let mut result = [0u8; 1];
    stream.read_exact(&mut result)?;
    if result[0] != 0 {
        return Err(Error::FileOpenFailure(remote_filename.to_string()));
    }

    let client_params = ClientParameters {
        block_size: params.block_size,
        target_rate: params.target_rate,
        error_rate: params.error_rate_threshold,
        slower_num: params.slower_num,
        slower_den: params.slower_den,
        faster_num: params.faster_num,
        faster_den: params.faster_den,
    };

    let mut bytes = BytesMut::new();
    client_params.encode(&mut bytes);
    stream.write_all(&bytes)?;
    stream.flush()?;

    let mut reply = [0u8; codec::handshake::SERVER_PARAMETERS_SIZE];
    stream.read_exact(&mut reply)?;
    let server_params = ServerParameters::decode(&reply)?;

    // spec.md §4.7 step 3c: the sender echoes block_size back; a mismatch
    // means the two sides disagree on the datagram layout and the transfer
    // must abort rather than silently adopting whatever the sender sent.
    if server_params.block_size != params.block_size {
        return Err(Error::BlockSizeMismatch {
            requested: params.block_size,
            echoed: server_params.block_size,
        });
    }

    Ok(server_params)
}

/// Sender side of §4.7 step 3a/3b/3c. `open_file` attempts to open
/// `remote_filename` and returns its size on success; a `None` indicates
/// the file could not be opened. `block_count` cannot be known until the
/// receiver's requested `block_size` arrives with the client parameters,
/// so it is computed here rather than threaded through `open_file`.
///
/// Reads the filename itself; callers that must branch on the filename
/// first (the `"*"` / `!#DIR??` multi-file sentinels, spec.md §4.11) should
/// read it with [`read_filename`] and call [`negotiate_transfer`] directly.
pub fn accept_transfer_request(
    stream: &mut TcpStream,
    open_file: impl FnOnce(&str) -> Option<u64>,
    epoch: u64,
) -> Result<(String, SessionParams, u64, u64)> {
    let remote_filename = read_filename(stream)?;
    let (params, file_size, block_count) = negotiate_transfer(stream, &remote_filename, open_file, epoch)?;
    Ok((remote_filename, params, file_size, block_count))
}

/// The open-result/client-parameters/server-parameters leg of §4.7 step
/// 3b/3c, for a filename already read off the wire.
pub fn negotiate_transfer(
    stream: &mut TcpStream,
    remote_filename: &str,
    open_file: impl FnOnce(&str) -> Option<u64>,
    epoch: u64,
) -> Result<(SessionParams, u64, u64)> {
    let opened = open_file(remote_filename);
    stream.write_all(&[if opened.is_some() { 0 } else { 1 }])?;
    stream.flush()?;

    let file_size = opened.ok_or_else(|| Error::FileOpenFailure(remote_filename.to_string()))?;

    let mut raw = [0u8; codec::handshake::CLIENT_PARAMETERS_SIZE];
    stream.read_exact(&mut raw)?;
    let client_params = ClientParameters::decode(&raw)?;

    let block_count = file_size.div_ceil(client_params.block_size.max(1) as u64);
    let server_params = ServerParameters {
        file_size,
        block_size: client_params.block_size,
        block_count,
        epoch,
    };

    let mut bytes = BytesMut::new();
    server_params.encode(&mut bytes);
    stream.write_all(&bytes)?;
    stream.flush()?;

    let params = SessionParams {
        block_size: client_params.block_size,
        target_rate: client_params.target_rate,
        error_rate_threshold: client_params.error_rate,
        slower_num: client_params.slower_num,
        slower_den: client_params.slower_den,
        faster_num: client_params.faster_num,
        faster_den: client_params.faster_den,
        ..SessionParams::default()
    };

    Ok((params, file_size, block_count))
}

/// Reads a newline-terminated filename up to `MAX_FILENAME_LENGTH` bytes.
pub fn read_filename(stream: &mut TcpStream) -> Result<String> {
    let mut name = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    loop {
        stream.read_exact(&mut byte)?;
        if byte[0] == b'\n' {
            break;
        }

        name.push(byte[0]);
        if name.len() > MAX_FILENAME_LENGTH {
            return Err(Error::MalformedMessage);
        }
    }

    String::from_utf8(name).map_err(|_| Error::MalformedMessage)
}

/// Receiver side of §4.7 step 3d: open a UDP socket and send its port back
/// to the sender, preserving the OS-returned byte order byte-for-byte
/// (spec.md §9, open ambiguity #1).
pub fn send_udp_port(stream: &mut TcpStream, raw_port_bytes: [u8; 2]) -> Result<()> {
    stream.write_all(&raw_port_bytes)?;
    stream.flush()?;
    Ok(())
}

pub fn read_udp_port(stream: &mut TcpStream) -> Result<[u8; 2]> {
    let mut bytes = [0u8; 2];
    stream.read_exact(&mut bytes)?;
    Ok(bytes)
}
