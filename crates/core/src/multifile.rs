//! Multi-file wire hooks (spec.md §4.11, supplemented by
//! `tsunami-udp/server/protocol.c`'s `ttp_open_transfer`). The REPL that
//! drives these is out of scope; these are pure protocol functions over a
//! `TcpStream` so a receiver can request a listing without one.
//!
//! The two sentinels have genuinely different wire shapes in the original —
//! they are not the same framing with different payloads, so they get
//! independent read/write logic below rather than shared count-then-entries
//! helpers.

use std::{
    io::{Read, Write},
    net::TcpStream,
};

use crate::{
    config::{DIR_LIST_SENTINEL, MULTI_FILE_SENTINEL},
    error::{Error, Result},
};

const COUNT_FIELD_WIDTH: usize = 10;

/// Requests the `"*"` multi-file listing and returns the filenames to
/// transfer in turn. The exchange, mirroring `ttp_open_transfer`
/// (`tsunami-udp/server/protocol.c:363-375`), is: two 10-byte decimal count
/// fields, an 8-byte "got size" ack, then `file_count` NUL-terminated
/// filenames back to back, then an 8-byte "got list" ack.
pub fn request_file_list(stream: &mut TcpStream) -> Result<Vec<String>> {
    write_filename_request(stream, MULTI_FILE_SENTINEL)?;

    let _total_name_bytes = read_decimal_field(stream)?;
    let file_count = read_decimal_field(stream)?;

    stream.write_all(b"got size")?;
    stream.flush()?;

    let names = (0..file_count).map(|_| read_cstr(stream)).collect::<Result<Vec<_>>>()?;

    stream.write_all(b"got list")?;
    stream.flush()?;

    Ok(names)
}

/// Requests the `!#DIR??` sentinel and returns `(name, size)` pairs without
/// starting a transfer. Mirrors `ttp_open_transfer`'s `TS_DIRLIST_HACK_CMD`
/// branch (`protocol.c:356-362`): a NUL-terminated decimal file count, then
/// that many NUL-terminated `(name, size)` pairs, then a single trailing ack
/// byte the client writes once it has read the whole listing.
pub fn request_directory_listing(stream: &mut TcpStream) -> Result<Vec<(String, u64)>> {
    write_filename_request(stream, DIR_LIST_SENTINEL)?;

    let file_count: usize = read_cstr(stream)?.parse().map_err(|_| Error::MalformedMessage)?;

    let entries = (0..file_count)
        .map(|_| {
            let name = read_cstr(stream)?;
            let size = read_cstr(stream)?.parse().map_err(|_| Error::MalformedMessage)?;
            Ok((name, size))
        })
        .collect::<Result<Vec<_>>>()?;

    stream.write_all(&[0])?;
    stream.flush()?;

    Ok(entries)
}

fn write_filename_request(stream: &mut TcpStream, token: &str) -> Result<()> {
    stream.write_all(token.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}

/// Sender side of the `"*"` branch: a 10-byte zero-padded ASCII decimal for
/// the total name-byte count (each name counted with its NUL terminator), a
/// second for `file_count`, an 8-byte "got size" ack read back, then that
/// many NUL-terminated filenames, then an 8-byte "got list" ack read back
/// (`protocol.c:363-375`).
pub fn reply_with_file_list(stream: &mut TcpStream, names: &[String]) -> Result<()> {
    let total_name_bytes: usize = names.iter().map(|n| n.len() + 1).sum();

    stream.write_all(&ascii_decimal_field(total_name_bytes))?;
    stream.write_all(&ascii_decimal_field(names.len()))?;
    stream.flush()?;

    let mut ack = [0u8; 8];
    stream.read_exact(&mut ack)?;

    for name in names {
        write_cstr(stream, name)?;
    }
    stream.flush()?;

    let mut ack = [0u8; 8];
    stream.read_exact(&mut ack)?;

    Ok(())
}

/// Sender side for the `!#DIR??` sentinel: a NUL-terminated decimal file
/// count, then NUL-terminated `name`/`size` pairs, then a single ack byte
/// read back once the client has the whole listing (`protocol.c:356-362`).
/// There is no total-byte-count field here — only the `"*"` branch has one.
pub fn reply_with_directory_listing(stream: &mut TcpStream, entries: &[(String, u64)]) -> Result<()> {
    write_cstr(stream, &entries.len().to_string())?;

    for (name, size) in entries {
        write_cstr(stream, name)?;
        write_cstr(stream, &size.to_string())?;
    }
    stream.flush()?;

    let mut ack = [0u8; 1];
    stream.read_exact(&mut ack)?;

    Ok(())
}

fn ascii_decimal_field(value: usize) -> [u8; COUNT_FIELD_WIDTH] {
    let digits = value.to_string();
    let mut field = [b'0'; COUNT_FIELD_WIDTH];
    let start = COUNT_FIELD_WIDTH - digits.len().min(COUNT_FIELD_WIDTH);
    field[start..].copy_from_slice(digits.as_bytes());
    field
}

/// Reads one zero-padded 10-byte ASCII decimal field, erroring rather than
/// silently coercing to `0` on non-numeric wire corruption.
fn read_decimal_field(stream: &mut TcpStream) -> Result<usize> {
    let mut raw = [0u8; COUNT_FIELD_WIDTH];
    stream.read_exact(&mut raw)?;

    let text = std::str::from_utf8(&raw).map_err(|_| Error::MalformedMessage)?;
    let digits = text.trim_start_matches('0');

    if digits.is_empty() {
        return Ok(0);
    }
    digits.parse().map_err(|_| Error::MalformedMessage)
}

fn write_cstr(stream: &mut TcpStream, s: &str) -> Result<()> {
    stream.write_all(s.as_bytes())?;
    stream.write_all(&[0])?;
    Ok(())
}

fn read_cstr(stream: &mut TcpStream) -> Result<String> {
    let mut name = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        stream.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        name.push(byte[0]);
    }

    Ok(String::from_utf8_lossy(&name).into_owned())
}
