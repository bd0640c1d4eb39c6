//! Tsunami sender binary: a thin CLI wrapper around `ttp-core`'s handshake,
//! multi-file, and sender-loop modules (SPEC_FULL.md §2), mirroring
//! `turn-server/src/main.rs`'s split between a binary that only parses
//! config/initializes logging and a library crate holding all the logic.

mod config;

use std::{
    fs::File,
    io,
    net::{IpAddr, SocketAddr, TcpListener, TcpStream, UdpSocket},
    path::{Path, PathBuf},
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use ttp_core::{
    config::{DIR_LIST_SENTINEL, HeartbeatConfig, MULTI_FILE_SENTINEL},
    handshake, multifile,
    sender::SenderLoop,
};

use config::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(cli.log_level.as_level())?;

    let listener = TcpListener::bind(cli.listen).with_context(|| format!("binding {}", cli.listen))?;
    log::info!("tsunami-sender listening on {} serving {}", cli.listen, cli.root.display());

    for incoming in listener.incoming() {
        let control = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("failed to accept connection: {e}");
                continue;
            }
        };

        let root = cli.root.clone();
        let secret = cli.secret.clone();
        let heartbeat = HeartbeatConfig { timeout: Duration::from_secs(cli.heartbeat_secs) };

        thread::spawn(move || {
            let peer = control.peer_addr().map(|a| a.to_string()).unwrap_or_default();
            if let Err(e) = serve_session(control, &root, secret.as_bytes(), heartbeat) {
                log::warn!("session with {peer} ended: {e}");
            }
        });
    }

    Ok(())
}

/// One TCP session (spec.md §4.7): version check, authentication, then a
/// per-file loop that runs until the connection is closed.
fn serve_session(mut control: TcpStream, root: &Path, secret: &[u8], heartbeat: HeartbeatConfig) -> Result<()> {
    let peer_ip = control.peer_addr()?.ip();

    handshake::check_version(&mut control)?;
    handshake::authenticate_as_sender(&mut control, secret)?;

    loop {
        let remote_filename = match handshake::read_filename(&mut control) {
            Ok(name) => name,
            Err(_) => return Ok(()), // connection closed between files
        };

        if remote_filename == MULTI_FILE_SENTINEL {
            let entries = list_directory(root)?;
            let names = entries.into_iter().map(|(name, _)| name).collect::<Vec<_>>();
            multifile::reply_with_file_list(&mut control, &names)?;
            continue;
        }

        if remote_filename == DIR_LIST_SENTINEL {
            let entries = list_directory(root)?;
            multifile::reply_with_directory_listing(&mut control, &entries)?;
            continue;
        }

        if let Err(e) = serve_one_file(&mut control, root, &remote_filename, peer_ip, heartbeat) {
            log::warn!("transfer of {remote_filename} ended: {e}");
        }
    }
}

/// Negotiates and runs a single file transfer (spec.md §4.7 step 3, §4.8).
fn serve_one_file(
    control: &mut TcpStream,
    root: &Path,
    remote_filename: &str,
    peer_ip: IpAddr,
    heartbeat: HeartbeatConfig,
) -> Result<()> {
    let path = safe_join(root, remote_filename)?;
    let epoch = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let (params, file_size, block_count) = handshake::negotiate_transfer(
        control,
        remote_filename,
        |_| std::fs::metadata(&path).ok().filter(|m| m.is_file()).map(|m| m.len()),
        epoch,
    )?;

    let peer_port = u16::from_be_bytes(handshake::read_udp_port(control)?);
    let peer = SocketAddr::new(peer_ip, peer_port);

    let udp = UdpSocket::bind(if peer_ip.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" })?;
    let file = File::open(&path)?;

    log::info!("sending {remote_filename} ({file_size} bytes, {block_count} blocks) to {peer}");

    let ipd = ttp_core::ipd::IpdController::new(&params);
    let mut sender = SenderLoop::new(control.try_clone()?, udp, peer, file, params.block_size, block_count, ipd, heartbeat)?;
    let result = sender.run();

    // SenderLoop::new puts the cloned handle (and, since it shares the same
    // underlying socket, `control` itself) into non-blocking mode; restore
    // it before the next per-file negotiation round reads the control
    // channel with blocking calls (spec.md §5).
    control.set_nonblocking(false)?;

    result?;
    log::info!("transfer of {remote_filename} complete");
    Ok(())
}

/// Rejects absolute paths and `..` components so a remote filename cannot
/// escape `root`.
fn safe_join(root: &Path, remote_filename: &str) -> Result<PathBuf> {
    let candidate = Path::new(remote_filename);
    if candidate.is_absolute() || candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        bail!("rejected unsafe filename: {remote_filename}");
    }
    Ok(root.join(candidate))
}

/// Lists the regular files directly under `root`, for the `"*"` and
/// `!#DIR??` multi-file sentinels (spec.md §4.11).
fn list_directory(root: &Path) -> io::Result<Vec<(String, u64)>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let metadata = entry.metadata()?;

        if metadata.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                entries.push((name.to_string(), metadata.len()));
            }
        }
    }

    entries.sort();
    Ok(entries)
}
