//! Tsunami receiver binary: connects to a sender, negotiates one or more
//! file transfers, and runs `ttp-core`'s receiver loop for each, mirroring
//! `turn-server/src/main.rs`'s thin-binary-over-library-crate split.

mod config;

use std::{
    fs::{self, File},
    io::Write as _,
    net::{TcpStream, UdpSocket},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use bytes::BytesMut;
use clap::Parser;
use codec::retransmission::{RECORD_SIZE, RetransmissionRecord};
use ttp_core::{
    config::{DIR_LIST_SENTINEL, MULTI_FILE_SENTINEL},
    handshake, multifile,
    receiver::ReceiverLoop,
    session::Transfer,
};

use config::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(cli.log_level.as_level())?;

    let mut control = TcpStream::connect(cli.server).with_context(|| format!("connecting to {}", cli.server))?;
    handshake::check_version(&mut control)?;
    handshake::authenticate_as_receiver(&mut control, cli.secret.as_bytes())?;

    let params = cli.session_params();

    match cli.remote.as_str() {
        MULTI_FILE_SENTINEL => {
            let names = multifile::request_file_list(&mut control)?;
            let dest_dir = cli.local.clone().unwrap_or_else(|| PathBuf::from("."));
            fs::create_dir_all(&dest_dir)?;

            for name in names {
                let local_path = dest_dir.join(&name);
                if let Err(e) = fetch_one_file(&mut control, &name, &local_path, &params) {
                    log::warn!("transfer of {name} failed: {e}");
                }
            }
        }
        DIR_LIST_SENTINEL => {
            let entries = multifile::request_directory_listing(&mut control)?;
            for (name, size) in entries {
                println!("{size:>12}  {name}");
            }
        }
        remote => {
            let local_path = cli.local.clone().unwrap_or_else(|| PathBuf::from(basename(remote)));
            fetch_one_file(&mut control, remote, &local_path, &params)?;
        }
    }

    Ok(())
}

/// Runs the §4.7/§4.8/§4.9 negotiation-and-transfer sequence for one file.
fn fetch_one_file(control: &mut TcpStream, remote: &str, local_path: &Path, params: &ttp_core::config::SessionParams) -> Result<()> {
    let server_params = handshake::request_transfer(control, remote, params)?;

    let udp = UdpSocket::bind(if params.ipv6 { "[::]:0" } else { "0.0.0.0:0" })?;
    let local_port = udp.local_addr()?.port();
    handshake::send_udp_port(control, local_port.to_be_bytes())?;

    let transfer = Transfer::new(
        remote.to_string(),
        local_path.display().to_string(),
        server_params.file_size,
        server_params.block_count,
    );
    log::info!(
        "fetching {} -> {} ({} bytes, {} blocks)",
        transfer.remote_filename,
        transfer.local_filename,
        transfer.file_size,
        transfer.block_count
    );

    // `handshake::request_transfer` already aborted if the sender's echoed
    // block_size disagreed with `params.block_size`, so `params` itself is
    // the negotiated value here.
    let mut receiver = ReceiverLoop::new(control.try_clone()?, udp, *params, server_params.block_count);

    let file = File::create(local_path).with_context(|| format!("creating {}", local_path.display()))?;
    let report = receiver.run(file, server_params.file_size)?;

    if report.is_complete() {
        log::info!("transfer of {remote} complete");
    } else {
        bail!("transfer of {remote} incomplete: {} blocks missing", report.blocks_left);
    }

    let mut bytes = BytesMut::with_capacity(RECORD_SIZE);
    RetransmissionRecord::stop().encode(&mut bytes);
    control.write_all(&bytes)?;
    control.flush()?;

    Ok(())
}

fn basename(remote: &str) -> &str {
    remote.rsplit(['/', '\\']).next().unwrap_or(remote)
}
