//! Command-line configuration for the receiver binary, mirroring the sender
//! side's `Cli` and, beneath it, `turn-server/src/config.rs`'s use of
//! `clap::Parser`. Every `SessionParams` field the handshake negotiates
//! (spec.md §3) is exposed as an override flag with the library's default.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use ttp_core::config::{DEFAULT_BLOCK_SIZE, DEFAULT_SECRET, DEFAULT_TCP_PORT, SessionParams};

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Cli {
    /// Sender's TCP control-channel address.
    #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_TCP_PORT)))]
    pub server: SocketAddr,

    /// Remote filename to fetch, or the `*` / `!#DIR??` sentinels for a
    /// multi-file transfer or directory listing (spec.md §4.11).
    #[arg(long)]
    pub remote: String,

    /// Local path to write the file(s) to. For `*` transfers this is a
    /// destination directory; defaults to `remote`'s basename otherwise.
    #[arg(long)]
    pub local: Option<PathBuf>,

    /// Shared authentication secret (spec.md §4.2).
    #[arg(long, default_value_t = DEFAULT_SECRET.to_string())]
    pub secret: String,

    /// Requested block size in bytes.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: u32,

    /// Target transfer rate in bits/second (spec.md §4.6).
    #[arg(long, default_value_t = 100_000_000)]
    pub target_rate: u32,

    /// Error-rate threshold in ‰×100 (0..=100_000).
    #[arg(long, default_value_t = 5_000)]
    pub error_rate_threshold: u32,

    #[arg(long, default_value_t = 11)]
    pub slower_num: u16,

    #[arg(long, default_value_t = 10)]
    pub slower_den: u16,

    #[arg(long, default_value_t = 9)]
    pub faster_num: u16,

    #[arg(long, default_value_t = 10)]
    pub faster_den: u16,

    /// Percentage (0..=100) of history retained in the IIR-smoothed rates.
    #[arg(long, default_value_t = 50)]
    pub history_percent: u8,

    /// Semi-lossy window in milliseconds; 0 disables it.
    #[arg(long, default_value_t = 0)]
    pub loss_window_ms: u32,

    /// Request every missing block rather than giving up on gaps
    /// (spec.md §4.9). Mutually exclusive in effect with `loss_window_ms`.
    #[arg(long, default_value_t = true)]
    pub lossless: bool,

    /// Bind the data channel on IPv6 rather than IPv4.
    #[arg(long, default_value_t = false)]
    pub ipv6: bool,

    /// Logging verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            block_size: self.block_size,
            target_rate: self.target_rate,
            error_rate_threshold: self.error_rate_threshold,
            slower_num: self.slower_num,
            slower_den: self.slower_den,
            faster_num: self.faster_num,
            faster_den: self.faster_den,
            history_percent: self.history_percent,
            loss_window_ms: self.loss_window_ms,
            lossless: self.lossless,
            ipv6: self.ipv6,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}
