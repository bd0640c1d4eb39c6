//! Command-line configuration (SPEC_FULL.md §10.2): the sender's config
//! surface is CLI flags only, matching `turn-server/src/config.rs`'s use of
//! `clap::Parser` but without its `serde_json5` file layer, since TTP has no
//! persisted configuration (spec.md §1 Non-goals).

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use ttp_core::config::{DEFAULT_SECRET, DEFAULT_TCP_PORT};

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Cli {
    /// TCP control-channel address to listen on.
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_TCP_PORT)))]
    pub listen: SocketAddr,

    /// Shared authentication secret (spec.md §4.2).
    #[arg(long, default_value_t = DEFAULT_SECRET.to_string())]
    pub secret: String,

    /// Directory files are served from.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Seconds without a receiver heartbeat before a transfer is aborted
    /// (spec.md §7, HeartbeatTimeout).
    #[arg(long, default_value_t = 10)]
    pub heartbeat_secs: u64,

    /// Logging verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
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
