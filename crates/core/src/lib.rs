//! ## Tsunami Transfer Protocol (TTP) engine
//!
//! Shared sender/receiver core: the control-channel handshake, the UDP
//! blast loop, the receiver's bitmap/retransmit-table/ring-buffer
//! machinery, and the feedback-driven IPD controller. The CLI, config
//! persistence, and transcript formatting around this engine live in the
//! `tsunami-sender` and `tsunami-receiver` binaries.

pub mod bitmap;
pub mod config;
pub mod error;
pub mod handshake;
pub mod ipd;
pub mod multifile;
pub mod receiver;
pub mod retransmit;
pub mod ring;
pub mod sender;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
