//! Tunable parameters, mirroring the defaults in `tsunami-udp/client/client.h`
//! and `tsunami-udp/server/config.c` where the original source fixes a
//! value, and choosing a documented default otherwise (see DESIGN.md).

use std::time::Duration;

/// Maximum number of datagrams queued between the receiver's network thread
/// and its disk thread.
pub const MAX_BLOCKS_QUEUED: usize = 8192;

/// Maximum number of outstanding retransmission requests flushed in one
/// repeat before the receiver gives up and issues a `Restart`.
pub const MAX_RETRANSMISSION_BUFFER: usize = 2048;

/// Initial capacity of the retransmit table; it doubles from here.
pub const RETRANSMIT_TABLE_INITIAL_CAPACITY: usize = 256;

/// Minimum spacing between periodic retransmit-table repeats / stats
/// updates, and the sender's default heartbeat granularity.
pub const UPDATE_PERIOD: Duration = Duration::from_micros(350_000);

/// Longest filename the control channel will carry.
pub const MAX_FILENAME_LENGTH: usize = 1024;

/// Sentinel filename requesting a size-only directory listing (§4.11).
pub const DIR_LIST_SENTINEL: &str = "!#DIR??";

/// Sentinel filename requesting a multi-file transfer (§4.11).
pub const MULTI_FILE_SENTINEL: &str = "*";

/// Default shared secret, matching `DEFAULT_SECRET` in the original server.
pub const DEFAULT_SECRET: &str = "kitten";

/// Default TCP control-channel port, matching `DEFAULT_TCP_PORT`.
pub const DEFAULT_TCP_PORT: u16 = 46224;

/// Default block size in bytes, matching `DEFAULT_BLOCK_SIZE`.
pub const DEFAULT_BLOCK_SIZE: u32 = 32768;

/// Per-transfer parameters negotiated between receiver and sender
/// (spec.md §3, Session Parameters). The receiver sends its requested
/// values; the sender may override block size but echoes the others back
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionParams {
    pub block_size: u32,
    pub target_rate: u32,
    /// Error-rate threshold in ‰×100 (0..=100_000).
    pub error_rate_threshold: u32,
    pub slower_num: u16,
    pub slower_den: u16,
    pub faster_num: u16,
    pub faster_den: u16,
    /// Percentage (0..=100) of history retained in the IIR-smoothed rates.
    pub history_percent: u8,
    /// Semi-lossy window in milliseconds; 0 means fully lossy (no window),
    /// and `lossless` below takes priority when set.
    pub loss_window_ms: u32,
    pub lossless: bool,
    pub ipv6: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            target_rate: 100_000_000,
            error_rate_threshold: 5_000,
            slower_num: 11,
            slower_den: 10,
            faster_num: 9,
            faster_den: 10,
            history_percent: 50,
            loss_window_ms: 0,
            lossless: true,
            ipv6: false,
        }
    }
}

impl SessionParams {
    /// `ipd_target`, in microseconds: the per-block delay implied by
    /// `target_rate` for the current `block_size` (spec.md §4.6).
    pub fn ipd_target_us(&self) -> u64 {
        (1_000_000u64 * 8 * self.block_size as u64) / self.target_rate.max(1) as u64
    }
}

/// Heartbeat watchdog timeout, sender-side (spec.md §7, HeartbeatTimeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipd_target_matches_spec_formula() {
        let params = SessionParams { block_size: 1024, target_rate: 8_000_000, ..Default::default() };
        assert_eq!(params.ipd_target_us(), 1024);
    }
}
