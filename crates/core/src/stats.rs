//! Statistics/feedback (spec.md §4.10, C10): rolling rate smoothing on both
//! ends plus the receiver's composite error-rate signal used to drive the
//! sender's IPD controller.

use std::time::{Duration, Instant};

use crate::config::MAX_BLOCKS_QUEUED;

/// Smoothed rate/retransmit tracking shared by sender and receiver.
pub struct Statistics {
    start_time: Instant,
    window_start: Instant,
    this_blocks: u64,
    this_retransmits: u64,
    total_blocks: u64,
    total_retransmits: u64,
    transmit_rate: f64,
    retransmit_rate: f64,
    history_percent: u8,
}

impl Statistics {
    pub fn new(history_percent: u8) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            window_start: now,
            this_blocks: 0,
            this_retransmits: 0,
            total_blocks: 0,
            total_retransmits: 0,
            transmit_rate: 0.0,
            retransmit_rate: 0.0,
            history_percent,
        }
    }

    pub fn record_block(&mut self, block: u64) {
        self.this_blocks += 1;
        self.total_blocks = block;
    }

    /// Resets `this_retransmits` and counts it against `kept_count`, the
    /// number of entries still wanted in the retransmit table after a
    /// periodic repeat's prune pass (`tsunami-udp/client/protocol.c`'s
    /// `ttp_repeat_retransmit`, lines 339-343): the counter measures
    /// outstanding unfulfilled requests at checkpoint time, not datagrams
    /// observed off the wire.
    pub fn record_repeat_retransmits(&mut self, kept_count: usize) {
        self.this_retransmits = kept_count as u64;
        self.total_retransmits += kept_count as u64;
    }

    /// Sets `this_retransmits` directly without touching `total_retransmits`,
    /// for the retransmit-table-overflow path, which the original sets to
    /// `MAX_RETRANSMISSION_BUFFER` without accumulating it into the total
    /// (`protocol.c` lines 322-326).
    pub fn set_this_retransmits(&mut self, count: u64) {
        self.this_retransmits = count;
    }

    pub fn transmit_rate(&self) -> f64 {
        self.transmit_rate
    }

    pub fn retransmit_rate(&self) -> f64 {
        self.retransmit_rate
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    pub fn total_retransmits(&self) -> u64 {
        self.total_retransmits
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// IIR-smooths the window's transmit/retransmit rates and rolls the
    /// window forward. `bytes_this_window` is the payload bytes accepted
    /// since the previous call.
    fn smooth_window(&mut self, bytes_this_window: u64, now: Instant) {
        let delta_us = now.duration_since(self.window_start).as_micros().max(1) as f64;
        let instant_tx_rate = bytes_this_window as f64 * 8.0 / delta_us * 1_000_000.0;

        let retx_ratio =
            self.this_retransmits as f64 / (1.0 + self.this_retransmits as f64 + self.this_blocks as f64);
        let instant_retx_rate = retx_ratio * 100_000.0;

        let history = self.history_percent as f64 / 100.0;
        self.transmit_rate = history * self.transmit_rate + (1.0 - history) * instant_tx_rate;
        self.retransmit_rate = history * self.retransmit_rate + (1.0 - history) * instant_retx_rate;

        self.window_start = now;
        self.this_blocks = 0;
        self.this_retransmits = 0;
    }

    /// Receiver-side composite error signal fed back to the sender's IPD
    /// controller (spec.md §4.10):
    /// `error_rate = history/100·prev + (100-history)·500·(retx_ratio + ring_fill_ratio)`
    /// where `retx_ratio = this_retx / (1 + this_retx + Δblocks)`. Note the
    /// asymmetric scaling: unlike `smooth_window`'s rates, only the first
    /// term is normalized by 100 — this is what lets the signal span the
    /// full `0..=100_000` error-rate range when `history_percent` is low.
    pub fn update_error_rate(
        &mut self,
        prev_error_rate: f64,
        bytes_this_window: u64,
        ring_occupancy: usize,
        now: Instant,
    ) -> f64 {
        let this_retransmits = self.this_retransmits as f64;
        let this_blocks = self.this_blocks as f64;
        let retx_ratio = this_retransmits / (1.0 + this_retransmits + this_blocks);
        let ring_fill_ratio = ring_occupancy as f64 / MAX_BLOCKS_QUEUED as f64;

        self.smooth_window(bytes_this_window, now);

        let history = self.history_percent as f64;
        (history / 100.0) * prev_error_rate + (100.0 - history) * 500.0 * (retx_ratio + ring_fill_ratio)
    }
}
