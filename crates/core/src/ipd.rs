//! Sender-side inter-packet-delay controller (spec.md §4.6, C6): an
//! AIMD-like rule with a ratio-based multiplicative term on both sides,
//! driven by the receiver's periodic error-rate feedback.

use crate::config::SessionParams;

const IPD_CLAMP_MAX_US: u64 = 10_000;

pub struct IpdController {
    ipd_target: u64,
    ipd_current: u64,
    error_rate_threshold: u32,
    slower_num: u64,
    slower_den: u64,
    faster_num: u64,
    faster_den: u64,
}

impl IpdController {
    pub fn new(params: &SessionParams) -> Self {
        let ipd_target = params.ipd_target_us();

        Self {
            ipd_target,
            ipd_current: ipd_target.saturating_mul(3),
            error_rate_threshold: params.error_rate_threshold,
            slower_num: params.slower_num as u64,
            slower_den: params.slower_den as u64,
            faster_num: params.faster_num as u64,
            faster_den: params.faster_den as u64,
        }
    }

    pub fn ipd_target(&self) -> u64 {
        self.ipd_target
    }

    pub fn ipd_current(&self) -> u64 {
        self.ipd_current
    }

    /// Applies one `ErrorRate` feedback sample (0..=100_000) and clamps the
    /// result into `[ipd_target, 10_000]` microseconds.
    pub fn on_error_rate(&mut self, error_rate: u32) {
        let threshold = self.error_rate_threshold as f64;
        let current = self.ipd_current as f64;

        let updated = if error_rate as f64 > threshold {
            let slower = self.slower_num as f64 / self.slower_den as f64;
            let overload = (1.0 + error_rate as f64 - threshold) / (100_000.0 - threshold);
            current * (1.0 + (slower - 1.0) * overload)
        } else {
            current * (self.faster_num as f64 / self.faster_den as f64)
        };

        self.ipd_current = clamp(updated.round() as i64, self.ipd_target);
    }
}

fn clamp(value: i64, ipd_target: u64) -> u64 {
    value.clamp(ipd_target as i64, IPD_CLAMP_MAX_US as i64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SessionParams {
        SessionParams {
            block_size: 1,
            target_rate: 8,
            error_rate_threshold: 10_000,
            slower_num: 11,
            slower_den: 10,
            faster_num: 9,
            faster_den: 10,
            ..Default::default()
        }
    }

    #[test]
    fn s5_speedup_then_slowdown() {
        let mut ipd = IpdController::new(&params());
        ipd.ipd_target = 100;
        ipd.ipd_current = 300;

        for _ in 0..5 {
            ipd.on_error_rate(0);
        }

        // 300 * 0.9^5 ≈ 177.15
        assert!((ipd.ipd_current() as i64 - 177).abs() <= 1);

        ipd.on_error_rate(50_000);
        // 177 * (1 + 0.1 * (1 + 40000) / 90000) ≈ 184.9
        assert!((ipd.ipd_current() as i64 - 185).abs() <= 1);
    }

    #[test]
    fn clamps_to_ipd_target_floor() {
        let mut ipd = IpdController::new(&params());
        ipd.ipd_target = 1000;
        ipd.ipd_current = 1000;
        ipd.on_error_rate(0);

        assert_eq!(ipd.ipd_current(), 1000);
    }

    #[test]
    fn clamps_to_ten_thousand_microsecond_ceiling() {
        let mut ipd = IpdController::new(&params());
        ipd.ipd_target = 100;
        ipd.ipd_current = 9_999;
        ipd.on_error_rate(100_000);

        assert_eq!(ipd.ipd_current(), IPD_CLAMP_MAX_US);
    }

    #[test]
    fn initializes_to_three_times_target() {
        let ipd = IpdController::new(&params());
        assert_eq!(ipd.ipd_current(), ipd.ipd_target() * 3);
    }
}
