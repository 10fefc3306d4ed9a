//! Traffic counters and the statistics loop.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::info;

use super::Server;

/// Per-direction byte totals since the last statistics tick.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    ep0_ep1: AtomicI64,
    ep1_ep0: AtomicI64,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter credited by the ep0 -> ep1 relay direction.
    pub fn forward_tally(&self) -> &AtomicI64 {
        &self.ep0_ep1
    }

    /// Counter credited by the ep1 -> ep0 relay direction.
    pub fn reverse_tally(&self) -> &AtomicI64 {
        &self.ep1_ep0
    }

    /// Current totals without resetting.
    pub fn totals(&self) -> (i64, i64) {
        (
            self.ep0_ep1.load(Ordering::Relaxed),
            self.ep1_ep0.load(Ordering::Relaxed),
        )
    }

    /// Take both totals, resetting them to zero.
    pub fn take(&self) -> (i64, i64) {
        (
            self.ep0_ep1.swap(0, Ordering::Relaxed),
            self.ep1_ep0.swap(0, Ordering::Relaxed),
        )
    }
}

/// Format a byte rate with the largest unit in {B, KB, MB, GB, TB}
/// that keeps the mantissa below 1024.
pub fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut rate = if bytes_per_sec.is_finite() && bytes_per_sec > 0.0 {
        bytes_per_sec
    } else {
        0.0
    };
    let mut unit = 0;
    while rate >= 1024.0 && unit < UNITS.len() - 1 {
        rate /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{:.0}{}", rate, UNITS[unit])
    } else {
        format!("{:.2}{}", rate, UNITS[unit])
    }
}

/// Periodically log the aggregate byte rates and reset the counters.
pub(crate) async fn run_statistics_loop(server: Arc<Server>) {
    let mut last = Instant::now();
    loop {
        tokio::time::sleep(server.statistic_interval()).await;
        let elapsed = last.elapsed().as_secs_f64();
        last = Instant::now();
        let (up, down) = server.counters().take();
        if elapsed <= 0.0 {
            continue;
        }
        info!(
            "transmission rate: {}/s ep0->ep1, {}/s ep1->ep0 ({} tunnels)",
            format_rate(up as f64 / elapsed),
            format_rate(down as f64 / elapsed),
            server.registry().len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_pick_the_largest_sub_1024_unit() {
        assert_eq!(format_rate(0.0), "0B");
        assert_eq!(format_rate(512.0), "512B");
        assert_eq!(format_rate(1023.0), "1023B");
        assert_eq!(format_rate(1024.0), "1.00KB");
        assert_eq!(format_rate(2048.0), "2.00KB");
        assert_eq!(format_rate(1024.0 * 1024.0), "1.00MB");
        assert_eq!(format_rate(1536.0 * 1024.0), "1.50MB");
        assert_eq!(format_rate(1024.0 * 1024.0 * 1024.0), "1.00GB");
        assert_eq!(format_rate(1024.0f64.powi(4)), "1.00TB");
    }

    #[test]
    fn oversized_rates_stay_in_terabytes() {
        assert_eq!(format_rate(1024.0f64.powi(5)), "1024.00TB");
    }

    #[test]
    fn counters_take_resets_to_zero() {
        let counters = TrafficCounters::new();
        counters.forward_tally().fetch_add(100, Ordering::Relaxed);
        counters.reverse_tally().fetch_add(7, Ordering::Relaxed);
        assert_eq!(counters.totals(), (100, 7));
        assert_eq!(counters.take(), (100, 7));
        assert_eq!(counters.totals(), (0, 0));
    }
}
