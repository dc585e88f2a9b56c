//! Running statistics over frame inter-arrival periods

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Incremental mean/stddev of the time between delivered frames.
///
/// `update` runs on the delivery context once per frame; `stats` is read from
/// the display loop. A single lock guards both so readers always see a
/// consistent pair.
#[derive(Debug, Default)]
pub struct TimingAccumulator {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Timestamp of the previous update; `None` right after a reset, in which
    /// case the next update only anchors and records no period.
    last: Option<Instant>,
    avg: f64,
    avg2: f64,
    count: u64,
}

impl Inner {
    fn accumulate(&mut self, period_us: f64) {
        let n = self.count as f64;
        self.count += 1;
        let n1 = self.count as f64;
        self.avg = (self.avg * n + period_us) / n1;
        self.avg2 = (self.avg2 * n + period_us * period_us) / n1;
    }
}

impl TimingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all state. The next `update` re-anchors the timestamp.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = Inner::default();
    }

    /// Record one frame arrival.
    pub fn update(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        if let Some(last) = inner.last {
            let period_us = now.duration_since(last).as_secs_f64() * 1e6;
            inner.accumulate(period_us);
        }
        inner.last = Some(now);
    }

    /// Current (mean, stddev) of the frame period in microseconds.
    ///
    /// The variance radicand is clamped at zero: with near-constant periods,
    /// round-off can push `avg2 - avg^2` slightly negative.
    pub fn stats(&self) -> (f64, f64) {
        let inner = self.lock();
        let var = (inner.avg2 - inner.avg * inner.avg).max(0.0);
        (inner.avg, var.sqrt())
    }

    /// Number of periods accumulated since the last reset.
    pub fn samples(&self) -> u64 {
        self.lock().count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_only_anchors() {
        let acc = TimingAccumulator::new();
        acc.update();
        let (mean, stddev) = acc.stats();
        assert_eq!(mean, 0.0);
        assert_eq!(stddev, 0.0);
        assert_eq!(acc.samples(), 0);
    }

    #[test]
    fn incremental_mean_and_stddev() {
        let acc = TimingAccumulator::new();
        {
            let mut inner = acc.lock();
            for period in [10.0, 20.0, 30.0] {
                inner.accumulate(period);
            }
        }
        let (mean, stddev) = acc.stats();
        assert!((mean - 20.0).abs() < 1e-9);
        // sqrt(((100 + 400 + 900) / 3) - 400)
        assert!((stddev - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(acc.samples(), 3);
    }

    #[test]
    fn variance_radicand_is_clamped() {
        let acc = TimingAccumulator::new();
        {
            // force avg2 < avg^2, as floating point round-off can
            let mut inner = acc.lock();
            inner.avg = 10.0;
            inner.avg2 = 99.999_999_999;
            inner.count = 5;
        }
        let (_, stddev) = acc.stats();
        assert_eq!(stddev, 0.0);
    }

    #[test]
    fn reset_discards_anchor_and_samples() {
        let acc = TimingAccumulator::new();
        acc.update();
        acc.update();
        assert_eq!(acc.samples(), 1);
        acc.reset();
        assert_eq!(acc.samples(), 0);
        acc.update();
        // re-anchored: still no period recorded
        assert_eq!(acc.samples(), 0);
    }
}
