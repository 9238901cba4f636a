// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;

use serde::Serialize;

/// Number of most recent samples kept for percentiles.
pub const SAMPLE_WINDOW: usize = 1000;

/// Percentiles stay at zero until this many samples are in the window.
pub const MIN_SAMPLES_FOR_PERCENTILES: usize = 20;

/// Response time statistics in milliseconds.
///
/// `count`, `sum_ms`, `min_ms`, `max_ms` and `avg_ms` cover every recorded sample;
/// `p95_ms` and `p99_ms` cover the most recent [`SAMPLE_WINDOW`] samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ResponseTimes {
    /// Number of samples recorded.
    pub count: u64,
    /// Sum of all samples.
    pub sum_ms: u64,
    /// Smallest sample, zero when empty.
    pub min_ms: u64,
    /// Largest sample.
    pub max_ms: u64,
    /// Mean of all samples.
    pub avg_ms: f64,
    /// 95th percentile of the window.
    pub p95_ms: u64,
    /// 99th percentile of the window.
    pub p99_ms: u64,
}

#[derive(Debug)]
pub(crate) struct LatencyWindow {
    stats: ResponseTimes,
    samples: VecDeque<u64>,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self {
            stats: ResponseTimes::default(),
            samples: VecDeque::with_capacity(SAMPLE_WINDOW),
        }
    }
}

impl LatencyWindow {
    pub fn record(&mut self, duration_ms: u64) {
        let stats = &mut self.stats;

        stats.min_ms = if stats.count == 0 {
            duration_ms
        } else {
            stats.min_ms.min(duration_ms)
        };
        stats.max_ms = stats.max_ms.max(duration_ms);
        stats.count = stats.count.saturating_add(1);
        stats.sum_ms = stats.sum_ms.saturating_add(duration_ms);
        stats.avg_ms = ratio(stats.sum_ms, stats.count);

        if self.samples.len() == SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(duration_ms);

        if self.samples.len() >= MIN_SAMPLES_FOR_PERCENTILES {
            let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
            sorted.sort_unstable();
            stats.p95_ms = percentile(&sorted, 95);
            stats.p99_ms = percentile(&sorted, 99);
        }
    }

    pub fn stats(&self) -> ResponseTimes {
        self.stats
    }

    #[cfg(test)]
    pub fn window_len(&self) -> usize {
        self.samples.len()
    }
}

/// Nearest-rank style percentile over sorted samples: index `percentile * len / 100`, clamped.
fn percentile(sorted: &[u64], percentile: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }

    let index = (percentile * sorted.len() / 100).min(sorted.len() - 1);
    sorted[index]
}

#[expect(clippy::cast_precision_loss, reason = "averages are reported, not used for arithmetic")]
fn ratio(sum: u64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }

    sum as f64 / count as f64
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_all_zero() {
        assert_eq!(LatencyWindow::default().stats(), ResponseTimes::default());
    }

    #[test]
    fn min_max_avg_over_all_samples() {
        let mut window = LatencyWindow::default();
        for ms in [30, 10, 20] {
            window.record(ms);
        }

        let stats = window.stats();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sum_ms, 60);
        assert_eq!(stats.min_ms, 10);
        assert_eq!(stats.max_ms, 30);
        assert!((stats.avg_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percentiles_wait_for_enough_samples() {
        let mut window = LatencyWindow::default();
        for ms in 1..20 {
            window.record(ms);
        }
        assert_eq!(window.stats().p95_ms, 0);

        window.record(20);
        // Index 95 * 20 / 100 = 19 and 99 * 20 / 100 = 19 over 1..=20.
        assert_eq!(window.stats().p95_ms, 20);
        assert_eq!(window.stats().p99_ms, 20);
    }

    #[test]
    fn percentiles_over_a_full_window() {
        let mut window = LatencyWindow::default();
        for ms in (1..=100).rev() {
            window.record(ms);
        }

        assert_eq!(window.stats().p95_ms, 96);
        assert_eq!(window.stats().p99_ms, 100);
    }

    #[test]
    fn window_evicts_oldest_first() {
        let mut window = LatencyWindow::default();
        for _ in 0..SAMPLE_WINDOW {
            window.record(1_000);
        }
        for _ in 0..SAMPLE_WINDOW {
            window.record(1);
        }

        assert_eq!(window.window_len(), SAMPLE_WINDOW);
        let stats = window.stats();
        assert_eq!(stats.p99_ms, 1);
        assert_eq!(stats.max_ms, 1_000);
        assert_eq!(stats.count, 2_000);
    }

    #[test]
    fn percentile_index_is_clamped() {
        assert_eq!(percentile(&[5], 99), 5);
        assert_eq!(percentile(&[1, 2], 100), 2);
        assert_eq!(percentile(&[], 95), 0);
    }
}
