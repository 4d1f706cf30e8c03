//! Test timing report
//!
//! Collects per-test durations and prints the slowest tests plus summary
//! statistics when the run stops.

use std::io::Write;
use tracing::debug;

use crate::models::{Outcome, TestId};
use crate::result::ResultHandler;

/// Duration statistics over every outcome of a run, in milliseconds
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimingStats {
    pub count: usize,
    pub total_ms: u64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p90_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

impl TimingStats {
    pub fn from_durations(durations: &[u64]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }
        let mut sorted = durations.to_vec();
        sorted.sort_unstable();
        let count = sorted.len();
        let total_ms: u64 = sorted.iter().sum();
        let median_ms = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) as f64 / 2.0
        } else {
            sorted[count / 2] as f64
        };

        Self {
            count,
            total_ms,
            mean_ms: total_ms as f64 / count as f64,
            median_ms,
            p90_ms: percentile(&sorted, 90),
            p99_ms: percentile(&sorted, 99),
            max_ms: sorted[count - 1],
        }
    }
}

/// Nearest-rank percentile of an ascending, non-empty slice.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

/// Core handler reporting the slowest tests
pub struct TimingHandler {
    writer: Box<dyn Write + Send>,
    slowest: usize,
    timings: Vec<(TestId, u64)>,
}

impl TimingHandler {
    pub fn new(writer: Box<dyn Write + Send>, slowest: usize) -> Self {
        Self {
            writer,
            slowest,
            timings: Vec::new(),
        }
    }

    pub fn stdout(slowest: usize) -> Self {
        Self::new(Box::new(std::io::stdout()), slowest)
    }

    /// The `n` slowest tests, slowest first. Ties keep arrival order.
    pub fn slowest(&self, n: usize) -> Vec<(TestId, u64)> {
        let mut timings = self.timings.clone();
        timings.sort_by(|a, b| b.1.cmp(&a.1));
        timings.truncate(n);
        timings
    }

    pub fn stats(&self) -> TimingStats {
        let durations: Vec<u64> = self.timings.iter().map(|(_, ms)| *ms).collect();
        TimingStats::from_durations(&durations)
    }

    pub fn report(&self) -> String {
        let stats = self.stats();
        let mut output = format!("\nSlowest {} tests:\n", self.slowest.min(stats.count));
        for (test, ms) in self.slowest(self.slowest) {
            output.push_str(&format!("  {:>9.3}s  {}\n", ms as f64 / 1000.0, test));
        }
        output.push_str(&format!(
            "Timing: {} outcomes | mean {:.1}ms | median {:.1}ms | p90 {}ms | p99 {}ms | max {}ms\n",
            stats.count, stats.mean_ms, stats.median_ms, stats.p90_ms, stats.p99_ms, stats.max_ms
        ));
        output
    }
}

impl ResultHandler for TimingHandler {
    fn start_test_run(&mut self) {
        self.timings.clear();
    }

    fn stop_test_run(&mut self) {
        let report = self.report();
        if let Err(e) = self.writer.write_all(report.as_bytes()) {
            debug!("Timing report write failed: {}", e);
        }
    }

    fn handle(&mut self, outcome: &Outcome) {
        self.timings
            .push((outcome.test.clone(), outcome.duration_ms()));
    }

    fn is_core(&self) -> bool {
        true
    }
}
