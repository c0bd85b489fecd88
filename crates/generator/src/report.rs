//! Send and wait reports.

use hdrhistogram::Histogram;
use std::time::Duration;

/// Outcome of a send loop.
#[derive(Debug, Clone)]
pub struct SendReport {
    /// Transactions accepted by the network.
    pub sent: u64,

    /// Retryable submission failures that were skipped.
    pub failed: u64,

    /// Pacing ticks executed.
    pub ticks: u64,

    /// Wall time of the loop.
    pub elapsed: Duration,

    /// True when the loop stopped on cancellation.
    pub cancelled: bool,

    /// Submission latency in microseconds.
    latency: Histogram<u64>,
}

impl Default for SendReport {
    fn default() -> Self {
        Self::new()
    }
}

impl SendReport {
    pub fn new() -> Self {
        Self {
            sent: 0,
            failed: 0,
            ticks: 0,
            elapsed: Duration::ZERO,
            cancelled: false,
            latency: new_histogram(),
        }
    }

    /// Record one accepted submission.
    pub fn record_success(&mut self, latency: Duration) {
        self.sent += 1;
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency.saturating_record(micros.max(1));
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Accepted submissions per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.sent as f64 / secs
        } else {
            0.0
        }
    }

    /// Latency at `quantile` (0.0 to 1.0); zero when nothing was sent.
    pub fn latency_at(&self, quantile: f64) -> Duration {
        if self.latency.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_micros(self.latency.value_at_quantile(quantile))
    }

    pub fn p50_latency(&self) -> Duration {
        self.latency_at(0.5)
    }

    pub fn p99_latency(&self) -> Duration {
        self.latency_at(0.99)
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.latency.max())
    }

    /// Print a summary to stdout.
    pub fn print(&self) {
        println!("--- send report ---");
        println!("sent:      {}", self.sent);
        println!("failed:    {}", self.failed);
        println!("ticks:     {}", self.ticks);
        println!("elapsed:   {:.2?}", self.elapsed);
        println!("rate:      {:.2} tx/s", self.rate());
        println!(
            "latency:   p50 {:.2?}  p99 {:.2?}  max {:.2?}",
            self.p50_latency(),
            self.p99_latency(),
            self.max_latency()
        );
        if self.cancelled {
            println!("(stopped early on interrupt)");
        }
    }
}

fn new_histogram() -> Histogram<u64> {
    // Three significant figures; auto-resizing so the bounds never reject a value.
    let mut histogram = Histogram::new(3).unwrap_or_else(|_| unreachable!());
    histogram.auto(true);
    histogram
}

/// Outcome of a wait pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitReport {
    /// Records found included.
    pub included: usize,

    /// Records that failed or timed out.
    pub failed: usize,
}

impl WaitReport {
    pub fn total(&self) -> usize {
        self.included + self.failed
    }

    pub fn print(&self) {
        println!("--- wait report ---");
        println!("included:  {}", self.included);
        println!("failed:    {}", self.failed);
    }
}
