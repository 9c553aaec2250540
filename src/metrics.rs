use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A simple percentile tracker that maintains a sliding window of measurements
#[derive(Debug, Clone)]
pub struct PercentileTracker {
    measurements: Arc<Mutex<VecDeque<u64>>>,
    window_size: usize,
}

impl PercentileTracker {
    /// Create a new percentile tracker with a specified window size
    pub fn new(window_size: usize) -> Self {
        Self {
            measurements: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size,
        }
    }

    /// Record a measurement (in nanoseconds)
    pub fn record(&self, nanos: u64) {
        let mut measurements = self.measurements.lock();
        if measurements.len() >= self.window_size {
            measurements.pop_front();
        }
        measurements.push_back(nanos);
    }

    /// The p50 (median) in microseconds
    pub fn p50_us(&self) -> f64 {
        self.percentile(0.50)
    }

    /// The p99 in microseconds
    pub fn p99_us(&self) -> f64 {
        self.percentile(0.99)
    }

    fn percentile(&self, p: f64) -> f64 {
        let measurements = self.measurements.lock();
        if measurements.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<_> = measurements.iter().copied().collect();
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
        sorted[idx] as f64 / 1000.0
    }

    /// Get the count of recorded measurements
    pub fn count(&self) -> usize {
        self.measurements.lock().len()
    }
}

/// Per-pipeline counters
///
/// Every item the source emits is counted once as emitted and then as
/// either accepted or rejected by the buffer. Accepted items are later
/// delivered, or evicted (counted in `dropped`).
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    emitted: Arc<AtomicU64>,
    accepted: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
    /// Sink consume latency
    latency_tracker: PercentileTracker,
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            emitted: Arc::new(AtomicU64::new(0)),
            accepted: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            rejected: Arc::new(AtomicU64::new(0)),
            delivered: Arc::new(AtomicU64::new(0)),
            latency_tracker: PercentileTracker::new(1000),
            start_time: Instant::now(),
        }
    }

    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item discarded by an overflow policy
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an offer refused because of overflow or a closed buffer
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a consume latency measurement
    pub fn record_latency(&self, elapsed: Duration) {
        self.latency_tracker.record(elapsed.as_nanos() as u64);
    }

    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn total_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn total_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Delivered items per second since creation
    pub fn throughput_ips(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_delivered() as f64 / elapsed
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            emitted: self.total_emitted(),
            accepted: self.total_accepted(),
            dropped: self.total_dropped(),
            rejected: self.total_rejected(),
            delivered: self.total_delivered(),
            throughput_ips: self.throughput_ips(),
            latency_p50_us: self.latency_tracker.p50_us(),
            latency_p99_us: self.latency_tracker.p99_us(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub emitted: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub throughput_ips: f64,
    pub latency_p50_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Emitted: {}, Accepted: {}, Dropped: {}, Rejected: {}, Delivered: {}, \
             Throughput: {:.2} items/s, Consume P50: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.emitted,
            self.accepted,
            self.dropped,
            self.rejected,
            self.delivered,
            self.throughput_ips,
            self.latency_p50_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_tracker() {
        let tracker = PercentileTracker::new(10);
        for i in 1..=10 {
            tracker.record(i * 1000);
        }
        assert_eq!(tracker.p50_us(), 5.0);
        assert_eq!(tracker.p99_us(), 10.0);
    }

    #[test]
    fn test_tracker_window_slides() {
        let tracker = PercentileTracker::new(2);
        tracker.record(1_000);
        tracker.record(2_000);
        tracker.record(3_000);
        assert_eq!(tracker.count(), 2);
        assert_eq!(tracker.p50_us(), 2.0);
    }

    #[test]
    fn test_pipeline_metrics() {
        let metrics = PipelineMetrics::new();
        for _ in 0..4 {
            metrics.record_emitted();
            metrics.record_accepted();
        }
        metrics.record_dropped();
        metrics.record_delivered();
        metrics.record_latency(Duration::from_micros(3));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.emitted, 4);
        assert_eq!(snapshot.accepted, 4);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.delivered, 1);
        assert!(snapshot.format().contains("Dropped: 1"));
    }
}
