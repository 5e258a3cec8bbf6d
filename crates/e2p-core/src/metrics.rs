//! Ingestion metrics.
//!
//! Atomic counters and gauges exported in Prometheus text format by the
//! CLI's `/metrics` endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters and gauges for the receiver.
pub struct ReceiverMetrics {
    /// Records accepted by the receiver
    records_total: AtomicU64,
    /// Records rejected at decode
    decode_errors_total: AtomicU64,
    /// Completed flushes
    flushes_total: AtomicU64,
    /// Rows written across all flushes
    rows_flushed_total: AtomicU64,
    /// Per-record encode failures
    encode_errors_total: AtomicU64,
    /// Failed flush attempts (finalize or sink failure)
    flush_failures_total: AtomicU64,
    /// Records routed to the dead-letter queue
    dead_letters_total: AtomicU64,
    /// Currently buffered records (gauge)
    buffered_records: AtomicU64,
    /// Sum of flush durations in milliseconds
    flush_duration_sum_ms: AtomicU64,
}

impl ReceiverMetrics {
    pub fn new() -> Self {
        Self {
            records_total: AtomicU64::new(0),
            decode_errors_total: AtomicU64::new(0),
            flushes_total: AtomicU64::new(0),
            rows_flushed_total: AtomicU64::new(0),
            encode_errors_total: AtomicU64::new(0),
            flush_failures_total: AtomicU64::new(0),
            dead_letters_total: AtomicU64::new(0),
            buffered_records: AtomicU64::new(0),
            flush_duration_sum_ms: AtomicU64::new(0),
        }
    }

    pub fn record_accepted(&self) {
        self.records_total.fetch_add(1, Ordering::Relaxed);
        self.buffered_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, rows: usize, duration: Duration) {
        self.flushes_total.fetch_add(1, Ordering::Relaxed);
        self.rows_flushed_total
            .fetch_add(rows as u64, Ordering::Relaxed);
        self.flush_duration_sum_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_encode_errors(&self, count: usize) {
        self.encode_errors_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_flush_failure(&self) {
        self.flush_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Adjust the buffered-record gauge after a drain resolves.
    pub fn records_unbuffered(&self, count: usize) {
        let count = count as u64;
        let mut current = self.buffered_records.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(count);
            match self.buffered_records.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn records_total(&self) -> u64 {
        self.records_total.load(Ordering::Relaxed)
    }

    pub fn decode_errors_total(&self) -> u64 {
        self.decode_errors_total.load(Ordering::Relaxed)
    }

    pub fn flushes_total(&self) -> u64 {
        self.flushes_total.load(Ordering::Relaxed)
    }

    pub fn rows_flushed_total(&self) -> u64 {
        self.rows_flushed_total.load(Ordering::Relaxed)
    }

    pub fn encode_errors_total(&self) -> u64 {
        self.encode_errors_total.load(Ordering::Relaxed)
    }

    pub fn flush_failures_total(&self) -> u64 {
        self.flush_failures_total.load(Ordering::Relaxed)
    }

    pub fn dead_letters_total(&self) -> u64 {
        self.dead_letters_total.load(Ordering::Relaxed)
    }

    pub fn buffered_records(&self) -> u64 {
        self.buffered_records.load(Ordering::Relaxed)
    }

    /// Render all metrics in Prometheus text format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            out.push_str(&format!("# HELP e2p_{} {}\n", name, help));
            out.push_str(&format!("# TYPE e2p_{} counter\n", name));
            out.push_str(&format!("e2p_{} {}\n\n", name, value));
        };

        counter(
            &mut out,
            "records_total",
            "Records accepted by the receiver",
            self.records_total(),
        );
        counter(
            &mut out,
            "decode_errors_total",
            "Records rejected at decode",
            self.decode_errors_total(),
        );
        counter(
            &mut out,
            "flushes_total",
            "Completed flushes",
            self.flushes_total(),
        );
        counter(
            &mut out,
            "rows_flushed_total",
            "Rows written across all flushes",
            self.rows_flushed_total(),
        );
        counter(
            &mut out,
            "encode_errors_total",
            "Per-record encode failures",
            self.encode_errors_total(),
        );
        counter(
            &mut out,
            "flush_failures_total",
            "Failed flush attempts",
            self.flush_failures_total(),
        );
        counter(
            &mut out,
            "dead_letters_total",
            "Records routed to the dead-letter queue",
            self.dead_letters_total(),
        );

        out.push_str("# HELP e2p_buffered_records Currently buffered records\n");
        out.push_str("# TYPE e2p_buffered_records gauge\n");
        out.push_str(&format!("e2p_buffered_records {}\n\n", self.buffered_records()));

        out.push_str("# HELP e2p_flush_duration_ms_sum Total time spent flushing\n");
        out.push_str("# TYPE e2p_flush_duration_ms_sum counter\n");
        out.push_str(&format!(
            "e2p_flush_duration_ms_sum {}\n",
            self.flush_duration_sum_ms.load(Ordering::Relaxed)
        ));

        out
    }
}

impl Default for ReceiverMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = ReceiverMetrics::new();
        metrics.record_accepted();
        metrics.record_accepted();
        metrics.record_flush(2, Duration::from_millis(15));
        metrics.records_unbuffered(2);

        assert_eq!(metrics.records_total(), 2);
        assert_eq!(metrics.flushes_total(), 1);
        assert_eq!(metrics.rows_flushed_total(), 2);
        assert_eq!(metrics.buffered_records(), 0);
    }

    #[test]
    fn test_gauge_never_underflows() {
        let metrics = ReceiverMetrics::new();
        metrics.record_accepted();
        metrics.records_unbuffered(10);
        assert_eq!(metrics.buffered_records(), 0);
    }

    #[test]
    fn test_prometheus_rendering() {
        let metrics = ReceiverMetrics::new();
        metrics.record_accepted();
        metrics.record_dead_letter();

        let text = metrics.render_prometheus();
        assert!(text.contains("e2p_records_total 1"));
        assert!(text.contains("e2p_dead_letters_total 1"));
        assert!(text.contains("# TYPE e2p_buffered_records gauge"));
    }
}
