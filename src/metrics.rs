// Performance metrics module
//
// Lightweight counters for the channel and the interaction state machine.
// All counters use atomics so any thread can record without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session-wide counters.
///
/// One instance is shared by the channel registry, the surface driver, and
/// the session façade. Counters are cumulative for the process lifetime and
/// can be logged on shutdown for diagnostics.
#[derive(Debug)]
pub struct Metrics {
    /// Values accepted by `send` across all channels
    pub values_sent: AtomicU64,

    /// Scheduled callback deliveries (items, eofs, and cancellations)
    pub deliveries: AtomicU64,

    /// End-of-stream outcomes delivered to receivers
    pub eof_deliveries: AtomicU64,

    /// Receive registrations withdrawn by cancellation
    pub receive_cancellations: AtomicU64,

    /// Requests handled by the interaction state machine
    pub requests_handled: AtomicU64,

    /// Events emitted on the outbound channel
    pub events_emitted: AtomicU64,

    /// Draw callbacks that panicked and were contained
    pub draw_failures: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            values_sent: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            eof_deliveries: AtomicU64::new(0),
            receive_cancellations: AtomicU64::new(0),
            requests_handled: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            draw_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_value_sent(&self) {
        self.values_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eof_delivered(&self) {
        self.eof_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive_cancelled(&self) {
        self.receive_cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_handled(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_draw_failure(&self) {
        self.draw_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the metrics instance was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log a one-shot summary, typically at session shutdown.
    pub fn log_summary(&self) {
        tracing::info!(
            uptime_secs = self.uptime().as_secs_f64(),
            values_sent = self.values_sent.load(Ordering::Relaxed),
            deliveries = self.deliveries.load(Ordering::Relaxed),
            eof_deliveries = self.eof_deliveries.load(Ordering::Relaxed),
            receive_cancellations = self.receive_cancellations.load(Ordering::Relaxed),
            requests_handled = self.requests_handled.load(Ordering::Relaxed),
            events_emitted = self.events_emitted.load(Ordering::Relaxed),
            draw_failures = self.draw_failures.load(Ordering::Relaxed),
            "session metrics"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
