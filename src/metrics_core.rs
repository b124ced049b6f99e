//! Core metrics trait (always compiled).
//!
//! Provides `MetricsRecorder` and `NoopMetrics` so every module can accept
//! an `Arc<dyn MetricsRecorder>` without pulling in the Prometheus registry.
//! Tests inject `NoopMetrics`; the server injects the Prometheus-backed
//! implementation from `crate::metrics`.

use std::sync::Arc;

/// Trait for recording application metrics.
///
/// All methods are no-op by default, allowing partial implementation.
/// Implementations must be thread-safe (Send + Sync).
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync {
    // ===== Redirect =====

    /// Record a redirect response by status class ("301", "302", "404", "503")
    fn inc_redirect(&self, status: &str) {}

    /// Record a negative-cache short circuit
    fn inc_negative_cache_hit(&self) {}

    /// Record a stale cache entry served because the database was down
    fn inc_stale_served(&self) {}

    // ===== Cache =====

    /// Record cache hit by layer ("positive", "negative")
    fn inc_cache_hit(&self, layer: &str) {}

    /// Record cache miss by layer
    fn inc_cache_miss(&self, layer: &str) {}

    // ===== Analytics pipeline =====

    /// Record a click event handed to the queue
    fn inc_event_enqueued(&self) {}

    /// Record a click event dropped before reaching storage
    fn inc_event_dropped(&self, reason: &str) {}

    /// Record an accumulator flush ("size" | "timeout" | "manual", "ok" | "error")
    fn inc_batch_flush(&self, trigger: &str, status: &str) {}

    /// Record events persisted by a successful flush
    fn add_events_persisted(&self, count: u64) {}

    /// Set current number of unflushed events held by the accumulator
    fn set_pending_events(&self, count: f64) {}

    // ===== Bot detection =====

    /// Record a bot verdict by reason
    fn inc_bot_detected(&self, reason: &str) {}

    // ===== Aggregation =====

    /// Record an aggregation job outcome ("hourly"…, "ok" | "retried" | "failed")
    fn inc_agg_job(&self, job_type: &str, status: &str) {}
}

/// Noop metrics implementation for tests and embedded use.
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {}

impl NoopMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn arc() -> Arc<dyn MetricsRecorder> {
        Arc::new(Self::new())
    }
}

impl Default for NoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}
