//! Prometheus metrics registry
//!
//! Defines all Prometheus metrics used in the application. Constructed once
//! at startup and injected as `Arc<dyn MetricsRecorder>`.

use prometheus::{CounterVec, Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};

use crate::metrics_core::MetricsRecorder;

/// Application metrics container
pub struct PrometheusMetrics {
    registry: Registry,

    // ===== Redirect metrics =====
    /// Total number of redirects by status code
    pub redirects_total: CounterVec,
    /// Negative-cache short circuits
    pub negative_cache_hits_total: IntCounter,
    /// Stale entries served during database outages
    pub stale_served_total: IntCounter,

    // ===== Cache metrics =====
    /// Cache hits by layer (positive, negative)
    pub cache_hits_total: CounterVec,
    /// Cache misses by layer
    pub cache_misses_total: CounterVec,

    // ===== Analytics pipeline metrics =====
    /// Click events handed to the queue
    pub events_enqueued_total: IntCounter,
    /// Click events dropped before storage, by reason
    pub events_dropped_total: CounterVec,
    /// Accumulator flushes by trigger and status
    pub batch_flushes_total: CounterVec,
    /// Events persisted by successful flushes
    pub events_persisted_total: IntCounter,
    /// Current unflushed events held by the accumulator
    pub pending_events: Gauge,

    // ===== Bot detection metrics =====
    /// Bot verdicts by reason
    pub bot_detected_total: CounterVec,

    // ===== Aggregation metrics =====
    /// Aggregation job outcomes by type and status
    pub agg_jobs_total: CounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let redirects_total = CounterVec::new(
            Opts::new(
                "linkjet_redirects_total",
                "Total number of redirects by status",
            ),
            &["status"],
        )
        .expect("Failed to create redirects_total metric");

        let negative_cache_hits_total = IntCounter::new(
            "linkjet_negative_cache_hits_total",
            "Negative-cache short circuits on the redirect path",
        )
        .expect("Failed to create negative_cache_hits_total metric");

        let stale_served_total = IntCounter::new(
            "linkjet_stale_served_total",
            "Stale cache entries served while the database was unreachable",
        )
        .expect("Failed to create stale_served_total metric");

        let cache_hits_total = CounterVec::new(
            Opts::new("linkjet_cache_hits_total", "Total cache hits by layer"),
            &["layer"],
        )
        .expect("Failed to create cache_hits_total metric");

        let cache_misses_total = CounterVec::new(
            Opts::new("linkjet_cache_misses_total", "Total cache misses by layer"),
            &["layer"],
        )
        .expect("Failed to create cache_misses_total metric");

        let events_enqueued_total = IntCounter::new(
            "linkjet_events_enqueued_total",
            "Click events handed to the queue",
        )
        .expect("Failed to create events_enqueued_total metric");

        let events_dropped_total = CounterVec::new(
            Opts::new(
                "linkjet_events_dropped_total",
                "Click events dropped before storage",
            ),
            &["reason"],
        )
        .expect("Failed to create events_dropped_total metric");

        let batch_flushes_total = CounterVec::new(
            Opts::new(
                "linkjet_batch_flushes_total",
                "Accumulator flushes by trigger and status",
            ),
            &["trigger", "status"],
        )
        .expect("Failed to create batch_flushes_total metric");

        let events_persisted_total = IntCounter::new(
            "linkjet_events_persisted_total",
            "Click events persisted to storage",
        )
        .expect("Failed to create events_persisted_total metric");

        let pending_events = Gauge::new(
            "linkjet_pending_events",
            "Unflushed click events held by the accumulator",
        )
        .expect("Failed to create pending_events metric");

        let bot_detected_total = CounterVec::new(
            Opts::new("linkjet_bot_detected_total", "Bot verdicts by reason"),
            &["reason"],
        )
        .expect("Failed to create bot_detected_total metric");

        let agg_jobs_total = CounterVec::new(
            Opts::new(
                "linkjet_agg_jobs_total",
                "Aggregation job outcomes by type and status",
            ),
            &["type", "status"],
        )
        .expect("Failed to create agg_jobs_total metric");

        registry
            .register(Box::new(redirects_total.clone()))
            .expect("Failed to register redirects_total");
        registry
            .register(Box::new(negative_cache_hits_total.clone()))
            .expect("Failed to register negative_cache_hits_total");
        registry
            .register(Box::new(stale_served_total.clone()))
            .expect("Failed to register stale_served_total");
        registry
            .register(Box::new(cache_hits_total.clone()))
            .expect("Failed to register cache_hits_total");
        registry
            .register(Box::new(cache_misses_total.clone()))
            .expect("Failed to register cache_misses_total");
        registry
            .register(Box::new(events_enqueued_total.clone()))
            .expect("Failed to register events_enqueued_total");
        registry
            .register(Box::new(events_dropped_total.clone()))
            .expect("Failed to register events_dropped_total");
        registry
            .register(Box::new(batch_flushes_total.clone()))
            .expect("Failed to register batch_flushes_total");
        registry
            .register(Box::new(events_persisted_total.clone()))
            .expect("Failed to register events_persisted_total");
        registry
            .register(Box::new(pending_events.clone()))
            .expect("Failed to register pending_events");
        registry
            .register(Box::new(bot_detected_total.clone()))
            .expect("Failed to register bot_detected_total");
        registry
            .register(Box::new(agg_jobs_total.clone()))
            .expect("Failed to register agg_jobs_total");

        Self {
            registry,
            redirects_total,
            negative_cache_hits_total,
            stale_served_total,
            cache_hits_total,
            cache_misses_total,
            events_enqueued_total,
            events_dropped_total,
            batch_flushes_total,
            events_persisted_total,
            pending_events,
            bot_detected_total,
            agg_jobs_total,
        }
    }

    /// 渲染为 Prometheus 文本格式
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn inc_redirect(&self, status: &str) {
        self.redirects_total.with_label_values(&[status]).inc();
    }

    fn inc_negative_cache_hit(&self) {
        self.negative_cache_hits_total.inc();
    }

    fn inc_stale_served(&self) {
        self.stale_served_total.inc();
    }

    fn inc_cache_hit(&self, layer: &str) {
        self.cache_hits_total.with_label_values(&[layer]).inc();
    }

    fn inc_cache_miss(&self, layer: &str) {
        self.cache_misses_total.with_label_values(&[layer]).inc();
    }

    fn inc_event_enqueued(&self) {
        self.events_enqueued_total.inc();
    }

    fn inc_event_dropped(&self, reason: &str) {
        self.events_dropped_total.with_label_values(&[reason]).inc();
    }

    fn inc_batch_flush(&self, trigger: &str, status: &str) {
        self.batch_flushes_total
            .with_label_values(&[trigger, status])
            .inc();
    }

    fn add_events_persisted(&self, count: u64) {
        self.events_persisted_total.inc_by(count);
    }

    fn set_pending_events(&self, count: f64) {
        self.pending_events.set(count);
    }

    fn inc_bot_detected(&self, reason: &str) {
        self.bot_detected_total.with_label_values(&[reason]).inc();
    }

    fn inc_agg_job(&self, job_type: &str, status: &str) {
        self.agg_jobs_total
            .with_label_values(&[job_type, status])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = PrometheusMetrics::new();
        metrics.inc_redirect("301");
        metrics.inc_negative_cache_hit();
        metrics.inc_batch_flush("size", "ok");

        let body = metrics.render();
        assert!(body.contains("linkjet_redirects_total"));
        assert!(body.contains("linkjet_negative_cache_hits_total"));
        assert!(body.contains("linkjet_batch_flushes_total"));
    }
}
