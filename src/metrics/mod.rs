//! Prometheus metrics module
//!
//! Provides the Prometheus-backed `MetricsRecorder` implementation and the
//! plain-text exposition used by `GET /metrics`.

mod registry;

pub use registry::PrometheusMetrics;
