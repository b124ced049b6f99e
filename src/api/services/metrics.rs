//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus text format at `/metrics`.

use actix_web::{HttpResponse, Responder, web};
use std::sync::Arc;

use crate::metrics::PrometheusMetrics;

pub struct MetricsService;

impl MetricsService {
    pub async fn export(metrics: web::Data<Arc<PrometheusMetrics>>) -> impl Responder {
        HttpResponse::Ok()
            .append_header(("Content-Type", "text/plain; version=0.0.4; charset=utf-8"))
            .body(metrics.render())
    }
}

/// Metrics 路由配置
pub fn metrics_routes() -> actix_web::Scope {
    web::scope("/metrics").route("", web::get().to(MetricsService::export))
}
