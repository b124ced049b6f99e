use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use crate::cache::LinkCache;
use crate::storage::LinkReader;

/// 依赖探测超时
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// 应用启动时间结构体
#[derive(Clone, Debug)]
pub struct AppStartTime {
    pub start_datetime: chrono::DateTime<chrono::Utc>,
}

pub struct HealthService;

impl HealthService {
    /// 存活检查：不探测任何依赖，进程活着就返回 200
    pub async fn liveness_check(app_start_time: web::Data<AppStartTime>) -> impl Responder {
        trace!("Received liveness check request");

        let now = chrono::Utc::now();
        let uptime_seconds = (now - app_start_time.start_datetime).num_seconds().max(0) as u64;

        HttpResponse::Ok()
            .append_header(("Content-Type", "application/json; charset=utf-8"))
            .json(json!({
                "status": "alive",
                "timestamp": now.to_rfc3339(),
                "uptime": uptime_seconds,
            }))
    }

    /// 就绪检查：探测缓存和数据库连通性
    ///
    /// 两者都通 → ok (200)；一个不通 → degraded (200)；都不通 → unhealthy (503)
    pub async fn readiness_check(
        cache: web::Data<Arc<dyn LinkCache>>,
        reader: web::Data<Arc<dyn LinkReader>>,
    ) -> impl Responder {
        let start_time = Instant::now();
        trace!("Received readiness check request");

        let cache_ok = tokio::time::timeout(PROBE_TIMEOUT, cache.health_check())
            .await
            .unwrap_or(false);

        let db_ok = match tokio::time::timeout(PROBE_TIMEOUT, reader.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Database readiness probe failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Database readiness probe timed out");
                false
            }
        };

        let (status, http_status) = match (cache_ok, db_ok) {
            (true, true) => ("ok", actix_web::http::StatusCode::OK),
            (false, false) => ("unhealthy", actix_web::http::StatusCode::SERVICE_UNAVAILABLE),
            _ => ("degraded", actix_web::http::StatusCode::OK),
        };

        HttpResponse::build(http_status)
            .append_header(("Content-Type", "application/json; charset=utf-8"))
            .json(json!({
                "status": status,
                "checks": {
                    "cache": if cache_ok { "ok" } else { "error" },
                    "database": if db_ok { "ok" } else { "error" },
                },
                "response_time_ms": start_time.elapsed().as_millis() as u64,
            }))
    }
}

/// 健康检查路由配置
pub fn health_routes() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::get().to(HealthService::liveness_check))
        .route("/ready", web::get().to(HealthService::readiness_check))
}
