//! 跳转解析服务
//!
//! 热路径的完整顺序：
//! 1. 短码格式检查（不进任何 I/O）
//! 2. 负缓存标记 → 直接 404
//! 3. 正向缓存命中 → 直接跳转
//! 4. 未命中 → 限时查库；命中则异步预热缓存，未命中则异步打负缓存标记
//! 5. 查库出错 → 读过期缓存条目降级提供；没有就 503
//!
//! 缓存写入和事件投递全部脱离请求路径，失败只记日志。

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use tracing::{debug, error, trace, warn};

use crate::analytics::{ClickEventProducer, ClickInput};
use crate::cache::{CacheResult, CachedLink, LinkCache};
use crate::config::AppConfig;
use crate::metrics_core::MetricsRecorder;
use crate::storage::LinkReader;
use crate::utils::ip::extract_client_ip;
use crate::utils::is_valid_short_code;

pub struct RedirectService {}

impl RedirectService {
    /// 根路径：跳到配置的默认地址
    pub async fn handle_root(config: web::Data<Arc<AppConfig>>) -> impl Responder {
        HttpResponse::TemporaryRedirect()
            .insert_header(("Location", config.server.default_url.as_str()))
            .finish()
    }

    pub async fn handle_redirect(
        req: HttpRequest,
        path: web::Path<String>,
        cache: web::Data<Arc<dyn LinkCache>>,
        reader: web::Data<Arc<dyn LinkReader>>,
        producer: web::Data<Arc<ClickEventProducer>>,
        metrics: web::Data<Arc<dyn MetricsRecorder>>,
    ) -> impl Responder {
        let code = path.into_inner();

        if !is_valid_short_code(&code) {
            // 非法短码直接 404，不触碰缓存和数据库。
            // 对外不区分“格式错”和“不存在”，避免短码枚举。
            trace!("Invalid short code rejected: {}", &code);
            return Self::not_found_response(&metrics);
        }

        Self::process_redirect(code, req, cache, reader, producer, metrics).await
    }

    async fn process_redirect(
        code: String,
        req: HttpRequest,
        cache: web::Data<Arc<dyn LinkCache>>,
        reader: web::Data<Arc<dyn LinkReader>>,
        producer: web::Data<Arc<ClickEventProducer>>,
        metrics: web::Data<Arc<dyn MetricsRecorder>>,
    ) -> HttpResponse {
        match cache.get(&code).await {
            CacheResult::NotFound => {
                debug!("Negative cache hit for '{}'", &code);
                metrics.inc_negative_cache_hit();
                metrics.inc_cache_hit("negative");
                Self::not_found_response(&metrics)
            }
            CacheResult::Found(cached) => {
                metrics.inc_cache_hit("positive");
                Self::dispatch_click(&code, cached.link_id, &req, &producer);
                Self::redirect_response(&metrics, cached.permanent, &cached.url)
            }
            CacheResult::Miss => {
                metrics.inc_cache_miss("positive");
                trace!("Cache miss for '{}'", &code);
                Self::resolve_from_database(code, req, cache, reader, producer, metrics).await
            }
        }
    }

    async fn resolve_from_database(
        code: String,
        req: HttpRequest,
        cache: web::Data<Arc<dyn LinkCache>>,
        reader: web::Data<Arc<dyn LinkReader>>,
        producer: web::Data<Arc<ClickEventProducer>>,
        metrics: web::Data<Arc<dyn MetricsRecorder>>,
    ) -> HttpResponse {
        match reader.find_by_code(&code).await {
            Ok(Some(link)) if link.is_eligible(chrono::Utc::now()) => {
                let cached = CachedLink::new(link.id, link.target_url.clone(), link.is_permanent());

                // 缓存预热脱离请求路径
                let warm_cache = Arc::clone(cache.get_ref());
                let warm_code = code.clone();
                let warm_entry = cached.clone();
                tokio::spawn(async move {
                    warm_cache.insert(&warm_code, warm_entry).await;
                });

                Self::dispatch_click(&code, link.id, &req, &producer);
                Self::redirect_response(&metrics, cached.permanent, &cached.url)
            }
            Ok(Some(link)) => {
                // 已停用 / 已过期 / 点击上限耗尽：与不存在同样处理
                debug!("Link '{}' found but not eligible", &link.code);
                Self::mark_missing_detached(&cache, &code);
                Self::not_found_response(&metrics)
            }
            Ok(None) => {
                debug!("Short code '{}' not found in database", &code);
                Self::mark_missing_detached(&cache, &code);
                Self::not_found_response(&metrics)
            }
            Err(e) => {
                error!("Database lookup failed for '{}': {}", &code, e);
                // 唯一允许读过期条目的路径
                match cache.get_stale(&code).await {
                    Some(stale) => {
                        warn!("Serving stale cache entry for '{}'", &code);
                        metrics.inc_stale_served();
                        Self::dispatch_click(&code, stale.link_id, &req, &producer);
                        Self::redirect_response(&metrics, stale.permanent, &stale.url)
                    }
                    None => Self::unavailable_response(&metrics),
                }
            }
        }
    }

    /// 负缓存标记写入脱离请求路径
    fn mark_missing_detached(cache: &web::Data<Arc<dyn LinkCache>>, code: &str) {
        let cache = Arc::clone(cache.get_ref());
        let code = code.to_string();
        tokio::spawn(async move {
            cache.mark_not_found(&code).await;
        });
    }

    /// fire-and-forget 点击事件；请求元数据在同步阶段提取完毕
    fn dispatch_click(
        code: &str,
        link_id: i64,
        req: &HttpRequest,
        producer: &web::Data<Arc<ClickEventProducer>>,
    ) {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(String::from)
        };

        producer.dispatch(ClickInput {
            code: code.to_string(),
            link_id,
            ip: extract_client_ip(req),
            user_agent: header("user-agent"),
            referrer: header("referer"),
            // 地理字段来自边缘层注入的请求头，本服务不做 IP 解析
            country: header("x-geo-country"),
            region: header("x-geo-region"),
        });
    }

    #[inline]
    fn redirect_response(
        metrics: &web::Data<Arc<dyn MetricsRecorder>>,
        permanent: bool,
        url: &str,
    ) -> HttpResponse {
        if permanent {
            metrics.inc_redirect("301");
            HttpResponse::build(StatusCode::MOVED_PERMANENTLY)
                .insert_header(("Location", url))
                .insert_header(("Cache-Control", "public, max-age=3600"))
                .finish()
        } else {
            metrics.inc_redirect("302");
            HttpResponse::build(StatusCode::FOUND)
                .insert_header(("Location", url))
                .insert_header(("Cache-Control", "no-cache"))
                .finish()
        }
    }

    #[inline]
    fn not_found_response(metrics: &web::Data<Arc<dyn MetricsRecorder>>) -> HttpResponse {
        metrics.inc_redirect("404");

        HttpResponse::build(StatusCode::NOT_FOUND)
            .insert_header(("Content-Type", "text/html; charset=utf-8"))
            .insert_header(("Cache-Control", "public, max-age=60"))
            .body("Not Found")
    }

    #[inline]
    fn unavailable_response(metrics: &web::Data<Arc<dyn MetricsRecorder>>) -> HttpResponse {
        metrics.inc_redirect("503");

        HttpResponse::build(StatusCode::SERVICE_UNAVAILABLE)
            .insert_header(("Content-Type", "text/html; charset=utf-8"))
            .insert_header(("Retry-After", "30"))
            .body("Service Temporarily Unavailable")
    }
}

/// Redirect 路由配置
pub fn redirect_routes() -> actix_web::Scope {
    web::scope("")
        .route("/", web::get().to(RedirectService::handle_root))
        .route("/{code}", web::get().to(RedirectService::handle_redirect))
        .route("/{code}", web::head().to(RedirectService::handle_redirect))
}
