//! 应用启动装配
//!
//! 所有组件在这里显式构造、显式注入（没有模块级单例），
//! 测试可以独立构造任意组合。

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::aggregate::{AggregationRunner, AggregationScheduler};
use crate::analytics::{
    BatchWorker, ClickAccumulator, ClickEventProducer, ClickEventSink, ClickQueue,
    MemoryClickQueue, RedisClickQueue,
};
use crate::api::services::{AppStartTime, health_routes, metrics_routes, redirect_routes};
use crate::bot::{BotDetector, FrequencyTracker, IpReputationFilter};
use crate::cache::{LinkCache, MemoryLinkCache, RedisLinkCache};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::metrics::PrometheusMetrics;
use crate::metrics_core::MetricsRecorder;
use crate::storage::{LinkReader, SeaOrmStorage, run_migrations};
use crate::system::redis::RedisHandle;

/// 装配完成的应用组件集
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub storage: Arc<SeaOrmStorage>,
    pub cache: Arc<dyn LinkCache>,
    pub queue: Arc<dyn ClickQueue>,
    pub frequency: Arc<FrequencyTracker>,
    pub reputation: Arc<IpReputationFilter>,
    pub producer: Arc<ClickEventProducer>,
    pub accumulator: Arc<ClickAccumulator>,
    pub scheduler: Arc<AggregationScheduler>,
    pub metrics_registry: Arc<PrometheusMetrics>,
    pub metrics: Arc<dyn MetricsRecorder>,
}

/// 构造全部组件并完成迁移
pub async fn build_context(config: AppConfig) -> Result<AppContext> {
    let config = Arc::new(config);

    let storage = Arc::new(SeaOrmStorage::new(&config.database).await?);
    run_migrations(storage.get_db()).await?;

    let metrics_registry = Arc::new(PrometheusMetrics::new());
    let metrics: Arc<dyn MetricsRecorder> = metrics_registry.clone();

    // "redis" 模式下缓存 / 队列 / 频率追踪 / 信誉过滤器共享存储，
    // "memory" 模式全部退回进程内实现
    let distributed = config.cache.cache_type == "redis";
    let redis_handle = if distributed {
        Some(RedisHandle::new(&config.redis.url, &config.redis.namespace)?)
    } else {
        None
    };

    let cache: Arc<dyn LinkCache> = match redis_handle {
        Some(ref handle) => {
            info!("Using Redis cache (namespace: {})", config.redis.namespace);
            Arc::new(RedisLinkCache::new(handle.clone(), &config.cache))
        }
        None => {
            info!("Using in-process cache");
            Arc::new(MemoryLinkCache::new(&config.cache))
        }
    };

    let queue: Arc<dyn ClickQueue> = match redis_handle {
        Some(ref handle) => Arc::new(RedisClickQueue::new(handle.clone())),
        None => Arc::new(MemoryClickQueue::new()),
    };

    let frequency = Arc::new(FrequencyTracker::new(redis_handle.clone(), &config.bot));
    let reputation = Arc::new(IpReputationFilter::new(
        config.bot.bloom_expected_items,
        config.bot.bloom_fp_rate,
        redis_handle.clone(),
    ));
    let detector = Arc::new(BotDetector::new(
        Arc::clone(&frequency),
        Arc::clone(&reputation),
    ));

    let producer = Arc::new(ClickEventProducer::new(
        Arc::clone(&queue),
        detector,
        Arc::clone(&metrics),
        &config.analytics,
    ));

    let sink: Arc<dyn ClickEventSink> = storage.clone();
    let accumulator = Arc::new(ClickAccumulator::new(
        sink,
        Arc::clone(&metrics),
        &config.analytics,
    ));

    let runner = Arc::new(AggregationRunner::new(Arc::clone(&storage)));
    let scheduler = Arc::new(AggregationScheduler::new(
        runner,
        Arc::clone(&storage),
        Arc::clone(&metrics),
        config.aggregation.clone(),
        redis_handle.clone(),
    ));

    Ok(AppContext {
        config,
        storage,
        cache,
        queue,
        frequency,
        reputation,
        producer,
        accumulator,
        scheduler,
        metrics_registry,
        metrics,
    })
}

/// 启动后台任务：批量写入 worker、汇总调度、降级表清扫、信誉位图同步
fn spawn_background(
    ctx: &AppContext,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    // 启动时把共享信誉位图并进本地镜像
    let reputation = Arc::clone(&ctx.reputation);
    tokio::spawn(async move {
        reputation.sync_from_shared().await;
    });

    // 降级表周期清扫
    let frequency = Arc::clone(&ctx.frequency);
    let sweep_interval = Duration::from_secs(ctx.config.bot.fallback_sweep_secs.max(1));
    let mut sweep_shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(sweep_interval) => frequency.sweep_fallback(),
                _ = sweep_shutdown.changed() => {
                    if *sweep_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // 汇总调度（worker + 定时器）
    ctx.scheduler.start(shutdown.clone());

    // 批量写入 worker；返回句柄供关停时等待最终刷写
    let worker = Arc::new(BatchWorker::new(
        Arc::clone(&ctx.queue),
        Arc::clone(&ctx.accumulator),
        ctx.config.analytics.batch_size,
    ));
    tokio::spawn(worker.run(shutdown))
}

/// 启动 HTTP 服务并阻塞到退出；返回前完成最终刷写
pub async fn run_server(ctx: AppContext) -> std::io::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = spawn_background(&ctx, shutdown_rx);

    let app_start_time = AppStartTime {
        start_datetime: chrono::Utc::now(),
    };

    let bind_address = format!("{}:{}", ctx.config.server.host, ctx.config.server.port);
    info!("Starting server at http://{}", bind_address);

    let config = Arc::clone(&ctx.config);
    let cache = Arc::clone(&ctx.cache);
    let storage = ctx.storage.clone();
    let producer = Arc::clone(&ctx.producer);
    let metrics = Arc::clone(&ctx.metrics);
    let metrics_registry = Arc::clone(&ctx.metrics_registry);
    let workers = ctx.config.server.workers.max(1);

    let server = HttpServer::new(move || {
        let reader: Arc<dyn LinkReader> = storage.clone();
        App::new()
            .app_data(web::Data::new(Arc::clone(&config)))
            .app_data(web::Data::new(Arc::clone(&cache)))
            .app_data(web::Data::new(reader))
            .app_data(web::Data::new(Arc::clone(&producer)))
            .app_data(web::Data::new(Arc::clone(&metrics)))
            .app_data(web::Data::new(Arc::clone(&metrics_registry)))
            .app_data(web::Data::new(app_start_time.clone()))
            .service(health_routes())
            .service(metrics_routes())
            // 跳转路由是 catch-all，必须最后注册
            .service(redirect_routes())
    })
    .workers(workers)
    .bind(bind_address)?
    .run();

    let result = server.await;

    info!("HTTP server stopped, flushing pending events");
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(10), worker_handle)
        .await
        .is_err()
    {
        warn!("Batch worker did not stop within 10s");
    }

    result
}
