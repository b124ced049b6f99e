//! 汇总任务调度
//!
//! 单 worker 串行消费任务（并发 = 1），避免两个任务对同一
//! (link_id, day_bucket) 行做出不同的并发 upsert。失败任务指数退避
//! 重试，重试耗尽后进入面向运维的失败任务列表，绝不静默丢弃。
//!
//! 定时器在整点 + 偏移分钟触发上一小时任务，零点 + 偏移分钟触发
//! 前一天任务；任意区间的手动回填走 `run_direct`。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::aggregate::{AggregationJob, AggregationRunner};
use crate::config::AggregationConfig;
use crate::metrics_core::MetricsRecorder;
use crate::storage::SeaOrmStorage;
use crate::storage::backend::retry::calculate_backoff;
use crate::system::redis::RedisHandle;

/// 重试耗尽的任务，留给运维排查 / 手动回填
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job: AggregationJob,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

pub struct AggregationScheduler {
    runner: Arc<AggregationRunner>,
    storage: Arc<SeaOrmStorage>,
    metrics: Arc<dyn MetricsRecorder>,
    config: AggregationConfig,
    /// Some = 同时消费共享存储里的 aggregation-jobs topic
    redis: Option<RedisHandle>,
    job_tx: mpsc::Sender<AggregationJob>,
    job_rx: Mutex<Option<mpsc::Receiver<AggregationJob>>>,
    failed: Arc<Mutex<Vec<FailedJob>>>,
}

impl AggregationScheduler {
    pub fn new(
        runner: Arc<AggregationRunner>,
        storage: Arc<SeaOrmStorage>,
        metrics: Arc<dyn MetricsRecorder>,
        config: AggregationConfig,
        redis: Option<RedisHandle>,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::channel(64);
        Self {
            runner,
            storage,
            metrics,
            config,
            redis,
            job_tx,
            job_rx: Mutex::new(Some(job_rx)),
            failed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 投递一个任务给串行 worker
    pub async fn submit(&self, job: AggregationJob) -> bool {
        match self.job_tx.send(job).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to submit aggregation job: {}", e);
                false
            }
        }
    }

    /// 直接执行（绕过队列），CLI 回填入口。仍然走完整重试策略。
    pub async fn run_direct(&self, job: AggregationJob) -> anyhow::Result<u64> {
        self.run_with_retries(&job).await.map_err(|e| {
            self.record_failure(&job, &e);
            anyhow::anyhow!(e)
        })
    }

    /// 重试耗尽的任务列表快照
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.failed.lock().clone()
    }

    /// 启动后台任务：串行 worker、定时器，以及（分布式模式下）
    /// aggregation-jobs topic 的消费端
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        let worker = Arc::clone(self);
        let worker_shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run_worker(worker_shutdown).await });

        if self.redis.is_some() {
            let poller = Arc::clone(self);
            let poller_shutdown = shutdown.clone();
            tokio::spawn(async move { poller.run_queue_poller(poller_shutdown).await });
        }

        let timer = Arc::clone(self);
        tokio::spawn(async move { timer.run_timer(shutdown).await });
    }

    /// 串行 worker：一次只处理一个任务
    async fn run_worker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut job_rx = self
            .job_rx
            .lock()
            .take()
            .expect("scheduler worker started twice");

        info!("Aggregation worker started");
        loop {
            tokio::select! {
                maybe_job = job_rx.recv() => {
                    let Some(job) = maybe_job else { break };
                    if let Err(e) = self.run_with_retries(&job).await {
                        self.record_failure(&job, &e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Aggregation worker stopped");
    }

    async fn run_with_retries(&self, job: &AggregationJob) -> Result<u64, String> {
        let max_retries = self.config.job_retry_count;
        let mut attempt = 0u32;

        loop {
            match self.runner.run(job).await {
                Ok(rows) => {
                    let status = if attempt > 0 { "retried" } else { "ok" };
                    self.metrics.inc_agg_job(job.job_type.as_str(), status);
                    return Ok(rows);
                }
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    let delay = calculate_backoff(
                        attempt,
                        self.config.job_retry_base_delay_ms,
                        self.config.job_retry_max_delay_ms,
                    );
                    warn!(
                        "Aggregation job {} failed (attempt {}/{}): {}; retrying in {} ms",
                        job.job_type.as_str(),
                        attempt,
                        max_retries + 1,
                        e,
                        delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    self.metrics.inc_agg_job(job.job_type.as_str(), "failed");
                    return Err(e.to_string());
                }
            }
        }
    }

    fn record_failure(&self, job: &AggregationJob, error: &str) {
        error!(
            "Aggregation job {} [{} .. {}) failed after retries: {}",
            job.job_type.as_str(),
            job.start_date,
            job.end_date,
            error
        );
        self.failed.lock().push(FailedJob {
            job: job.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
    }

    /// 消费 `{ns}:v1:queue:agg` topic：外部服务投递的任务也进同一个
    /// 串行 worker，保持并发 = 1 的约束
    async fn run_queue_poller(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        use redis::AsyncCommands;

        let Some(handle) = self.redis.clone() else {
            return;
        };
        let topic = handle.key("queue:agg");
        info!("Aggregation job queue poller started ({})", topic);

        loop {
            tokio::select! {
                _ = sleep(Duration::from_secs(5)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let payloads: Vec<String> = match handle.get_connection().await {
                Ok(mut conn) => match conn
                    .rpop(&topic, Some(std::num::NonZeroUsize::new(8).expect("non-zero")))
                    .await
                {
                    Ok(payloads) => payloads,
                    Err(e) => {
                        warn!("Aggregation queue poll failed: {}", e);
                        handle.reset_connection().await;
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Aggregation queue poll failed: {}", e);
                    continue;
                }
            };

            for payload in payloads {
                match serde_json::from_str::<AggregationJob>(&payload) {
                    Ok(job) => {
                        self.submit(job).await;
                    }
                    Err(e) => error!("Dropping malformed aggregation job payload: {}", e),
                }
            }
        }
        info!("Aggregation job queue poller stopped");
    }

    /// 定时器：整点 + hourly_offset 触发小时任务，
    /// 零点 + daily_offset 触发天任务和保留期清理
    async fn run_timer(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Aggregation timer started (hourly at :{:02}, daily at 00:{:02})",
            self.config.hourly_offset_min, self.config.daily_offset_min
        );

        loop {
            let now = Utc::now();
            let next_hourly = next_hourly_fire(now, self.config.hourly_offset_min);
            let next_daily = next_daily_fire(now, self.config.daily_offset_min);
            let fire_at = next_hourly.min(next_daily);

            let wait = (fire_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::from_secs(0));
            tokio::select! {
                _ = sleep(wait) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if fire_at == next_daily {
                let yesterday = fire_at.date_naive() - chrono::Duration::days(1);
                self.submit(AggregationJob::daily_for(yesterday)).await;

                if let Err(e) = self
                    .storage
                    .cleanup_expired_stats(self.config.stats_retention_days)
                    .await
                {
                    warn!("Stats retention cleanup failed: {}", e);
                }
            } else {
                let hour_end = crate::aggregate::truncate_to_hour(fire_at);
                self.submit(AggregationJob::hourly_ending(hour_end)).await;
            }
        }
        info!("Aggregation timer stopped");
    }
}

/// 下一个 整点 + offset 分钟 的触发时刻
fn next_hourly_fire(now: DateTime<Utc>, offset_min: u32) -> DateTime<Utc> {
    let this_hour = crate::aggregate::truncate_to_hour(now);
    let fire = this_hour + chrono::Duration::minutes(offset_min as i64);
    if fire > now {
        fire
    } else {
        fire + chrono::Duration::hours(1)
    }
}

/// 下一个 零点 + offset 分钟 的触发时刻
fn next_daily_fire(now: DateTime<Utc>, offset_min: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight")
        .and_utc();
    let fire = today + chrono::Duration::minutes(offset_min as i64);
    if fire > now {
        fire
    } else {
        fire + chrono::Duration::days(1)
    }
}
