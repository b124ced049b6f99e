//! 点击事件生产者
//!
//! 每次（尝试）跳转产出一条隐私脱敏的事件：生成唯一 event_id、
//! 哈希原始标识（原始 IP 不出本函数）、截断自由文本、推导 bot 标记，
//! 然后单次入队。入队失败只记日志和指标，跳转完全不受影响。

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analytics::{ClickEvent, ClickQueue};
use crate::bot::BotDetector;
use crate::config::AnalyticsConfig;
use crate::metrics_core::MetricsRecorder;
use crate::utils::{hash_identity, truncate_utf8};

/// 跳转路径采集到的原始输入
#[derive(Debug, Clone, Default)]
pub struct ClickInput {
    pub code: String,
    pub link_id: i64,
    /// 原始客户端 IP，emit 内立即哈希后丢弃
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
}

pub struct ClickEventProducer {
    queue: Arc<dyn ClickQueue>,
    detector: Arc<BotDetector>,
    metrics: Arc<dyn MetricsRecorder>,
    user_agent_max_len: usize,
    referrer_max_len: usize,
    emit_concurrency: usize,
}

impl ClickEventProducer {
    pub fn new(
        queue: Arc<dyn ClickQueue>,
        detector: Arc<BotDetector>,
        metrics: Arc<dyn MetricsRecorder>,
        config: &AnalyticsConfig,
    ) -> Self {
        Self {
            queue,
            detector,
            metrics,
            user_agent_max_len: config.user_agent_max_len,
            referrer_max_len: config.referrer_max_len,
            emit_concurrency: config.emit_concurrency.max(1),
        }
    }

    /// fire-and-forget 入口：跳转路径调用后立即返回，不等待
    pub fn dispatch(self: &Arc<Self>, input: ClickInput) {
        let producer = Arc::clone(self);
        tokio::spawn(async move {
            producer.emit(input).await;
        });
    }

    /// 构造并入队一条事件。永不失败、永不 panic。
    pub async fn emit(&self, input: ClickInput) {
        let ip_hash = input.ip.as_deref().map(hash_identity);

        let verdict = self
            .detector
            .detect(input.user_agent.as_deref(), ip_hash.as_deref())
            .await;
        if verdict.is_bot {
            self.metrics.inc_bot_detected(verdict.reason.as_str());
        }

        let event = ClickEvent {
            event_id: Uuid::new_v4().to_string(),
            code: input.code,
            link_id: input.link_id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            ip_hash,
            user_agent: input
                .user_agent
                .as_deref()
                .map(|ua| truncate_utf8(ua, self.user_agent_max_len).to_string()),
            referrer: input
                .referrer
                .as_deref()
                .map(|r| truncate_utf8(r, self.referrer_max_len).to_string()),
            country: input.country,
            region: input.region,
            is_bot: verdict.is_bot,
        };

        // 单次尝试，不重试
        match self.queue.enqueue(&event).await {
            Ok(()) => {
                self.metrics.inc_event_enqueued();
                debug!("Click event {} enqueued for '{}'", event.event_id, event.code);
            }
            Err(e) => {
                self.metrics.inc_event_dropped("enqueue_failed");
                warn!(
                    "Dropping click event for '{}' (enqueue failed): {}",
                    event.code, e
                );
            }
        }
    }

    /// 批量入口：多条输入走同一路径，并发上限受配置约束
    pub async fn emit_batch(&self, inputs: Vec<ClickInput>) {
        stream::iter(inputs)
            .for_each_concurrent(self.emit_concurrency, |input| self.emit(input))
            .await;
    }
}
