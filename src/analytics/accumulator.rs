//! 批量累积器
//!
//! 事件先进进程内列表，满足任一条件触发刷写：
//! - 列表达到 batch_size
//! - 自首条未刷事件起超过 batch_timeout
//!
//! 刷写先在锁内把列表整体换成空表，再在锁外持久化换出的批次，
//! add 和 flush 之间只在换表瞬间互斥。持久化失败的批次放回待刷
//! 列表最前面，等下一次触发重试。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::analytics::{ClickEvent, ClickEventSink};
use crate::config::AnalyticsConfig;
use crate::metrics_core::MetricsRecorder;

struct Inner {
    pending: Vec<ClickEvent>,
    /// 首条未刷事件的入列时刻，超时触发的基准
    first_pending_at: Option<Instant>,
}

pub struct ClickAccumulator {
    sink: Arc<dyn ClickEventSink>,
    metrics: Arc<dyn MetricsRecorder>,
    batch_size: usize,
    batch_timeout: Duration,
    inner: Mutex<Inner>,
}

impl ClickAccumulator {
    pub fn new(
        sink: Arc<dyn ClickEventSink>,
        metrics: Arc<dyn MetricsRecorder>,
        config: &AnalyticsConfig,
    ) -> Self {
        Self {
            sink,
            metrics,
            batch_size: config.batch_size.max(1),
            batch_timeout: Duration::from_millis(config.batch_timeout_ms),
            inner: Mutex::new(Inner {
                pending: Vec::new(),
                first_pending_at: None,
            }),
        }
    }

    /// 压入一条事件；达到批量阈值时就地触发刷写
    pub async fn add(&self, event: ClickEvent) {
        let should_flush = {
            let mut inner = self.inner.lock();
            if inner.pending.is_empty() {
                inner.first_pending_at = Some(Instant::now());
            }
            inner.pending.push(event);
            inner.pending.len() >= self.batch_size
        };

        self.metrics.set_pending_events(self.pending_len() as f64);

        if should_flush {
            self.flush_with_trigger("size").await;
        }
    }

    /// 手动刷写（关停路径、测试）
    pub async fn flush(&self) -> u64 {
        self.flush_with_trigger("manual").await
    }

    /// 周期检查：首条未刷事件超时则触发刷写。由后台 worker 驱动。
    pub async fn tick(&self) {
        let timed_out = {
            let inner = self.inner.lock();
            matches!(inner.first_pending_at, Some(t) if t.elapsed() >= self.batch_timeout)
        };
        if timed_out {
            self.flush_with_trigger("timeout").await;
        }
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    async fn flush_with_trigger(&self, trigger: &str) -> u64 {
        // 原子换表：锁内 swap，锁外持久化
        let batch = {
            let mut inner = self.inner.lock();
            if inner.pending.is_empty() {
                return 0;
            }
            inner.first_pending_at = None;
            std::mem::take(&mut inner.pending)
        };

        let batch_len = batch.len();
        match self.sink.persist_events(batch.clone()).await {
            Ok(inserted) => {
                self.metrics.inc_batch_flush(trigger, "ok");
                self.metrics.add_events_persisted(inserted);
                self.metrics.set_pending_events(self.pending_len() as f64);
                debug!(
                    "Flushed {} events ({} inserted, trigger={})",
                    batch_len, inserted, trigger
                );

                // 补充通道：按 link_id 累加点击计数。
                // 失败（如链接已被删除）只记录，不回滚事件写入。
                let updates = Self::count_by_link(&batch);
                if let Err(e) = self.sink.bump_click_counts(updates).await {
                    warn!("Click counter pass failed (non-fatal): {}", e);
                }

                inserted
            }
            Err(e) => {
                warn!(
                    "Failed to persist batch of {} events, requeueing: {}",
                    batch_len, e
                );
                self.metrics.inc_batch_flush(trigger, "error");

                // 失败批次放回最前面，保持原有顺序
                let mut inner = self.inner.lock();
                let mut restored = batch;
                restored.append(&mut inner.pending);
                inner.pending = restored;
                if inner.first_pending_at.is_none() {
                    inner.first_pending_at = Some(Instant::now());
                }
                drop(inner);
                self.metrics.set_pending_events(self.pending_len() as f64);
                0
            }
        }
    }

    /// 机器人点击不计入链接计数
    fn count_by_link(batch: &[ClickEvent]) -> Vec<(i64, usize)> {
        use std::collections::HashMap;
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for event in batch {
            if !event.is_bot {
                *counts.entry(event.link_id).or_insert(0) += 1;
            }
        }
        counts.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics_core::NoopMetrics;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// 记录每次 flush 批次的内存 Sink
    struct RecordingSink {
        flushes: Mutex<Vec<usize>>,
        persisted: AtomicUsize,
        fail_next: AtomicBool,
        counter_updates: Mutex<Vec<(i64, usize)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                flushes: Mutex::new(Vec::new()),
                persisted: AtomicUsize::new(0),
                fail_next: AtomicBool::new(false),
                counter_updates: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ClickEventSink for RecordingSink {
        async fn persist_events(&self, events: Vec<ClickEvent>) -> anyhow::Result<u64> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                anyhow::bail!("injected persistence failure");
            }
            self.flushes.lock().push(events.len());
            self.persisted.fetch_add(events.len(), Ordering::SeqCst);
            Ok(events.len() as u64)
        }

        async fn bump_click_counts(&self, updates: Vec<(i64, usize)>) -> anyhow::Result<()> {
            self.counter_updates.lock().extend(updates);
            Ok(())
        }
    }

    fn config(batch_size: usize, timeout_ms: u64) -> AnalyticsConfig {
        AnalyticsConfig {
            batch_size,
            batch_timeout_ms: timeout_ms,
            ..AnalyticsConfig::default()
        }
    }

    fn event(id: usize) -> ClickEvent {
        ClickEvent {
            event_id: format!("evt-{id}"),
            code: "abc123".to_string(),
            link_id: (id % 3) as i64 + 1,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            ip_hash: None,
            user_agent: None,
            referrer: None,
            country: None,
            region: None,
            is_bot: false,
        }
    }

    #[tokio::test]
    async fn test_twelve_records_three_flushes() {
        // batch_size=5，加 12 条：两次自动刷（各 5 条）剩 2 条，
        // 手动刷出第三批 2 条，总计 3 次 flush、12 条持久化。
        let sink = RecordingSink::new();
        let acc = ClickAccumulator::new(sink.clone(), NoopMetrics::arc(), &config(5, 60_000));

        for i in 0..12 {
            acc.add(event(i)).await;
        }

        assert_eq!(*sink.flushes.lock(), vec![5, 5]);
        assert_eq!(acc.pending_len(), 2);

        let flushed = acc.flush().await;
        assert_eq!(flushed, 2);
        assert_eq!(*sink.flushes.lock(), vec![5, 5, 2]);
        assert_eq!(sink.persisted.load(Ordering::SeqCst), 12);
        assert_eq!(acc.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_timeout_triggers_flush() {
        let sink = RecordingSink::new();
        let acc = ClickAccumulator::new(sink.clone(), NoopMetrics::arc(), &config(100, 20));

        acc.add(event(1)).await;
        acc.add(event(2)).await;
        assert_eq!(acc.pending_len(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        acc.tick().await;

        assert_eq!(*sink.flushes.lock(), vec![2]);
        assert_eq!(acc.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_tick_before_timeout_is_noop() {
        let sink = RecordingSink::new();
        let acc = ClickAccumulator::new(sink.clone(), NoopMetrics::arc(), &config(100, 60_000));

        acc.add(event(1)).await;
        acc.tick().await;

        assert!(sink.flushes.lock().is_empty());
        assert_eq!(acc.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_requeued_at_front() {
        let sink = RecordingSink::new();
        let acc = ClickAccumulator::new(sink.clone(), NoopMetrics::arc(), &config(100, 60_000));

        acc.add(event(1)).await;
        acc.add(event(2)).await;

        sink.fail_next.store(true, Ordering::SeqCst);
        let flushed = acc.flush().await;
        assert_eq!(flushed, 0);
        // 失败后两条都还在
        assert_eq!(acc.pending_len(), 2);

        // 新事件排在失败批次之后
        acc.add(event(3)).await;
        let flushed = acc.flush().await;
        assert_eq!(flushed, 3);
        assert_eq!(*sink.flushes.lock(), vec![3]);
    }

    #[tokio::test]
    async fn test_counter_pass_skips_bots() {
        let sink = RecordingSink::new();
        let acc = ClickAccumulator::new(sink.clone(), NoopMetrics::arc(), &config(100, 60_000));

        let mut bot_event = event(1);
        bot_event.is_bot = true;
        bot_event.link_id = 9;
        acc.add(bot_event).await;

        let mut human_event = event(2);
        human_event.link_id = 5;
        acc.add(human_event).await;

        acc.flush().await;

        let updates = sink.counter_updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], (5, 1));
    }
}
