use crate::analytics::ClickEvent;

/// 点击事件持久化端
///
/// 由存储后端实现；Accumulator 只面向这个 trait，测试用内存 Sink 替换。
#[async_trait::async_trait]
pub trait ClickEventSink: Send + Sync {
    /// 批量写入事件，重复 `event_id` 静默跳过，返回实际写入行数
    async fn persist_events(&self, events: Vec<ClickEvent>) -> anyhow::Result<u64>;

    /// 按 link_id 批量累加点击计数（best-effort 补充通道，失败不回滚事件写入）
    async fn bump_click_counts(&self, updates: Vec<(i64, usize)>) -> anyhow::Result<()>;
}
