pub mod accumulator;
pub mod producer;
pub mod queue;
pub mod sink;
pub mod worker;

pub use accumulator::ClickAccumulator;
pub use producer::{ClickEventProducer, ClickInput};
pub use queue::{ClickQueue, MemoryClickQueue, RedisClickQueue};
pub use sink::ClickEventSink;
pub use worker::BatchWorker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 点击事件载荷
///
/// 由 Producer 生成后不可变；`event_id` 是批量写入端的幂等键。
/// 标识字段只携带哈希，原始 IP 在 Producer 内就被丢弃。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub event_id: String,
    pub code: String,
    pub link_id: i64,
    pub timestamp_ms: i64,
    pub ip_hash: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub is_bot: bool,
}

impl ClickEvent {
    pub fn clicked_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp_ms).unwrap_or_else(Utc::now)
    }
}
