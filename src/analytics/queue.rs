//! 点击事件队列
//!
//! 队列把重定向热路径和批量写库解耦。Redis 实现用一个 List 作为
//! 单 topic（`{ns}:v1:queue:clicks`，LPUSH 入队 / RPOP 批量出队），
//! 载荷为 ClickEvent JSON，幂等靠事件自带的 event_id，由 Sink 去重。

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::{error, trace};

use crate::analytics::ClickEvent;
use crate::errors::{LinkjetError, Result};
use crate::system::redis::RedisHandle;

#[async_trait]
pub trait ClickQueue: Send + Sync {
    /// 单次入队尝试，不重试；失败由调用方记录后丢弃
    async fn enqueue(&self, event: &ClickEvent) -> Result<()>;

    /// 非阻塞批量出队，最多 max 条；队列空返回空 Vec
    async fn dequeue(&self, max: usize) -> Result<Vec<ClickEvent>>;
}

/// Redis List 队列
pub struct RedisClickQueue {
    handle: RedisHandle,
    op_timeout: Duration,
}

impl RedisClickQueue {
    pub fn new(handle: RedisHandle) -> Self {
        Self {
            handle,
            op_timeout: Duration::from_millis(500),
        }
    }

    fn topic(&self) -> String {
        self.handle.key("queue:clicks")
    }
}

#[async_trait]
impl ClickQueue for RedisClickQueue {
    async fn enqueue(&self, event: &ClickEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let topic = self.topic();

        let fut = async {
            let mut conn = self.handle.get_connection().await?;
            conn.lpush::<_, _, ()>(&topic, &payload)
                .await
                .map_err(LinkjetError::from)
        };

        match timeout(self.op_timeout, fut).await {
            Ok(Ok(())) => {
                trace!("Enqueued click event {}", event.event_id);
                Ok(())
            }
            Ok(Err(e)) => {
                self.handle.reset_connection().await;
                Err(e)
            }
            Err(_) => Err(LinkjetError::queue_operation("enqueue timed out")),
        }
    }

    async fn dequeue(&self, max: usize) -> Result<Vec<ClickEvent>> {
        let Some(count) = NonZeroUsize::new(max) else {
            return Ok(Vec::new());
        };
        let topic = self.topic();

        let fut = async {
            let mut conn = self.handle.get_connection().await?;
            conn.rpop::<_, Vec<String>>(&topic, Some(count))
                .await
                .map_err(LinkjetError::from)
        };

        let raw = match timeout(self.op_timeout, fut).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                self.handle.reset_connection().await;
                return Err(e);
            }
            Err(_) => return Err(LinkjetError::queue_operation("dequeue timed out")),
        };

        let mut events = Vec::with_capacity(raw.len());
        for payload in raw {
            match serde_json::from_str::<ClickEvent>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => {
                    // 毒消息只记录，不能堵住整个消费端
                    error!("Dropping malformed click event payload: {}", e);
                }
            }
        }
        Ok(events)
    }
}

/// 进程内队列（单机部署 / 测试）
pub struct MemoryClickQueue {
    inner: Mutex<VecDeque<ClickEvent>>,
}

impl MemoryClickQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for MemoryClickQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClickQueue for MemoryClickQueue {
    async fn enqueue(&self, event: &ClickEvent) -> Result<()> {
        self.inner.lock().push_back(event.clone());
        Ok(())
    }

    async fn dequeue(&self, max: usize) -> Result<Vec<ClickEvent>> {
        let mut queue = self.inner.lock();
        let take = max.min(queue.len());
        Ok(queue.drain(..take).collect())
    }
}
