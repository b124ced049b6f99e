//! 批量写入 worker
//!
//! 消费点击事件队列，喂给累积器，并驱动超时刷写。
//! 队列空时短暂休眠，避免空转打满共享存储。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::analytics::{ClickAccumulator, ClickQueue};

/// 队列空轮询间隔
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct BatchWorker {
    queue: Arc<dyn ClickQueue>,
    accumulator: Arc<ClickAccumulator>,
    batch_size: usize,
}

impl BatchWorker {
    pub fn new(
        queue: Arc<dyn ClickQueue>,
        accumulator: Arc<ClickAccumulator>,
        batch_size: usize,
    ) -> Self {
        Self {
            queue,
            accumulator,
            batch_size: batch_size.max(1),
        }
    }

    /// 消费循环；收到关停信号后做最终刷写再退出
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Batch worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let events = match self.queue.dequeue(self.batch_size).await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Queue dequeue failed: {}", e);
                    Vec::new()
                }
            };

            if events.is_empty() {
                self.accumulator.tick().await;
                tokio::select! {
                    _ = sleep(IDLE_POLL_INTERVAL) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            debug!("Dequeued {} click events", events.len());
            for event in events {
                self.accumulator.add(event).await;
            }
            self.accumulator.tick().await;
        }

        // 关停前把队列里残留的事件尽量排空，再做最终刷写
        match self.queue.dequeue(self.batch_size).await {
            Ok(events) => {
                for event in events {
                    self.accumulator.add(event).await;
                }
            }
            Err(e) => warn!("Final drain failed: {}", e),
        }
        let flushed = self.accumulator.flush().await;
        info!("Batch worker stopped ({} events in final flush)", flushed);
    }
}
