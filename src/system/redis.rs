//! 共享 Redis 连接句柄
//!
//! 缓存、事件队列、频率追踪和信誉过滤器都通过各自持有的 `RedisHandle`
//! 访问 Redis。连接懒建立、出错重置，调用方在下次操作时自动重连。

use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::errors::{LinkjetError, Result};

#[derive(Clone)]
pub struct RedisHandle {
    client: redis::Client,
    /// 持久化连接，使用 RwLock 保护
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    namespace: String,
}

impl RedisHandle {
    pub fn new(url: &str, namespace: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            LinkjetError::cache_connection(format!("Failed to create Redis client: {e}"))
        })?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            namespace: namespace.to_string(),
        })
    }

    /// 组装命名空间化的 key：`{ns}:v1:{suffix}`
    pub fn key(&self, suffix: &str) -> String {
        format!("{}:v1:{}", self.namespace, suffix)
    }

    /// 获取或建立持久连接
    pub async fn get_connection(&self) -> Result<MultiplexedConnection> {
        // 首先尝试读取现有连接
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        // 需要建立新连接
        let mut conn_guard = self.connection.write().await;

        // 双重检查，避免竞态条件
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let new_conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!("Failed to establish Redis connection: {}", e);
                LinkjetError::cache_connection(e.to_string())
            })?;
        *conn_guard = Some(new_conn.clone());
        debug!("Redis connection established and cached");

        Ok(new_conn)
    }

    /// 重置连接（在连接错误时调用）
    pub async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Redis connection reset due to error");
    }

    /// 就绪探测用 PING
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            LinkjetError::cache_connection(format!("Redis ping failed: {e}"))
        })?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(LinkjetError::cache_connection(format!(
                "Unexpected PING reply: {pong}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespacing() {
        let handle = RedisHandle::new("redis://127.0.0.1:6379/", "linkjet").unwrap();
        assert_eq!(handle.key("link:abc123"), "linkjet:v1:link:abc123");
        assert_eq!(handle.key("404:abc123"), "linkjet:v1:404:abc123");
        assert_eq!(handle.key("queue:clicks"), "linkjet:v1:queue:clicks");
    }
}
