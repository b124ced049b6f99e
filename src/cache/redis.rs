use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::{debug, error, trace};

use crate::cache::{CacheResult, CachedLink, LinkCache};
use crate::config::CacheConfig;
use crate::system::redis::RedisHandle;

/// Redis 链接缓存
///
/// Key 规划（均带命名空间前缀）：
/// - `{ns}:v1:link:{code}` → 紧凑 JSON 条目
/// - `{ns}:v1:404:{code}`  → 负缓存标记（仅存在性）
///
/// 正向条目的存储 TTL = 抖动后的新鲜期 + 过期保留窗口，
/// 因此新鲜期结束后条目仍在 Redis 里停留一段时间，供降级路径读取。
pub struct RedisLinkCache {
    handle: RedisHandle,
    positive_ttl: u64,
    negative_ttl: u64,
    jitter_pct: u8,
    stale_extra: u64,
    op_timeout: Duration,
}

impl RedisLinkCache {
    pub fn new(handle: RedisHandle, config: &CacheConfig) -> Self {
        debug!(
            "RedisLinkCache created: positive_ttl={}s (±{}%), negative_ttl={}s, stale_extra={}s",
            config.positive_ttl_secs,
            config.ttl_jitter_pct,
            config.negative_ttl_secs,
            config.stale_extra_secs
        );

        Self {
            handle,
            positive_ttl: config.positive_ttl_secs,
            negative_ttl: config.negative_ttl_secs,
            jitter_pct: config.ttl_jitter_pct,
            stale_extra: config.stale_extra_secs,
            op_timeout: Duration::from_millis(config.op_timeout_ms),
        }
    }

    fn link_key(&self, code: &str) -> String {
        self.handle.key(&format!("link:{code}"))
    }

    fn negative_key(&self, code: &str) -> String {
        self.handle.key(&format!("404:{code}"))
    }

    /// 抖动后的存储 TTL，错开批量写入条目的同步性过期
    fn storage_ttl(&self) -> u64 {
        use rand::RngExt;
        let jitter_span = self.positive_ttl * self.jitter_pct as u64 / 100;
        let jitter = if jitter_span > 0 {
            rand::rng().random_range(0..=jitter_span * 2) as i64 - jitter_span as i64
        } else {
            0
        };
        (self.positive_ttl as i64 + jitter).max(1) as u64 + self.stale_extra
    }

    async fn read_raw(&self, code: &str) -> redis::RedisResult<(bool, Option<String>)> {
        let mut conn = self.handle.get_connection().await.map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::Io, "connect", e.to_string()))
        })?;

        // 一次往返同时取负缓存标记和正向条目
        redis::pipe()
            .exists(self.negative_key(code))
            .get(self.link_key(code))
            .query_async(&mut conn)
            .await
    }
}

#[async_trait]
impl LinkCache for RedisLinkCache {
    async fn get(&self, code: &str) -> CacheResult {
        let result = match timeout(self.op_timeout, self.read_raw(code)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                error!("Cache read failed for '{}': {}", code, e);
                self.handle.reset_connection().await;
                return CacheResult::Miss;
            }
            Err(_) => {
                trace!("Cache read timed out for '{}'", code);
                return CacheResult::Miss;
            }
        };

        let (marked_missing, raw) = result;
        if marked_missing {
            return CacheResult::NotFound;
        }

        let Some(raw) = raw else {
            return CacheResult::Miss;
        };

        match serde_json::from_str::<CachedLink>(&raw) {
            Ok(link) if link.is_fresh(self.positive_ttl) => CacheResult::Found(link),
            Ok(_) => {
                // 过期保留窗口内的条目：热路径按未命中处理
                trace!("Cache entry for '{}' past freshness window", code);
                CacheResult::Miss
            }
            Err(e) => {
                error!("Failed to deserialize cache entry for '{}': {}", code, e);
                CacheResult::Miss
            }
        }
    }

    async fn get_stale(&self, code: &str) -> Option<CachedLink> {
        let fut = async {
            let mut conn = self.handle.get_connection().await.ok()?;
            let raw: Option<String> = conn.get(self.link_key(code)).await.ok()?;
            raw.and_then(|r| serde_json::from_str::<CachedLink>(&r).ok())
        };

        match timeout(self.op_timeout, fut).await {
            Ok(link) => link,
            Err(_) => {
                trace!("Stale cache read timed out for '{}'", code);
                None
            }
        }
    }

    async fn insert(&self, code: &str, link: CachedLink) {
        let serialized = match serde_json::to_string(&link) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to serialize cache entry for '{}': {}", code, e);
                return;
            }
        };

        let ttl = self.storage_ttl();
        let link_key = self.link_key(code);
        let negative_key = self.negative_key(code);

        let fut = async {
            let mut conn = self.handle.get_connection().await.map_err(|e| {
                redis::RedisError::from((redis::ErrorKind::Io, "connect", e.to_string()))
            })?;
            // 写条目的同时清掉可能残留的负缓存标记
            redis::pipe()
                .set_ex(&link_key, &serialized, ttl)
                .del(&negative_key)
                .query_async::<()>(&mut conn)
                .await
        };

        match timeout(self.op_timeout, fut).await {
            Ok(Ok(())) => trace!("Cached '{}' for {}s", code, ttl),
            Ok(Err(e)) => {
                error!("Failed to cache '{}': {}", code, e);
                self.handle.reset_connection().await;
            }
            Err(_) => trace!("Cache insert timed out for '{}'", code),
        }
    }

    async fn mark_not_found(&self, code: &str) {
        let negative_key = self.negative_key(code);
        let ttl = self.negative_ttl;

        let fut = async {
            let mut conn = self.handle.get_connection().await.map_err(|e| {
                redis::RedisError::from((redis::ErrorKind::Io, "connect", e.to_string()))
            })?;
            conn.set_ex::<_, _, ()>(&negative_key, 1u8, ttl).await
        };

        match timeout(self.op_timeout, fut).await {
            Ok(Ok(())) => trace!("Marked '{}' as not found for {}s", code, ttl),
            Ok(Err(e)) => {
                error!("Failed to mark '{}' as not found: {}", code, e);
                self.handle.reset_connection().await;
            }
            Err(_) => trace!("Negative mark timed out for '{}'", code),
        }
    }

    async fn health_check(&self) -> bool {
        self.handle.ping().await.is_ok()
    }
}
