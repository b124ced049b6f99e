use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use tracing::trace;

use crate::cache::{CacheResult, CachedLink, LinkCache};
use crate::config::CacheConfig;

/// 进程内链接缓存（单机部署 / 测试）
///
/// 正向条目保留到新鲜期 + 过期保留窗口之后才被 Moka 逐出，
/// 新鲜度判定与 Redis 后端一致，走条目自身的 `cached_at`。
pub struct MemoryLinkCache {
    entries: Cache<String, CachedLink>,
    negative: Cache<String, ()>,
    positive_ttl: u64,
}

impl MemoryLinkCache {
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.memory_capacity)
            .time_to_live(Duration::from_secs(
                config.positive_ttl_secs + config.stale_extra_secs,
            ))
            .build();

        let negative = Cache::builder()
            .max_capacity(config.memory_capacity)
            .time_to_live(Duration::from_secs(config.negative_ttl_secs))
            .build();

        trace!(
            "MemoryLinkCache initialized: capacity={}, positive_ttl={}s, negative_ttl={}s",
            config.memory_capacity, config.positive_ttl_secs, config.negative_ttl_secs
        );

        Self {
            entries,
            negative,
            positive_ttl: config.positive_ttl_secs,
        }
    }
}

#[async_trait]
impl LinkCache for MemoryLinkCache {
    async fn get(&self, code: &str) -> CacheResult {
        if self.negative.contains_key(code) {
            return CacheResult::NotFound;
        }

        match self.entries.get(code).await {
            Some(link) if link.is_fresh(self.positive_ttl) => CacheResult::Found(link),
            Some(_) => CacheResult::Miss,
            None => CacheResult::Miss,
        }
    }

    async fn get_stale(&self, code: &str) -> Option<CachedLink> {
        self.entries.get(code).await
    }

    async fn insert(&self, code: &str, link: CachedLink) {
        self.negative.invalidate(code).await;
        self.entries.insert(code.to_string(), link).await;
    }

    async fn mark_not_found(&self, code: &str) {
        trace!("Marking code as not found: {}", code);
        self.negative.insert(code.to_string(), ()).await;
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CacheConfig {
        CacheConfig::default()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = MemoryLinkCache::new(&test_config());
        let link = CachedLink::new(1, "https://example.com".to_string(), true);

        cache.insert("abc123", link.clone()).await;

        match cache.get("abc123").await {
            CacheResult::Found(found) => assert_eq!(found.url, link.url),
            other => panic!("Expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mark_not_found_short_circuits() {
        let cache = MemoryLinkCache::new(&test_config());

        cache.mark_not_found("missing1").await;

        assert!(matches!(cache.get("missing1").await, CacheResult::NotFound));
        // 其他短码不受影响
        assert!(matches!(cache.get("other1").await, CacheResult::Miss));
    }

    #[tokio::test]
    async fn test_insert_clears_negative_marker() {
        let cache = MemoryLinkCache::new(&test_config());

        cache.mark_not_found("abc123").await;
        cache
            .insert(
                "abc123",
                CachedLink::new(1, "https://example.com".to_string(), false),
            )
            .await;

        assert!(matches!(cache.get("abc123").await, CacheResult::Found(_)));
    }

    #[tokio::test]
    async fn test_stale_entry_hidden_from_hot_path() {
        let cache = MemoryLinkCache::new(&test_config());
        // 构造一个写入时刻在新鲜期之外的条目
        let mut link = CachedLink::new(7, "https://example.com/old".to_string(), false);
        link.cached_at = chrono::Utc::now().timestamp() - 7200;

        cache.insert("old123", link.clone()).await;

        // 热路径按未命中处理
        assert!(matches!(cache.get("old123").await, CacheResult::Miss));
        // 降级路径仍可读到
        let stale = cache.get_stale("old123").await.expect("stale entry");
        assert_eq!(stale.url, link.url);
    }
}
