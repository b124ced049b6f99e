//! 分布式滑动窗口频率追踪
//!
//! 每个标识一个 ZSET，score 和 member 都是毫秒时间戳（member 附加随机后缀
//! 防止同毫秒去重）。修剪、插入、计数、续期四步由 Lua 脚本在服务端
//! 一次往返内完成，多进程并发下计数依然正确。
//!
//! Redis 不可用时退回进程内表，结果打上 `from_fallback` 标记；
//! 降级表由定时清扫限制内存。

use std::time::Duration;

use dashmap::DashMap;
use redis::Script;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::system::redis::RedisHandle;

/// 一次频率检查的结果
#[derive(Debug, Clone)]
pub struct FrequencyResult {
    pub is_high_frequency: bool,
    /// 窗口内的请求数（含本次）
    pub count: u32,
    /// 距最早一条记录滑出窗口的毫秒数
    pub reset_in_ms: u64,
    /// 结果来自进程内降级表
    pub from_fallback: bool,
}

/// 修剪 → 插入 → 计数 → 续期，单脚本执行保证原子性。
/// 返回 {窗口内计数, 最早一条的时间戳}。
const CHECK_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_start = tonumber(ARGV[2])
local member = ARGV[3]
local ttl_ms = tonumber(ARGV[4])

redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start)
redis.call('ZADD', key, now, member)
local count = redis.call('ZCARD', key)
redis.call('PEXPIRE', key, ttl_ms)

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_score = now
if oldest[2] ~= nil then
    oldest_score = tonumber(oldest[2])
end
return {count, oldest_score}
"#;

pub struct FrequencyTracker {
    redis: Option<RedisHandle>,
    script: Script,
    window_ms: u64,
    threshold: u32,
    op_timeout: Duration,
    /// 降级表：identity hash → 窗口内时间戳列表
    fallback: DashMap<u64, Vec<i64>>,
}

impl FrequencyTracker {
    pub fn new(redis: Option<RedisHandle>, config: &BotConfig) -> Self {
        debug!(
            "FrequencyTracker created: window={}ms, threshold={}, distributed={}",
            config.frequency_window_ms,
            config.frequency_threshold,
            redis.is_some()
        );

        Self {
            redis,
            script: Script::new(CHECK_SCRIPT),
            window_ms: config.frequency_window_ms,
            threshold: config.frequency_threshold,
            op_timeout: Duration::from_millis(150),
            fallback: DashMap::new(),
        }
    }

    /// 检查一个标识的请求频率并记录本次请求
    pub async fn check(&self, identity_hash: u64) -> FrequencyResult {
        if let Some(ref handle) = self.redis {
            match timeout(self.op_timeout, self.check_shared(handle, identity_hash)).await {
                Ok(Ok(result)) => return result,
                Ok(Err(e)) => {
                    warn!("Frequency check fell back to local table: {}", e);
                    handle.reset_connection().await;
                }
                Err(_) => {
                    warn!("Frequency check timed out, falling back to local table");
                }
            }
        }

        self.check_local(identity_hash)
    }

    async fn check_shared(
        &self,
        handle: &RedisHandle,
        identity_hash: u64,
    ) -> Result<FrequencyResult, redis::RedisError> {
        let mut conn = handle.get_connection().await.map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::Io, "connect", e.to_string()))
        })?;

        let now = chrono::Utc::now().timestamp_millis();
        let window_start = now - self.window_ms as i64;
        // member 附加随机后缀，同一毫秒的多次请求不会互相吞掉
        let member = format!("{}:{}", now, uuid::Uuid::new_v4().simple());
        let key = handle.key(&format!("freq:{identity_hash:016x}"));
        // 窗口之外留一点余量再整体过期
        let ttl_ms = self.window_ms + 1000;

        let (count, oldest): (u32, i64) = self
            .script
            .key(key)
            .arg(now)
            .arg(window_start)
            .arg(member)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(self.build_result(count, oldest, now, false))
    }

    /// 进程内降级路径：同一把 DashMap 分片锁保护 prune + push + count
    fn check_local(&self, identity_hash: u64) -> FrequencyResult {
        let now = chrono::Utc::now().timestamp_millis();
        let window_start = now - self.window_ms as i64;

        let mut entry = self.fallback.entry(identity_hash).or_default();
        entry.retain(|&ts| ts > window_start);
        entry.push(now);

        let count = entry.len() as u32;
        let oldest = entry.first().copied().unwrap_or(now);

        self.build_result(count, oldest, now, true)
    }

    fn build_result(&self, count: u32, oldest: i64, now: i64, from_fallback: bool) -> FrequencyResult {
        let reset_in_ms = (oldest + self.window_ms as i64 - now).max(0) as u64;
        FrequencyResult {
            is_high_frequency: count > self.threshold,
            count,
            reset_in_ms,
            from_fallback,
        }
    }

    /// 清扫降级表，丢掉整窗都已滑出的标识，限制内存占用
    pub fn sweep_fallback(&self) {
        let window_start = chrono::Utc::now().timestamp_millis() - self.window_ms as i64;
        self.fallback.retain(|_, timestamps| {
            timestamps.retain(|&ts| ts > window_start);
            !timestamps.is_empty()
        });
    }

    /// 降级表当前条目数（测试与巡检用）
    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_tracker(threshold: u32) -> FrequencyTracker {
        let config = BotConfig {
            frequency_threshold: threshold,
            ..BotConfig::default()
        };
        FrequencyTracker::new(None, &config)
    }

    #[tokio::test]
    async fn test_count_never_undercounts_sequentially() {
        let tracker = local_tracker(30);

        for i in 1..=10u32 {
            let result = tracker.check(42).await;
            assert!(result.from_fallback);
            assert_eq!(result.count, i);
        }
    }

    #[tokio::test]
    async fn test_threshold_flags_high_frequency() {
        let tracker = local_tracker(5);

        for _ in 0..5 {
            assert!(!tracker.check(7).await.is_high_frequency);
        }
        // 第 6 次越过阈值
        assert!(tracker.check(7).await.is_high_frequency);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let tracker = local_tracker(2);

        tracker.check(1).await;
        tracker.check(1).await;
        tracker.check(1).await;
        let other = tracker.check(2).await;

        assert_eq!(other.count, 1);
        assert!(!other.is_high_frequency);
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_identities() {
        let config = BotConfig {
            frequency_window_ms: 1,
            ..BotConfig::default()
        };
        let tracker = FrequencyTracker::new(None, &config);

        tracker.check(99).await;
        assert_eq!(tracker.fallback_len(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.sweep_fallback();
        assert_eq!(tracker.fallback_len(), 0);
    }

    #[tokio::test]
    async fn test_reset_in_bounded_by_window() {
        let tracker = local_tracker(30);
        let result = tracker.check(5).await;
        assert!(result.reset_in_ms <= 60_000);
    }
}
