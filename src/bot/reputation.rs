//! IP 信誉布隆过滤器
//!
//! 固定大小位数组，k 个位置由两个独立的 xxh64 哈希双重散列得到。
//! 位只置不清（单调），缩小的唯一途径是整体 reset。
//!
//! 读永远走本地位数组；分布式模式下写操作同时镜像到 Redis 位图，
//! 其他实例通过 `sync_from_shared` 把共享位图 OR 进本地。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::system::redis::RedisHandle;
use xxhash_rust::xxh64::xxh64;

const SEED_LO: u64 = 0x9E37_79B9_7F4A_7C15;
const SEED_HI: u64 = 0xC2B2_AE3D_27D4_EB4F;

pub struct IpReputationFilter {
    bits: Vec<AtomicU64>,
    num_bits: u64,
    num_hashes: u32,
    /// Some = 分布式模式，写操作镜像到共享位图
    redis: Option<RedisHandle>,
    op_timeout: Duration,
}

impl IpReputationFilter {
    /// 按预期元素数和目标误报率确定位数组大小
    ///
    /// m = -n·ln(p) / (ln2)²，k = (m/n)·ln2
    pub fn new(expected_items: usize, fp_rate: f64, redis: Option<RedisHandle>) -> Self {
        let n = expected_items.max(1) as f64;
        let p = fp_rate.clamp(1e-9, 0.5);

        let ln2 = std::f64::consts::LN_2;
        let num_bits = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().max(1.0) as u32;

        let words = num_bits.div_ceil(64) as usize;
        let bits = (0..words).map(|_| AtomicU64::new(0)).collect();

        debug!(
            "IpReputationFilter created: {} bits, {} hashes (n={}, p={}), distributed={}",
            num_bits,
            num_hashes,
            expected_items,
            fp_rate,
            redis.is_some()
        );

        Self {
            bits,
            num_bits,
            num_hashes,
            redis,
            op_timeout: Duration::from_millis(150),
        }
    }

    /// 双重散列展开 k 个位位置
    fn positions(&self, identity_hash: &str) -> Vec<u64> {
        let h1 = xxh64(identity_hash.as_bytes(), SEED_LO);
        let h2 = xxh64(identity_hash.as_bytes(), SEED_HI) | 1; // 保证与 m 互质概率
        (0..self.num_hashes as u64)
            .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
            .collect()
    }

    fn set_bit_local(&self, pos: u64) {
        let word = (pos / 64) as usize;
        let mask = 1u64 << (pos % 64);
        self.bits[word].fetch_or(mask, Ordering::Relaxed);
    }

    fn get_bit_local(&self, pos: u64) -> bool {
        let word = (pos / 64) as usize;
        let mask = 1u64 << (pos % 64);
        self.bits[word].load(Ordering::Relaxed) & mask != 0
    }

    /// 记录一个滥用标识：本地置位，分布式模式下同时镜像到共享位图
    pub async fn add(&self, identity_hash: &str) {
        let positions = self.positions(identity_hash);
        for &pos in &positions {
            self.set_bit_local(pos);
        }

        if let Some(ref handle) = self.redis {
            let key = handle.key("reputation");
            let fut = async {
                let mut conn = handle.get_connection().await.map_err(|e| {
                    redis::RedisError::from((redis::ErrorKind::Io, "connect", e.to_string()))
                })?;
                let mut pipe = redis::pipe();
                for &pos in &positions {
                    pipe.cmd("SETBIT").arg(&key).arg(pos).arg(1).ignore();
                }
                pipe.query_async::<()>(&mut conn).await
            };

            match timeout(self.op_timeout, fut).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Failed to mirror reputation bits: {}", e);
                    handle.reset_connection().await;
                }
                Err(_) => warn!("Reputation bit mirror timed out"),
            }
        }
    }

    /// 所有 k 位都置位才返回 true；false 即确定未见过（零漏报）
    pub fn might_contain(&self, identity_hash: &str) -> bool {
        self.positions(identity_hash)
            .iter()
            .all(|&pos| self.get_bit_local(pos))
    }

    /// 从共享位图拉取并 OR 进本地镜像（启动时 / 周期性调用）
    pub async fn sync_from_shared(&self) {
        let Some(ref handle) = self.redis else {
            return;
        };

        let key = handle.key("reputation");
        let fut = async {
            let mut conn = handle.get_connection().await.map_err(|e| {
                redis::RedisError::from((redis::ErrorKind::Io, "connect", e.to_string()))
            })?;
            redis::cmd("GET")
                .arg(&key)
                .query_async::<Option<Vec<u8>>>(&mut conn)
                .await
        };

        match timeout(Duration::from_secs(5), fut).await {
            Ok(Ok(Some(bitmap))) => {
                let mut merged = 0u64;
                for (byte_idx, &byte) in bitmap.iter().enumerate() {
                    if byte == 0 {
                        continue;
                    }
                    for bit in 0..8u64 {
                        // Redis SETBIT 的位序是字节内高位在前
                        if byte & (0x80 >> bit) != 0 {
                            let pos = byte_idx as u64 * 8 + bit;
                            if pos < self.num_bits {
                                self.set_bit_local(pos);
                                merged += 1;
                            }
                        }
                    }
                }
                debug!("Reputation filter synced {} bits from shared store", merged);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                warn!("Failed to sync reputation filter: {}", e);
                handle.reset_connection().await;
            }
            Err(_) => warn!("Reputation filter sync timed out"),
        }
    }

    /// 整体清空：本地位清零，共享位图删除。没有单条删除操作。
    pub async fn reset(&self) {
        for word in &self.bits {
            word.store(0, Ordering::Relaxed);
        }

        if let Some(ref handle) = self.redis {
            let key = handle.key("reputation");
            let fut = async {
                let mut conn = handle.get_connection().await.map_err(|e| {
                    redis::RedisError::from((redis::ErrorKind::Io, "connect", e.to_string()))
                })?;
                redis::cmd("DEL").arg(&key).query_async::<()>(&mut conn).await
            };
            if let Ok(Err(e)) = timeout(self.op_timeout, fut).await {
                warn!("Failed to reset shared reputation bitmap: {}", e);
            }
        }

        debug!("Reputation filter reset");
    }

    #[cfg(test)]
    fn bit_count(&self) -> u64 {
        self.bits
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_false_negatives() {
        let filter = IpReputationFilter::new(10_000, 0.01, None);

        let identities: Vec<String> = (0..1000).map(|i| format!("{:016x}", i * 7919)).collect();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            for id in &identities {
                filter.add(id).await;
            }
        });

        // add 过的标识必须全部命中
        for id in &identities {
            assert!(filter.might_contain(id), "False negative for {}", id);
        }
    }

    #[test]
    fn test_false_positive_rate_bounded() {
        let filter = IpReputationFilter::new(10_000, 0.01, None);

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            for i in 0..10_000u64 {
                filter.add(&format!("{:016x}", i)).await;
            }
        });

        // 未插入的标识的误报率应接近目标值，放宽到 3 倍容差
        let mut false_positives = 0;
        for i in 0..10_000u64 {
            if filter.might_contain(&format!("unseen-{i}")) {
                false_positives += 1;
            }
        }
        assert!(
            false_positives < 300,
            "False positive rate too high: {}/10000",
            false_positives
        );
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = IpReputationFilter::new(1000, 0.01, None);
        assert!(!filter.might_contain("deadbeefdeadbeef"));
        assert_eq!(filter.bit_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_local_bits() {
        let filter = IpReputationFilter::new(1000, 0.01, None);

        filter.add("deadbeefdeadbeef").await;
        assert!(filter.might_contain("deadbeefdeadbeef"));

        filter.reset().await;
        assert!(!filter.might_contain("deadbeefdeadbeef"));
        assert_eq!(filter.bit_count(), 0);
    }

    #[test]
    fn test_sizing_follows_fp_rate() {
        // 更低的误报率需要更多位
        let loose = IpReputationFilter::new(1000, 0.1, None);
        let tight = IpReputationFilter::new(1000, 0.001, None);
        assert!(tight.num_bits > loose.num_bits);
        assert!(tight.num_hashes > loose.num_hashes);
    }
}
