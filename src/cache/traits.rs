use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 缓存里的链接条目
///
/// 线上形态为紧凑 JSON：`{"u":url,"p":permanent,"l":link_id,"t":cached_at}`。
/// `t` 用于判定新鲜度：超过正向 TTL 的条目只在数据库不可用时降级提供。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLink {
    #[serde(rename = "u")]
    pub url: String,
    /// 无过期且无点击上限的链接走 301，其余 302
    #[serde(rename = "p")]
    pub permanent: bool,
    #[serde(rename = "l")]
    pub link_id: i64,
    /// 写入时刻（epoch 秒）
    #[serde(rename = "t")]
    pub cached_at: i64,
}

impl CachedLink {
    pub fn new(link_id: i64, url: String, permanent: bool) -> Self {
        Self {
            url,
            permanent,
            link_id,
            cached_at: chrono::Utc::now().timestamp(),
        }
    }

    /// 条目是否仍在新鲜期内
    pub fn is_fresh(&self, positive_ttl_secs: u64) -> bool {
        let age = chrono::Utc::now().timestamp() - self.cached_at;
        age >= 0 && (age as u64) < positive_ttl_secs
    }
}

/// 缓存查询结果
#[derive(Debug, Clone)]
pub enum CacheResult {
    /// 新鲜命中
    Found(CachedLink),
    /// 负缓存标记命中：确定不存在 / 不可用
    NotFound,
    /// 未命中（含过期、超时、缓存故障）
    Miss,
}

/// 链接缓存
///
/// 所有操作 best-effort：缓存故障和超时永远不会传播到调用方，
/// `get` 把它们折叠成 `Miss`，写操作只记录日志。
#[async_trait]
pub trait LinkCache: Send + Sync {
    /// 热路径读取：先查负缓存标记，再查正向条目，只返回新鲜值
    async fn get(&self, code: &str) -> CacheResult;

    /// 降级读取：数据库不可用时读取任何仍保留的条目，无视新鲜度
    async fn get_stale(&self, code: &str) -> Option<CachedLink>;

    /// 写入正向条目（由解析器在 DB 回源命中后异步预热）
    async fn insert(&self, code: &str, link: CachedLink);

    /// 写入负缓存标记（确认不存在或不可用的短码）
    async fn mark_not_found(&self, code: &str);

    /// 就绪探测
    async fn health_check(&self) -> bool;
}
