use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含基础设施配置：
/// - server: 服务器地址、端口、worker 数量
/// - database: 数据库连接配置
/// - redis: 共享存储（缓存 / 队列 / 频率追踪）连接配置
/// - cache: 缓存 TTL 与超时
/// - analytics: 点击事件批量写入配置
/// - bot: 频率窗口与信誉过滤器配置
/// - aggregation: 汇总任务调度配置
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：LJ，分隔符：__
    /// 示例：LJ__SERVER__PORT=9999
    pub fn load() -> Self {
        use config::{Config, Environment, File};

        let path = "config.toml";

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("LJ")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<AppConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_worker_count")]
    pub workers: usize,
    /// 根路径（空短码）重定向目标
    #[serde(default = "default_root_url")]
    pub default_url: String,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    /// 热路径单次读超时（毫秒），超时视同未命中
    #[serde(default = "default_database_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// Redis 配置（缓存、事件队列、频率追踪、信誉过滤器共用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// key 命名空间，所有 key 形如 {namespace}:v1:...
    #[serde(default = "default_redis_namespace")]
    pub namespace: String,
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "redis" 或 "memory"（单机 / 测试）
    #[serde(rename = "type")]
    #[serde(default = "default_cache_type")]
    pub cache_type: String,
    /// 正向条目新鲜期（秒）
    #[serde(default = "default_positive_ttl")]
    pub positive_ttl_secs: u64,
    /// 负缓存标记 TTL（秒）
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl_secs: u64,
    /// TTL 抖动百分比，避免同步性批量过期
    #[serde(default = "default_ttl_jitter_pct")]
    pub ttl_jitter_pct: u8,
    /// 新鲜期之后条目在存储里额外保留的时长（秒），仅降级路径可读
    #[serde(default = "default_stale_extra")]
    pub stale_extra_secs: u64,
    /// 单次缓存操作超时（毫秒），超时视同未命中
    #[serde(default = "default_cache_op_timeout_ms")]
    pub op_timeout_ms: u64,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,
}

/// 点击分析配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// 批量写库阈值
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 自首条未刷记录起的刷写超时（毫秒）
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// 批量 emit 的并发上限
    #[serde(default = "default_emit_concurrency")]
    pub emit_concurrency: usize,
    /// user_agent / referrer 字段截断上限（字节）
    #[serde(default = "default_user_agent_max_len")]
    pub user_agent_max_len: usize,
    #[serde(default = "default_referrer_max_len")]
    pub referrer_max_len: usize,
}

/// 机器人检测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// 滑动窗口长度（毫秒）
    #[serde(default = "default_frequency_window_ms")]
    pub frequency_window_ms: u64,
    /// 窗口内请求数阈值，超过即判定高频
    #[serde(default = "default_frequency_threshold")]
    pub frequency_threshold: u32,
    /// 本地降级表清扫间隔（秒）
    #[serde(default = "default_fallback_sweep_secs")]
    pub fallback_sweep_secs: u64,
    /// 布隆过滤器预期元素数
    #[serde(default = "default_bloom_expected_items")]
    pub bloom_expected_items: usize,
    /// 布隆过滤器目标误报率
    #[serde(default = "default_bloom_fp_rate")]
    pub bloom_fp_rate: f64,
}

/// 汇总任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// 每小时任务在整点后的分钟偏移
    #[serde(default = "default_hourly_offset_min")]
    pub hourly_offset_min: u32,
    /// 每日任务在零点后的分钟偏移
    #[serde(default = "default_daily_offset_min")]
    pub daily_offset_min: u32,
    /// 任务失败最大重试次数
    #[serde(default = "default_job_retry_count")]
    pub job_retry_count: u32,
    #[serde(default = "default_job_retry_base_delay_ms")]
    pub job_retry_base_delay_ms: u64,
    #[serde(default = "default_job_retry_max_delay_ms")]
    pub job_retry_max_delay_ms: u64,
    /// 汇总行保留天数，0 表示不清理
    #[serde(default = "default_stats_retention_days")]
    pub stats_retention_days: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_root_url() -> String {
    "https://example.com".to_string()
}

fn default_database_url() -> String {
    "sqlite://linkjet.db?mode=rwc".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_read_timeout_ms() -> u64 {
    100
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_redis_namespace() -> String {
    "linkjet".to_string()
}

fn default_cache_type() -> String {
    "memory".to_string()
}

fn default_positive_ttl() -> u64 {
    3600
}

fn default_negative_ttl() -> u64 {
    300
}

fn default_ttl_jitter_pct() -> u8 {
    8
}

fn default_stale_extra() -> u64 {
    7200
}

fn default_cache_op_timeout_ms() -> u64 {
    50
}

fn default_memory_capacity() -> u64 {
    10000
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_timeout_ms() -> u64 {
    5000
}

fn default_emit_concurrency() -> usize {
    8
}

fn default_user_agent_max_len() -> usize {
    256
}

fn default_referrer_max_len() -> usize {
    512
}

fn default_frequency_window_ms() -> u64 {
    60_000
}

fn default_frequency_threshold() -> u32 {
    30
}

fn default_fallback_sweep_secs() -> u64 {
    60
}

fn default_bloom_expected_items() -> usize {
    100_000
}

fn default_bloom_fp_rate() -> f64 {
    0.01
}

fn default_hourly_offset_min() -> u32 {
    5
}

fn default_daily_offset_min() -> u32 {
    15
}

fn default_job_retry_count() -> u32 {
    3
}

fn default_job_retry_base_delay_ms() -> u64 {
    1000
}

fn default_job_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_stats_retention_days() -> u64 {
    0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_file() -> Option<String> {
    None
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            workers: default_worker_count(),
            default_url: default_root_url(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            read_timeout_ms: default_database_read_timeout_ms(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            namespace: default_redis_namespace(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: default_cache_type(),
            positive_ttl_secs: default_positive_ttl(),
            negative_ttl_secs: default_negative_ttl(),
            ttl_jitter_pct: default_ttl_jitter_pct(),
            stale_extra_secs: default_stale_extra(),
            op_timeout_ms: default_cache_op_timeout_ms(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            emit_concurrency: default_emit_concurrency(),
            user_agent_max_len: default_user_agent_max_len(),
            referrer_max_len: default_referrer_max_len(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            frequency_window_ms: default_frequency_window_ms(),
            frequency_threshold: default_frequency_threshold(),
            fallback_sweep_secs: default_fallback_sweep_secs(),
            bloom_expected_items: default_bloom_expected_items(),
            bloom_fp_rate: default_bloom_fp_rate(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            hourly_offset_min: default_hourly_offset_min(),
            daily_offset_min: default_daily_offset_min(),
            job_retry_count: default_job_retry_count(),
            job_retry_base_delay_ms: default_job_retry_base_delay_ms(),
            job_retry_max_delay_ms: default_job_retry_max_delay_ms(),
            stats_retention_days: default_stats_retention_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_file(),
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}
