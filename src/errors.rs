use std::fmt;

#[derive(Debug, Clone)]
pub enum LinkjetError {
    CacheConnection(String),
    CacheOperation(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    QueueOperation(String),
    Validation(String),
    NotFound(String),
    Serialization(String),
    Aggregation(String),
    Unavailable(String),
}

impl LinkjetError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            LinkjetError::CacheConnection(_) => "E001",
            LinkjetError::CacheOperation(_) => "E002",
            LinkjetError::DatabaseConfig(_) => "E003",
            LinkjetError::DatabaseConnection(_) => "E004",
            LinkjetError::DatabaseOperation(_) => "E005",
            LinkjetError::QueueOperation(_) => "E006",
            LinkjetError::Validation(_) => "E007",
            LinkjetError::NotFound(_) => "E008",
            LinkjetError::Serialization(_) => "E009",
            LinkjetError::Aggregation(_) => "E010",
            LinkjetError::Unavailable(_) => "E011",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            LinkjetError::CacheConnection(_) => "Cache Connection Error",
            LinkjetError::CacheOperation(_) => "Cache Operation Error",
            LinkjetError::DatabaseConfig(_) => "Database Configuration Error",
            LinkjetError::DatabaseConnection(_) => "Database Connection Error",
            LinkjetError::DatabaseOperation(_) => "Database Operation Error",
            LinkjetError::QueueOperation(_) => "Queue Operation Error",
            LinkjetError::Validation(_) => "Validation Error",
            LinkjetError::NotFound(_) => "Resource Not Found",
            LinkjetError::Serialization(_) => "Serialization Error",
            LinkjetError::Aggregation(_) => "Aggregation Error",
            LinkjetError::Unavailable(_) => "Service Unavailable",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            LinkjetError::CacheConnection(msg)
            | LinkjetError::CacheOperation(msg)
            | LinkjetError::DatabaseConfig(msg)
            | LinkjetError::DatabaseConnection(msg)
            | LinkjetError::DatabaseOperation(msg)
            | LinkjetError::QueueOperation(msg)
            | LinkjetError::Validation(msg)
            | LinkjetError::NotFound(msg)
            | LinkjetError::Serialization(msg)
            | LinkjetError::Aggregation(msg)
            | LinkjetError::Unavailable(msg) => msg,
        }
    }

    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for LinkjetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for LinkjetError {}

// 便捷的构造函数
impl LinkjetError {
    pub fn cache_connection<T: Into<String>>(msg: T) -> Self {
        LinkjetError::CacheConnection(msg.into())
    }

    pub fn cache_operation<T: Into<String>>(msg: T) -> Self {
        LinkjetError::CacheOperation(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        LinkjetError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        LinkjetError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        LinkjetError::DatabaseOperation(msg.into())
    }

    pub fn queue_operation<T: Into<String>>(msg: T) -> Self {
        LinkjetError::QueueOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        LinkjetError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        LinkjetError::NotFound(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        LinkjetError::Serialization(msg.into())
    }

    pub fn aggregation<T: Into<String>>(msg: T) -> Self {
        LinkjetError::Aggregation(msg.into())
    }

    pub fn unavailable<T: Into<String>>(msg: T) -> Self {
        LinkjetError::Unavailable(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for LinkjetError {
    fn from(err: sea_orm::DbErr) -> Self {
        LinkjetError::DatabaseOperation(err.to_string())
    }
}

impl From<redis::RedisError> for LinkjetError {
    fn from(err: redis::RedisError) -> Self {
        LinkjetError::CacheOperation(err.to_string())
    }
}

impl From<std::io::Error> for LinkjetError {
    fn from(err: std::io::Error) -> Self {
        LinkjetError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for LinkjetError {
    fn from(err: serde_json::Error) -> Self {
        LinkjetError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LinkjetError>;
