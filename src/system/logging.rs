//! 日志初始化
//!
//! 控制台或文件输出，文件模式支持按天滚动；格式可选 text / json。
//! 返回的 `WorkerGuard` 必须存活到进程退出，否则非阻塞写入的
//! 尾部日志会丢失。

use std::path::Path;

use crate::config::{AppConfig, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

/// 配置里有效的日志文件路径（空字符串视同未配置）
fn log_file_path(logging: &LoggingConfig) -> Option<&str> {
    logging.file.as_deref().filter(|f| !f.is_empty())
}

fn build_writer(logging: &LoggingConfig) -> Box<dyn std::io::Write + Send + Sync> {
    let Some(log_file) = log_file_path(logging) else {
        return Box::new(std::io::stdout());
    };

    let path = Path::new(log_file);
    if logging.enable_rotation {
        let dir = path.parent().unwrap_or(Path::new("."));
        let prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("linkjet.log")
            .trim_end_matches(".log");
        let appender = rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(logging.max_backups as usize)
            .build(dir)
            .expect("Failed to create rolling log appender");
        Box::new(appender)
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .expect("Failed to open log file");
        Box::new(file)
    }
}

/// 根据配置初始化 tracing 订阅器
///
/// 整个进程只能调用一次，且必须在配置加载之后。
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let to_file = log_file_path(&config.logging).is_some();
    let (writer, guard) = tracing_appender::non_blocking(build_writer(&config.logging));

    let builder = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            config.logging.level.clone(),
        ))
        .with_level(true)
        .with_ansi(!to_file);

    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path_filters_empty() {
        let mut logging = LoggingConfig::default();
        assert!(log_file_path(&logging).is_none());

        logging.file = Some(String::new());
        assert!(log_file_path(&logging).is_none());

        logging.file = Some("logs/linkjet.log".to_string());
        assert_eq!(log_file_path(&logging), Some("logs/linkjet.log"));
    }
}
