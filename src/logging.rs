//! 日志初始化
//!
//! 控制台输出始终开启；配置了目录时另外按天滚动写文件，保留 7 天。
//! `RUST_LOG` 环境变量优先于配置中的级别。

use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::SystemTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FILE_PREFIX: &str = "relay-counter";
const MAX_LOG_FILES: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// 过滤指令，如 `info` 或 `relay_counter=debug`
    pub level: String,
    /// 滚动日志目录，为 None 时只输出到控制台
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter '{0}'")]
    InvalidFilter(String),
    #[error("cannot create log file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
}

/// 初始化全局日志
///
/// 返回的 guard 需要保持到进程退出，否则文件日志可能丢失尾部。
/// 已经初始化过时什么也不做，返回 `Ok(None)`。
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>, LogError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|_| LogError::InvalidFilter(config.level.clone()))?,
    };

    let console_layer = fmt::layer()
        .with_timer(SystemTime)
        .with_target(true)
        .with_thread_names(true);

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .max_log_files(MAX_LOG_FILES)
                .build(directory)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(SystemTime)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let initialized = Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    match initialized {
        Ok(()) => {
            tracing::info!(
                level = %config.level,
                directory = ?config.directory,
                "logging initialized"
            );
            Ok(guard)
        }
        Err(_) => Ok(None),
    }
}
