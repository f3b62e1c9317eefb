use crate::errors::BoxError;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日志环境配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingEnvironment {
    /// 开发环境
    Development,
    /// 测试环境
    Testing,
    /// 生产环境
    Production,
}

/// 日志格式配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 人类可读格式
    Pretty,
    /// 紧凑格式
    Compact,
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub environment: LoggingEnvironment,
    /// 默认级别；`RUST_LOG` 存在时以其为准
    pub level: Level,
    pub format: LogFormat,
    /// 是否显示目标模块
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            environment: LoggingEnvironment::Development,
            level: Level::INFO,
            format: LogFormat::Pretty,
            show_target: true,
            show_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            environment: LoggingEnvironment::Development,
            level: Level::DEBUG,
            format: LogFormat::Pretty,
            show_target: true,
            // 容器常在多个线程上解析
            show_thread_ids: true,
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        Self {
            environment: LoggingEnvironment::Production,
            level: Level::INFO,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
        }
    }

    /// 创建测试环境配置
    pub fn testing() -> Self {
        Self {
            environment: LoggingEnvironment::Testing,
            level: Level::ERROR,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()))
    }
}

/// 初始化日志系统
///
/// 全局订阅者已经存在时返回错误，不会 panic。
pub fn init_logging(config: LoggingConfig) -> Result<(), BoxError> {
    let ansi = config.environment != LoggingEnvironment::Production;
    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(ansi);

            tracing_subscriber::registry()
                .with(config.env_filter())
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(ansi);

            tracing_subscriber::registry()
                .with(config.env_filter())
                .with(fmt_layer)
                .try_init()?;
        }
    }

    tracing::info!(
        environment = ?config.environment,
        level = ?config.level,
        format = ?config.format,
        "Logging system initialized"
    );

    Ok(())
}

/// 操作性能计时器
pub struct OperationTimer {
    start: Instant,
    operation: String,
    metadata: HashMap<String, String>,
    finished: bool,
}

impl OperationTimer {
    /// 创建新的计时器
    pub fn new(operation: &str) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
            finished: false,
        }
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// 完成计时并记录日志
    pub fn finish(mut self) -> Duration {
        self.finished = true;
        let duration = self.start.elapsed();

        tracing::info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            metadata = ?self.metadata,
            "Operation completed"
        );
        duration
    }

    /// 获取当前经过时间
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // 未调用 finish，通常是操作中途出错
        tracing::debug!(
            operation = %self.operation,
            duration_ms = self.start.elapsed().as_millis() as u64,
            metadata = ?self.metadata,
            "Operation abandoned"
        );
    }
}
