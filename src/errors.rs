use thiserror::Error;

/// 工厂和构造函数返回的原始错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 容器操作结果
pub type ContainerResult<T> = Result<T, ContainerError>;

/// 服务容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 必需参数为空或无效
    #[error("Invalid argument '{argument}': {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    /// 自动映射找不到预期类型的实际类型
    #[error("No actual mapping type found for expected type '{expected}'")]
    NoMappingFound { expected: String },

    /// 配置项不存在或为空
    #[error("Configuration setting '{key}' is missing or blank")]
    MissingConfiguration { key: String },

    /// 构造函数参数无法绑定
    #[error("Cannot resolve parameter '{parameter}' of service '{service}'")]
    UnresolvableDependency { parameter: String, service: String },

    /// 解析期间检测到循环依赖
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// 类型转换失败
    #[error("Type cast failed: expected '{expected}', found instance registered as '{actual}'")]
    TypeCastFailed { expected: String, actual: String },

    /// 工厂本身失败，原始错误原样透出
    #[error(transparent)]
    Construction(BoxError),
}

impl ContainerError {
    pub(crate) fn invalid(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    /// 把工厂错误还原为容器错误。
    ///
    /// 工厂内部再次访问容器时产生的 `ContainerError` 直接透出，其余错误包装为
    /// `Construction`，`source()` 链保持不变。
    pub fn from_factory(err: BoxError) -> Self {
        match err.downcast::<ContainerError>() {
            Ok(inner) => *inner,
            Err(other) => Self::Construction(other),
        }
    }

    /// 取出工厂的原始错误（仅 `Construction`）
    pub fn into_construction_source(self) -> Option<BoxError> {
        match self {
            Self::Construction(source) => Some(source),
            _ => None,
        }
    }
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Failed to parse JSON from file '{0}': {1}")]
    JsonParse(String, #[source] serde_json::Error),
}
