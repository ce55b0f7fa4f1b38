//! 容器错误类型
//!
//! 容器内部使用 `ContainerError` 描述 Bean 查找、创建和配置绑定失败。
//! 用户提供的 Bean 构造函数返回 `anyhow::Result`，在容器边界处转换为具体的错误变体。

use thiserror::Error;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Bean not found: {0}")]
    BeanNotFound(String),

    #[error("Bean already exists: {0}")]
    BeanAlreadyExists(String),

    #[error("Bean creation failed for '{name}': {source}")]
    BeanCreationFailed {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging initialization failed: {0}")]
    LoggingInitFailed(String),
}

impl ContainerError {
    /// 将构造函数返回的 anyhow 错误包装为 Bean 创建失败
    pub fn creation_failed(name: impl Into<String>, error: anyhow::Error) -> Self {
        Self::BeanCreationFailed {
            name: name.into(),
            source: error.into(),
        }
    }
}

/// 容器操作结果
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 统一的通用错误类型，供 Bean 构造函数等用户代码使用
pub use anyhow::Result;
