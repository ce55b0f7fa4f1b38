//! AOP 错误类型
//!
//! 配置类错误（签名、绑定、误用）在发现时立即失败，不做重试。
//! 通知体或目标方法抛出的业务错误通过 [`AopError::Thrown`] 原样传递。

use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::metadata::AdviceKind;
use crate::types::ThrownError;

/// AOP 引擎错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 通知注解缺失、冲突或切点表达式为空
    #[error("Invalid advice signature for '{method}': {reason}")]
    InvalidAdviceSignature { method: String, reason: String },

    /// 形参名称与数量不一致，或调用时绑定数量不符
    #[error("Argument binding failed: {0}")]
    ArgumentBindingFailure(String),

    /// 切面实例构造失败
    #[error("Failed to instantiate aspect '{aspect}': {source}")]
    InstantiationFailure {
        aspect: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    /// 非环绕通知声明了 ProceedingJoinPoint 形参
    #[error("ProceedingJoinPoint is only supported for around advice: '{method}' is {kind} advice")]
    ProceedingJoinPointMisuse { method: String, kind: AdviceKind },

    #[error("Invalid pointcut expression '{expression}': {reason}")]
    InvalidPointcut { expression: String, reason: String },

    /// 违反调用约定，例如对静态匹配器做运行时匹配
    #[error("Illegal usage: {0}")]
    Usage(String),

    #[error("Illegal aspect configuration: {0}")]
    IllegalAspectConfiguration(String),

    /// 通知体或目标方法抛出的业务错误，不做包装
    #[error(transparent)]
    Thrown(ThrownError),
}

impl AopError {
    pub fn binding(message: impl Into<String>) -> Self {
        Self::ArgumentBindingFailure(message.into())
    }

    pub fn invalid_signature(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAdviceSignature {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn instantiation(
        aspect: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::InstantiationFailure {
            aspect: aspect.into(),
            source: source.into(),
        }
    }

    /// 包装一个业务错误
    pub fn thrown<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Thrown(Arc::new(error))
    }

    /// 复制一个错误；无法克隆的错误来源保留其描述
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::InvalidAdviceSignature { method, reason } => Self::invalid_signature(method.clone(), reason.clone()),
            Self::ArgumentBindingFailure(message) => Self::binding(message.clone()),
            Self::InstantiationFailure { aspect, source } => Self::instantiation(aspect.clone(), source.to_string()),
            Self::ProceedingJoinPointMisuse { method, kind } => Self::ProceedingJoinPointMisuse {
                method: method.clone(),
                kind: *kind,
            },
            Self::InvalidPointcut { expression, reason } => Self::InvalidPointcut {
                expression: expression.clone(),
                reason: reason.clone(),
            },
            Self::Usage(message) => Self::Usage(message.clone()),
            Self::IllegalAspectConfiguration(message) => Self::IllegalAspectConfiguration(message.clone()),
            Self::Thrown(error) => Self::Thrown(Arc::clone(error)),
        }
    }

    pub fn is_thrown(&self) -> bool {
        matches!(self, Self::Thrown(_))
    }

    /// 取出原始业务错误
    pub fn into_thrown(self) -> Option<ThrownError> {
        match self {
            Self::Thrown(error) => Some(error),
            _ => None,
        }
    }
}

/// AOP 操作结果
pub type AopResult<T> = Result<T, AopError>;
