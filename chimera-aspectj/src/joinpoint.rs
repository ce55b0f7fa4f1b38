//! 连接点（JoinPoint）定义
//!
//! 连接点表示一次被拦截的方法执行。调用上下文 [`JoinPointContext`] 由拦截链显式传递，
//! 通知通过 [`JoinPoint`] / [`ProceedingJoinPoint`] 视图读取它。

use std::fmt;
use std::sync::Arc;

use crate::error::{AopError, AopResult};
use crate::pointcut::JoinPointMatch;
use crate::types::{MethodSignature, ThrownError, TypeInfo, Value};

/// 继续执行的回调：`None` 使用原始参数，`Some(args)` 替换参数
pub type ProceedCallback<'a> = dyn Fn(Option<Vec<Value>>) -> AopResult<Option<Value>> + 'a;

/// 连接点种类
pub const METHOD_EXECUTION: &str = "method-execution";

/// 一次调用的上下文
#[derive(Clone)]
pub struct JoinPointContext<'a> {
    method: Arc<MethodSignature>,
    target_type: TypeInfo,
    target: Option<Value>,
    arguments: Vec<Value>,
    proceed: Option<&'a ProceedCallback<'a>>,
    return_value: Option<Value>,
    thrown: Option<ThrownError>,
    captured: Option<JoinPointMatch>,
}

impl<'a> JoinPointContext<'a> {
    pub fn new(method: Arc<MethodSignature>, target_type: TypeInfo, arguments: Vec<Value>) -> Self {
        Self {
            method,
            target_type,
            target: None,
            arguments,
            proceed: None,
            return_value: None,
            thrown: None,
            captured: None,
        }
    }

    pub fn with_target(mut self, target: Value) -> Self {
        self.target = Some(target);
        self
    }

    /// 赋予继续执行的能力（环绕通知）
    pub fn with_proceed(mut self, proceed: &'a ProceedCallback<'a>) -> Self {
        self.proceed = Some(proceed);
        self
    }

    pub fn with_return_value(mut self, value: Value) -> Self {
        self.return_value = Some(value);
        self
    }

    pub fn with_thrown(mut self, error: ThrownError) -> Self {
        self.thrown = Some(error);
        self
    }

    /// 切点在本次调用中捕获的变量
    pub fn with_captured(mut self, captured: JoinPointMatch) -> Self {
        self.captured = Some(captured);
        self
    }

    pub fn method(&self) -> &MethodSignature {
        &self.method
    }

    pub fn target_type(&self) -> &TypeInfo {
        &self.target_type
    }

    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn can_proceed(&self) -> bool {
        self.proceed.is_some()
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn thrown(&self) -> Option<&ThrownError> {
        self.thrown.as_ref()
    }

    pub fn captured(&self) -> Option<&JoinPointMatch> {
        self.captured.as_ref()
    }

    pub fn join_point(&self) -> JoinPoint<'_> {
        JoinPoint { context: self }
    }

    pub fn static_part(&self) -> StaticPart {
        StaticPart {
            kind: METHOD_EXECUTION,
            signature: Arc::clone(&self.method),
        }
    }

    fn proceed_with_arguments(&self, arguments: Option<Vec<Value>>) -> AopResult<Option<Value>> {
        match self.proceed {
            Some(proceed) => proceed(arguments),
            None => Err(AopError::Usage(format!(
                "join point for {} cannot proceed outside around advice",
                self.method
            ))),
        }
    }
}

impl fmt::Debug for JoinPointContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPointContext")
            .field("method", &self.method.to_string())
            .field("target_type", &self.target_type.name())
            .field("arguments", &self.arguments.len())
            .field("can_proceed", &self.can_proceed())
            .field("has_return_value", &self.return_value.is_some())
            .field("thrown", &self.thrown.as_ref().map(|e| e.to_string()))
            .field("captured", &self.captured)
            .finish()
    }
}

/// 连接点信息
#[derive(Clone, Copy)]
pub struct JoinPoint<'a> {
    context: &'a JoinPointContext<'a>,
}

impl<'a> JoinPoint<'a> {
    pub fn kind(&self) -> &'static str {
        METHOD_EXECUTION
    }

    pub fn signature(&self) -> &'a MethodSignature {
        self.context.method()
    }

    pub fn target_type(&self) -> &'a TypeInfo {
        self.context.target_type()
    }

    pub fn target(&self) -> Option<&'a Value> {
        self.context.target()
    }

    pub fn args(&self) -> &'a [Value] {
        self.context.arguments()
    }

    /// 尝试按类型获取第 `index` 个参数
    pub fn arg<T: Send + Sync + 'static>(&self, index: usize) -> Option<&'a T> {
        self.context.arguments().get(index)?.downcast_ref::<T>()
    }

    pub fn static_part(&self) -> StaticPart {
        self.context.static_part()
    }

    pub fn context(&self) -> &'a JoinPointContext<'a> {
        self.context
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("kind", &self.kind())
            .field("signature", &self.signature().to_string())
            .finish()
    }
}

impl fmt::Display for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution({})", self.signature())
    }
}

/// 可继续执行的连接点，仅在环绕通知中可用
#[derive(Clone, Copy)]
pub struct ProceedingJoinPoint<'a> {
    join_point: JoinPoint<'a>,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub(crate) fn new(context: &'a JoinPointContext<'a>) -> Self {
        Self {
            join_point: JoinPoint { context },
        }
    }

    /// 使用原始参数继续执行后续拦截器和目标方法
    pub fn proceed(&self) -> AopResult<Option<Value>> {
        self.join_point.context.proceed_with_arguments(None)
    }

    /// 使用替换后的参数继续执行
    pub fn proceed_with(&self, arguments: Vec<Value>) -> AopResult<Option<Value>> {
        self.join_point.context.proceed_with_arguments(Some(arguments))
    }

    pub fn join_point(&self) -> &JoinPoint<'a> {
        &self.join_point
    }

    pub fn signature(&self) -> &'a MethodSignature {
        self.join_point.signature()
    }

    pub fn args(&self) -> &'a [Value] {
        self.join_point.args()
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", &self.join_point)
            .field("can_proceed", &self.join_point.context.can_proceed())
            .finish()
    }
}

/// 连接点的静态部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPart {
    kind: &'static str,
    signature: Arc<MethodSignature>,
}

impl StaticPart {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }
}

impl fmt::Display for StaticPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution({})", self.signature)
    }
}
