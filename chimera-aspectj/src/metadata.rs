//! 通知元数据
//!
//! Rust 没有注解反射，通知方法以 [`AdviceMethod`] 描述：名称、所属切面类型、形参、
//! 注解和方法体。[`AdviceSpecification::from_method`] 从注解中解析出通知种类、
//! 切点表达式和 argNames。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::binding::{AdviceArgs, AdviceFailure};
use crate::error::{AopError, AopResult};
use crate::types::{ParameterType, TypeInfo, Value};

/// 通知种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceKind {
    /// 命名切点定义，不是可执行的通知
    Pointcut,
    Around,
    Before,
    After,
    AfterReturning,
    AfterThrowing,
}

impl AdviceKind {
    /// 注解名称到通知种类的映射
    pub fn from_annotation(name: &str) -> Option<Self> {
        let simple = name.rsplit(['.', ':']).next().unwrap_or(name);
        match simple {
            "Pointcut" => Some(AdviceKind::Pointcut),
            "Around" => Some(AdviceKind::Around),
            "Before" => Some(AdviceKind::Before),
            "After" => Some(AdviceKind::After),
            "AfterReturning" => Some(AdviceKind::AfterReturning),
            "AfterThrowing" => Some(AdviceKind::AfterThrowing),
            _ => None,
        }
    }

    /// after、after-returning、after-throwing
    pub fn is_after(&self) -> bool {
        matches!(
            self,
            AdviceKind::After | AdviceKind::AfterReturning | AdviceKind::AfterThrowing
        )
    }

    /// 只有环绕通知可以使用 ProceedingJoinPoint
    pub fn supports_proceeding(&self) -> bool {
        matches!(self, AdviceKind::Around)
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdviceKind::Pointcut => "pointcut",
            AdviceKind::Around => "around",
            AdviceKind::Before => "before",
            AdviceKind::After => "after",
            AdviceKind::AfterReturning => "after-returning",
            AdviceKind::AfterThrowing => "after-throwing",
        };
        f.write_str(name)
    }
}

/// 通知方法上的注解
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    name: String,
    attributes: BTreeMap<String, String>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn before(expression: impl Into<String>) -> Self {
        Self::new("Before").value(expression)
    }

    pub fn after(expression: impl Into<String>) -> Self {
        Self::new("After").value(expression)
    }

    pub fn around(expression: impl Into<String>) -> Self {
        Self::new("Around").value(expression)
    }

    pub fn after_returning(expression: impl Into<String>) -> Self {
        Self::new("AfterReturning").pointcut_attr(expression)
    }

    pub fn after_throwing(expression: impl Into<String>) -> Self {
        Self::new("AfterThrowing").pointcut_attr(expression)
    }

    pub fn pointcut(expression: impl Into<String>) -> Self {
        Self::new("Pointcut").value(expression)
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn value(self, expression: impl Into<String>) -> Self {
        self.attribute("value", expression)
    }

    /// 设置 `pointcut` 属性（优先于 `value`）
    pub fn pointcut_attr(self, expression: impl Into<String>) -> Self {
        self.attribute("pointcut", expression)
    }

    pub fn returning(self, name: impl Into<String>) -> Self {
        self.attribute("returning", name)
    }

    pub fn throwing(self, name: impl Into<String>) -> Self {
        self.attribute("throwing", name)
    }

    pub fn arg_names(self, names: impl Into<String>) -> Self {
        self.attribute("argNames", names)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// 非空（去除首尾空白后）的属性值
    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn kind(&self) -> Option<AdviceKind> {
        AdviceKind::from_annotation(&self.name)
    }
}

/// 通知方法体：接收切面实例和绑定好的参数
pub type AdviceBody =
    Arc<dyn Fn(&Value, AdviceArgs<'_>) -> Result<Option<Value>, AdviceFailure> + Send + Sync>;

/// 通知方法的形参
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceParameter {
    name: Option<String>,
    parameter_type: ParameterType,
}

impl AdviceParameter {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parameter_type(&self) -> &ParameterType {
        &self.parameter_type
    }
}

/// 通知方法描述
#[derive(Clone)]
pub struct AdviceMethod {
    name: String,
    declaring_type: TypeInfo,
    parameters: Vec<AdviceParameter>,
    annotations: Vec<Annotation>,
    body: AdviceBody,
}

impl AdviceMethod {
    pub fn builder(declaring_type: TypeInfo, name: impl Into<String>) -> AdviceMethodBuilder {
        AdviceMethodBuilder {
            name: name.into(),
            declaring_type,
            parameters: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> &TypeInfo {
        &self.declaring_type
    }

    pub fn parameters(&self) -> &[AdviceParameter] {
        &self.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_type(&self, index: usize) -> Option<&ParameterType> {
        self.parameters.get(index).map(|p| &p.parameter_type)
    }

    pub fn parameter_types(&self) -> impl Iterator<Item = &ParameterType> {
        self.parameters.iter().map(|p| &p.parameter_type)
    }

    /// 声明时给出的形参名称；只有全部形参都有名称时才返回
    pub fn parameter_names(&self) -> Option<Vec<String>> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// 可读的签名，例如 `LoggingAspect.log(JoinPoint, Object)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| p.parameter_type.to_string())
            .collect();
        format!("{}.{}({})", self.declaring_type, self.name, params.join(", "))
    }

    pub(crate) fn call(
        &self,
        aspect: &Value,
        args: AdviceArgs<'_>,
    ) -> Result<Option<Value>, AdviceFailure> {
        (self.body)(aspect, args)
    }
}

impl fmt::Debug for AdviceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceMethod")
            .field("signature", &self.signature())
            .field("annotations", &self.annotations)
            .finish()
    }
}

/// [`AdviceMethod`] 构建器
pub struct AdviceMethodBuilder {
    name: String,
    declaring_type: TypeInfo,
    parameters: Vec<AdviceParameter>,
    annotations: Vec<Annotation>,
}

impl AdviceMethodBuilder {
    /// 未命名的形参，名称需要通过 argNames 或发现机制得到
    pub fn parameter(mut self, parameter_type: ParameterType) -> Self {
        self.parameters.push(AdviceParameter {
            name: None,
            parameter_type,
        });
        self
    }

    pub fn named_parameter(mut self, name: impl Into<String>, parameter_type: ParameterType) -> Self {
        self.parameters.push(AdviceParameter {
            name: Some(name.into()),
            parameter_type,
        });
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn body<F>(self, body: F) -> AdviceMethod
    where
        F: Fn(&Value, AdviceArgs<'_>) -> Result<Option<Value>, AdviceFailure>
            + Send
            + Sync
            + 'static,
    {
        AdviceMethod {
            name: self.name,
            declaring_type: self.declaring_type,
            parameters: self.parameters,
            annotations: self.annotations,
            body: Arc::new(body),
        }
    }

    /// 没有方法体（例如命名切点定义）
    pub fn build(self) -> AdviceMethod {
        self.body(|_, _| Ok(None))
    }
}

/// 解析后的通知规格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceSpecification {
    kind: AdviceKind,
    pointcut_expression: String,
    arg_names: Option<String>,
    returning: Option<String>,
    throwing: Option<String>,
}

impl AdviceSpecification {
    /// 从通知方法的注解解析规格
    pub fn from_method(method: &AdviceMethod) -> AopResult<Self> {
        let recognized: Vec<(&Annotation, AdviceKind)> = method
            .annotations()
            .iter()
            .filter_map(|a| a.kind().map(|kind| (a, kind)))
            .collect();

        let (annotation, kind) = match recognized.as_slice() {
            [] => {
                return Err(AopError::invalid_signature(
                    method.signature(),
                    "no AspectJ advice annotation found",
                ))
            }
            [single] => *single,
            many => {
                let names: Vec<&str> = many.iter().map(|(a, _)| a.name()).collect();
                return Err(AopError::invalid_signature(
                    method.signature(),
                    format!("conflicting advice annotations [{}]", names.join(", ")),
                ));
            }
        };

        let pointcut_expression = annotation
            .non_empty("pointcut")
            .or_else(|| annotation.non_empty("value"))
            .ok_or_else(|| {
                AopError::invalid_signature(
                    method.signature(),
                    format!("@{} must declare a non-empty pointcut or value attribute", annotation.name()),
                )
            })?
            .to_string();

        let returning = match kind {
            AdviceKind::AfterReturning => annotation.non_empty("returning").map(str::to_string),
            _ => None,
        };
        let throwing = match kind {
            AdviceKind::AfterThrowing => annotation.non_empty("throwing").map(str::to_string),
            _ => None,
        };

        Ok(Self {
            kind,
            pointcut_expression,
            arg_names: annotation.non_empty("argNames").map(str::to_string),
            returning,
            throwing,
        })
    }

    pub fn kind(&self) -> AdviceKind {
        self.kind
    }

    pub fn pointcut_expression(&self) -> &str {
        &self.pointcut_expression
    }

    /// argNames 原文
    pub fn arg_names(&self) -> Option<&str> {
        self.arg_names.as_deref()
    }

    pub fn returning(&self) -> Option<&str> {
        self.returning.as_deref()
    }

    pub fn throwing(&self) -> Option<&str> {
        self.throwing.as_deref()
    }

    /// 拆分 argNames；未声明时返回 `None`，交给发现机制处理
    pub fn argument_names(&self) -> AopResult<Option<Vec<String>>> {
        let Some(raw) = &self.arg_names else {
            return Ok(None);
        };
        let names: Vec<String> = raw.split(',').map(|n| n.trim().to_string()).collect();
        if let Some(bad) = names.iter().find(|n| !is_identifier(n)) {
            return Err(AopError::binding(format!(
                "argNames '{}' contains an invalid name '{}'",
                raw, bad
            )));
        }
        Ok(Some(names))
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}
