//! 通知参数绑定
//!
//! [`ArgumentBindingPlan`] 为一个通知方法计算一次：哪个形参接收连接点，
//! 哪些形参接收切点捕获的变量，哪个接收返回值或抛出的错误。
//! 每次调用时 [`ArgumentBindingPlan::bind`] 根据 [`JoinPointContext`] 生成实参。
//!
//! 计算规则：
//!
//! 1. 第一个形参若是 `JoinPoint` / `ProceedingJoinPoint` / `StaticPart`，直接绑定；
//!    `ProceedingJoinPoint` 只允许用于环绕通知
//! 2. 其余形参需要名称：优先使用 argNames（名称比形参少一个且第一个形参是连接点类型时，
//!    自动补上连接点名称），否则交给 [`ParameterNameDiscoverer`]
//! 3. 名称数量必须与形参数量完全一致
//! 4. returning / throwing 名称单独记录，其余名称成为切点的形参并写回切点

use std::collections::BTreeMap;
use std::fmt;

use crate::discoverer::{DiscoveryHints, ParameterNameDiscoverer, THIS_JOIN_POINT};
use crate::error::{AopError, AopResult};
use crate::joinpoint::{JoinPoint, JoinPointContext, ProceedingJoinPoint, StaticPart};
use crate::metadata::{AdviceMethod, AdviceSpecification};
use crate::pointcut::AspectJExpressionPointcut;
use crate::types::{ParameterType, ThrownError, Value};

/// 第一个形参接收的连接点种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinPointSlot {
    JoinPoint,
    ProceedingJoinPoint,
    StaticPart,
}

/// returning / throwing 形参
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotBinding {
    pub name: String,
    pub index: usize,
    pub parameter_type: ParameterType,
}

/// 参数绑定计划
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArgumentBindingPlan {
    parameter_count: usize,
    join_point: Option<JoinPointSlot>,
    named_bindings: BTreeMap<String, usize>,
    returning: Option<SlotBinding>,
    throwing: Option<SlotBinding>,
    pointcut_parameter_names: Vec<String>,
    pointcut_parameter_types: Vec<ParameterType>,
}

impl ArgumentBindingPlan {
    /// 计算绑定计划，并把切点形参写回 `pointcut`
    pub fn compute(
        method: &AdviceMethod,
        specification: &AdviceSpecification,
        discoverer: &dyn ParameterNameDiscoverer,
        pointcut: &AspectJExpressionPointcut,
    ) -> AopResult<Self> {
        let parameter_types: Vec<&ParameterType> = method.parameter_types().collect();
        let mut plan = Self {
            parameter_count: parameter_types.len(),
            ..Self::default()
        };
        if parameter_types.is_empty() {
            return Ok(plan);
        }

        plan.join_point = match parameter_types[0] {
            ParameterType::JoinPoint => Some(JoinPointSlot::JoinPoint),
            ParameterType::ProceedingJoinPoint => {
                if !specification.kind().supports_proceeding() {
                    return Err(AopError::ProceedingJoinPointMisuse {
                        method: method.signature(),
                        kind: specification.kind(),
                    });
                }
                Some(JoinPointSlot::ProceedingJoinPoint)
            }
            ParameterType::StaticPart => Some(JoinPointSlot::StaticPart),
            _ => None,
        };
        let offset = usize::from(plan.join_point.is_some());
        if offset == parameter_types.len() {
            return Ok(plan);
        }

        let names = Self::resolve_names(method, specification, discoverer, &parameter_types)?;
        if names.len() != parameter_types.len() {
            return Err(AopError::binding(format!(
                "Expecting argument names for {} parameter(s) of {} but got {}: [{}]",
                parameter_types.len(),
                method.signature(),
                names.len(),
                names.join(", ")
            )));
        }

        let mut pointcut_names = Vec::new();
        let mut pointcut_types = Vec::new();
        for (index, name) in names.iter().enumerate().skip(offset) {
            let slot = SlotBinding {
                name: name.clone(),
                index,
                parameter_type: parameter_types[index].clone(),
            };
            if specification.returning() == Some(name.as_str()) {
                plan.returning = Some(slot);
            } else if specification.throwing() == Some(name.as_str()) {
                if !matches!(slot.parameter_type, ParameterType::Error(_)) {
                    return Err(AopError::binding(format!(
                        "Throwing argument '{}' of {} must be an error type, found {}",
                        name,
                        method.signature(),
                        slot.parameter_type
                    )));
                }
                plan.throwing = Some(slot);
            } else {
                if plan.named_bindings.insert(name.clone(), index).is_some() {
                    return Err(AopError::binding(format!(
                        "Duplicate argument name '{}' in {}",
                        name,
                        method.signature()
                    )));
                }
                pointcut_names.push(name.clone());
                pointcut_types.push(slot.parameter_type);
            }
        }

        if let Some(returning) = specification.returning() {
            if plan.returning.is_none() {
                return Err(AopError::binding(format!(
                    "Returning argument name '{}' was not bound in advice arguments of {}",
                    returning,
                    method.signature()
                )));
            }
        }
        if let Some(throwing) = specification.throwing() {
            if plan.throwing.is_none() {
                return Err(AopError::binding(format!(
                    "Throwing argument name '{}' was not bound in advice arguments of {}",
                    throwing,
                    method.signature()
                )));
            }
        }

        pointcut.set_parameters(pointcut_names.clone(), pointcut_types.clone());
        plan.pointcut_parameter_names = pointcut_names;
        plan.pointcut_parameter_types = pointcut_types;

        tracing::debug!(
            "Computed argument bindings for {}: join_point={:?}, named={:?}, returning={:?}, throwing={:?}",
            method.signature(),
            plan.join_point,
            plan.named_bindings,
            plan.returning.as_ref().map(|s| &s.name),
            plan.throwing.as_ref().map(|s| &s.name)
        );
        Ok(plan)
    }

    fn resolve_names(
        method: &AdviceMethod,
        specification: &AdviceSpecification,
        discoverer: &dyn ParameterNameDiscoverer,
        parameter_types: &[&ParameterType],
    ) -> AopResult<Vec<String>> {
        if let Some(mut names) = specification.argument_names()? {
            let first_is_join_point = parameter_types
                .first()
                .map_or(false, |t| t.is_join_point_like());
            if names.len() + 1 == parameter_types.len() && first_is_join_point {
                names.insert(0, THIS_JOIN_POINT.to_string());
            }
            return Ok(names);
        }

        let hints = DiscoveryHints {
            pointcut_expression: specification.pointcut_expression(),
            returning: specification.returning(),
            throwing: specification.throwing(),
        };
        discoverer.parameter_names(method, &hints)?.ok_or_else(|| {
            AopError::binding(format!(
                "Unable to discover argument names for {} with pointcut '{}'",
                method.signature(),
                specification.pointcut_expression()
            ))
        })
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn join_point(&self) -> Option<JoinPointSlot> {
        self.join_point
    }

    /// 接收连接点（含 ProceedingJoinPoint）的形参下标
    pub fn join_point_index(&self) -> Option<usize> {
        match self.join_point {
            Some(JoinPointSlot::JoinPoint | JoinPointSlot::ProceedingJoinPoint) => Some(0),
            _ => None,
        }
    }

    pub fn static_part_index(&self) -> Option<usize> {
        match self.join_point {
            Some(JoinPointSlot::StaticPart) => Some(0),
            _ => None,
        }
    }

    pub fn named_bindings(&self) -> &BTreeMap<String, usize> {
        &self.named_bindings
    }

    pub fn returning(&self) -> Option<&SlotBinding> {
        self.returning.as_ref()
    }

    pub fn throwing(&self) -> Option<&SlotBinding> {
        self.throwing.as_ref()
    }

    pub fn pointcut_parameter_names(&self) -> &[String] {
        &self.pointcut_parameter_names
    }

    pub fn pointcut_parameter_types(&self) -> &[ParameterType] {
        &self.pointcut_parameter_types
    }

    /// 根据调用上下文生成实参
    pub fn bind<'a>(&self, context: &'a JoinPointContext<'a>) -> AopResult<AdviceArgs<'a>> {
        let mut slots: Vec<Option<AdviceArgument<'a>>> = vec![None; self.parameter_count];
        let mut bound = 0;

        if let Some(kind) = self.join_point {
            slots[0] = Some(match kind {
                JoinPointSlot::JoinPoint => AdviceArgument::JoinPoint(context.join_point()),
                JoinPointSlot::ProceedingJoinPoint => {
                    AdviceArgument::ProceedingJoinPoint(ProceedingJoinPoint::new(context))
                }
                JoinPointSlot::StaticPart => AdviceArgument::StaticPart(context.static_part()),
            });
            bound += 1;
        }

        if let Some(captured) = context.captured() {
            for (name, &index) in &self.named_bindings {
                if let Some(value) = captured.get(name) {
                    slots[index] = Some(AdviceArgument::Value(value.clone()));
                    bound += 1;
                }
            }
        }

        if let (Some(slot), Some(value)) = (&self.returning, context.return_value()) {
            slots[slot.index] = Some(AdviceArgument::Value(value.clone()));
            bound += 1;
        }
        if let (Some(slot), Some(error)) = (&self.throwing, context.thrown()) {
            slots[slot.index] = Some(AdviceArgument::Error(error.clone()));
            bound += 1;
        }

        if bound != self.parameter_count {
            let captured = if context.captured().is_some() {
                "were"
            } else {
                "were not"
            };
            return Err(AopError::binding(format!(
                "Required to bind {} arguments, but only bound {} (captured pointcut variables {} present for {})",
                self.parameter_count,
                bound,
                captured,
                context.method()
            )));
        }

        Ok(AdviceArgs {
            arguments: slots.into_iter().flatten().collect(),
        })
    }
}

// ============================================================================
// 实参
// ============================================================================

/// 一个通知实参
#[derive(Clone)]
pub enum AdviceArgument<'a> {
    JoinPoint(JoinPoint<'a>),
    ProceedingJoinPoint(ProceedingJoinPoint<'a>),
    StaticPart(StaticPart),
    Value(Value),
    Error(ThrownError),
}

impl AdviceArgument<'_> {
    fn describe(&self) -> &'static str {
        match self {
            AdviceArgument::JoinPoint(_) => "JoinPoint",
            AdviceArgument::ProceedingJoinPoint(_) => "ProceedingJoinPoint",
            AdviceArgument::StaticPart(_) => "JoinPoint.StaticPart",
            AdviceArgument::Value(_) => "value",
            AdviceArgument::Error(_) => "error",
        }
    }
}

impl fmt::Debug for AdviceArgument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// 通知方法体读取实参时类型不符
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("argument {index} mismatch: expected {expected}, found {found}")]
pub struct ArgumentMismatch {
    pub index: usize,
    pub expected: String,
    pub found: String,
}

/// 按位置排列的通知实参
#[derive(Debug, Clone)]
pub struct AdviceArgs<'a> {
    arguments: Vec<AdviceArgument<'a>>,
}

impl<'a> AdviceArgs<'a> {
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    fn get(&self, index: usize, expected: &str) -> Result<&AdviceArgument<'a>, ArgumentMismatch> {
        self.arguments.get(index).ok_or_else(|| ArgumentMismatch {
            index,
            expected: expected.to_string(),
            found: format!("only {} argument(s)", self.arguments.len()),
        })
    }

    fn mismatch(index: usize, expected: &str, found: &AdviceArgument<'_>) -> ArgumentMismatch {
        ArgumentMismatch {
            index,
            expected: expected.to_string(),
            found: found.describe().to_string(),
        }
    }

    pub fn join_point(&self, index: usize) -> Result<JoinPoint<'a>, ArgumentMismatch> {
        match self.get(index, "JoinPoint")? {
            AdviceArgument::JoinPoint(jp) => Ok(*jp),
            AdviceArgument::ProceedingJoinPoint(pjp) => Ok(*pjp.join_point()),
            other => Err(Self::mismatch(index, "JoinPoint", other)),
        }
    }

    pub fn proceeding_join_point(
        &self,
        index: usize,
    ) -> Result<ProceedingJoinPoint<'a>, ArgumentMismatch> {
        match self.get(index, "ProceedingJoinPoint")? {
            AdviceArgument::ProceedingJoinPoint(pjp) => Ok(*pjp),
            other => Err(Self::mismatch(index, "ProceedingJoinPoint", other)),
        }
    }

    pub fn static_part(&self, index: usize) -> Result<StaticPart, ArgumentMismatch> {
        match self.get(index, "JoinPoint.StaticPart")? {
            AdviceArgument::StaticPart(sp) => Ok(sp.clone()),
            AdviceArgument::JoinPoint(jp) => Ok(jp.static_part()),
            other => Err(Self::mismatch(index, "JoinPoint.StaticPart", other)),
        }
    }

    /// 按具体类型读取值实参
    pub fn value<T: Send + Sync + 'static>(&self, index: usize) -> Result<std::sync::Arc<T>, ArgumentMismatch> {
        let expected = std::any::type_name::<T>();
        match self.get(index, expected)? {
            AdviceArgument::Value(value) => value
                .clone()
                .downcast::<T>()
                .map_err(|_| Self::mismatch(index, expected, &AdviceArgument::Value(value.clone()))),
            other => Err(Self::mismatch(index, expected, other)),
        }
    }

    /// 不做类型转换的值实参
    pub fn raw(&self, index: usize) -> Result<Value, ArgumentMismatch> {
        match self.get(index, "value")? {
            AdviceArgument::Value(value) => Ok(value.clone()),
            other => Err(Self::mismatch(index, "value", other)),
        }
    }

    pub fn error(&self, index: usize) -> Result<ThrownError, ArgumentMismatch> {
        match self.get(index, "error")? {
            AdviceArgument::Error(error) => Ok(error.clone()),
            other => Err(Self::mismatch(index, "error", other)),
        }
    }
}

/// 通知方法体的失败
#[derive(Debug)]
pub enum AdviceFailure {
    /// 读取实参时类型不符（由调用方转换为绑定错误）
    Mismatch(ArgumentMismatch),
    /// 通知体抛出的业务错误，原样传递
    Thrown(ThrownError),
    /// 来自 proceed 等引擎调用的错误
    Aop(AopError),
}

impl AdviceFailure {
    pub fn thrown<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        AdviceFailure::Thrown(std::sync::Arc::new(error))
    }
}

impl From<ArgumentMismatch> for AdviceFailure {
    fn from(mismatch: ArgumentMismatch) -> Self {
        AdviceFailure::Mismatch(mismatch)
    }
}

impl From<AopError> for AdviceFailure {
    fn from(error: AopError) -> Self {
        match error {
            AopError::Thrown(thrown) => AdviceFailure::Thrown(thrown),
            other => AdviceFailure::Aop(other),
        }
    }
}
