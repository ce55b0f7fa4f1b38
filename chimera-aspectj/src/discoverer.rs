//! 形参名称发现
//!
//! 通知方法没有声明 argNames 时，由 [`ParameterNameDiscoverer`] 推断形参名称。
//! 默认组合：先使用声明时给出的名称，再按切点表达式启发式推断。

use std::sync::Arc;

use crate::error::{AopError, AopResult};
use crate::metadata::AdviceMethod;
use crate::pointcut::extract_binding_variables;
use crate::types::ParameterType;

/// 名称推断的输入
#[derive(Debug, Clone, Default)]
pub struct DiscoveryHints<'a> {
    pub pointcut_expression: &'a str,
    pub returning: Option<&'a str>,
    pub throwing: Option<&'a str>,
}

/// 形参名称发现服务
pub trait ParameterNameDiscoverer: Send + Sync {
    /// 返回与形参一一对应的名称；无法完全确定时返回 `Ok(None)` 或错误
    fn parameter_names(
        &self,
        method: &AdviceMethod,
        hints: &DiscoveryHints<'_>,
    ) -> AopResult<Option<Vec<String>>>;
}

impl<T: ParameterNameDiscoverer + ?Sized> ParameterNameDiscoverer for Arc<T> {
    fn parameter_names(
        &self,
        method: &AdviceMethod,
        hints: &DiscoveryHints<'_>,
    ) -> AopResult<Option<Vec<String>>> {
        (**self).parameter_names(method, hints)
    }
}

/// 使用声明通知方法时给出的形参名称
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredParameterNameDiscoverer;

impl ParameterNameDiscoverer for DeclaredParameterNameDiscoverer {
    fn parameter_names(
        &self,
        method: &AdviceMethod,
        _hints: &DiscoveryHints<'_>,
    ) -> AopResult<Option<Vec<String>>> {
        Ok(method.parameter_names())
    }
}

pub const THIS_JOIN_POINT: &str = "thisJoinPoint";
pub const THIS_JOIN_POINT_STATIC_PART: &str = "thisJoinPointStaticPart";

/// 根据切点表达式和 returning/throwing 配置推断形参名称
///
/// 依次：
/// 1. 第一个形参是连接点类型时命名为 `thisJoinPoint` / `thisJoinPointStaticPart`
/// 2. throwing 名称分配给唯一的错误类型形参
/// 3. 只剩一个未命名形参时分配 returning 名称
/// 4. 表达式中 `args(...)` 的变量按顺序分配给剩余形参
///
/// `raise_exceptions` 为 true 时，无法确定的情况返回带原因的错误，否则返回 `None`。
#[derive(Debug, Clone, Copy)]
pub struct AdviceParameterNameDiscoverer {
    raise_exceptions: bool,
}

impl AdviceParameterNameDiscoverer {
    pub fn new(raise_exceptions: bool) -> Self {
        Self { raise_exceptions }
    }

    fn fail(&self, reason: String) -> AopResult<Option<Vec<String>>> {
        if self.raise_exceptions {
            Err(AopError::binding(reason))
        } else {
            tracing::debug!("Parameter name discovery gave up: {}", reason);
            Ok(None)
        }
    }
}

impl Default for AdviceParameterNameDiscoverer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ParameterNameDiscoverer for AdviceParameterNameDiscoverer {
    fn parameter_names(
        &self,
        method: &AdviceMethod,
        hints: &DiscoveryHints<'_>,
    ) -> AopResult<Option<Vec<String>>> {
        let types: Vec<&ParameterType> = method.parameter_types().collect();
        let mut names: Vec<Option<String>> = vec![None; types.len()];
        if types.is_empty() {
            return Ok(Some(Vec::new()));
        }

        match types[0] {
            ParameterType::JoinPoint | ParameterType::ProceedingJoinPoint => {
                names[0] = Some(THIS_JOIN_POINT.to_string())
            }
            ParameterType::StaticPart => names[0] = Some(THIS_JOIN_POINT_STATIC_PART.to_string()),
            _ => {}
        }

        if let Some(throwing) = hints.throwing {
            let error_slots: Vec<usize> = (0..types.len())
                .filter(|&i| names[i].is_none() && matches!(types[i], ParameterType::Error(_)))
                .collect();
            match error_slots.as_slice() {
                [index] => names[*index] = Some(throwing.to_string()),
                [] => {
                    return self.fail(format!(
                        "no error-typed parameter available for throwing name '{}' in {}",
                        throwing,
                        method.signature()
                    ))
                }
                _ => {
                    return self.fail(format!(
                        "ambiguous binding of throwing name '{}' in {}",
                        throwing,
                        method.signature()
                    ))
                }
            }
        }

        if let Some(returning) = hints.returning {
            let unbound: Vec<usize> = (0..types.len()).filter(|&i| names[i].is_none()).collect();
            match unbound.as_slice() {
                [index] => names[*index] = Some(returning.to_string()),
                _ => {
                    return self.fail(format!(
                        "cannot decide which of {} unbound parameters receives returning name '{}' in {}",
                        unbound.len(),
                        returning,
                        method.signature()
                    ))
                }
            }
        }

        let unbound: Vec<usize> = (0..types.len()).filter(|&i| names[i].is_none()).collect();
        if !unbound.is_empty() {
            // 与形参类型同名的标识符是类型模式，不是变量
            let type_names: Vec<String> = types.iter().map(|t| t.to_string()).collect();
            let variables: Vec<String> = extract_binding_variables(hints.pointcut_expression)
                .into_iter()
                .filter(|v| !type_names.contains(v))
                .collect();
            if variables.len() != unbound.len() {
                return self.fail(format!(
                    "found {} candidate variable(s) in '{}' for {} unbound parameter(s) of {}",
                    variables.len(),
                    hints.pointcut_expression,
                    unbound.len(),
                    method.signature()
                ));
            }
            for (index, variable) in unbound.into_iter().zip(variables) {
                names[index] = Some(variable);
            }
        }

        Ok(names.into_iter().collect())
    }
}

/// 依次尝试多个发现器，第一个给出名称的结果生效
#[derive(Clone, Default)]
pub struct PrioritizedParameterNameDiscoverer {
    discoverers: Vec<Arc<dyn ParameterNameDiscoverer>>,
}

impl PrioritizedParameterNameDiscoverer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, discoverer: impl ParameterNameDiscoverer + 'static) -> Self {
        self.discoverers.push(Arc::new(discoverer));
        self
    }

    /// 默认组合：声明的名称优先，然后是启发式推断
    pub fn standard(raise_exceptions: bool) -> Self {
        Self::new()
            .with(DeclaredParameterNameDiscoverer)
            .with(AdviceParameterNameDiscoverer::new(raise_exceptions))
    }
}

impl ParameterNameDiscoverer for PrioritizedParameterNameDiscoverer {
    fn parameter_names(
        &self,
        method: &AdviceMethod,
        hints: &DiscoveryHints<'_>,
    ) -> AopResult<Option<Vec<String>>> {
        for discoverer in &self.discoverers {
            if let Some(names) = discoverer.parameter_names(method, hints)? {
                return Ok(Some(names));
            }
        }
        Ok(None)
    }
}
