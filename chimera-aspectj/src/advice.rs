//! 通知（Advice）
//!
//! [`AspectJAdvice`] 把一个通知方法、它的切点、切面实例工厂和缓存的参数绑定计划组合在一起，
//! 并按通知种类在拦截链中执行：
//!
//! - Before：通知执行后继续
//! - After：无论目标成功还是失败都执行（finally）
//! - AfterReturning：目标正常返回且返回值符合绑定的类型时执行
//! - AfterThrowing：目标抛出且错误符合绑定的类型时执行，然后继续抛出
//! - Around：通知通过 ProceedingJoinPoint 决定是否、以何种参数继续

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::binding::ArgumentBindingPlan;
use crate::discoverer::ParameterNameDiscoverer;
use crate::error::{AopError, AopResult};
use crate::instance::AspectInstanceFactory;
use crate::invocation::MethodInvocation;
use crate::invoker::AdviceInvoker;
use crate::joinpoint::JoinPointContext;
use crate::metadata::{AdviceKind, AdviceMethod, AdviceSpecification};
use crate::pointcut::{AspectJExpressionPointcut, JoinPointMatch};
use crate::types::{unit_value, ParameterType, ThrownError, Value};

/// AspectJ 风格的通知
pub struct AspectJAdvice {
    method: Arc<AdviceMethod>,
    specification: AdviceSpecification,
    pointcut: Arc<AspectJExpressionPointcut>,
    instance_factory: Arc<dyn AspectInstanceFactory>,
    discoverer: Arc<dyn ParameterNameDiscoverer>,
    aspect_name: String,
    declaration_order: usize,
    binding_plan: OnceCell<AopResult<ArgumentBindingPlan>>,
}

impl AspectJAdvice {
    pub fn new(
        method: Arc<AdviceMethod>,
        specification: AdviceSpecification,
        pointcut: Arc<AspectJExpressionPointcut>,
        instance_factory: Arc<dyn AspectInstanceFactory>,
        discoverer: Arc<dyn ParameterNameDiscoverer>,
        declaration_order: usize,
    ) -> Self {
        let aspect_name = instance_factory.aspect_name().to_string();
        Self {
            method,
            specification,
            pointcut,
            instance_factory,
            discoverer,
            aspect_name,
            declaration_order,
            binding_plan: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> AdviceKind {
        self.specification.kind()
    }

    pub fn method(&self) -> &AdviceMethod {
        &self.method
    }

    pub fn specification(&self) -> &AdviceSpecification {
        &self.specification
    }

    pub fn pointcut(&self) -> &Arc<AspectJExpressionPointcut> {
        &self.pointcut
    }

    pub fn instance_factory(&self) -> &Arc<dyn AspectInstanceFactory> {
        &self.instance_factory
    }

    pub fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    pub fn declaration_order(&self) -> usize {
        self.declaration_order
    }

    /// 计算（或返回已缓存的）参数绑定计划
    ///
    /// 只计算一次，失败结果同样缓存；并发的首次调用会等待同一次计算完成。
    pub fn calculate_argument_bindings(&self) -> AopResult<&ArgumentBindingPlan> {
        let plan = self.binding_plan.get_or_init(|| {
            let plan = ArgumentBindingPlan::compute(
                &self.method,
                &self.specification,
                self.discoverer.as_ref(),
                &self.pointcut,
            );
            if let Err(e) = &plan {
                tracing::warn!("Cannot bind arguments of advice {}: {}", self.method.signature(), e);
            }
            plan
        });
        plan.as_ref().map_err(AopError::duplicate)
    }

    /// 使用给定上下文和切面实例执行通知方法
    pub fn invoke_advice_method(
        &self,
        context: &JoinPointContext<'_>,
        aspect: &Value,
    ) -> AopResult<Option<Value>> {
        let plan = self.calculate_argument_bindings()?;
        AdviceInvoker::invoke(&self.method, &self.specification, plan, context, aspect)
    }

    fn accepts_return_value(&self, plan: &ArgumentBindingPlan, value: &Value) -> bool {
        match plan.returning().map(|slot| &slot.parameter_type) {
            Some(ParameterType::Value(ty)) => ty.is_instance(value),
            _ => true,
        }
    }

    fn accepts_error(&self, plan: &ArgumentBindingPlan, error: &ThrownError) -> bool {
        match plan.throwing().map(|slot| &slot.parameter_type) {
            Some(ParameterType::Error(ty)) => ty.matches(error),
            _ => true,
        }
    }

    /// 在拦截链中执行
    pub(crate) fn intercept(
        &self,
        invocation: &MethodInvocation<'_>,
        captured: JoinPointMatch,
    ) -> AopResult<Option<Value>> {
        let aspect = self.instance_factory.aspect_instance_for(invocation.target())?;
        let context = || invocation.context().with_captured(captured.clone());

        match self.kind() {
            AdviceKind::Before => {
                self.invoke_advice_method(&context(), &aspect)?;
                invocation.proceed()
            }
            AdviceKind::After => {
                let result = invocation.proceed();
                self.invoke_advice_method(&context(), &aspect)?;
                result
            }
            AdviceKind::AfterReturning => {
                let result = invocation.proceed()?;
                let value = result.clone().unwrap_or_else(unit_value);
                let plan = self.calculate_argument_bindings()?;
                if self.accepts_return_value(plan, &value) {
                    self.invoke_advice_method(&context().with_return_value(value), &aspect)?;
                } else {
                    tracing::trace!("Return value does not match {}; skipping advice", self.method.signature());
                }
                Ok(result)
            }
            AdviceKind::AfterThrowing => match invocation.proceed() {
                Err(AopError::Thrown(error)) => {
                    let plan = self.calculate_argument_bindings()?;
                    if self.accepts_error(plan, &error) {
                        self.invoke_advice_method(&context().with_thrown(Arc::clone(&error)), &aspect)?;
                    }
                    Err(AopError::Thrown(error))
                }
                other => other,
            },
            AdviceKind::Around => {
                let proceed = |arguments: Option<Vec<Value>>| match arguments {
                    Some(arguments) => invocation.proceed_with(arguments),
                    None => invocation.proceed(),
                };
                let around_context = context().with_proceed(&proceed);
                self.invoke_advice_method(&around_context, &aspect)
            }
            AdviceKind::Pointcut => invocation.proceed(),
        }
    }
}

impl fmt::Debug for AspectJAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectJAdvice")
            .field("kind", &self.kind())
            .field("method", &self.method.signature())
            .field("pointcut", &self.pointcut.expression())
            .field("aspect", &self.aspect_name)
            .field("declaration_order", &self.declaration_order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discoverer::{DiscoveryHints, PrioritizedParameterNameDiscoverer};
    use crate::instance::SingletonAspectInstanceFactory;
    use crate::metadata::Annotation;
    use crate::types::TypeInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct CountingDiscoverer {
        calls: AtomicUsize,
    }

    impl ParameterNameDiscoverer for CountingDiscoverer {
        fn parameter_names(
            &self,
            method: &AdviceMethod,
            hints: &DiscoveryHints<'_>,
        ) -> AopResult<Option<Vec<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PrioritizedParameterNameDiscoverer::standard(true).parameter_names(method, hints)
        }
    }

    fn advice(method: AdviceMethod, discoverer: Arc<dyn ParameterNameDiscoverer>) -> AspectJAdvice {
        let spec = AdviceSpecification::from_method(&method).unwrap();
        let pointcut = Arc::new(AspectJExpressionPointcut::new(spec.pointcut_expression()).unwrap());
        let factory = Arc::new(SingletonAspectInstanceFactory::new("Logging", Arc::new(())));
        AspectJAdvice::new(Arc::new(method), spec, pointcut, factory, discoverer, 0)
    }

    #[test]
    fn test_binding_plan_is_computed_once() {
        let discoverer = Arc::new(CountingDiscoverer {
            calls: AtomicUsize::new(0),
        });
        let method = AdviceMethod::builder(TypeInfo::named("Logging"), "log")
            .parameter(ParameterType::JoinPoint)
            .parameter(ParameterType::any())
            .annotation(Annotation::after_returning("execution(* foo())").returning("retVal"))
            .build();
        let advice = advice(method, discoverer.clone());

        let first = advice.calculate_argument_bindings().unwrap().clone();
        let second = advice.calculate_argument_bindings().unwrap();
        assert_eq!(&first, second);
        assert_eq!(discoverer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.returning().map(|s| s.index), Some(1));
    }

    #[test]
    fn test_concurrent_first_computation() {
        let discoverer = Arc::new(CountingDiscoverer {
            calls: AtomicUsize::new(0),
        });
        let method = AdviceMethod::builder(TypeInfo::named("Logging"), "log")
            .parameter(ParameterType::JoinPoint)
            .parameter(ParameterType::of::<String>())
            .annotation(Annotation::before("execution(* foo(..)) && args(name)"))
            .build();
        let advice = advice(method, discoverer.clone());

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| advice.calculate_argument_bindings().map(|_| ()).unwrap());
            }
        });
        assert_eq!(discoverer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(advice.pointcut().parameter_names(), vec!["name".to_string()]);
    }

    #[test]
    fn test_binding_failure_is_cached() {
        let discoverer = Arc::new(CountingDiscoverer {
            calls: AtomicUsize::new(0),
        });
        let method = AdviceMethod::builder(TypeInfo::named("Logging"), "log")
            .parameter(ParameterType::JoinPoint)
            .parameter(ParameterType::of::<String>())
            .parameter(ParameterType::of::<String>())
            .annotation(Annotation::before("execution(* foo(..)) && args(name)"))
            .build();
        let advice = advice(method, discoverer.clone());

        let first = advice.calculate_argument_bindings().unwrap_err();
        let second = advice.calculate_argument_bindings().unwrap_err();
        assert!(matches!(first, AopError::ArgumentBindingFailure(_)));
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(discoverer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_misuse_surfaces_on_first_computation() {
        let method = AdviceMethod::builder(TypeInfo::named("Logging"), "log")
            .parameter(ParameterType::ProceedingJoinPoint)
            .annotation(Annotation::after("execution(* foo())"))
            .build();
        let advice = advice(method, Arc::new(PrioritizedParameterNameDiscoverer::standard(true)));
        for _ in 0..2 {
            assert!(matches!(
                advice.calculate_argument_bindings(),
                Err(AopError::ProceedingJoinPointMisuse { .. })
            ));
        }
    }
}
