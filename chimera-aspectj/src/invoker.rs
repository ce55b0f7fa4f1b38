//! 通知方法调用
//!
//! 将绑定计划、调用上下文和切面实例组合起来执行通知方法体。
//! 读取实参时的类型不符转换为 [`AopError::ArgumentBindingFailure`]，
//! 通知体抛出的业务错误原样传递。

use crate::binding::{AdviceFailure, ArgumentBindingPlan};
use crate::error::{AopError, AopResult};
use crate::joinpoint::JoinPointContext;
use crate::metadata::{AdviceMethod, AdviceSpecification};
use crate::types::Value;

pub struct AdviceInvoker;

impl AdviceInvoker {
    pub fn invoke(
        method: &AdviceMethod,
        specification: &AdviceSpecification,
        plan: &ArgumentBindingPlan,
        context: &JoinPointContext<'_>,
        aspect: &Value,
    ) -> AopResult<Option<Value>> {
        let args = plan.bind(context)?;
        tracing::trace!(
            "Invoking {} advice {} with {} argument(s)",
            specification.kind(),
            method.signature(),
            args.len()
        );

        method.call(aspect, args).map_err(|failure| match failure {
            AdviceFailure::Mismatch(mismatch) => AopError::binding(format!(
                "Mismatch on arguments to advice method [{}]; pointcut expression [{}]: {}",
                method.signature(),
                specification.pointcut_expression(),
                mismatch
            )),
            AdviceFailure::Thrown(error) => AopError::Thrown(error),
            AdviceFailure::Aop(error) => error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discoverer::PrioritizedParameterNameDiscoverer;
    use crate::metadata::Annotation;
    use crate::pointcut::AspectJExpressionPointcut;
    use crate::types::{MethodSignature, ParameterType, ThrownError, TypeInfo};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("audit rejected")]
    struct AuditRejected;

    fn prepare(method: &AdviceMethod) -> (AdviceSpecification, ArgumentBindingPlan) {
        let spec = AdviceSpecification::from_method(method).unwrap();
        let pointcut = AspectJExpressionPointcut::new(spec.pointcut_expression()).unwrap();
        let plan = ArgumentBindingPlan::compute(
            method,
            &spec,
            &PrioritizedParameterNameDiscoverer::standard(true),
            &pointcut,
        )
        .unwrap();
        (spec, plan)
    }

    fn context<'a>() -> JoinPointContext<'a> {
        let method = MethodSignature::new(TypeInfo::named("Service"), "run");
        JoinPointContext::new(Arc::new(method), TypeInfo::named("Service"), Vec::new())
    }

    #[test]
    fn test_invokes_body_with_aspect_instance() {
        let method = AdviceMethod::builder(TypeInfo::named("Audit"), "audit")
            .named_parameter("jp", ParameterType::JoinPoint)
            .annotation(Annotation::before("execution(* run())"))
            .body(|aspect, args| {
                let name = aspect.downcast_ref::<String>().cloned().unwrap_or_default();
                let jp = args.join_point(0)?;
                Ok(Some(Arc::new(format!("{}:{}", name, jp.signature().name())) as Value))
            });
        let (spec, plan) = prepare(&method);
        let aspect: Value = Arc::new(String::from("audit"));

        let result = AdviceInvoker::invoke(&method, &spec, &plan, &context(), &aspect)
            .unwrap()
            .unwrap();
        assert_eq!(result.downcast_ref::<String>().map(String::as_str), Some("audit:run"));
    }

    #[test]
    fn test_mismatch_becomes_binding_failure() {
        let method = AdviceMethod::builder(TypeInfo::named("Audit"), "audit")
            .named_parameter("jp", ParameterType::JoinPoint)
            .annotation(Annotation::before("execution(* run())"))
            .body(|_, args| {
                args.error(0)?;
                Ok(None)
            });
        let (spec, plan) = prepare(&method);
        let aspect: Value = Arc::new(());

        let err = AdviceInvoker::invoke(&method, &spec, &plan, &context(), &aspect).unwrap_err();
        match err {
            AopError::ArgumentBindingFailure(message) => {
                assert!(message.contains("Audit.audit(JoinPoint)"));
                assert!(message.contains("execution(* run())"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_thrown_errors_pass_through_unchanged() {
        let thrown: ThrownError = Arc::new(AuditRejected);
        let to_throw = thrown.clone();
        let method = AdviceMethod::builder(TypeInfo::named("Audit"), "audit")
            .annotation(Annotation::before("execution(* run())"))
            .body(move |_, _| Err(AdviceFailure::Thrown(to_throw.clone())));
        let (spec, plan) = prepare(&method);
        let aspect: Value = Arc::new(());

        let err = AdviceInvoker::invoke(&method, &spec, &plan, &context(), &aspect).unwrap_err();
        let returned = err.into_thrown().unwrap();
        assert!(Arc::ptr_eq(&returned, &thrown));
        assert_eq!(returned.to_string(), "audit rejected");
    }
}
