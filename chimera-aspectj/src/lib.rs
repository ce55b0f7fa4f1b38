//! Chimera AspectJ - AspectJ 风格的 AOP 引擎
//!
//! 提供：
//! - 类过滤器与方法匹配器的组合代数（并集、交集、取反，区分静态与动态匹配）
//! - AspectJ 切点表达式子集（`execution`、`within`、`args`、命名切点引用）
//! - 通知元数据解析与参数绑定（连接点、切点变量、返回值、抛出的错误）
//! - 多种切面实例化策略（单例、延迟单例、原型、按目标对象）
//! - 通知优先级排序与拦截链执行
//! - 基于 inventory 的编译时切面注册

pub mod advice;
pub mod advisor;
pub mod binding;
pub mod config;
pub mod discoverer;
pub mod error;
pub mod instance;
pub mod invocation;
pub mod invoker;
pub mod joinpoint;
pub mod matcher;
pub mod metadata;
pub mod pointcut;
pub mod precedence;
pub mod registry;
pub mod types;

// 重新导出核心类型
pub use advice::AspectJAdvice;
pub use advisor::{Advisor, AdvisorFactory, AspectDefinition, InstantiationModel};
pub use binding::{AdviceArgs, AdviceFailure, ArgumentBindingPlan, ArgumentMismatch};
pub use config::{AopProperties, IncludePatterns};
pub use discoverer::{
    AdviceParameterNameDiscoverer, DeclaredParameterNameDiscoverer, ParameterNameDiscoverer,
    PrioritizedParameterNameDiscoverer,
};
pub use error::{AopError, AopResult};
pub use instance::{
    AspectInstanceFactory, BeanFactoryAspectInstanceFactory, LazySingletonAspectInstanceFactory,
    PerTargetAspectInstanceFactory, PrototypeAspectInstanceFactory, SimpleAspectInstanceFactory,
    SingletonAspectInstanceFactory, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE,
};
pub use invocation::{AopProxy, MethodInvocation};
pub use invoker::AdviceInvoker;
pub use joinpoint::{JoinPoint, JoinPointContext, ProceedingJoinPoint, StaticPart};
pub use matcher::{ClassFilter, ComposablePointcut, MatcherKind, MethodMatcher, NamePattern, Pointcut};
pub use metadata::{AdviceKind, AdviceMethod, AdviceSpecification, Annotation};
pub use pointcut::{AspectJExpressionPointcut, JoinPointMatch};
pub use precedence::{sort_by_precedence, AspectJPrecedenceComparator, Ordered, PrecedenceAware};
pub use registry::{get_global_registry, init_global_registry, AdvisorRegistry, AspectRegistration};
pub use types::{ErrorType, MethodSignature, ParameterType, ThrownError, TypeInfo, Value};

// 导出 inventory 供切面注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advisor::{AspectDefinition, InstantiationModel};
    pub use crate::binding::{AdviceArgs, AdviceFailure};
    pub use crate::error::{AopError, AopResult};
    pub use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
    pub use crate::matcher::Pointcut;
    pub use crate::metadata::{AdviceKind, AdviceMethod, Annotation};
    pub use crate::registry::{get_global_registry, AdvisorRegistry, AspectRegistration};
    pub use crate::types::{MethodSignature, ParameterType, TypeInfo, Value};
}
