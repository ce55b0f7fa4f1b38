//! 通知器
//!
//! [`AspectDefinition`] 描述一个切面：名称、类型、实例化模型、排序值、构造函数和通知方法。
//! [`AdvisorFactory`] 把它展开为一组 [`Advisor`]，每个通知方法一个。
//! 参数绑定计划在创建时立即计算，签名错误在处理切面时就暴露出来。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chimera_core::BeanFactory;

use crate::advice::AspectJAdvice;
use crate::discoverer::{ParameterNameDiscoverer, PrioritizedParameterNameDiscoverer};
use crate::error::{AopError, AopResult};
use crate::instance::{
    AspectConstructor, AspectInstanceFactory, BeanFactoryAspectInstanceFactory,
    LazySingletonAspectInstanceFactory, PerTargetAspectInstanceFactory,
    PrototypeAspectInstanceFactory, SimpleAspectInstanceFactory,
};
use crate::metadata::{AdviceKind, AdviceMethod, AdviceSpecification};
use crate::pointcut::AspectJExpressionPointcut;
use crate::precedence::{Ordered, PrecedenceAware, PrecedenceInformation};
use crate::types::{TypeInfo, Value};

/// 切点与通知的组合，附带优先级信息
pub struct Advisor {
    advice: Arc<AspectJAdvice>,
    order: i32,
    precedence: PrecedenceInformation,
}

impl Advisor {
    pub fn new(advice: Arc<AspectJAdvice>, order: i32) -> Self {
        let precedence = PrecedenceInformation {
            aspect_name: advice.aspect_name().to_string(),
            declaration_order: advice.declaration_order(),
            advice_kind: advice.kind(),
        };
        Self {
            advice,
            order,
            precedence,
        }
    }

    pub fn advice(&self) -> &Arc<AspectJAdvice> {
        &self.advice
    }

    pub fn pointcut(&self) -> &Arc<AspectJExpressionPointcut> {
        self.advice.pointcut()
    }

    pub fn aspect_name(&self) -> &str {
        &self.precedence.aspect_name
    }

    pub fn declaration_order(&self) -> usize {
        self.precedence.declaration_order
    }

    pub fn kind(&self) -> AdviceKind {
        self.precedence.advice_kind
    }

    /// 去重键：(切面, 通知方法, 切点表达式)
    pub fn key(&self) -> (&str, &str, &str) {
        (
            self.aspect_name(),
            self.advice.method().name(),
            self.pointcut().expression(),
        )
    }
}

impl Ordered for Advisor {
    fn order(&self) -> i32 {
        self.order
    }
}

impl PrecedenceAware for Advisor {
    fn precedence_information(&self) -> Option<&PrecedenceInformation> {
        Some(&self.precedence)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("aspect", &self.aspect_name())
            .field("method", &self.advice.method().name())
            .field("kind", &self.kind())
            .field("pointcut", &self.pointcut().expression())
            .field("order", &self.order)
            .field("declaration_order", &self.declaration_order())
            .finish()
    }
}

/// 切面实例化模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstantiationModel {
    /// 整个进程共享一个实例（首次使用时创建）
    #[default]
    Singleton,
    /// 每个目标对象一个实例
    PerTarget,
}

/// 切面定义
#[derive(Clone)]
pub struct AspectDefinition {
    name: String,
    aspect_type: TypeInfo,
    instantiation: InstantiationModel,
    order: Option<i32>,
    constructor: AspectConstructor,
    methods: Vec<Arc<AdviceMethod>>,
}

impl AspectDefinition {
    pub fn new<T, F>(name: impl Into<String>, aspect_type: TypeInfo, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            aspect_type,
            instantiation: InstantiationModel::Singleton,
            order: None,
            constructor: Arc::new(move || constructor().map(|aspect| Arc::new(aspect) as Value)),
            methods: Vec::new(),
        }
    }

    pub fn per_target(mut self) -> Self {
        self.instantiation = InstantiationModel::PerTarget;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 追加一个方法，声明顺序即追加顺序
    pub fn advice(mut self, method: AdviceMethod) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aspect_type(&self) -> &TypeInfo {
        &self.aspect_type
    }

    pub fn instantiation(&self) -> InstantiationModel {
        self.instantiation
    }

    pub fn order(&self) -> Option<i32> {
        self.order
    }

    pub fn methods(&self) -> &[Arc<AdviceMethod>] {
        &self.methods
    }
}

impl fmt::Debug for AspectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectDefinition")
            .field("name", &self.name)
            .field("aspect_type", &self.aspect_type.name())
            .field("instantiation", &self.instantiation)
            .field("order", &self.order)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// 由切面定义创建通知器
pub struct AdvisorFactory {
    discoverer: Arc<dyn ParameterNameDiscoverer>,
}

impl AdvisorFactory {
    pub fn new(discoverer: Arc<dyn ParameterNameDiscoverer>) -> Self {
        Self { discoverer }
    }

    /// 按实例化模型选择实例工厂
    pub fn instance_factory_for(&self, definition: &AspectDefinition) -> Arc<dyn AspectInstanceFactory> {
        let mut simple =
            SimpleAspectInstanceFactory::from_constructor(definition.name(), Arc::clone(&definition.constructor));
        if let Some(order) = definition.order {
            simple = simple.with_order(order);
        }

        match definition.instantiation {
            InstantiationModel::Singleton => {
                Arc::new(LazySingletonAspectInstanceFactory::new(Arc::new(simple)))
            }
            InstantiationModel::PerTarget => Arc::new(PerTargetAspectInstanceFactory::new(Arc::new(simple))),
        }
    }

    /// 切面实例由容器管理时使用的实例工厂
    ///
    /// 单例 Bean 使用延迟单例装饰器，原型 Bean 每次调用都从容器获取。
    pub fn bean_instance_factory(
        &self,
        bean_factory: Arc<dyn BeanFactory>,
        bean_name: &str,
    ) -> AopResult<Arc<dyn AspectInstanceFactory>> {
        let singleton = bean_factory.is_singleton(bean_name).map_err(|e| {
            AopError::IllegalAspectConfiguration(format!(
                "cannot resolve aspect bean '{}': {}",
                bean_name, e
            ))
        })?;

        if singleton {
            let delegate = BeanFactoryAspectInstanceFactory::new(bean_factory, bean_name);
            Ok(Arc::new(LazySingletonAspectInstanceFactory::new(Arc::new(delegate))))
        } else {
            Ok(Arc::new(PrototypeAspectInstanceFactory::new(bean_factory, bean_name)?))
        }
    }

    /// 为切面的每个通知方法创建通知器
    ///
    /// 没有可识别注解的方法被忽略；`Pointcut` 方法只登记为命名切点。
    pub fn advisors(
        &self,
        definition: &AspectDefinition,
        instance_factory: Arc<dyn AspectInstanceFactory>,
    ) -> AopResult<Vec<Arc<Advisor>>> {
        let mut specifications = Vec::new();
        let mut references = HashMap::new();
        for (position, method) in definition.methods.iter().enumerate() {
            if method.annotations().iter().all(|a| a.kind().is_none()) {
                tracing::trace!("Skipping non-advice method {}", method.signature());
                continue;
            }
            let specification = AdviceSpecification::from_method(method)?;
            if specification.kind() == AdviceKind::Pointcut {
                references.insert(
                    method.name().to_string(),
                    specification.pointcut_expression().to_string(),
                );
            } else {
                specifications.push((position, method, specification));
            }
        }

        let order = instance_factory.order();
        let mut advisors = Vec::with_capacity(specifications.len());
        for (position, method, specification) in specifications {
            let pointcut = AspectJExpressionPointcut::with_references(
                specification.pointcut_expression(),
                &references,
            )?;
            let advice = AspectJAdvice::new(
                Arc::clone(method),
                specification,
                Arc::new(pointcut),
                Arc::clone(&instance_factory),
                Arc::clone(&self.discoverer),
                position,
            );
            advice.calculate_argument_bindings()?;
            advisors.push(Arc::new(Advisor::new(Arc::new(advice), order)));
        }

        tracing::debug!(
            "Created {} advisor(s) for aspect '{}'",
            advisors.len(),
            definition.name()
        );
        Ok(advisors)
    }
}

impl Default for AdvisorFactory {
    fn default() -> Self {
        Self::new(Arc::new(PrioritizedParameterNameDiscoverer::standard(true)))
    }
}
