//! 通知器注册表
//!
//! 收集所有切面展开后的通知器，按目标方法筛选并按优先级排序，为目标类型构建代理。
//! 切面可以在编译时通过 `inventory::submit!` 注册，由全局注册表启动时自动加载。

use std::sync::Arc;

use chimera_core::Environment;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::advisor::{Advisor, AdvisorFactory, AspectDefinition};
use crate::config::{AopProperties, IncludePatterns};
use crate::discoverer::PrioritizedParameterNameDiscoverer;
use crate::error::AopResult;
use crate::instance::AspectInstanceFactory;
use crate::invocation::AopProxy;
use crate::matcher::can_apply;
use crate::precedence::sort_by_precedence;
use crate::types::{MethodSignature, TypeInfo};

/// 切面注册器
///
/// ```ignore
/// chimera_aspectj::inventory::submit! {
///     AspectRegistration::new("logging", logging_aspect)
/// }
/// ```
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    /// 构造切面定义
    pub definition: fn() -> AspectDefinition,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, definition: fn() -> AspectDefinition) -> Self {
        Self { name, definition }
    }
}

inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

/// 全局通知器注册表
static GLOBAL_ADVISOR_REGISTRY: OnceCell<Arc<AdvisorRegistry>> = OnceCell::new();

/// 用指定环境初始化全局注册表
///
/// 只有第一次调用生效，之后返回已有的注册表
pub fn init_global_registry(environment: &Environment) -> AopResult<&'static Arc<AdvisorRegistry>> {
    GLOBAL_ADVISOR_REGISTRY.get_or_try_init(|| AdvisorRegistry::bootstrap(environment).map(Arc::new))
}

/// 获取全局通知器注册表
///
/// 尚未初始化时按默认配置创建
pub fn get_global_registry() -> &'static Arc<AdvisorRegistry> {
    GLOBAL_ADVISOR_REGISTRY.get_or_init(|| {
        let registry = AdvisorRegistry::new();
        if let Err(e) = registry.load_if_enabled() {
            tracing::error!("Failed to auto-load aspects: {}", e);
        }
        Arc::new(registry)
    })
}

/// 通知器注册表
pub struct AdvisorRegistry {
    properties: AopProperties,
    include: IncludePatterns,
    factory: AdvisorFactory,
    advisors: RwLock<Vec<Arc<Advisor>>>,
}

impl AdvisorRegistry {
    /// 使用默认配置
    pub fn new() -> Self {
        Self::build(AopProperties::default(), IncludePatterns::default())
    }

    pub fn with_properties(properties: AopProperties) -> AopResult<Self> {
        let include = IncludePatterns::compile(&properties.include_patterns)?;
        Ok(Self::build(properties, include))
    }

    pub fn from_environment(environment: &Environment) -> AopResult<Self> {
        Self::with_properties(AopProperties::from_environment(environment)?)
    }

    /// 从环境创建注册表，`enabled` 与 `auto-load` 同时开启时加载编译时注册的切面
    pub fn bootstrap(environment: &Environment) -> AopResult<Self> {
        let registry = Self::from_environment(environment)?;
        registry.load_if_enabled()?;
        Ok(registry)
    }

    fn load_if_enabled(&self) -> AopResult<usize> {
        if self.properties.enabled && self.properties.auto_load {
            self.auto_load_aspects()
        } else {
            tracing::debug!("Aspect auto-loading is disabled");
            Ok(0)
        }
    }

    fn build(properties: AopProperties, include: IncludePatterns) -> Self {
        let discoverer = PrioritizedParameterNameDiscoverer::standard(properties.raise_discovery_errors);
        Self {
            properties,
            include,
            factory: AdvisorFactory::new(Arc::new(discoverer)),
            advisors: RwLock::new(Vec::new()),
        }
    }

    pub fn properties(&self) -> &AopProperties {
        &self.properties
    }

    pub fn advisor_factory(&self) -> &AdvisorFactory {
        &self.factory
    }

    /// 切面名称是否通过 include-patterns 过滤
    pub fn is_eligible(&self, aspect_name: &str) -> bool {
        self.include.is_eligible(aspect_name)
    }

    /// 注册切面，实例工厂按实例化模型选择；返回新增的通知器数量
    pub fn register_aspect(&self, definition: &AspectDefinition) -> AopResult<usize> {
        let instance_factory = self.factory.instance_factory_for(definition);
        self.register_aspect_with_factory(definition, instance_factory)
    }

    /// 使用指定实例工厂注册切面（例如由容器管理的切面 Bean）
    pub fn register_aspect_with_factory(
        &self,
        definition: &AspectDefinition,
        instance_factory: Arc<dyn AspectInstanceFactory>,
    ) -> AopResult<usize> {
        if !self.properties.enabled {
            tracing::warn!("AOP is disabled; skipping aspect '{}'", definition.name());
            return Ok(0);
        }
        if !self.is_eligible(definition.name()) {
            tracing::warn!(
                "Aspect '{}' does not match any include pattern; skipping",
                definition.name()
            );
            return Ok(0);
        }

        let advisors = self.factory.advisors(definition, instance_factory)?;
        Ok(self.add_advisors(advisors))
    }

    /// 添加通知器，相同 (切面, 方法, 表达式) 的只保留第一个
    pub fn add_advisors(&self, advisors: impl IntoIterator<Item = Arc<Advisor>>) -> usize {
        let mut registered = self.advisors.write();
        let mut added = 0;
        for advisor in advisors {
            if registered.iter().any(|a| a.key() == advisor.key()) {
                tracing::debug!("Ignoring duplicate advisor {:?}", advisor.key());
                continue;
            }
            tracing::debug!("Registering advisor {:?}", advisor);
            registered.push(advisor);
            added += 1;
        }
        added
    }

    /// 所有通知器（注册顺序）
    pub fn advisors(&self) -> Vec<Arc<Advisor>> {
        self.advisors.read().clone()
    }

    /// 可以应用到指定方法的通知器，按优先级排序
    pub fn find_eligible_advisors(
        &self,
        method: &MethodSignature,
        target_type: &TypeInfo,
    ) -> Vec<Arc<Advisor>> {
        let eligible: Vec<Arc<Advisor>> = self
            .advisors
            .read()
            .iter()
            .filter(|a| can_apply(a.pointcut().as_ref(), method, target_type))
            .cloned()
            .collect();
        sort_by_precedence(eligible)
    }

    /// 为目标类型构建代理
    pub fn proxy(&self, target_type: TypeInfo) -> AopProxy {
        AopProxy::new(target_type, self.advisors())
    }

    /// 从 inventory 加载所有注册的切面，返回新增的通知器数量
    pub fn auto_load_aspects(&self) -> AopResult<usize> {
        let registrations: Vec<_> = get_all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        let mut added = 0;
        for registration in registrations {
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            added += self.register_aspect(&(registration.definition)())?;
        }

        tracing::info!("Auto-loaded {} advisor(s)", added);
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.advisors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.read().is_empty()
    }

    pub fn clear(&self) {
        self.advisors.write().clear();
    }
}

impl Default for AdvisorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdvisorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorRegistry")
            .field("properties", &self.properties)
            .field("advisors", &self.len())
            .finish()
    }
}
