//! 切面实例工厂
//!
//! 决定通知执行时使用哪个切面对象：
//!
//! - [`SingletonAspectInstanceFactory`]：预先构造好的唯一实例
//! - [`SimpleAspectInstanceFactory`]：每次调用构造新实例
//! - [`LazySingletonAspectInstanceFactory`]：首次使用时通过委托构造，之后复用
//! - [`BeanFactoryAspectInstanceFactory`]：每次从容器按名称获取
//! - [`PrototypeAspectInstanceFactory`]：容器中的原型 Bean
//! - [`PerTargetAspectInstanceFactory`]：每个目标对象一个实例，弱引用目标
//!
//! `creation_mutex()` 返回 `None` 表示实例创建已由外部（容器的单例机制）串行化，
//! 本引擎不再额外加锁。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use chimera_core::{BeanFactory, SingletonMutex};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex};

use crate::error::{AopError, AopResult};
use crate::types::Value;

/// 最低优先级（默认）
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 最高优先级
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 切面实例工厂
pub trait AspectInstanceFactory: Send + Sync {
    fn aspect_name(&self) -> &str;

    /// 获取切面实例
    fn aspect_instance(&self) -> AopResult<Value>;

    /// 为指定目标对象获取切面实例，只有按目标实例化的工厂关心 `target`
    fn aspect_instance_for(&self, _target: Option<&Value>) -> AopResult<Value> {
        self.aspect_instance()
    }

    /// 实例创建锁；`None` 表示不需要额外加锁
    fn creation_mutex(&self) -> Option<SingletonMutex>;

    /// 排序值，越小优先级越高
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }
}

fn new_mutex() -> SingletonMutex {
    Arc::new(ReentrantMutex::new(()))
}

// ============================================================================
// Singleton
// ============================================================================

/// 已构造好的单例切面
pub struct SingletonAspectInstanceFactory {
    name: String,
    instance: Value,
    order: i32,
}

impl SingletonAspectInstanceFactory {
    pub fn new(name: impl Into<String>, instance: Value) -> Self {
        Self {
            name: name.into(),
            instance,
            order: LOWEST_PRECEDENCE,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl AspectInstanceFactory for SingletonAspectInstanceFactory {
    fn aspect_name(&self) -> &str {
        &self.name
    }

    fn aspect_instance(&self) -> AopResult<Value> {
        Ok(Arc::clone(&self.instance))
    }

    fn creation_mutex(&self) -> Option<SingletonMutex> {
        None
    }

    fn order(&self) -> i32 {
        self.order
    }
}

// ============================================================================
// Simple
// ============================================================================

pub type AspectConstructor = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;

/// 每次调用都构造新的切面实例
pub struct SimpleAspectInstanceFactory {
    name: String,
    constructor: AspectConstructor,
    mutex: SingletonMutex,
    order: i32,
}

impl SimpleAspectInstanceFactory {
    pub fn new<T, F>(name: impl Into<String>, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::from_constructor(
            name,
            Arc::new(move || constructor().map(|aspect| Arc::new(aspect) as Value)),
        )
    }

    pub fn from_constructor(name: impl Into<String>, constructor: AspectConstructor) -> Self {
        Self {
            name: name.into(),
            constructor,
            mutex: new_mutex(),
            order: LOWEST_PRECEDENCE,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl AspectInstanceFactory for SimpleAspectInstanceFactory {
    fn aspect_name(&self) -> &str {
        &self.name
    }

    fn aspect_instance(&self) -> AopResult<Value> {
        tracing::trace!("Instantiating aspect '{}'", self.name);
        (self.constructor)().map_err(|e| {
            tracing::warn!("Failed to instantiate aspect '{}': {}", self.name, e);
            AopError::instantiation(self.name.clone(), e)
        })
    }

    fn creation_mutex(&self) -> Option<SingletonMutex> {
        Some(Arc::clone(&self.mutex))
    }

    fn order(&self) -> i32 {
        self.order
    }
}

// ============================================================================
// LazySingleton
// ============================================================================

/// 延迟单例装饰器：保证委托最多被调用一次（成功时）
pub struct LazySingletonAspectInstanceFactory {
    delegate: Arc<dyn AspectInstanceFactory>,
    instance: OnceCell<Value>,
}

impl LazySingletonAspectInstanceFactory {
    pub fn new(delegate: Arc<dyn AspectInstanceFactory>) -> Self {
        Self {
            delegate,
            instance: OnceCell::new(),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.instance.get().is_some()
    }

    fn materialize(&self) -> AopResult<Value> {
        let created = self.delegate.aspect_instance()?;
        tracing::debug!("Materialized lazy singleton aspect '{}'", self.delegate.aspect_name());
        // 先写入的实例生效
        Ok(match self.instance.try_insert(created) {
            Ok(stored) => Arc::clone(stored),
            Err((stored, _)) => Arc::clone(stored),
        })
    }
}

impl AspectInstanceFactory for LazySingletonAspectInstanceFactory {
    fn aspect_name(&self) -> &str {
        self.delegate.aspect_name()
    }

    fn aspect_instance(&self) -> AopResult<Value> {
        if let Some(instance) = self.instance.get() {
            return Ok(Arc::clone(instance));
        }

        match self.delegate.creation_mutex() {
            Some(mutex) => {
                let _lock = mutex.lock();
                if let Some(instance) = self.instance.get() {
                    return Ok(Arc::clone(instance));
                }
                self.materialize()
            }
            None => self.materialize(),
        }
    }

    fn creation_mutex(&self) -> Option<SingletonMutex> {
        self.delegate.creation_mutex()
    }

    fn order(&self) -> i32 {
        self.delegate.order()
    }
}

impl fmt::Debug for LazySingletonAspectInstanceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySingletonAspectInstanceFactory")
            .field("aspect", &self.delegate.aspect_name())
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

// ============================================================================
// BeanFactory
// ============================================================================

/// 从容器按名称获取切面
pub struct BeanFactoryAspectInstanceFactory {
    bean_factory: Arc<dyn BeanFactory>,
    name: String,
    order: i32,
    fallback_mutex: SingletonMutex,
}

impl BeanFactoryAspectInstanceFactory {
    pub fn new(bean_factory: Arc<dyn BeanFactory>, name: impl Into<String>) -> Self {
        let name = name.into();
        let order = bean_factory.get_order(&name).unwrap_or(LOWEST_PRECEDENCE);
        Self {
            bean_factory,
            name,
            order,
            fallback_mutex: new_mutex(),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    fn is_singleton(&self) -> AopResult<bool> {
        self.bean_factory.is_singleton(&self.name).map_err(|e| {
            AopError::IllegalAspectConfiguration(format!(
                "cannot resolve aspect bean '{}': {}",
                self.name, e
            ))
        })
    }
}

impl AspectInstanceFactory for BeanFactoryAspectInstanceFactory {
    fn aspect_name(&self) -> &str {
        &self.name
    }

    fn aspect_instance(&self) -> AopResult<Value> {
        self.bean_factory
            .get_bean(&self.name)
            .map_err(|e| AopError::instantiation(self.name.clone(), e))
    }

    fn creation_mutex(&self) -> Option<SingletonMutex> {
        if matches!(self.is_singleton(), Ok(true)) {
            // 容器的单例机制已经保证只创建一次
            return None;
        }
        Some(
            self.bean_factory
                .singleton_mutex()
                .unwrap_or_else(|| Arc::clone(&self.fallback_mutex)),
        )
    }

    fn order(&self) -> i32 {
        self.order
    }
}

// ============================================================================
// Prototype
// ============================================================================

/// 原型作用域的切面 Bean，每次调用都从容器获取新实例
pub struct PrototypeAspectInstanceFactory {
    inner: BeanFactoryAspectInstanceFactory,
}

impl PrototypeAspectInstanceFactory {
    /// 引用的 Bean 必须是原型作用域
    pub fn new(bean_factory: Arc<dyn BeanFactory>, name: impl Into<String>) -> AopResult<Self> {
        let inner = BeanFactoryAspectInstanceFactory::new(bean_factory, name);
        if inner.is_singleton()? {
            return Err(AopError::IllegalAspectConfiguration(format!(
                "cannot use PrototypeAspectInstanceFactory with bean named '{}': bean is not a prototype",
                inner.name
            )));
        }
        Ok(Self { inner })
    }
}

impl AspectInstanceFactory for PrototypeAspectInstanceFactory {
    fn aspect_name(&self) -> &str {
        self.inner.aspect_name()
    }

    fn aspect_instance(&self) -> AopResult<Value> {
        self.inner.aspect_instance()
    }

    fn creation_mutex(&self) -> Option<SingletonMutex> {
        self.inner.creation_mutex()
    }

    fn order(&self) -> i32 {
        self.inner.order()
    }
}

// ============================================================================
// PerTarget
// ============================================================================

struct PerTargetEntry {
    target: Weak<dyn Any + Send + Sync>,
    aspect: Value,
}

/// 每个目标对象一个切面实例
///
/// 以目标对象的地址为键，只持有目标的弱引用。目标被释放后条目失效，
/// 并在下一次插入时清理。
pub struct PerTargetAspectInstanceFactory {
    delegate: Arc<dyn AspectInstanceFactory>,
    instances: Mutex<HashMap<usize, PerTargetEntry>>,
}

fn identity(target: &Value) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

impl PerTargetAspectInstanceFactory {
    /// `delegate` 每次调用都应当返回新实例
    pub fn new(delegate: Arc<dyn AspectInstanceFactory>) -> Self {
        Self {
            delegate,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// 仍然存活的目标数量
    pub fn len(&self) -> usize {
        self.instances
            .lock()
            .values()
            .filter(|e| e.target.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_instance(&self, key: usize) -> Option<Value> {
        let instances = self.instances.lock();
        let entry = instances.get(&key)?;
        (entry.target.strong_count() > 0).then(|| Arc::clone(&entry.aspect))
    }

    /// 清理目标已释放的条目，返回清理数量
    pub fn purge(&self) -> usize {
        let mut instances = self.instances.lock();
        let before = instances.len();
        instances.retain(|_, e| e.target.strong_count() > 0);
        before - instances.len()
    }
}

impl AspectInstanceFactory for PerTargetAspectInstanceFactory {
    fn aspect_name(&self) -> &str {
        self.delegate.aspect_name()
    }

    fn aspect_instance(&self) -> AopResult<Value> {
        Err(AopError::Usage(format!(
            "per-target aspect '{}' requires the intercepted target object",
            self.delegate.aspect_name()
        )))
    }

    fn aspect_instance_for(&self, target: Option<&Value>) -> AopResult<Value> {
        let Some(target) = target else {
            return self.aspect_instance();
        };

        let key = identity(target);
        if let Some(aspect) = self.live_instance(key) {
            return Ok(aspect);
        }

        // 委托工厂在锁外创建实例，可以重入本工厂
        let aspect = self.delegate.aspect_instance()?;

        let mut instances = self.instances.lock();
        instances.retain(|_, e| e.target.strong_count() > 0);
        if let Some(entry) = instances.get(&key) {
            return Ok(Arc::clone(&entry.aspect));
        }
        instances.insert(
            key,
            PerTargetEntry {
                target: Arc::downgrade(target),
                aspect: Arc::clone(&aspect),
            },
        );
        tracing::debug!(
            "Created per-target instance of aspect '{}' ({} live target(s))",
            self.delegate.aspect_name(),
            instances.len()
        );
        Ok(aspect)
    }

    fn creation_mutex(&self) -> Option<SingletonMutex> {
        self.delegate.creation_mutex()
    }

    fn order(&self) -> i32 {
        self.delegate.order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MethodMatcher;
    use crate::types::{MethodSignature, TypeInfo};
    use chimera_core::{BeanDefinition, ConfigurableBeanFactory, DefaultListableBeanFactory, Scope};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct LoggingAspect;

    #[test]
    fn test_singleton_returns_same_instance() {
        let factory = SingletonAspectInstanceFactory::new("logging", Arc::new(LoggingAspect)).with_order(5);
        let a = factory.aspect_instance().unwrap();
        let b = factory.aspect_instance().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(factory.creation_mutex().is_none());
        assert_eq!(factory.order(), 5);
    }

    #[test]
    fn test_simple_creates_each_time_and_wraps_failures() {
        let factory = SimpleAspectInstanceFactory::new("logging", || Ok(LoggingAspect));
        let a = factory.aspect_instance().unwrap();
        let b = factory.aspect_instance().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(factory.order(), LOWEST_PRECEDENCE);

        let failing = SimpleAspectInstanceFactory::new("broken", || -> anyhow::Result<LoggingAspect> {
            Err(anyhow::anyhow!("no config"))
        });
        let err = failing.aspect_instance().unwrap_err();
        assert!(matches!(err, AopError::InstantiationFailure { ref aspect, .. } if aspect == "broken"));
        assert!(err.to_string().contains("no config"));
    }

    #[test]
    fn test_lazy_singleton_instantiates_at_most_once() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructions);
        let delegate = SimpleAspectInstanceFactory::new("slow", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Ok(LoggingAspect)
        });
        let lazy = LazySingletonAspectInstanceFactory::new(Arc::new(delegate));
        assert!(!lazy.is_materialized());

        let instances: Vec<Value> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| lazy.aspect_instance().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
        assert!(lazy.is_materialized());
    }

    struct ThresholdAspect {
        threshold: u32,
        checks: AtomicUsize,
    }

    #[test]
    fn test_dynamic_matcher_on_shared_aspect_across_threads() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructions);
        let delegate = SimpleAspectInstanceFactory::new("threshold", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ThresholdAspect {
                threshold: 50,
                checks: AtomicUsize::new(0),
            })
        });
        let lazy = Arc::new(LazySingletonAspectInstanceFactory::new(Arc::new(delegate)));

        let shared = Arc::clone(&lazy);
        let matcher = MethodMatcher::dynamic(
            "argAboveThreshold",
            |method, _| method.name() == "run",
            move |_, _, args| {
                let Ok(instance) = shared.aspect_instance() else {
                    return false;
                };
                let Some(aspect) = instance.downcast_ref::<ThresholdAspect>() else {
                    return false;
                };
                aspect.checks.fetch_add(1, Ordering::SeqCst);
                args.first()
                    .and_then(|a| a.downcast_ref::<u32>())
                    .is_some_and(|v| *v > aspect.threshold)
            },
        );
        let MethodMatcher::Dynamic(ref inner) = matcher else {
            unreachable!()
        };
        let method = MethodSignature::new(TypeInfo::named("S"), "run").with_parameter(TypeInfo::of::<u32>());
        let target = TypeInfo::named("S");

        let matched: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8u32)
                .map(|t| {
                    let (matcher, method, target) = (&matcher, &method, &target);
                    scope.spawn(move || {
                        (0..100u32)
                            .filter(|i| {
                                let arg = Arc::new(t * 100 + i) as Value;
                                matcher.matches_with_args(method, target, &[arg]).unwrap()
                            })
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        // 0..800 中大于 50 的有 749 个
        assert_eq!(matched, 749);
        assert_eq!(inner.evaluations(), 800);
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        let instance = lazy.aspect_instance().unwrap();
        let aspect = instance.downcast_ref::<ThresholdAspect>().unwrap();
        assert_eq!(aspect.checks.load(Ordering::SeqCst), 800);
    }

    #[test]
    fn test_bean_factory_mutex_contract() {
        let container = Arc::new(DefaultListableBeanFactory::new());
        container
            .register_bean_definition(BeanDefinition::new("singletonAspect", || Ok(LoggingAspect)).with_order(3))
            .unwrap();
        container
            .register_bean_definition(
                BeanDefinition::new("prototypeAspect", || Ok(LoggingAspect)).with_scope(Scope::Prototype),
            )
            .unwrap();
        let bean_factory: Arc<dyn BeanFactory> = container.clone();

        let singleton = BeanFactoryAspectInstanceFactory::new(Arc::clone(&bean_factory), "singletonAspect");
        assert!(singleton.creation_mutex().is_none());
        assert_eq!(singleton.order(), 3);
        assert!(Arc::ptr_eq(
            &singleton.aspect_instance().unwrap(),
            &singleton.aspect_instance().unwrap()
        ));

        let prototype = BeanFactoryAspectInstanceFactory::new(Arc::clone(&bean_factory), "prototypeAspect");
        let mutex = prototype.creation_mutex().unwrap();
        assert!(Arc::ptr_eq(&mutex, &container.singleton_mutex().unwrap()));

        let missing = BeanFactoryAspectInstanceFactory::new(bean_factory, "missing");
        assert!(matches!(
            missing.aspect_instance(),
            Err(AopError::InstantiationFailure { .. })
        ));
    }

    #[test]
    fn test_prototype_factory_rejects_singletons() {
        let container = Arc::new(DefaultListableBeanFactory::new());
        container
            .register_bean_definition(BeanDefinition::new("shared", || Ok(LoggingAspect)))
            .unwrap();
        container
            .register_bean_definition(
                BeanDefinition::new("fresh", || Ok(LoggingAspect)).with_scope(Scope::Prototype),
            )
            .unwrap();

        let result = PrototypeAspectInstanceFactory::new(container.clone(), "shared");
        assert!(matches!(result, Err(AopError::IllegalAspectConfiguration(_))));

        let prototype = PrototypeAspectInstanceFactory::new(container, "fresh").unwrap();
        assert!(!Arc::ptr_eq(
            &prototype.aspect_instance().unwrap(),
            &prototype.aspect_instance().unwrap()
        ));
    }

    #[test]
    fn test_per_target_reuses_and_evicts() {
        let delegate = Arc::new(SimpleAspectInstanceFactory::new("perTarget", || Ok(LoggingAspect)));
        let factory = PerTargetAspectInstanceFactory::new(delegate);

        let first: Value = Arc::new(String::from("target-1"));
        let second: Value = Arc::new(String::from("target-2"));

        let a1 = factory.aspect_instance_for(Some(&first)).unwrap();
        let a1_again = factory.aspect_instance_for(Some(&first)).unwrap();
        let a2 = factory.aspect_instance_for(Some(&second)).unwrap();
        assert!(Arc::ptr_eq(&a1, &a1_again));
        assert!(!Arc::ptr_eq(&a1, &a2));
        assert_eq!(factory.len(), 2);

        drop(first);
        assert_eq!(factory.len(), 1);
        assert_eq!(factory.purge(), 1);

        assert!(matches!(factory.aspect_instance(), Err(AopError::Usage(_))));
    }

    #[test]
    fn test_per_target_delegate_may_reenter_factory() {
        let cell: Arc<OnceCell<Weak<PerTargetAspectInstanceFactory>>> = Arc::new(OnceCell::new());
        let observed = Arc::new(AtomicUsize::new(usize::MAX));
        let (handle, seen) = (Arc::clone(&cell), Arc::clone(&observed));
        let delegate = SimpleAspectInstanceFactory::new("perTarget", move || {
            if let Some(factory) = handle.get().and_then(Weak::upgrade) {
                seen.store(factory.len(), Ordering::SeqCst);
                factory.purge();
            }
            Ok(LoggingAspect)
        });
        let factory = Arc::new(PerTargetAspectInstanceFactory::new(Arc::new(delegate)));
        let _ = cell.set(Arc::downgrade(&factory));

        let target: Value = Arc::new(String::from("target"));
        let first = factory.aspect_instance_for(Some(&target)).unwrap();
        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&first, &factory.aspect_instance_for(Some(&target)).unwrap()));
        assert_eq!(factory.len(), 1);
    }
}
