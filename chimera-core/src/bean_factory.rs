//! Bean Factory - 核心容器接口
//!
//! 参考 Spring 的 BeanFactory 架构设计。AOP 引擎只依赖其中很小的一部分：
//! 按名称取 Bean、判断作用域、以及获取容器自身的单例创建锁。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::bean::{BeanDefinition, BeanInstance};
use crate::error::{ContainerError, ContainerResult};

/// 单例创建锁
///
/// 可重入：单例的构造函数可以在持锁期间继续向容器请求其他单例。
pub type SingletonMutex = Arc<ReentrantMutex<()>>;

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;

    /// 指定 Bean 是否为单例作用域
    fn is_singleton(&self, name: &str) -> ContainerResult<bool>;

    /// 指定 Bean 是否为原型作用域
    fn is_prototype(&self, name: &str) -> ContainerResult<bool> {
        Ok(!self.is_singleton(name)?)
    }

    /// 获取 Bean 的类型名称
    fn get_type_name(&self, name: &str) -> ContainerResult<&'static str>;

    /// 获取 Bean 定义上声明的排序值
    fn get_order(&self, _name: &str) -> Option<i32> {
        None
    }

    /// 容器的单例创建锁
    ///
    /// 外部代码需要与容器的单例创建互斥时应当复用此锁，避免锁顺序反转。
    /// 不支持的容器返回 `None`。
    fn singleton_mutex(&self) -> Option<SingletonMutex> {
        None
    }
}

/// ListableBeanFactory - 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 获取所有 Bean 的名称
    fn get_bean_names(&self) -> Vec<String>;

    /// 获取 Bean 定义的数量
    fn get_bean_definition_count(&self) -> usize;
}

/// ConfigurableBeanFactory - 可配置的 Bean 工厂
pub trait ConfigurableBeanFactory: BeanFactory {
    /// 注册 Bean 定义
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()>;

    /// 直接注册一个已经构造好的单例
    fn register_singleton(&self, name: &str, instance: BeanInstance) -> ContainerResult<()>;

    /// 销毁所有缓存的单例
    fn destroy_singletons(&self);
}

/// DefaultListableBeanFactory - 默认的 Bean 容器实现
pub struct DefaultListableBeanFactory {
    /// Bean 定义存储
    definitions: RwLock<HashMap<String, BeanDefinition>>,

    /// 单例 Bean 缓存
    singletons: RwLock<HashMap<String, BeanInstance>>,

    /// 单例创建锁
    singleton_mutex: SingletonMutex,

    /// 正在创建中的 Bean（按线程区分，用于循环依赖检测）
    in_creation: Mutex<HashSet<(ThreadId, String)>>,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            singletons: RwLock::new(HashMap::new()),
            singleton_mutex: Arc::new(ReentrantMutex::new(())),
            in_creation: Mutex::new(HashSet::new()),
        }
    }

    fn definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.definitions.read().get(name).cloned().ok_or_else(|| {
            tracing::debug!("Bean '{}' not found in container", name);
            ContainerError::BeanNotFound(name.to_string())
        })
    }

    fn create_bean(&self, definition: &BeanDefinition) -> ContainerResult<BeanInstance> {
        let key = (thread::current().id(), definition.name.clone());

        if !self.in_creation.lock().insert(key.clone()) {
            return Err(ContainerError::CircularDependency(format!(
                "Bean '{}' is currently in creation",
                definition.name
            )));
        }

        // 使用 RAII 模式确保在任何情况下都会清理标记
        struct CreationGuard<'a> {
            in_creation: &'a Mutex<HashSet<(ThreadId, String)>>,
            key: (ThreadId, String),
        }

        impl Drop for CreationGuard<'_> {
            fn drop(&mut self) {
                self.in_creation.lock().remove(&self.key);
            }
        }

        let _guard = CreationGuard {
            in_creation: &self.in_creation,
            key,
        };

        definition.create().map_err(|e| {
            tracing::warn!("Failed to create bean '{}': {}", definition.name, e);
            ContainerError::creation_failed(definition.name.clone(), e)
        })
    }
}

impl Default for DefaultListableBeanFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<BeanInstance> {
        tracing::trace!("Requesting bean: '{}'", name);

        if let Some(bean) = self.singletons.read().get(name) {
            return Ok(Arc::clone(bean));
        }

        let definition = self.definition(name)?;

        if definition.scope.is_singleton() {
            let _lock = self.singleton_mutex.lock();

            // 持锁后再检查一次，其他线程可能已经完成创建
            if let Some(bean) = self.singletons.read().get(name) {
                return Ok(Arc::clone(bean));
            }

            tracing::debug!("Creating shared instance of singleton bean '{}'", name);
            let bean = self.create_bean(&definition)?;
            self.singletons
                .write()
                .insert(name.to_string(), Arc::clone(&bean));
            Ok(bean)
        } else {
            tracing::debug!("Creating new instance of prototype bean '{}'", name);
            self.create_bean(&definition)
        }
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name) || self.singletons.read().contains_key(name)
    }

    fn is_singleton(&self, name: &str) -> ContainerResult<bool> {
        if let Some(definition) = self.definitions.read().get(name) {
            return Ok(definition.scope.is_singleton());
        }
        if self.singletons.read().contains_key(name) {
            return Ok(true);
        }
        Err(ContainerError::BeanNotFound(name.to_string()))
    }

    fn get_type_name(&self, name: &str) -> ContainerResult<&'static str> {
        Ok(self.definition(name)?.type_name)
    }

    fn get_order(&self, name: &str) -> Option<i32> {
        self.definitions.read().get(name).and_then(|d| d.order)
    }

    fn singleton_mutex(&self) -> Option<SingletonMutex> {
        Some(Arc::clone(&self.singleton_mutex))
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn get_bean_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        for name in self.singletons.read().keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    fn get_bean_definition_count(&self) -> usize {
        self.definitions.read().len()
    }
}

impl ConfigurableBeanFactory for DefaultListableBeanFactory {
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        let mut definitions = self.definitions.write();
        if definitions.contains_key(&definition.name) {
            tracing::warn!("Bean '{}' already exists, registration failed", definition.name);
            return Err(ContainerError::BeanAlreadyExists(definition.name));
        }

        tracing::debug!(
            "Registering bean definition '{}' ({}, scope={})",
            definition.name,
            definition.type_name,
            definition.scope
        );
        definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    fn register_singleton(&self, name: &str, instance: BeanInstance) -> ContainerResult<()> {
        let _lock = self.singleton_mutex.lock();
        let mut singletons = self.singletons.write();
        if singletons.contains_key(name) {
            return Err(ContainerError::BeanAlreadyExists(name.to_string()));
        }
        singletons.insert(name.to_string(), instance);
        Ok(())
    }

    fn destroy_singletons(&self) {
        let _lock = self.singleton_mutex.lock();
        let count = {
            let mut singletons = self.singletons.write();
            let count = singletons.len();
            singletons.clear();
            count
        };
        tracing::info!("Destroyed {} singleton bean(s)", count);
    }
}
