use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Scope;

/// 容器中共享的 Bean 实例
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// Bean 实例提供者
pub type InstanceSupplier = Arc<dyn Fn() -> anyhow::Result<BeanInstance> + Send + Sync>;

/// Bean 定义 - 描述如何创建和管理 Bean
#[derive(Clone)]
pub struct BeanDefinition {
    /// Bean 的名称
    pub name: String,

    /// Bean 的类型名称（用于诊断）
    pub type_name: &'static str,

    /// Bean 的作用域
    pub scope: Scope,

    /// 排序值（越小优先级越高），未设置时由使用方决定默认值
    pub order: Option<i32>,

    supplier: InstanceSupplier,
}

impl BeanDefinition {
    /// 创建新的 Bean 定义
    ///
    /// ```
    /// use chimera_core::{BeanDefinition, Scope};
    ///
    /// let definition = BeanDefinition::new("greeting", || Ok(String::from("hello")))
    ///     .with_scope(Scope::Prototype);
    /// assert_eq!(definition.scope, Scope::Prototype);
    /// ```
    pub fn new<T, F>(name: impl Into<String>, supplier: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            type_name: std::any::type_name::<T>(),
            scope: Scope::default(),
            order: None,
            supplier: Arc::new(move || supplier().map(|bean| Arc::new(bean) as BeanInstance)),
        }
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置排序值
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 调用提供者创建一个新实例
    pub fn create(&self) -> anyhow::Result<BeanInstance> {
        (self.supplier)()
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("order", &self.order)
            .finish()
    }
}
