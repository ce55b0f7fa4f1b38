// chimera-core: Chimera 的容器基础设施
//
// 为 AOP 引擎提供外部协作者：
// - 单例和原型作用域的 Bean 容器（按名称查找、单例创建锁）
// - 多配置源叠加的 Environment 与强类型绑定
// - 基于 tracing 的日志初始化

pub mod bean;
pub mod bean_factory;
pub mod config;
pub mod error;
pub mod logging;
pub mod scope;

// 重新导出常用类型
pub use bean::{BeanDefinition, BeanInstance, InstanceSupplier};
pub use bean_factory::{
    BeanFactory, ConfigurableBeanFactory, DefaultListableBeanFactory, ListableBeanFactory,
    SingletonMutex,
};
pub use config::{Environment, MapPropertySource, PropertySource, TomlPropertySource};
pub use error::{ContainerError, ContainerResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use scope::Scope;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{BeanDefinition, BeanInstance};
    pub use crate::bean_factory::{
        BeanFactory, ConfigurableBeanFactory, DefaultListableBeanFactory, ListableBeanFactory,
    };
    pub use crate::config::{Environment, MapPropertySource, PropertySource, TomlPropertySource};
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::scope::Scope;
    pub use anyhow::{anyhow, Context};
}
