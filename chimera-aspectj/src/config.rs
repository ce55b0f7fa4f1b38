//! AOP 配置
//!
//! 从 `Environment` 的 `chimera.aop` 前缀绑定：
//!
//! ```toml
//! [chimera.aop]
//! enabled = true
//! include-patterns = ["security.*", "audit"]
//! raise-discovery-errors = true
//! auto-load = true
//! ```

use chimera_core::Environment;
use regex::Regex;
use serde::Deserialize;

use crate::error::{AopError, AopResult};

/// AOP 配置属性
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AopProperties {
    /// 是否启用切面
    pub enabled: bool,

    /// 切面名称的正则过滤，为空时所有切面都有效
    ///
    /// 同时接受 TOML 数组和逗号分隔的字符串，单独读取
    #[serde(skip)]
    pub include_patterns: Vec<String>,

    /// 启发式参数名发现失败时是否报告具体原因
    pub raise_discovery_errors: bool,

    /// 是否把编译时注册的切面加载到全局注册表
    pub auto_load: bool,
}

impl AopProperties {
    pub const PREFIX: &'static str = "chimera.aop";

    pub fn from_environment(environment: &Environment) -> AopResult<Self> {
        let mut properties: Self = environment
            .bind(Self::PREFIX)
            .map_err(|e| AopError::IllegalAspectConfiguration(e.to_string()))?;
        if let Some(patterns) = environment.get_string_array("chimera.aop.include-patterns") {
            properties.include_patterns = patterns;
        }
        tracing::debug!("Loaded AOP properties: {:?}", properties);
        Ok(properties)
    }
}

impl Default for AopProperties {
    fn default() -> Self {
        Self {
            enabled: true,
            include_patterns: Vec::new(),
            raise_discovery_errors: true,
            auto_load: true,
        }
    }
}

/// 编译后的切面名称过滤器
#[derive(Debug, Clone, Default)]
pub struct IncludePatterns {
    patterns: Vec<Regex>,
}

impl IncludePatterns {
    /// 每个模式都匹配完整的切面名称
    pub fn compile(patterns: &[String]) -> AopResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p)).map_err(|e| {
                    AopError::IllegalAspectConfiguration(format!(
                        "invalid include pattern '{}': {}",
                        p, e
                    ))
                })
            })
            .collect::<AopResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_eligible(&self, aspect_name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(aspect_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::{MapPropertySource, TomlPropertySource};

    #[test]
    fn test_defaults_without_configuration() {
        let properties = AopProperties::from_environment(&Environment::new()).unwrap();
        assert_eq!(properties, AopProperties::default());
        assert!(properties.enabled);
        assert!(properties.raise_discovery_errors);
    }

    #[test]
    fn test_bind_from_toml() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            TomlPropertySource::parse(
                r#"
                [chimera.aop]
                enabled = false
                include-patterns = ["security.*", "audit"]
                raise-discovery-errors = false
                "#,
                "application.toml",
            )
            .unwrap(),
        ));

        let properties = AopProperties::from_environment(&env).unwrap();
        assert!(!properties.enabled);
        assert!(!properties.raise_discovery_errors);
        assert!(properties.auto_load);
        assert_eq!(properties.include_patterns, ["security.*", "audit"]);
    }

    #[test]
    fn test_comma_separated_patterns() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("overrides").with_property("chimera.aop.include-patterns", "tx, log.*"),
        ));
        let properties = AopProperties::from_environment(&env).unwrap();
        assert_eq!(properties.include_patterns, ["tx", "log.*"]);
    }

    #[test]
    fn test_include_patterns() {
        let include = IncludePatterns::compile(&["security.*".to_string(), "audit".to_string()]).unwrap();
        assert!(include.is_eligible("securityAspect"));
        assert!(include.is_eligible("audit"));
        assert!(!include.is_eligible("auditing"));
        assert!(IncludePatterns::default().is_eligible("anything"));

        assert!(matches!(
            IncludePatterns::compile(&["(".to_string()]),
            Err(AopError::IllegalAspectConfiguration(_))
        ));
    }
}
