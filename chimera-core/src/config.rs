//! 配置管理
//!
//! 类似 Spring Boot 的 Environment：多个配置源按优先级叠加，键使用点号分隔
//! （例如 `chimera.aop.include-patterns`），值统一使用 `toml::Value` 表示。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use toml::value::Table;
use toml::Value;

use crate::error::{ContainerError, ContainerResult};

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 获取配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<Value>;

    /// 获取所有配置键
    fn keys(&self) -> Vec<String>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// Environment - 配置管理器
pub struct Environment {
    /// 配置源列表（按优先级降序）
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .sources
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        f.debug_struct("Environment").field("sources", &names).finish()
    }
}

impl Environment {
    /// 创建空的环境
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        tracing::debug!(
            "Adding property source '{}' (priority {})",
            source.name(),
            source.priority()
        );
        sources.push(source);
        // 稳定排序：同优先级时先添加的配置源优先
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 获取配置值
    pub fn get(&self, key: &str) -> Option<Value> {
        let sources = self.sources.read();
        sources.iter().find_map(|source| source.get(key))
    }

    /// 获取字符串配置
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    /// 获取字符串配置（带默认值）
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// 获取整数配置
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Integer(i) => Some(i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 获取布尔值配置
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Boolean(b) => Some(b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 获取字符串数组配置
    ///
    /// 支持 TOML 数组和逗号分隔字符串两种写法
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::String(s) => Some(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// 将指定前缀下的所有配置绑定为强类型结构
    ///
    /// 低优先级的配置源先写入，高优先级的配置源覆盖同名键。
    /// 前缀下没有任何键时等价于绑定一个空表，配合 `#[serde(default)]` 得到默认值。
    pub fn bind<T: DeserializeOwned>(&self, prefix: &str) -> ContainerResult<T> {
        let mut table = Table::new();
        {
            let sources = self.sources.read();
            for source in sources.iter().rev() {
                for key in source.keys() {
                    let Some(rest) = key
                        .strip_prefix(prefix)
                        .and_then(|r| r.strip_prefix('.'))
                    else {
                        continue;
                    };
                    if let Some(value) = source.get(&key) {
                        insert_path(&mut table, rest, value);
                    }
                }
            }
        }

        Value::Table(table).try_into().map_err(|e| {
            ContainerError::Config(format!("Failed to bind properties under '{}': {}", prefix, e))
        })
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_path(table: &mut Table, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            table.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = table
                .entry(head.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            if !entry.is_table() {
                *entry = Value::Table(Table::new());
            }
            if let Value::Table(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

fn flatten(value: &Value, prefix: String, out: &mut HashMap<String, Value>) {
    match value {
        Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(child, path, out);
            }
        }
        other => {
            out.insert(prefix, other.clone());
        }
    }
}

// ========== Property Sources ==========

/// TOML 文件配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, Value>,
    priority: i32,
}

impl TomlPropertySource {
    /// 从文件加载 TOML 配置
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::parse(&content, path.to_string_lossy().to_string())
    }

    /// 从字符串解析 TOML 配置
    pub fn parse(content: &str, name: impl Into<String>) -> ContainerResult<Self> {
        let name = name.into();
        let root: Value = toml::from_str(content)
            .map_err(|e| ContainerError::Config(format!("Failed to parse TOML '{}': {}", name, e)))?;

        let mut properties = HashMap::new();
        flatten(&root, String::new(), &mut properties);

        Ok(Self {
            name,
            properties,
            priority: 0,
        })
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时覆盖）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, Value>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const SAMPLE: &str = r#"
        [chimera.aop]
        enabled = false
        include-patterns = ["Audit.*", "Logging"]

        [logging]
        level = "debug"
    "#;

    #[derive(Debug, Deserialize, Default, PartialEq)]
    #[serde(default, rename_all = "kebab-case")]
    struct SampleProperties {
        enabled: bool,
        include_patterns: Vec<String>,
        order: i64,
    }

    fn environment() -> Environment {
        let env = Environment::new();
        env.add_property_source(Box::new(TomlPropertySource::parse(SAMPLE, "sample").unwrap()));
        env
    }

    #[test]
    fn test_flattened_lookup() {
        let env = environment();
        assert_eq!(env.get_bool("chimera.aop.enabled"), Some(false));
        assert_eq!(env.get_string("logging.level").as_deref(), Some("debug"));
        assert_eq!(
            env.get_string_array("chimera.aop.include-patterns"),
            Some(vec!["Audit.*".to_string(), "Logging".to_string()])
        );
        assert!(env.get("missing.key").is_none());
    }

    #[test]
    fn test_priority_override() {
        let env = environment();
        env.add_property_source(Box::new(
            MapPropertySource::new("overrides").with_property("logging.level", "trace"),
        ));
        assert_eq!(env.get_string("logging.level").as_deref(), Some("trace"));
    }

    #[test]
    fn test_comma_separated_array_and_string_numbers() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("m")
                .with_property("list", "a, b ,,c")
                .with_property("num", "42"),
        ));
        assert_eq!(
            env.get_string_array("list"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(env.get_i64("num"), Some(42));
    }

    #[test]
    fn test_bind_prefix() {
        let env = environment();
        env.add_property_source(Box::new(
            MapPropertySource::new("overrides").with_property("chimera.aop.order", 7i64),
        ));

        let props: SampleProperties = env.bind("chimera.aop").unwrap();
        assert_eq!(
            props,
            SampleProperties {
                enabled: false,
                include_patterns: vec!["Audit.*".to_string(), "Logging".to_string()],
                order: 7,
            }
        );
    }

    #[test]
    fn test_bind_missing_prefix_yields_defaults() {
        let env = Environment::new();
        let props: SampleProperties = env.bind("nothing.here").unwrap();
        assert_eq!(props, SampleProperties::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            TomlPropertySource::parse("not = [valid", "bad"),
            Err(ContainerError::Config(_))
        ));
    }
}
