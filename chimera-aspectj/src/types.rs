//! 类型描述
//!
//! Rust 没有运行时反射，引擎以显式的描述对象代替：
//! - [`TypeInfo`]：目标类型（名称、可选 `TypeId`、声明的父类型名称）
//! - [`MethodSignature`]：被拦截的方法
//! - [`ParameterType`]：通知方法的形参类型

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 运行时值（方法参数、返回值、目标对象、切面实例）
pub type Value = Arc<dyn Any + Send + Sync>;

/// 通知或目标方法抛出的业务错误
pub type ThrownError = Arc<dyn Error + Send + Sync>;

/// 返回值为空（`()`）时使用的占位值
pub fn unit_value() -> Value {
    Arc::new(())
}

/// 截取 `std::any::type_name` 的最后一段，泛型类型保留完整名称
fn short_type_name(full: &'static str) -> &'static str {
    if full.contains('<') {
        return full;
    }
    full.rsplit("::").next().unwrap_or(full)
}

/// 类型信息
#[derive(Debug, Clone)]
pub struct TypeInfo {
    name: Cow<'static, str>,
    type_id: Option<TypeId>,
    supertypes: Vec<Cow<'static, str>>,
}

impl TypeInfo {
    /// 由 Rust 类型构造，携带 `TypeId` 以便做运行时实例检查
    pub fn of<T: Any>() -> Self {
        Self {
            name: Cow::Borrowed(short_type_name(std::any::type_name::<T>())),
            type_id: Some(TypeId::of::<T>()),
            supertypes: Vec::new(),
        }
    }

    /// 仅按名称描述的类型（无法做运行时实例检查）
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
            supertypes: Vec::new(),
        }
    }

    /// 可以接收任意值的类型
    pub fn any() -> Self {
        Self::named("Object")
    }

    /// 声明一个父类型（接口）名称
    pub fn with_supertype(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.supertypes.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.supertypes.iter().map(|s| s.as_ref())
    }

    /// 是否可以赋值给指定名称的类型（自身、声明的父类型或 `Object`）
    pub fn is_assignable_to(&self, name: &str) -> bool {
        name == "Object" || self.name == name || self.supertypes.iter().any(|s| s == name)
    }

    /// 值是否是该类型的实例；没有 `TypeId` 的类型接受任意值
    pub fn is_instance(&self, value: &Value) -> bool {
        match self.type_id {
            Some(expected) => value.as_ref().type_id() == expected,
            None => true,
        }
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.type_id == other.type_id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.type_id.hash(state);
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 被拦截方法的签名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    declaring_type: TypeInfo,
    name: String,
    parameter_types: Vec<TypeInfo>,
    return_type: Option<TypeInfo>,
}

impl MethodSignature {
    pub fn new(declaring_type: TypeInfo, name: impl Into<String>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            parameter_types: Vec::new(),
            return_type: None,
        }
    }

    pub fn with_parameter(mut self, parameter_type: TypeInfo) -> Self {
        self.parameter_types.push(parameter_type);
        self
    }

    pub fn with_parameters(mut self, parameter_types: impl IntoIterator<Item = TypeInfo>) -> Self {
        self.parameter_types.extend(parameter_types);
        self
    }

    pub fn returning(mut self, return_type: TypeInfo) -> Self {
        self.return_type = Some(return_type);
        self
    }

    pub fn declaring_type(&self) -> &TypeInfo {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[TypeInfo] {
        &self.parameter_types
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    /// 返回类型，`None` 表示无返回值
    pub fn return_type(&self) -> Option<&TypeInfo> {
        self.return_type.as_ref()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.declaring_type, self.name)?;
        for (i, ty) in self.parameter_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", ty)?;
        }
        f.write_str(")")
    }
}

/// 错误类型描述，用于 after-throwing 通知的类型过滤
#[derive(Clone, Copy)]
pub struct ErrorType {
    name: &'static str,
    matcher: Option<fn(&(dyn Error + Send + Sync + 'static)) -> bool>,
}

fn error_is<E: Error + 'static>(error: &(dyn Error + Send + Sync + 'static)) -> bool {
    error.is::<E>()
}

impl ErrorType {
    /// 匹配任意错误
    pub fn any() -> Self {
        Self {
            name: "Error",
            matcher: None,
        }
    }

    /// 只匹配具体的错误类型 `E`
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            name: short_type_name(std::any::type_name::<E>()),
            matcher: Some(error_is::<E>),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matches(&self, error: &ThrownError) -> bool {
        match self.matcher {
            Some(matcher) => matcher(error.as_ref()),
            None => true,
        }
    }
}

impl PartialEq for ErrorType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.matcher.is_some() == other.matcher.is_some()
    }
}

impl Eq for ErrorType {}

impl Hash for ErrorType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorType({})", self.name)
    }
}

/// 通知方法的形参类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterType {
    /// 当前连接点
    JoinPoint,
    /// 可继续执行的连接点，仅环绕通知可用
    ProceedingJoinPoint,
    /// 连接点的静态部分
    StaticPart,
    /// 抛出的错误
    Error(ErrorType),
    /// 普通值
    Value(TypeInfo),
}

impl ParameterType {
    pub fn of<T: Any>() -> Self {
        ParameterType::Value(TypeInfo::of::<T>())
    }

    pub fn any() -> Self {
        ParameterType::Value(TypeInfo::any())
    }

    pub fn error() -> Self {
        ParameterType::Error(ErrorType::any())
    }

    pub fn error_of<E: Error + 'static>() -> Self {
        ParameterType::Error(ErrorType::of::<E>())
    }

    /// 是否是三种连接点类型之一
    pub fn is_join_point_like(&self) -> bool {
        matches!(
            self,
            ParameterType::JoinPoint | ParameterType::ProceedingJoinPoint | ParameterType::StaticPart
        )
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterType::JoinPoint => f.write_str("JoinPoint"),
            ParameterType::ProceedingJoinPoint => f.write_str("ProceedingJoinPoint"),
            ParameterType::StaticPart => f.write_str("JoinPoint.StaticPart"),
            ParameterType::Error(ty) => f.write_str(ty.name()),
            ParameterType::Value(ty) => write!(f, "{}", ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NotFound;

    impl fmt::Display for NotFound {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("not found")
        }
    }

    impl Error for NotFound {}

    #[test]
    fn test_type_info_names() {
        assert_eq!(TypeInfo::of::<String>().name(), "String");
        assert_eq!(TypeInfo::named("UserService").name(), "UserService");
        let ty = TypeInfo::named("UserServiceImpl").with_supertype("UserService");
        assert!(ty.is_assignable_to("UserService"));
        assert!(ty.is_assignable_to("Object"));
        assert!(!ty.is_assignable_to("OrderService"));
    }

    #[test]
    fn test_is_instance_uses_concrete_type() {
        let value: Value = Arc::new(String::from("x"));
        assert!(TypeInfo::of::<String>().is_instance(&value));
        assert!(!TypeInfo::of::<u32>().is_instance(&value));
        assert!(TypeInfo::any().is_instance(&value));
    }

    #[test]
    fn test_error_type_matching() {
        let thrown: ThrownError = Arc::new(NotFound);
        assert!(ErrorType::any().matches(&thrown));
        assert!(ErrorType::of::<NotFound>().matches(&thrown));
        assert!(!ErrorType::of::<std::fmt::Error>().matches(&thrown));
    }

    #[test]
    fn test_signature_display() {
        let sig = MethodSignature::new(TypeInfo::named("UserService"), "find")
            .with_parameter(TypeInfo::of::<String>())
            .with_parameter(TypeInfo::of::<u32>());
        assert_eq!(sig.to_string(), "UserService.find(String, u32)");
        assert_eq!(sig.parameter_count(), 2);
    }
}
