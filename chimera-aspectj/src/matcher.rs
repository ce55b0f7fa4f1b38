//! 匹配器代数
//!
//! [`ClassFilter`] 判断目标类型，[`MethodMatcher`] 判断方法。两者都可以通过
//! `union` / `intersection` / `negate` 组合。
//!
//! 方法匹配器分为静态和动态两类：静态匹配只看方法签名和目标类型，
//! 动态匹配在静态检查通过后，每次调用时再结合实际参数检查。
//! 静态匹配器不允许做运行时匹配，调用 [`MethodMatcher::matches_with_args`] 会返回
//! [`AopError::Usage`]。
//!
//! 组合匹配器的相等性按操作数判断（与操作数顺序无关），以支持上层的去重和缓存。
//! 自定义谓词无法比较闭包，因此以构造时给出的 key 作为身份。

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regex::Regex;

use crate::error::{AopError, AopResult};
use crate::types::{MethodSignature, TypeInfo, Value};

pub type TypePredicate = Arc<dyn Fn(&TypeInfo) -> bool + Send + Sync>;
pub type MethodPredicate = Arc<dyn Fn(&MethodSignature, &TypeInfo) -> bool + Send + Sync>;
pub type ArgumentsPredicate =
    Arc<dyn Fn(&MethodSignature, &TypeInfo, &[Value]) -> bool + Send + Sync>;

/// 多重集相等：两边操作数一一对应即可，不要求顺序
fn same_operands<T: PartialEq>(left: &[T], right: &[T]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut used = vec![false; right.len()];
    for item in left {
        let mut found = false;
        for (i, candidate) in right.iter().enumerate() {
            if !used[i] && item == candidate {
                used[i] = true;
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
    }
    true
}

/// 与顺序无关的哈希，与 [`same_operands`] 保持一致
fn hash_unordered<T: Hash, H: Hasher>(items: &[T], state: &mut H) {
    let combined = items
        .iter()
        .map(|item| {
            let mut hasher = DefaultHasher::new();
            item.hash(&mut hasher);
            hasher.finish()
        })
        .fold(0u64, u64::wrapping_add);
    items.len().hash(state);
    combined.hash(state);
}

// ============================================================================
// 名称模式
// ============================================================================

/// 简单的名称模式（支持 `*` 通配符）
///
/// - `*` - 匹配任意名称
/// - `User*` - 以 User 开头
/// - `*Service` - 以 Service 结尾
/// - `*Service*` - 包含 Service
#[derive(Clone)]
pub struct NamePattern {
    source: String,
    regex: Option<Regex>,
}

impl NamePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let source = pattern.into();
        let regex = if source != "*" && source.contains('*') {
            let escaped: Vec<String> = source.split('*').map(regex::escape).collect();
            Regex::new(&format!("^{}$", escaped.join(".*"))).ok()
        } else {
            None
        };
        Self { source, regex }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_wildcard(&self) -> bool {
        self.source == "*"
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.is_wildcard() {
            return true;
        }
        match &self.regex {
            Some(regex) => regex.is_match(name),
            None => !self.source.contains('*') && self.source == name,
        }
    }

    /// 匹配类型名称或其任一父类型名称
    pub fn matches_type(&self, ty: &TypeInfo) -> bool {
        self.matches(ty.name()) || ty.supertypes().any(|s| self.matches(s))
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for NamePattern {}

impl Hash for NamePattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

// ============================================================================
// ClassFilter
// ============================================================================

/// 类型过滤器
#[derive(Clone)]
pub enum ClassFilter {
    /// 匹配所有类型
    True,
    /// 类型名称完全相同
    Exact(String),
    /// 类型本身或声明的父类型名称相同
    Assignable(String),
    /// 名称模式匹配类型或其父类型
    Pattern(NamePattern),
    /// 自定义谓词，以 key 作为身份
    Custom { key: String, predicate: TypePredicate },
    Union(Vec<ClassFilter>),
    Intersection(Vec<ClassFilter>),
    Negate(Box<ClassFilter>),
}

impl ClassFilter {
    pub fn exact(name: impl Into<String>) -> Self {
        ClassFilter::Exact(name.into())
    }

    pub fn assignable(name: impl Into<String>) -> Self {
        ClassFilter::Assignable(name.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        ClassFilter::Pattern(NamePattern::new(pattern))
    }

    pub fn custom<F>(key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&TypeInfo) -> bool + Send + Sync + 'static,
    {
        ClassFilter::Custom {
            key: key.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// 任一过滤器匹配即匹配
    pub fn union(a: ClassFilter, b: ClassFilter) -> Self {
        ClassFilter::Union(vec![a, b])
    }

    pub fn union_all(filters: impl IntoIterator<Item = ClassFilter>) -> Self {
        ClassFilter::Union(filters.into_iter().collect())
    }

    /// 所有过滤器都匹配才匹配
    pub fn intersection(a: ClassFilter, b: ClassFilter) -> Self {
        ClassFilter::Intersection(vec![a, b])
    }

    pub fn intersection_all(filters: impl IntoIterator<Item = ClassFilter>) -> Self {
        ClassFilter::Intersection(filters.into_iter().collect())
    }

    pub fn negate(self) -> Self {
        ClassFilter::Negate(Box::new(self))
    }

    pub fn matches(&self, target: &TypeInfo) -> bool {
        match self {
            ClassFilter::True => true,
            ClassFilter::Exact(name) => target.name() == name,
            ClassFilter::Assignable(name) => target.is_assignable_to(name),
            ClassFilter::Pattern(pattern) => pattern.matches_type(target),
            ClassFilter::Custom { predicate, .. } => predicate(target),
            ClassFilter::Union(filters) => filters.iter().any(|f| f.matches(target)),
            ClassFilter::Intersection(filters) => filters.iter().all(|f| f.matches(target)),
            ClassFilter::Negate(filter) => !filter.matches(target),
        }
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        ClassFilter::True
    }
}

impl PartialEq for ClassFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ClassFilter::True, ClassFilter::True) => true,
            (ClassFilter::Exact(a), ClassFilter::Exact(b))
            | (ClassFilter::Assignable(a), ClassFilter::Assignable(b)) => a == b,
            (ClassFilter::Pattern(a), ClassFilter::Pattern(b)) => a == b,
            (ClassFilter::Custom { key: a, .. }, ClassFilter::Custom { key: b, .. }) => a == b,
            (ClassFilter::Union(a), ClassFilter::Union(b))
            | (ClassFilter::Intersection(a), ClassFilter::Intersection(b)) => same_operands(a, b),
            (ClassFilter::Negate(a), ClassFilter::Negate(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ClassFilter {}

impl Hash for ClassFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ClassFilter::True => {}
            ClassFilter::Exact(name) | ClassFilter::Assignable(name) => name.hash(state),
            ClassFilter::Pattern(pattern) => pattern.hash(state),
            ClassFilter::Custom { key, .. } => key.hash(state),
            ClassFilter::Union(filters) | ClassFilter::Intersection(filters) => {
                hash_unordered(filters, state)
            }
            ClassFilter::Negate(filter) => filter.hash(state),
        }
    }
}

impl fmt::Debug for ClassFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassFilter::True => write!(f, "ClassFilter.TRUE"),
            ClassFilter::Exact(name) => write!(f, "Exact({})", name),
            ClassFilter::Assignable(name) => write!(f, "Assignable({})", name),
            ClassFilter::Pattern(pattern) => write!(f, "Pattern({:?})", pattern),
            ClassFilter::Custom { key, .. } => write!(f, "Custom({})", key),
            ClassFilter::Union(filters) => write!(f, "Union{:?}", filters),
            ClassFilter::Intersection(filters) => write!(f, "Intersection{:?}", filters),
            ClassFilter::Negate(filter) => write!(f, "Negate({:?})", filter),
        }
    }
}

// ============================================================================
// MethodMatcher
// ============================================================================

/// 匹配器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    /// 只依赖方法签名和目标类型
    Static,
    /// 还需要每次调用的实际参数
    Dynamic,
}

/// 动态方法匹配器
#[derive(Clone)]
pub struct DynamicMatcher {
    key: String,
    static_check: MethodPredicate,
    runtime_check: ArgumentsPredicate,
    evaluations: Arc<AtomicUsize>,
}

impl DynamicMatcher {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 运行时检查被执行的次数（仅用于诊断）
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    fn evaluate(&self, method: &MethodSignature, target: &TypeInfo, args: &[Value]) -> bool {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        (self.runtime_check)(method, target, args)
    }
}

/// 并集匹配器；带类型过滤器时只在对应过滤器匹配目标类型时才咨询该操作数
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UnionMatcher {
    left: MethodMatcher,
    left_filter: Option<ClassFilter>,
    right: MethodMatcher,
    right_filter: Option<ClassFilter>,
}

impl UnionMatcher {
    fn left_applies(&self, target: &TypeInfo) -> bool {
        self.left_filter.as_ref().map_or(true, |f| f.matches(target))
    }

    fn right_applies(&self, target: &TypeInfo) -> bool {
        self.right_filter.as_ref().map_or(true, |f| f.matches(target))
    }

    pub fn is_class_filter_aware(&self) -> bool {
        self.left_filter.is_some() || self.right_filter.is_some()
    }
}

/// 方法匹配器
#[derive(Clone)]
pub enum MethodMatcher {
    /// 匹配所有方法
    True,
    /// 静态谓词，以 key 作为身份
    Static { key: String, predicate: MethodPredicate },
    /// 动态匹配器
    Dynamic(DynamicMatcher),
    /// 以类型过滤器作为方法匹配条件（静态）
    Class(ClassFilter),
    Union(Box<UnionMatcher>),
    Intersection(Box<MethodMatcher>, Box<MethodMatcher>),
    Negate(Box<MethodMatcher>),
}

impl MethodMatcher {
    pub fn new_static<F>(key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&MethodSignature, &TypeInfo) -> bool + Send + Sync + 'static,
    {
        MethodMatcher::Static {
            key: key.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// 按方法名模式匹配
    pub fn name(pattern: impl Into<String>) -> Self {
        let pattern = NamePattern::new(pattern);
        let key = format!("name({})", pattern.as_str());
        MethodMatcher::new_static(key, move |method, _| pattern.matches(method.name()))
    }

    /// 动态匹配器：`static_check` 总是先执行，通过后才会在调用时执行 `runtime_check`
    pub fn dynamic<S, R>(key: impl Into<String>, static_check: S, runtime_check: R) -> Self
    where
        S: Fn(&MethodSignature, &TypeInfo) -> bool + Send + Sync + 'static,
        R: Fn(&MethodSignature, &TypeInfo, &[Value]) -> bool + Send + Sync + 'static,
    {
        MethodMatcher::Dynamic(DynamicMatcher {
            key: key.into(),
            static_check: Arc::new(static_check),
            runtime_check: Arc::new(runtime_check),
            evaluations: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// 不感知类型过滤器的并集
    pub fn union(a: MethodMatcher, b: MethodMatcher) -> Self {
        MethodMatcher::Union(Box::new(UnionMatcher {
            left: a,
            left_filter: None,
            right: b,
            right_filter: None,
        }))
    }

    /// 感知类型过滤器的并集：`a` 只在 `a_filter` 匹配目标类型时参与，`b` 同理
    pub fn union_with_filters(
        a: MethodMatcher,
        a_filter: ClassFilter,
        b: MethodMatcher,
        b_filter: ClassFilter,
    ) -> Self {
        MethodMatcher::Union(Box::new(UnionMatcher {
            left: a,
            left_filter: Some(a_filter),
            right: b,
            right_filter: Some(b_filter),
        }))
    }

    pub fn intersection(a: MethodMatcher, b: MethodMatcher) -> Self {
        MethodMatcher::Intersection(Box::new(a), Box::new(b))
    }

    pub fn negate(self) -> Self {
        MethodMatcher::Negate(Box::new(self))
    }

    pub fn kind(&self) -> MatcherKind {
        if self.is_runtime() {
            MatcherKind::Dynamic
        } else {
            MatcherKind::Static
        }
    }

    /// 是否需要在调用时结合参数再次检查
    pub fn is_runtime(&self) -> bool {
        match self {
            MethodMatcher::True | MethodMatcher::Static { .. } | MethodMatcher::Class(_) => false,
            MethodMatcher::Dynamic(_) => true,
            MethodMatcher::Union(union) => union.left.is_runtime() || union.right.is_runtime(),
            MethodMatcher::Intersection(a, b) => a.is_runtime() || b.is_runtime(),
            MethodMatcher::Negate(inner) => inner.is_runtime(),
        }
    }

    /// 静态匹配，对动态匹配器也必须先执行
    pub fn matches(&self, method: &MethodSignature, target: &TypeInfo) -> bool {
        match self {
            MethodMatcher::True => true,
            MethodMatcher::Static { predicate, .. } => predicate(method, target),
            MethodMatcher::Dynamic(dynamic) => (dynamic.static_check)(method, target),
            MethodMatcher::Class(filter) => filter.matches(target),
            MethodMatcher::Union(union) => {
                (union.left_applies(target) && union.left.matches(method, target))
                    || (union.right_applies(target) && union.right.matches(method, target))
            }
            MethodMatcher::Intersection(a, b) => a.matches(method, target) && b.matches(method, target),
            // 取反的动态匹配器在静态阶段无法排除，交给运行时判断
            MethodMatcher::Negate(inner) => inner.is_runtime() || !inner.matches(method, target),
        }
    }

    /// 运行时匹配
    ///
    /// 只有动态匹配器（或包含动态操作数的组合）可以调用，静态匹配器返回 `Usage` 错误。
    pub fn matches_with_args(
        &self,
        method: &MethodSignature,
        target: &TypeInfo,
        args: &[Value],
    ) -> AopResult<bool> {
        if !self.is_runtime() {
            return Err(AopError::Usage(format!(
                "static method matcher {:?} cannot be evaluated against runtime arguments",
                self
            )));
        }
        Ok(self.evaluate(method, target, args))
    }

    /// 动态操作数使用运行时检查，静态操作数使用静态检查
    fn evaluate(&self, method: &MethodSignature, target: &TypeInfo, args: &[Value]) -> bool {
        match self {
            MethodMatcher::Dynamic(dynamic) => dynamic.evaluate(method, target, args),
            MethodMatcher::Union(union) => {
                (union.left_applies(target) && union.left.evaluate(method, target, args))
                    || (union.right_applies(target) && union.right.evaluate(method, target, args))
            }
            MethodMatcher::Intersection(a, b) => {
                // 两侧都要执行，不短路
                let left = a.evaluate(method, target, args);
                let right = b.evaluate(method, target, args);
                left && right
            }
            MethodMatcher::Negate(inner) => !inner.evaluate(method, target, args),
            other => other.matches(method, target),
        }
    }
}

impl Default for MethodMatcher {
    fn default() -> Self {
        MethodMatcher::True
    }
}

impl PartialEq for MethodMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MethodMatcher::True, MethodMatcher::True) => true,
            (MethodMatcher::Static { key: a, .. }, MethodMatcher::Static { key: b, .. }) => a == b,
            (MethodMatcher::Dynamic(a), MethodMatcher::Dynamic(b)) => a.key == b.key,
            (MethodMatcher::Class(a), MethodMatcher::Class(b)) => a == b,
            (MethodMatcher::Union(a), MethodMatcher::Union(b)) => {
                let left = [
                    (&a.left, &a.left_filter),
                    (&a.right, &a.right_filter),
                ];
                let right = [
                    (&b.left, &b.left_filter),
                    (&b.right, &b.right_filter),
                ];
                same_operands(&left, &right)
            }
            (MethodMatcher::Intersection(a1, a2), MethodMatcher::Intersection(b1, b2)) => {
                (a1 == b1 && a2 == b2) || (a1 == b2 && a2 == b1)
            }
            (MethodMatcher::Negate(a), MethodMatcher::Negate(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for MethodMatcher {}

impl Hash for MethodMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MethodMatcher::True => {}
            MethodMatcher::Static { key, .. } => key.hash(state),
            MethodMatcher::Dynamic(dynamic) => dynamic.key.hash(state),
            MethodMatcher::Class(filter) => filter.hash(state),
            MethodMatcher::Union(union) => hash_unordered(
                &[
                    (&union.left, &union.left_filter),
                    (&union.right, &union.right_filter),
                ],
                state,
            ),
            MethodMatcher::Intersection(a, b) => hash_unordered(&[a, b], state),
            MethodMatcher::Negate(inner) => inner.hash(state),
        }
    }
}

impl fmt::Debug for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMatcher::True => write!(f, "MethodMatcher.TRUE"),
            MethodMatcher::Static { key, .. } => write!(f, "Static({})", key),
            MethodMatcher::Dynamic(dynamic) => write!(f, "Dynamic({})", dynamic.key),
            MethodMatcher::Class(filter) => write!(f, "Class({:?})", filter),
            MethodMatcher::Union(union) => {
                if union.is_class_filter_aware() {
                    write!(
                        f,
                        "Union({:?} if {:?}, {:?} if {:?})",
                        union.left, union.left_filter, union.right, union.right_filter
                    )
                } else {
                    write!(f, "Union({:?}, {:?})", union.left, union.right)
                }
            }
            MethodMatcher::Intersection(a, b) => write!(f, "Intersection({:?}, {:?})", a, b),
            MethodMatcher::Negate(inner) => write!(f, "Negate({:?})", inner),
        }
    }
}

// ============================================================================
// Pointcut
// ============================================================================

/// 切点：类型过滤器与方法匹配器的组合
pub trait Pointcut: Send + Sync {
    fn class_filter(&self) -> &ClassFilter;

    fn method_matcher(&self) -> &MethodMatcher;
}

/// 静态判断切点是否可能作用于某个方法
pub fn can_apply(pointcut: &dyn Pointcut, method: &MethodSignature, target: &TypeInfo) -> bool {
    pointcut.class_filter().matches(target) && pointcut.method_matcher().matches(method, target)
}

/// 完整判断：静态检查通过后，动态匹配器再结合参数检查
pub fn matches_invocation(
    pointcut: &dyn Pointcut,
    method: &MethodSignature,
    target: &TypeInfo,
    args: &[Value],
) -> AopResult<bool> {
    if !can_apply(pointcut, method, target) {
        return Ok(false);
    }
    let matcher = pointcut.method_matcher();
    match matcher.kind() {
        MatcherKind::Static => Ok(true),
        MatcherKind::Dynamic => matcher.matches_with_args(method, target, args),
    }
}

/// 可组合的切点
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ComposablePointcut {
    class_filter: ClassFilter,
    method_matcher: MethodMatcher,
}

impl ComposablePointcut {
    pub fn new(class_filter: ClassFilter, method_matcher: MethodMatcher) -> Self {
        Self {
            class_filter,
            method_matcher,
        }
    }

    pub fn of(pointcut: &dyn Pointcut) -> Self {
        Self::new(
            pointcut.class_filter().clone(),
            pointcut.method_matcher().clone(),
        )
    }

    /// 并集；方法匹配器使用感知类型过滤器的并集，避免把一侧的方法套用到另一侧的类型上
    pub fn union(self, other: &dyn Pointcut) -> Self {
        let method_matcher = MethodMatcher::union_with_filters(
            self.method_matcher,
            self.class_filter.clone(),
            other.method_matcher().clone(),
            other.class_filter().clone(),
        );
        let class_filter = ClassFilter::union(self.class_filter, other.class_filter().clone());
        Self::new(class_filter, method_matcher)
    }

    pub fn intersection(self, other: &dyn Pointcut) -> Self {
        Self::new(
            ClassFilter::intersection(self.class_filter, other.class_filter().clone()),
            MethodMatcher::intersection(self.method_matcher, other.method_matcher().clone()),
        )
    }
}

impl Pointcut for ComposablePointcut {
    fn class_filter(&self) -> &ClassFilter {
        &self.class_filter
    }

    fn method_matcher(&self) -> &MethodMatcher {
        &self.method_matcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ty(name: &'static str) -> TypeInfo {
        TypeInfo::named(name)
    }

    fn method(owner: &'static str, name: &str) -> MethodSignature {
        MethodSignature::new(ty(owner), name)
    }

    fn arg(v: u32) -> Value {
        Arc::new(v)
    }

    /// 第一个参数大于阈值时匹配的动态匹配器
    fn first_arg_above(key: &str, threshold: u32) -> MethodMatcher {
        MethodMatcher::dynamic(
            key,
            |_, _| true,
            move |_, _, args| {
                args.first()
                    .and_then(|a| a.downcast_ref::<u32>())
                    .map_or(false, |v| *v > threshold)
            },
        )
    }

    #[test]
    fn test_class_filter_union_matches_either_side() {
        let union = ClassFilter::union(ClassFilter::exact("ClassA"), ClassFilter::exact("ClassB"));
        assert!(union.matches(&ty("ClassA")));
        assert!(union.matches(&ty("ClassB")));
        assert!(!union.matches(&ty("ClassC")));
    }

    #[test]
    fn test_class_filter_laws() {
        let filters = vec![
            ClassFilter::True,
            ClassFilter::exact("ClassA"),
            ClassFilter::assignable("Service"),
            ClassFilter::pattern("*Impl"),
            ClassFilter::custom("short-name", |t| t.name().len() < 7),
            ClassFilter::exact("ClassA").negate(),
        ];
        let types = vec![
            ty("ClassA"),
            ty("ClassB"),
            TypeInfo::named("UserServiceImpl").with_supertype("Service"),
            ty("Other"),
        ];

        for a in &filters {
            for b in &filters {
                let union = ClassFilter::union(a.clone(), b.clone());
                let intersection = ClassFilter::intersection(a.clone(), b.clone());
                for t in &types {
                    assert_eq!(union.matches(t), a.matches(t) || b.matches(t));
                    assert_eq!(intersection.matches(t), a.matches(t) && b.matches(t));
                }
                assert_eq!(union, ClassFilter::union(b.clone(), a.clone()));
                assert_eq!(intersection, ClassFilter::intersection(b.clone(), a.clone()));
            }
        }
    }

    #[test]
    fn test_composite_equality_and_hash() {
        let a = ClassFilter::union(ClassFilter::exact("A"), ClassFilter::pattern("B*"));
        let b = ClassFilter::union(ClassFilter::pattern("B*"), ClassFilter::exact("A"));
        let c = ClassFilter::union(ClassFilter::exact("A"), ClassFilter::pattern("C*"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, ClassFilter::intersection(ClassFilter::exact("A"), ClassFilter::pattern("B*")));

        let set: HashSet<ClassFilter> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);

        let m1 = MethodMatcher::union(MethodMatcher::name("get*"), MethodMatcher::name("find*"));
        let m2 = MethodMatcher::union(MethodMatcher::name("find*"), MethodMatcher::name("get*"));
        assert_eq!(m1, m2);
        let set: HashSet<MethodMatcher> = [m1, m2].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_name_pattern() {
        let pattern = NamePattern::new("get*");
        assert!(pattern.matches("get_user"));
        assert!(!pattern.matches("find_user"));
        assert!(NamePattern::new("*").matches("anything"));
        assert!(NamePattern::new("*Service*").matches("UserServiceImpl"));
        assert!(NamePattern::new("a.b").matches("a.b"));
        assert!(!NamePattern::new("a.b").matches("axb"));
    }

    #[test]
    fn test_static_matcher_rejects_runtime_evaluation() {
        let matcher = MethodMatcher::name("get*");
        assert_eq!(matcher.kind(), MatcherKind::Static);
        let result = matcher.matches_with_args(&method("S", "get"), &ty("S"), &[]);
        assert!(matches!(result, Err(AopError::Usage(_))));

        let composite = MethodMatcher::intersection(MethodMatcher::True, MethodMatcher::name("x"));
        assert!(composite
            .matches_with_args(&method("S", "x"), &ty("S"), &[])
            .is_err());
    }

    #[test]
    fn test_dynamic_flag_propagates() {
        let dynamic = first_arg_above("gt10", 10);
        assert!(MethodMatcher::union(MethodMatcher::True, dynamic.clone()).is_runtime());
        assert!(MethodMatcher::intersection(dynamic.clone(), MethodMatcher::True).is_runtime());
        assert!(!MethodMatcher::union(MethodMatcher::True, MethodMatcher::name("a")).is_runtime());
        assert_eq!(dynamic.kind(), MatcherKind::Dynamic);
    }

    #[test]
    fn test_dynamic_matcher_uses_arguments() {
        let matcher = first_arg_above("gt10", 10);
        let m = method("S", "run");
        assert!(matcher.matches(&m, &ty("S")));
        assert!(matcher.matches_with_args(&m, &ty("S"), &[arg(11)]).unwrap());
        assert!(!matcher.matches_with_args(&m, &ty("S"), &[arg(3)]).unwrap());
    }

    #[test]
    fn test_intersection_runtime_check_is_not_short_circuited() {
        let counted = first_arg_above("gt0", 0);
        let MethodMatcher::Dynamic(ref inner) = counted else {
            unreachable!()
        };
        let inner = inner.clone();

        // 左侧静态检查在运行时为 false，右侧动态检查仍然要执行
        let matcher = MethodMatcher::intersection(MethodMatcher::name("other"), counted.clone());
        let m = method("S", "run");
        let matched = matcher.matches_with_args(&m, &ty("S"), &[arg(5)]).unwrap();

        assert!(!matched);
        assert_eq!(inner.evaluations(), 1);
    }

    #[test]
    fn test_intersection_mixes_static_and_dynamic_operands() {
        let matcher = MethodMatcher::intersection(MethodMatcher::name("run"), first_arg_above("gt1", 1));
        let m = method("S", "run");
        assert!(matcher.matches_with_args(&m, &ty("S"), &[arg(2)]).unwrap());
        assert!(!matcher.matches_with_args(&m, &ty("S"), &[arg(1)]).unwrap());
    }

    #[test]
    fn test_class_filter_aware_union() {
        let aware = MethodMatcher::union_with_filters(
            MethodMatcher::name("save"),
            ClassFilter::exact("OrderService"),
            MethodMatcher::name("find"),
            ClassFilter::exact("UserService"),
        );
        let plain = MethodMatcher::union(MethodMatcher::name("save"), MethodMatcher::name("find"));

        let user = ty("UserService");
        assert!(aware.matches(&method("UserService", "find"), &user));
        assert!(!aware.matches(&method("UserService", "save"), &user));
        assert!(plain.matches(&method("UserService", "save"), &user));
        assert_ne!(aware, plain);
    }

    #[test]
    fn test_negate() {
        let not_get = MethodMatcher::name("get*").negate();
        assert!(not_get.matches(&method("S", "save"), &ty("S")));
        assert!(!not_get.matches(&method("S", "get_a"), &ty("S")));

        let not_dynamic = first_arg_above("gt10", 10).negate();
        let m = method("S", "run");
        assert!(not_dynamic.matches(&m, &ty("S")));
        assert!(not_dynamic.matches_with_args(&m, &ty("S"), &[arg(3)]).unwrap());
        assert!(!not_dynamic.matches_with_args(&m, &ty("S"), &[arg(30)]).unwrap());

        assert!(!ClassFilter::exact("A").negate().matches(&ty("A")));
    }

    #[test]
    fn test_composable_pointcut_union_keeps_sides_apart() {
        let orders = ComposablePointcut::new(ClassFilter::exact("OrderService"), MethodMatcher::name("save"));
        let users = ComposablePointcut::new(ClassFilter::exact("UserService"), MethodMatcher::name("find"));
        let both = orders.clone().union(&users);

        assert!(can_apply(&both, &method("OrderService", "save"), &ty("OrderService")));
        assert!(can_apply(&both, &method("UserService", "find"), &ty("UserService")));
        assert!(!can_apply(&both, &method("UserService", "save"), &ty("UserService")));

        let narrowed = orders.intersection(&ComposablePointcut::new(ClassFilter::True, MethodMatcher::name("s*")));
        assert!(can_apply(&narrowed, &method("OrderService", "save"), &ty("OrderService")));
    }

    #[test]
    fn test_matches_invocation() {
        let pc = ComposablePointcut::new(ClassFilter::True, first_arg_above("gt10", 10));
        let m = method("S", "run");
        assert!(matches_invocation(&pc, &m, &ty("S"), &[arg(20)]).unwrap());
        assert!(!matches_invocation(&pc, &m, &ty("S"), &[arg(2)]).unwrap());

        let static_pc = ComposablePointcut::new(ClassFilter::exact("S"), MethodMatcher::True);
        assert!(matches_invocation(&static_pc, &m, &ty("S"), &[]).unwrap());
        assert!(!matches_invocation(&static_pc, &m, &ty("T"), &[]).unwrap());
    }
}
