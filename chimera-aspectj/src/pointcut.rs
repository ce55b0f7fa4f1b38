//! 切点（Pointcut）表达式
//!
//! 支持 AspectJ 表达式的一个子集：
//!
//! - `execution([修饰符] [返回类型] [类型.]方法名(参数))`
//! - `within(类型模式)`
//! - `args(p1, .., pn)`，参数可以是 `*`、`..`、类型名，或切点的形参名
//! - `&&` / `and`、`||` / `or`、`!` / `not`、括号
//! - 命名切点引用 `name()`（通过 [`AspectJExpressionPointcut::with_references`] 解析）
//!
//! 表达式在构造时解析，并推导出 [`ClassFilter`] 和 [`MethodMatcher`]。
//! `args` 会产生动态匹配器；形参名称和类型由参数绑定阶段写回（见
//! [`AspectJExpressionPointcut::set_parameters`]），调用时由
//! [`AspectJExpressionPointcut::match_join_point`] 捕获对应的实参。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AopError, AopResult};
use crate::matcher::{ClassFilter, MethodMatcher, NamePattern, Pointcut};
use crate::metadata::is_identifier;
use crate::types::{MethodSignature, ParameterType, TypeInfo, Value};

// ============================================================================
// 词法分析
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    /// 指示符或命名切点引用，`body` 是括号内的原文
    Call { name: String, body: String },
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    _ => {
                        while i < chars.len() && chars[i].is_whitespace() {
                            i += 1;
                        }
                        if chars.get(i) != Some(&'(') {
                            return Err(format!("expected '(' after '{}'", word));
                        }
                        let (body, next) = read_balanced(&chars, i)?;
                        tokens.push(Token::Call { name: word, body });
                        i = next;
                    }
                }
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

/// 从 `open`（指向 `(`）开始读取到匹配的 `)`，返回括号内文本和下一个位置
fn read_balanced(chars: &[char], open: usize) -> Result<(String, usize), String> {
    let mut depth = 0usize;
    for (offset, c) in chars[open..].iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let end = open + offset;
                    let body: String = chars[open + 1..end].iter().collect();
                    return Ok((body.trim().to_string(), end + 1));
                }
            }
            _ => {}
        }
    }
    Err("unbalanced parentheses".to_string())
}

// ============================================================================
// 语法树
// ============================================================================

/// 参数模式元素
#[derive(Debug, Clone, PartialEq, Eq)]
enum ArgPattern {
    /// `*`：任意一个参数
    Any,
    /// `..`：任意多个参数
    Ellipsis,
    /// 类型名模式，或者（仅 args 中）切点形参名
    Name(NamePattern),
}

fn parse_arg_patterns(body: &str) -> Result<Vec<ArgPattern>, String> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let patterns: Vec<ArgPattern> = body
        .split(',')
        .map(|p| match p.trim() {
            "*" => ArgPattern::Any,
            ".." => ArgPattern::Ellipsis,
            name => ArgPattern::Name(NamePattern::new(name)),
        })
        .collect();

    if patterns
        .iter()
        .any(|p| matches!(p, ArgPattern::Name(n) if n.as_str().is_empty()))
    {
        return Err(format!("empty parameter pattern in '({})'", body));
    }
    if patterns.iter().filter(|p| **p == ArgPattern::Ellipsis).count() > 1 {
        return Err(format!("at most one '..' is supported in '({})'", body));
    }
    Ok(patterns)
}

/// 将模式与 `len` 个参数对齐，返回每个非 `..` 模式对应的参数下标
fn align(patterns: &[ArgPattern], len: usize) -> Option<Vec<(&ArgPattern, usize)>> {
    match patterns.iter().position(|p| *p == ArgPattern::Ellipsis) {
        None => {
            if patterns.len() != len {
                return None;
            }
            Some(patterns.iter().zip(0..).collect())
        }
        Some(pos) => {
            let suffix = &patterns[pos + 1..];
            if pos + suffix.len() > len {
                return None;
            }
            let tail_start = len - suffix.len();
            let mut pairs: Vec<(&ArgPattern, usize)> = patterns[..pos].iter().zip(0..).collect();
            pairs.extend(suffix.iter().zip(tail_start..));
            Some(pairs)
        }
    }
}

#[derive(Debug, Clone)]
struct ExecutionPattern {
    source: String,
    return_type: NamePattern,
    declaring_type: Option<NamePattern>,
    method: NamePattern,
    params: Vec<ArgPattern>,
}

impl ExecutionPattern {
    fn parse(body: &str) -> Result<Self, String> {
        let open = body
            .find('(')
            .ok_or_else(|| format!("execution({}) has no parameter list", body))?;
        if !body.ends_with(')') {
            return Err(format!("execution({}) has an unterminated parameter list", body));
        }
        let params = parse_arg_patterns(&body[open + 1..body.len() - 1])?;

        let head: Vec<&str> = body[..open].split_whitespace().collect();
        let Some((qualified, rest)) = head.split_last() else {
            return Err(format!("execution({}) has no method name", body));
        };
        let modifiers = ["public", "protected", "private", "static", "final"];
        let return_type = rest
            .iter()
            .filter(|t| !modifiers.contains(*t))
            .last()
            .copied()
            .unwrap_or("*");

        let (declaring_type, method) = match qualified.rsplit_once('.') {
            Some((ty, method)) => {
                let simple = ty.rsplit('.').next().unwrap_or(ty);
                (Some(NamePattern::new(simple)), method)
            }
            None => (None, *qualified),
        };
        if method.is_empty() {
            return Err(format!("execution({}) has an empty method name", body));
        }

        Ok(Self {
            source: body.to_string(),
            return_type: NamePattern::new(return_type),
            declaring_type: declaring_type.filter(|p| !p.is_wildcard()),
            method: NamePattern::new(method),
            params,
        })
    }

    fn matches(&self, method: &MethodSignature, target: &TypeInfo) -> bool {
        if let Some(ty) = &self.declaring_type {
            if !ty.matches_type(target) && !ty.matches_type(method.declaring_type()) {
                return false;
            }
        }
        if !self.method.matches(method.name()) {
            return false;
        }
        if !self.return_type.is_wildcard() {
            let name = method.return_type().map_or("void", |t| t.name());
            if !self.return_type.matches(name) {
                return false;
            }
        }
        let declared = method.parameter_types();
        match align(&self.params, declared.len()) {
            Some(pairs) => pairs.into_iter().all(|(pattern, index)| match pattern {
                ArgPattern::Name(name) => name.matches_type(&declared[index]),
                _ => true,
            }),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Execution(ExecutionPattern),
    Within(NamePattern),
    Args { source: String, patterns: Vec<ArgPattern> },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

struct Parser<'r> {
    tokens: Vec<Token>,
    pos: usize,
    references: &'r HashMap<String, String>,
    resolving: &'r mut Vec<String>,
}

fn parse_expression(
    expression: &str,
    references: &HashMap<String, String>,
    resolving: &mut Vec<String>,
) -> Result<Node, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        references,
        resolving,
    };
    let node = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected token {:?}", parser.tokens[parser.pos]));
    }
    Ok(node)
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Node, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, String> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Node::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, String> {
        match self.next() {
            Some(Token::LParen) => {
                let node = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(node),
                    _ => Err("missing ')'".to_string()),
                }
            }
            Some(Token::Call { name, body }) => self.designator(&name, &body),
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn designator(&mut self, name: &str, body: &str) -> Result<Node, String> {
        match name {
            "execution" => Ok(Node::Execution(ExecutionPattern::parse(body)?)),
            "within" => {
                if body.is_empty() {
                    return Err("within() requires a type pattern".to_string());
                }
                let simple = body.rsplit('.').next().unwrap_or(body);
                Ok(Node::Within(NamePattern::new(simple)))
            }
            "args" => Ok(Node::Args {
                source: body.to_string(),
                patterns: parse_arg_patterns(body)?,
            }),
            reference if body.is_empty() => {
                let simple = reference.rsplit('.').next().unwrap_or(reference);
                let Some(expression) = self.references.get(simple) else {
                    return Err(format!("unsupported designator or unknown pointcut '{}()'", reference));
                };
                if self.resolving.iter().any(|r| r == simple) {
                    return Err(format!("circular pointcut reference '{}()'", simple));
                }
                self.resolving.push(simple.to_string());
                let node = parse_expression(expression, self.references, self.resolving);
                self.resolving.pop();
                node
            }
            other => Err(format!("unsupported pointcut designator '{}'", other)),
        }
    }
}

// ============================================================================
// 形参
// ============================================================================

/// 切点形参（由参数绑定阶段写入）
#[derive(Debug, Clone, Default)]
struct FormalParameters {
    names: Vec<String>,
    types: Vec<ParameterType>,
}

impl FormalParameters {
    fn type_of(&self, name: &str) -> Option<&ParameterType> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.types.get(i))
    }
}

fn accepts(parameter_type: &ParameterType, value: &Value) -> bool {
    match parameter_type {
        ParameterType::Value(ty) => ty.is_instance(value),
        _ => true,
    }
}

fn args_static_match(
    patterns: &[ArgPattern],
    formals: &FormalParameters,
    method: &MethodSignature,
) -> bool {
    let declared = method.parameter_types();
    match align(patterns, declared.len()) {
        Some(pairs) => pairs.into_iter().all(|(pattern, index)| match pattern {
            ArgPattern::Name(name) if formals.type_of(name.as_str()).is_none() => {
                name.matches_type(&declared[index])
            }
            _ => true,
        }),
        None => false,
    }
}

/// 按实参匹配 args，命中的形参写入 `bindings`
fn args_runtime_match(
    patterns: &[ArgPattern],
    formals: &FormalParameters,
    method: &MethodSignature,
    args: &[Value],
    mut bindings: Option<&mut HashMap<String, Value>>,
) -> bool {
    let Some(pairs) = align(patterns, args.len()) else {
        return false;
    };
    let declared = method.parameter_types();
    for (pattern, index) in pairs {
        let ArgPattern::Name(name) = pattern else {
            continue;
        };
        match formals.type_of(name.as_str()) {
            Some(formal_type) => {
                if !accepts(formal_type, &args[index]) {
                    return false;
                }
                if let Some(bindings) = bindings.as_deref_mut() {
                    bindings.insert(name.as_str().to_string(), args[index].clone());
                }
            }
            None => {
                let matches = declared
                    .get(index)
                    .map_or(false, |ty| name.matches_type(ty) && ty.is_instance(&args[index]));
                if !matches {
                    return false;
                }
            }
        }
    }
    true
}

// ============================================================================
// AspectJExpressionPointcut
// ============================================================================

/// 连接点匹配结果：切点捕获的变量
#[derive(Debug, Clone, Default)]
pub struct JoinPointMatch {
    bindings: HashMap<String, Value>,
}

impl JoinPointMatch {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// AspectJ 表达式切点
pub struct AspectJExpressionPointcut {
    expression: String,
    root: Node,
    class_filter: ClassFilter,
    method_matcher: MethodMatcher,
    formals: Arc<RwLock<FormalParameters>>,
}

impl AspectJExpressionPointcut {
    pub fn new(expression: impl Into<String>) -> AopResult<Self> {
        Self::with_references(expression, &HashMap::new())
    }

    /// 解析表达式，`references` 提供可以用 `name()` 引用的命名切点
    pub fn with_references(
        expression: impl Into<String>,
        references: &HashMap<String, String>,
    ) -> AopResult<Self> {
        let expression = expression.into();
        let mut resolving = Vec::new();
        let root = parse_expression(&expression, references, &mut resolving).map_err(|reason| {
            AopError::InvalidPointcut {
                expression: expression.clone(),
                reason,
            }
        })?;

        let formals = Arc::new(RwLock::new(FormalParameters::default()));
        let (class_filter, method_matcher) = derive(&root, &formals);
        tracing::trace!("Parsed pointcut '{}': {:?}", expression, method_matcher);

        Ok(Self {
            expression,
            root,
            class_filter,
            method_matcher,
            formals,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 写入切点形参名称和类型
    pub fn set_parameters(&self, names: Vec<String>, types: Vec<ParameterType>) {
        tracing::debug!("Pointcut '{}' formal parameters: {:?}", self.expression, names);
        let mut formals = self.formals.write();
        formals.names = names;
        formals.types = types;
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.formals.read().names.clone()
    }

    pub fn parameter_types(&self) -> Vec<ParameterType> {
        self.formals.read().types.clone()
    }

    /// 在一次调用上求值整个表达式；匹配时返回捕获的形参
    pub fn match_join_point(
        &self,
        method: &MethodSignature,
        target_type: &TypeInfo,
        args: &[Value],
    ) -> Option<JoinPointMatch> {
        let formals = self.formals.read();
        let mut bindings = HashMap::new();
        if evaluate(&self.root, &formals, method, target_type, args, &mut bindings) {
            tracing::trace!("Pointcut '{}' matched {} with {} binding(s)", self.expression, method, bindings.len());
            Some(JoinPointMatch { bindings })
        } else {
            None
        }
    }
}

fn evaluate(
    node: &Node,
    formals: &FormalParameters,
    method: &MethodSignature,
    target: &TypeInfo,
    args: &[Value],
    bindings: &mut HashMap<String, Value>,
) -> bool {
    match node {
        Node::Execution(pattern) => pattern.matches(method, target),
        Node::Within(pattern) => pattern.matches_type(target),
        Node::Args { patterns, .. } => {
            args_runtime_match(patterns, formals, method, args, Some(bindings))
        }
        Node::And(left, right) => {
            evaluate(left, formals, method, target, args, bindings)
                && evaluate(right, formals, method, target, args, bindings)
        }
        Node::Or(left, right) => {
            let mut scratch = HashMap::new();
            if evaluate(left, formals, method, target, args, &mut scratch) {
                bindings.extend(scratch);
                return true;
            }
            let mut scratch = HashMap::new();
            if evaluate(right, formals, method, target, args, &mut scratch) {
                bindings.extend(scratch);
                return true;
            }
            false
        }
        Node::Not(inner) => !evaluate(inner, formals, method, target, args, &mut HashMap::new()),
    }
}

/// 从语法树推导类型过滤器和方法匹配器
fn derive(node: &Node, formals: &Arc<RwLock<FormalParameters>>) -> (ClassFilter, MethodMatcher) {
    match node {
        Node::Execution(pattern) => {
            let class_filter = match &pattern.declaring_type {
                Some(ty) => ClassFilter::Pattern(ty.clone()),
                None => ClassFilter::True,
            };
            let key = format!("execution({})", pattern.source);
            let pattern = pattern.clone();
            let matcher = MethodMatcher::new_static(key, move |method, target| pattern.matches(method, target));
            (class_filter, matcher)
        }
        Node::Within(pattern) => (ClassFilter::Pattern(pattern.clone()), MethodMatcher::True),
        Node::Args { source, patterns } => {
            let static_patterns = patterns.clone();
            let static_formals = Arc::clone(formals);
            let runtime_patterns = patterns.clone();
            let runtime_formals = Arc::clone(formals);
            let matcher = MethodMatcher::dynamic(
                format!("args({})", source),
                move |method, _| args_static_match(&static_patterns, &static_formals.read(), method),
                move |method, _, args| {
                    args_runtime_match(&runtime_patterns, &runtime_formals.read(), method, args, None)
                },
            );
            (ClassFilter::True, matcher)
        }
        Node::And(left, right) => {
            let (cf1, mm1) = derive(left, formals);
            let (cf2, mm2) = derive(right, formals);
            (
                ClassFilter::intersection(cf1, cf2),
                MethodMatcher::intersection(mm1, mm2),
            )
        }
        Node::Or(left, right) => {
            let (cf1, mm1) = derive(left, formals);
            let (cf2, mm2) = derive(right, formals);
            let matcher = MethodMatcher::union_with_filters(mm1, cf1.clone(), mm2, cf2.clone());
            (ClassFilter::union(cf1, cf2), matcher)
        }
        Node::Not(inner) => {
            let (cf, mm) = derive(inner, formals);
            let matcher =
                MethodMatcher::intersection(MethodMatcher::Class(cf), mm).negate();
            (ClassFilter::True, matcher)
        }
    }
}

impl Pointcut for AspectJExpressionPointcut {
    fn class_filter(&self) -> &ClassFilter {
        &self.class_filter
    }

    fn method_matcher(&self) -> &MethodMatcher {
        &self.method_matcher
    }
}

impl fmt::Debug for AspectJExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectJExpressionPointcut")
            .field("expression", &self.expression)
            .field("parameter_names", &self.formals.read().names)
            .finish()
    }
}

impl fmt::Display for AspectJExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// 在 `args(...)` 中按类型模式处理的基本类型名称
const PRIMITIVE_TYPE_NAMES: &[&str] = &[
    "bool", "char", "str", "u8", "u16", "u32", "u64", "u128", "usize", "i8", "i16", "i32", "i64",
    "i128", "isize", "f32", "f64", "int", "long", "short", "byte", "float", "double", "boolean",
];

pub fn is_primitive_type_name(name: &str) -> bool {
    PRIMITIVE_TYPE_NAMES.contains(&name)
}

/// 提取表达式中 `args(...)` 里可能是变量名的标识符（小写开头、不是基本类型），按出现顺序
pub fn extract_binding_variables(expression: &str) -> Vec<String> {
    fn collect(tokens: &[Token], out: &mut Vec<String>) {
        for token in tokens {
            if let Token::Call { name, body } = token {
                if name == "args" {
                    for part in body.split(',').map(str::trim) {
                        let lowercase = part.chars().next().map_or(false, char::is_lowercase);
                        if lowercase
                            && is_identifier(part)
                            && !is_primitive_type_name(part)
                            && !out.iter().any(|v| v == part)
                        {
                            out.push(part.to_string());
                        }
                    }
                }
            }
        }
    }

    let mut variables = Vec::new();
    if let Ok(tokens) = tokenize(expression) {
        collect(&tokens, &mut variables);
    }
    variables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::can_apply;

    fn user_service() -> TypeInfo {
        TypeInfo::named("UserServiceImpl").with_supertype("UserService")
    }

    fn find_user() -> MethodSignature {
        MethodSignature::new(user_service(), "find_user")
            .with_parameter(TypeInfo::of::<String>())
            .returning(TypeInfo::named("User"))
    }

    fn save_order() -> MethodSignature {
        MethodSignature::new(TypeInfo::named("OrderService"), "save").with_parameter(TypeInfo::of::<u32>())
    }

    #[test]
    fn test_execution_matching() {
        let pc = AspectJExpressionPointcut::new("execution(* UserService.find*(..))").unwrap();
        assert!(can_apply(&pc, &find_user(), &user_service()));
        assert!(!can_apply(&pc, &save_order(), &TypeInfo::named("OrderService")));

        let typed = AspectJExpressionPointcut::new("execution(public User *(String))").unwrap();
        assert!(can_apply(&typed, &find_user(), &user_service()));
        let wrong_params = AspectJExpressionPointcut::new("execution(* find_user())").unwrap();
        assert!(!can_apply(&wrong_params, &find_user(), &user_service()));
    }

    #[test]
    fn test_void_return_type() {
        let method = MethodSignature::new(TypeInfo::named("S"), "run");
        let pc = AspectJExpressionPointcut::new("execution(void run())").unwrap();
        assert!(can_apply(&pc, &method, &TypeInfo::named("S")));
    }

    #[test]
    fn test_boolean_operators() {
        let pc = AspectJExpressionPointcut::new(
            "within(UserService) && !execution(* save*(..)) || within(OrderService) and not execution(* find*(..))",
        )
        .unwrap();
        assert!(can_apply(&pc, &find_user(), &user_service()));
        assert!(can_apply(&pc, &save_order(), &TypeInfo::named("OrderService")));

        let user_save = MethodSignature::new(user_service(), "save_user");
        assert!(!can_apply(&pc, &user_save, &user_service()));
    }

    #[test]
    fn test_or_is_class_filter_aware() {
        let pc = AspectJExpressionPointcut::new(
            "(within(OrderService) && execution(* save(..))) || (within(UserService) && execution(* find_user(..)))",
        )
        .unwrap();
        let user_save = MethodSignature::new(user_service(), "save").with_parameter(TypeInfo::of::<u32>());
        assert!(!can_apply(&pc, &user_save, &user_service()));
        assert!(can_apply(&pc, &save_order(), &TypeInfo::named("OrderService")));
    }

    #[test]
    fn test_args_binds_formal_parameters() {
        let pc = AspectJExpressionPointcut::new("execution(* find_user(..)) && args(name)").unwrap();
        assert!(pc.method_matcher().is_runtime());
        pc.set_parameters(vec!["name".to_string()], vec![ParameterType::of::<String>()]);

        let args: Vec<Value> = vec![Arc::new(String::from("alice")) as Value];
        let matched = pc.match_join_point(&find_user(), &user_service(), &args).unwrap();
        let bound = matched.get("name").and_then(|v| v.downcast_ref::<String>());
        assert_eq!(bound.map(String::as_str), Some("alice"));

        let wrong_type: Vec<Value> = vec![Arc::new(7u32) as Value];
        assert!(pc.match_join_point(&find_user(), &user_service(), &wrong_type).is_none());
        assert!(!pc
            .method_matcher()
            .matches_with_args(&find_user(), &user_service(), &wrong_type)
            .unwrap());
    }

    #[test]
    fn test_args_type_names_and_wildcards() {
        let pc = AspectJExpressionPointcut::new("args(u32, ..)").unwrap();
        assert!(can_apply(&pc, &save_order(), &TypeInfo::named("OrderService")));
        assert!(!can_apply(&pc, &find_user(), &user_service()));

        let any_two = AspectJExpressionPointcut::new("args(*, *)").unwrap();
        assert!(!can_apply(&any_two, &save_order(), &TypeInfo::named("OrderService")));
    }

    #[test]
    fn test_not_discards_bindings() {
        let pc = AspectJExpressionPointcut::new("!args(name)").unwrap();
        pc.set_parameters(vec!["name".to_string()], vec![ParameterType::of::<u32>()]);
        let args: Vec<Value> = vec![Arc::new(String::from("x")) as Value];
        let matched = pc.match_join_point(&find_user(), &user_service(), &args).unwrap();
        assert!(matched.is_empty());
    }

    #[test]
    fn test_invalid_expressions() {
        for expression in [
            "",
            "execution(* foo()",
            "call(* foo())",
            "within(A) &&",
            "execution(* foo(..)) $ within(A)",
            "args(.., ..)",
        ] {
            let result = AspectJExpressionPointcut::new(expression);
            assert!(
                matches!(result, Err(AopError::InvalidPointcut { .. })),
                "expected '{}' to be rejected",
                expression
            );
        }
    }

    #[test]
    fn test_named_references() {
        let mut references = HashMap::new();
        references.insert("services".to_string(), "within(*Service*)".to_string());
        references.insert("finders".to_string(), "services() && execution(* find*(..))".to_string());

        let pc = AspectJExpressionPointcut::with_references("finders()", &references).unwrap();
        assert!(can_apply(&pc, &find_user(), &user_service()));
        assert!(!can_apply(&pc, &save_order(), &TypeInfo::named("OrderService")));

        references.insert("loop".to_string(), "loop()".to_string());
        assert!(AspectJExpressionPointcut::with_references("loop()", &references).is_err());
        assert!(AspectJExpressionPointcut::new("unknown()").is_err());
    }

    #[test]
    fn test_extract_binding_variables() {
        assert_eq!(
            extract_binding_variables("execution(* bar(String)) && args(x, String, y, ..)"),
            vec!["x".to_string(), "y".to_string()]
        );
        assert!(extract_binding_variables("execution(* foo())").is_empty());
        assert_eq!(
            extract_binding_variables("args(id, u32, f64, flag)"),
            vec!["id".to_string(), "flag".to_string()]
        );
    }
}
