//! 拦截链
//!
//! [`AopProxy`] 为目标类型缓存每个方法的拦截器链，[`MethodInvocation`] 是链上的游标。
//! 调用上下文在链上显式传递，不使用线程局部变量。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::advisor::Advisor;
use crate::error::{AopError, AopResult};
use crate::joinpoint::JoinPointContext;
use crate::matcher::{can_apply, Pointcut};
use crate::pointcut::JoinPointMatch;
use crate::precedence::sort_by_precedence;
use crate::types::{MethodSignature, ThrownError, TypeInfo, Value};

/// 目标方法
pub type TargetFn<'a> = dyn Fn(&[Value]) -> Result<Option<Value>, ThrownError> + 'a;

/// 拦截链上的一个元素
#[derive(Debug, Clone)]
pub struct ChainElement {
    advisor: Arc<Advisor>,
    runtime: bool,
}

impl ChainElement {
    pub fn advisor(&self) -> &Arc<Advisor> {
        &self.advisor
    }

    /// 是否需要在每次调用时结合参数再次匹配
    pub fn is_runtime(&self) -> bool {
        self.runtime
    }
}

/// 一次方法调用在拦截链上的位置
pub struct MethodInvocation<'a> {
    method: &'a Arc<MethodSignature>,
    target_type: &'a TypeInfo,
    target: Option<&'a Value>,
    arguments: Vec<Value>,
    chain: &'a [ChainElement],
    index: usize,
    target_fn: &'a TargetFn<'a>,
}

impl<'a> MethodInvocation<'a> {
    pub fn new(
        method: &'a Arc<MethodSignature>,
        target_type: &'a TypeInfo,
        target: Option<&'a Value>,
        arguments: Vec<Value>,
        chain: &'a [ChainElement],
        target_fn: &'a TargetFn<'a>,
    ) -> Self {
        Self {
            method,
            target_type,
            target,
            arguments,
            chain,
            index: 0,
            target_fn,
        }
    }

    pub fn method(&self) -> &MethodSignature {
        self.method
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn target(&self) -> Option<&'a Value> {
        self.target
    }

    /// 当前调用的上下文（不含继续执行能力和捕获变量）
    pub fn context(&self) -> JoinPointContext<'static> {
        let context = JoinPointContext::new(
            Arc::clone(self.method),
            self.target_type.clone(),
            self.arguments.clone(),
        );
        match self.target {
            Some(target) => context.with_target(Arc::clone(target)),
            None => context,
        }
    }

    fn at(&self, index: usize, arguments: Vec<Value>) -> MethodInvocation<'a> {
        MethodInvocation {
            method: self.method,
            target_type: self.target_type,
            target: self.target,
            arguments,
            chain: self.chain,
            index,
            target_fn: self.target_fn,
        }
    }

    /// 执行链上的下一个拦截器，链尾调用目标方法
    pub fn proceed(&self) -> AopResult<Option<Value>> {
        self.at(self.index + 1, self.arguments.clone()).run()
    }

    /// 以替换后的参数继续
    pub fn proceed_with(&self, arguments: Vec<Value>) -> AopResult<Option<Value>> {
        if arguments.len() != self.arguments.len() {
            return Err(AopError::Usage(format!(
                "expected {} argument(s) to proceed with {}, got {}",
                self.arguments.len(),
                self.method,
                arguments.len()
            )));
        }
        self.at(self.index + 1, arguments).run()
    }

    /// 执行当前位置
    pub fn run(&self) -> AopResult<Option<Value>> {
        let Some(element) = self.chain.get(self.index) else {
            tracing::trace!("Invoking target {}", self.method);
            return (self.target_fn)(&self.arguments).map_err(AopError::Thrown);
        };

        let pointcut = element.advisor.pointcut();
        if element.runtime
            && !pointcut
                .method_matcher()
                .matches_with_args(self.method, self.target_type, &self.arguments)?
        {
            tracing::trace!(
                "Dynamic pointcut '{}' did not match {}; skipping",
                pointcut.expression(),
                self.method
            );
            return self.proceed();
        }

        let captured = match pointcut.match_join_point(self.method, self.target_type, &self.arguments) {
            Some(captured) => captured,
            None => {
                tracing::warn!(
                    "Pointcut '{}' was selected for {} but did not match its arguments; binding no variables",
                    pointcut.expression(),
                    self.method
                );
                JoinPointMatch::default()
            }
        };
        element.advisor.advice().intercept(self, captured)
    }
}

impl fmt::Debug for MethodInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.method.to_string())
            .field("index", &self.index)
            .field("chain_length", &self.chain.len())
            .finish()
    }
}

/// 目标类型的代理
pub struct AopProxy {
    target_type: TypeInfo,
    target: Option<Value>,
    advisors: Vec<Arc<Advisor>>,
    chains: RwLock<HashMap<MethodSignature, Arc<Vec<ChainElement>>>>,
}

impl AopProxy {
    /// 通知器按优先级排序
    pub fn new(target_type: TypeInfo, advisors: Vec<Arc<Advisor>>) -> Self {
        let advisors: Vec<Arc<Advisor>> = advisors
            .into_iter()
            .filter(|a| a.pointcut().class_filter().matches(&target_type))
            .collect();
        Self {
            target_type,
            target: None,
            advisors: sort_by_precedence(advisors),
            chains: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_target(mut self, target: Value) -> Self {
        self.target = Some(target);
        self
    }

    pub fn target_type(&self) -> &TypeInfo {
        &self.target_type
    }

    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    pub fn advisors(&self) -> &[Arc<Advisor>] {
        &self.advisors
    }

    /// 方法的拦截器链（静态匹配结果缓存）
    pub fn chain_for(&self, method: &MethodSignature) -> Arc<Vec<ChainElement>> {
        if let Some(chain) = self.chains.read().get(method) {
            return Arc::clone(chain);
        }

        let chain: Vec<ChainElement> = self
            .advisors
            .iter()
            .filter(|a| can_apply(a.pointcut().as_ref(), method, &self.target_type))
            .map(|a| ChainElement {
                advisor: Arc::clone(a),
                runtime: a.pointcut().method_matcher().is_runtime(),
            })
            .collect();
        tracing::debug!(
            "Built interceptor chain for {} with {} advisor(s)",
            method,
            chain.len()
        );

        let chain = Arc::new(chain);
        self.chains
            .write()
            .entry(method.clone())
            .or_insert_with(|| Arc::clone(&chain))
            .clone()
    }

    /// 通过拦截链调用目标方法
    pub fn invoke<F>(
        &self,
        method: &Arc<MethodSignature>,
        arguments: Vec<Value>,
        target_fn: F,
    ) -> AopResult<Option<Value>>
    where
        F: Fn(&[Value]) -> Result<Option<Value>, ThrownError>,
    {
        let chain = self.chain_for(method);
        let invocation = MethodInvocation::new(
            method,
            &self.target_type,
            self.target.as_ref(),
            arguments,
            &chain,
            &target_fn,
        );
        invocation.run()
    }
}

impl fmt::Debug for AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("target_type", &self.target_type.name())
            .field("advisors", &self.advisors.len())
            .field("cached_chains", &self.chains.read().len())
            .finish()
    }
}
