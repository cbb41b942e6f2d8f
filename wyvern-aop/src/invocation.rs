//! 方法调用与拦截器链执行器
//!
//! `MethodInvocation` 是一次逻辑调用的具体化：持有目标、方法、
//! 实参与已解析的拦截器链，游标逐项推进，链走到末尾时直接
//! 分发到目标方法。

use std::collections::HashMap;
use std::sync::Arc;

use crate::advice::MethodInterceptor;
use crate::error::{AopError, AopResult};
use crate::method::{Args, MethodDescriptor, ReturnValue, Value};
use crate::pointcut::MethodMatcher;
use crate::target::{TargetClass, TargetInstance};

/// 已解析链中的一项
#[derive(Clone)]
pub enum ChainEntry {
    /// 静态匹配通过的拦截器
    Static(Arc<dyn MethodInterceptor>),

    /// 静态匹配通过、但需要在调用期针对实参再判定的拦截器
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    },
}

/// 一次逻辑方法调用
///
/// 单次使用：由发起调用的线程创建并独占，游标只被该线程推进。
/// 需要重复执行同一逻辑调用时使用 [`MethodInvocation::reinvocable_clone`]。
pub struct MethodInvocation {
    proxy: Option<Value>,
    target: Option<TargetInstance>,
    target_class: Arc<TargetClass>,
    method: Arc<MethodDescriptor>,
    args: Args,
    chain: Arc<Vec<ChainEntry>>,
    cursor: usize,
    attributes: HashMap<String, Value>,
}

impl MethodInvocation {
    /// 创建一次调用
    pub fn new(
        proxy: Option<Value>,
        target: Option<TargetInstance>,
        target_class: Arc<TargetClass>,
        method: Arc<MethodDescriptor>,
        args: Args,
        chain: Arc<Vec<ChainEntry>>,
    ) -> Self {
        Self {
            proxy,
            target,
            target_class,
            method,
            args,
            chain,
            cursor: 0,
            attributes: HashMap::new(),
        }
    }

    /// 当前方法
    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    /// 实参数组
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// 替换实参数组
    ///
    /// 个数必须与方法声明一致，否则视为调用不匹配。
    pub fn set_args(&mut self, args: Args) -> AopResult<()> {
        if args.len() != self.args.len() {
            return Err(AopError::InvocationMismatch(format!(
                "method '{}' expects {} argument(s), got {}",
                self.method.name,
                self.args.len(),
                args.len()
            )));
        }
        self.args = args;
        Ok(())
    }

    /// 目标类型
    pub fn target_class(&self) -> &Arc<TargetClass> {
        &self.target_class
    }

    /// 目标实例
    pub fn target(&self) -> Option<&TargetInstance> {
        self.target.as_ref()
    }

    /// 发起调用的代理
    pub fn proxy(&self) -> Option<&Value> {
        self.proxy.as_ref()
    }

    /// 设置调用属性（生命周期为本次逻辑调用）
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// 读取调用属性
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// 移除调用属性
    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// 推进拦截器链
    ///
    /// 游标位于链尾时直接分发目标方法；动态项在此处针对实参
    /// 求值，不匹配则跳过并继续推进。
    pub fn proceed(&mut self) -> AopResult<ReturnValue> {
        if self.cursor == self.chain.len() {
            return self.invoke_target();
        }

        let entry = self.chain[self.cursor].clone();
        self.cursor += 1;

        match entry {
            ChainEntry::Static(interceptor) => interceptor.invoke(self),
            ChainEntry::Dynamic {
                interceptor,
                matcher,
            } => {
                if matcher.matches_runtime(&self.method, &self.target_class, &self.args) {
                    interceptor.invoke(self)
                } else {
                    self.proceed()
                }
            }
        }
    }

    /// 直接分发目标方法（链的终点）
    fn invoke_target(&mut self) -> AopResult<ReturnValue> {
        let body = self
            .target_class
            .body(&self.method.name)
            .cloned()
            .ok_or_else(|| {
                AopError::config(format!(
                    "no body registered for method '{}' on '{}'",
                    self.method.name,
                    self.target_class.name()
                ))
            })?;
        let target = self.target.clone().ok_or_else(|| {
            AopError::config(format!(
                "no target instance available for method '{}'",
                self.method.name
            ))
        })?;

        body(target.as_ref(), &self.args).map_err(AopError::Application)
    }

    /// 克隆出一个可重新执行的调用
    ///
    /// 共享拦截器链，但拥有独立的实参数组与全新的游标，
    /// 支持带不同实参重复执行同一逻辑调用而无需重新解析链。
    pub fn reinvocable_clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
            target: self.target.clone(),
            target_class: self.target_class.clone(),
            method: self.method.clone(),
            args: self.args.clone(),
            chain: self.chain.clone(),
            cursor: 0,
            attributes: self.attributes.clone(),
        }
    }
}

impl std::fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("class", &self.target_class.name())
            .field("method", &self.method.name)
            .field("args", &self.args.len())
            .field("chain", &self.chain.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
