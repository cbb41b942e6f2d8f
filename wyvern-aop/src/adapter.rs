//! 通知适配层
//!
//! 把五种异构的通知语义归一化为统一的拦截器形式。适配器注册表
//! 是显式构造、随配置传递的对象，而不是进程级单例，便于扩展
//! 新的通知类型并避免跨测试的隐藏状态。

use std::sync::Arc;

use crate::advice::{
    Advice, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice, MethodInterceptor,
};
use crate::advisor::Advisor;
use crate::error::{AopError, AopResult};
use crate::invocation::MethodInvocation;
use crate::method::ReturnValue;

/// 通知适配器
///
/// 识别并包装自己支持的通知类型；不支持则返回 `None`，
/// 由注册表继续询问后续适配器。
pub trait AdviceAdapter: Send + Sync {
    fn adapt(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>>;
}

/// 通知适配器注册表
///
/// 持有一张有序、可扩展的适配器表。
pub struct AdviceAdapterRegistry {
    adapters: Vec<Arc<dyn AdviceAdapter>>,
}

impl AdviceAdapterRegistry {
    /// 创建带默认适配器的注册表
    pub fn with_defaults() -> Self {
        Self {
            adapters: vec![
                Arc::new(AroundAdviceAdapter),
                Arc::new(BeforeAdviceAdapter),
                Arc::new(AfterAdviceAdapter),
                Arc::new(AfterReturningAdviceAdapter),
                Arc::new(AfterThrowingAdviceAdapter),
            ],
        }
    }

    /// 创建空注册表
    pub fn empty() -> Self {
        Self { adapters: Vec::new() }
    }

    /// 追加适配器
    pub fn register(&mut self, adapter: Arc<dyn AdviceAdapter>) {
        self.adapters.push(adapter);
    }

    /// 把通知归一化为一个或多个拦截器
    ///
    /// 没有任何适配器认领该通知时报配置错误。
    pub fn interceptors(&self, advice: &Advice) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        let mut result = Vec::new();
        for adapter in &self.adapters {
            if let Some(interceptor) = adapter.adapt(advice) {
                result.push(interceptor);
            }
        }
        if result.is_empty() {
            return Err(AopError::config(format!(
                "no adapter registered for advice kind {:?}",
                advice.kind()
            )));
        }
        Ok(result)
    }

    /// 把裸通知包装为顾问（未指定切点即视为匹配一切）
    pub fn wrap(&self, advice: Advice) -> AopResult<Advisor> {
        // 先验证通知可被适配，错误在注册时暴露而不是首次调用时
        self.interceptors(&advice)?;
        Ok(Advisor::simple(advice))
    }
}

impl Default for AdviceAdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// 环绕通知本身就是拦截器，直接透传
struct AroundAdviceAdapter;

impl AdviceAdapter for AroundAdviceAdapter {
    fn adapt(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::Around(i) => Some(i.clone()),
            _ => None,
        }
    }
}

struct BeforeAdviceAdapter;

impl AdviceAdapter for BeforeAdviceAdapter {
    fn adapt(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::Before(a) => Some(Arc::new(BeforeAdviceInterceptor { advice: a.clone() })),
            _ => None,
        }
    }
}

struct AfterAdviceAdapter;

impl AdviceAdapter for AfterAdviceAdapter {
    fn adapt(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::After(a) => Some(Arc::new(AfterAdviceInterceptor { advice: a.clone() })),
            _ => None,
        }
    }
}

struct AfterReturningAdviceAdapter;

impl AdviceAdapter for AfterReturningAdviceAdapter {
    fn adapt(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::AfterReturning(a) => {
                Some(Arc::new(AfterReturningInterceptor { advice: a.clone() }))
            }
            _ => None,
        }
    }
}

struct AfterThrowingAdviceAdapter;

impl AdviceAdapter for AfterThrowingAdviceAdapter {
    fn adapt(&self, advice: &Advice) -> Option<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::AfterThrowing(a) => {
                Some(Arc::new(ThrowsAdviceInterceptor { advice: a.clone() }))
            }
            _ => None,
        }
    }
}

/// 前置通知拦截器：先执行通知逻辑，再无条件推进链
pub struct BeforeAdviceInterceptor {
    advice: Arc<dyn BeforeAdvice>,
}

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn name(&self) -> &str {
        self.advice.name()
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue> {
        self.advice.before(invocation)?;
        invocation.proceed()
    }
}

/// 后置通知拦截器：通知逻辑在所有退出路径上执行
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn name(&self) -> &str {
        self.advice.name()
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue> {
        let result = invocation.proceed();
        self.advice.after(invocation);
        result
    }
}

/// 返回后通知拦截器：仅在正常返回路径上绑定并可替换返回值
pub struct AfterReturningInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl MethodInterceptor for AfterReturningInterceptor {
    fn name(&self) -> &str {
        self.advice.name()
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue> {
        let value = invocation.proceed()?;
        self.advice.after_returning(invocation, value)
    }
}

/// 异常通知拦截器
///
/// 仅当错误通过通知的类型过滤时才执行通知逻辑；无论是否执行，
/// 错误都原样向上传播。
pub struct ThrowsAdviceInterceptor {
    advice: Arc<dyn AfterThrowingAdvice>,
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn name(&self) -> &str {
        self.advice.name()
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue> {
        match invocation.proceed() {
            Ok(value) => Ok(value),
            Err(error) => {
                if self.advice.handles(&error) {
                    self.advice.after_throwing(invocation, &error);
                }
                Err(error)
            }
        }
    }
}
