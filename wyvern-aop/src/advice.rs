//! 通知（Advice）定义
//!
//! 五种通知语义以显式的标签枚举表达，适配层据此把它们统一
//! 归一化为拦截器。前置/后置类通知只读地观察调用；只有环绕
//! 通知拿到可变的调用并自行决定是否推进链。

use std::sync::Arc;

use crate::error::{AopError, AopResult};
use crate::invocation::MethodInvocation;
use crate::method::ReturnValue;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdviceKind {
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出错误时执行）
    AfterThrowing,
}

impl AdviceKind {
    /// 同一声明来源内的优先级（值越小越靠前）
    pub fn precedence(self) -> u8 {
        match self {
            AdviceKind::Around => 0,
            AdviceKind::Before => 1,
            AdviceKind::After => 2,
            AdviceKind::AfterReturning => 3,
            AdviceKind::AfterThrowing => 4,
        }
    }
}

/// 环绕通知/拦截器 Trait
///
/// 拦截器自己决定是否调用 `invocation.proceed()` 继续链，
/// 不调用即短路，目标方法不会执行。
pub trait MethodInterceptor: Send + Sync {
    /// 通知名称
    fn name(&self) -> &str {
        "interceptor"
    }

    /// 执行拦截逻辑
    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue>;
}

/// 前置通知 Trait
///
/// 在目标方法执行前调用；返回错误会阻止目标执行并向调用方传播。
pub trait BeforeAdvice: Send + Sync {
    fn name(&self) -> &str {
        "before"
    }

    fn before(&self, invocation: &MethodInvocation) -> AopResult<()>;
}

/// 后置通知 Trait
///
/// 在目标方法执行后调用，无论成功还是失败。
pub trait AfterAdvice: Send + Sync {
    fn name(&self) -> &str {
        "after"
    }

    fn after(&self, invocation: &MethodInvocation);
}

/// 返回后通知 Trait
///
/// 仅在正常返回路径上调用；通知取得返回值的所有权，可以原样
/// 返还，也可以替换为新值。
pub trait AfterReturningAdvice: Send + Sync {
    fn name(&self) -> &str {
        "after-returning"
    }

    fn after_returning(
        &self,
        invocation: &MethodInvocation,
        value: ReturnValue,
    ) -> AopResult<ReturnValue>;
}

/// 异常通知 Trait
///
/// 仅在异常退出路径上调用；`handles` 按声明的错误类型过滤，
/// 默认匹配任何错误（通用错误类型）。
pub trait AfterThrowingAdvice: Send + Sync {
    fn name(&self) -> &str {
        "after-throwing"
    }

    /// 是否处理该错误
    fn handles(&self, _error: &AopError) -> bool {
        true
    }

    fn after_throwing(&self, invocation: &MethodInvocation, error: &AopError);
}

/// 通知：五种语义的显式标签枚举
#[derive(Clone)]
pub enum Advice {
    Around(Arc<dyn MethodInterceptor>),
    Before(Arc<dyn BeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
}

impl Advice {
    /// 通知类型
    pub fn kind(&self) -> AdviceKind {
        match self {
            Advice::Around(_) => AdviceKind::Around,
            Advice::Before(_) => AdviceKind::Before,
            Advice::After(_) => AdviceKind::After,
            Advice::AfterReturning(_) => AdviceKind::AfterReturning,
            Advice::AfterThrowing(_) => AdviceKind::AfterThrowing,
        }
    }

    /// 通知名称
    pub fn name(&self) -> &str {
        match self {
            Advice::Around(a) => a.name(),
            Advice::Before(a) => a.name(),
            Advice::After(a) => a.name(),
            Advice::AfterReturning(a) => a.name(),
            Advice::AfterThrowing(a) => a.name(),
        }
    }

    /// 由闭包创建前置通知
    pub fn before_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&MethodInvocation) -> AopResult<()> + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(FnBeforeAdvice {
            name: name.into(),
            f: Box::new(f),
        }))
    }

    /// 由闭包创建后置通知
    pub fn after_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&MethodInvocation) + Send + Sync + 'static,
    {
        Advice::After(Arc::new(FnAfterAdvice {
            name: name.into(),
            f: Box::new(f),
        }))
    }

    /// 由闭包创建返回后通知
    pub fn after_returning_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&MethodInvocation, ReturnValue) -> AopResult<ReturnValue> + Send + Sync + 'static,
    {
        Advice::AfterReturning(Arc::new(FnAfterReturningAdvice {
            name: name.into(),
            f: Box::new(f),
        }))
    }

    /// 由闭包创建异常通知（带错误过滤谓词）
    pub fn after_throwing_fn<F, H>(name: impl Into<String>, handles: H, f: F) -> Self
    where
        F: Fn(&MethodInvocation, &AopError) + Send + Sync + 'static,
        H: Fn(&AopError) -> bool + Send + Sync + 'static,
    {
        Advice::AfterThrowing(Arc::new(FnAfterThrowingAdvice {
            name: name.into(),
            handles: Box::new(handles),
            f: Box::new(f),
        }))
    }

    /// 由闭包创建环绕通知
    pub fn around_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut MethodInvocation) -> AopResult<ReturnValue> + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(FnAroundAdvice {
            name: name.into(),
            f: Box::new(f),
        }))
    }
}

impl std::fmt::Debug for Advice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Advice({:?}:{})", self.kind(), self.name())
    }
}

struct FnBeforeAdvice {
    name: String,
    f: Box<dyn Fn(&MethodInvocation) -> AopResult<()> + Send + Sync>,
}

impl BeforeAdvice for FnBeforeAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn before(&self, invocation: &MethodInvocation) -> AopResult<()> {
        (self.f)(invocation)
    }
}

struct FnAfterAdvice {
    name: String,
    f: Box<dyn Fn(&MethodInvocation) + Send + Sync>,
}

impl AfterAdvice for FnAfterAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn after(&self, invocation: &MethodInvocation) {
        (self.f)(invocation)
    }
}

struct FnAfterReturningAdvice {
    name: String,
    f: Box<dyn Fn(&MethodInvocation, ReturnValue) -> AopResult<ReturnValue> + Send + Sync>,
}

impl AfterReturningAdvice for FnAfterReturningAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn after_returning(
        &self,
        invocation: &MethodInvocation,
        value: ReturnValue,
    ) -> AopResult<ReturnValue> {
        (self.f)(invocation, value)
    }
}

struct FnAfterThrowingAdvice {
    name: String,
    handles: Box<dyn Fn(&AopError) -> bool + Send + Sync>,
    f: Box<dyn Fn(&MethodInvocation, &AopError) + Send + Sync>,
}

impl AfterThrowingAdvice for FnAfterThrowingAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, error: &AopError) -> bool {
        (self.handles)(error)
    }

    fn after_throwing(&self, invocation: &MethodInvocation, error: &AopError) {
        (self.f)(invocation, error)
    }
}

struct FnAroundAdvice {
    name: String,
    f: Box<dyn Fn(&mut MethodInvocation) -> AopResult<ReturnValue> + Send + Sync>,
}

impl MethodInterceptor for FnAroundAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue> {
        (self.f)(invocation)
    }
}
