//! Wyvern AOP - 运行时方法拦截引擎
//!
//! 给定目标对象与一组声明式的通知规则，构建一个替身对象（代理）：
//! 每次调用时判定哪些通知适用，按确定的顺序围绕真实调用执行它们，
//! 并返回真实结果或被通知替换的结果。支持：
//! - 顾问/通知/切点数据模型
//! - 两种代理构建策略（接口代理与类代理）及其选择规则
//! - 按调用解析的拦截器链与运行时匹配器
//! - 冻结配置的固定链快速路径

pub mod adapter;
pub mod advice;
pub mod advisor;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod invocation;
pub mod method;
pub mod pointcut;
pub mod proxy;
pub mod target;

// 重新导出核心类型
pub use adapter::{AdviceAdapter, AdviceAdapterRegistry};
pub use advice::{
    Advice, AdviceKind, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice,
    MethodInterceptor,
};
pub use advisor::{Advisor, IntroductionAdvisor, PointcutAdvisor};
pub use chain::AdvisorChainFactory;
pub use config::ProxyConfig;
pub use context::{current_proxy, ExposedProxyGuard};
pub use error::{AopError, AopResult};
pub use invocation::{ChainEntry, MethodInvocation};
pub use method::{downcast, value, Args, MethodDescriptor, ReturnValue, Value};
pub use pointcut::{
    DynamicMethodMatcher, MethodMatcher, Pointcut, PointcutExpression, TypeFilter,
};
pub use proxy::{AopProxy, ClassProxy, InterfaceProxy, ProxyFactory, MARKER_INTERFACE};
pub use target::{
    EmptyTargetSource, InterfaceDef, MethodBody, PrototypeTargetSource, SingletonTargetSource,
    TargetClass, TargetClassBuilder, TargetInstance, TargetSource,
};

/// 预导入模块
pub mod prelude {
    pub use crate::adapter::{AdviceAdapter, AdviceAdapterRegistry};
    pub use crate::advice::*;
    pub use crate::advisor::{Advisor, IntroductionAdvisor, PointcutAdvisor};
    pub use crate::config::ProxyConfig;
    pub use crate::context::current_proxy;
    pub use crate::error::{AopError, AopResult};
    pub use crate::invocation::{ChainEntry, MethodInvocation};
    pub use crate::method::{downcast, value, Args, MethodDescriptor, ReturnValue, Value};
    pub use crate::pointcut::{Pointcut, PointcutExpression};
    pub use crate::proxy::{AopProxy, ProxyFactory};
    pub use crate::target::{
        InterfaceDef, SingletonTargetSource, TargetClass, TargetInstance, TargetSource,
    };
}
