//! 顾问（Advisor）定义
//!
//! Advisor 把一个通知与一个切点绑定在一起，附带声明顺序与
//! 来源切面名。注册到代理配置后即视为不可变。

use std::fmt;
use std::sync::Arc;

use crate::advice::{Advice, MethodInterceptor};
use crate::pointcut::{Pointcut, TypeFilter};
use crate::target::InterfaceDef;

/// 切点型顾问：一个通知 + 一个切点
#[derive(Clone)]
pub struct PointcutAdvisor {
    pointcut: Pointcut,
    advice: Advice,
    order: i32,
    aspect_name: Option<String>,
}

impl PointcutAdvisor {
    pub fn new(pointcut: Pointcut, advice: Advice) -> Self {
        Self {
            pointcut,
            advice,
            order: 0,
            aspect_name: None,
        }
    }

    /// 设置声明顺序
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// 设置来源切面名（同一声明来源内的优先级依据）
    pub fn with_aspect_name(mut self, name: impl Into<String>) -> Self {
        self.aspect_name = Some(name.into());
        self
    }

    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }
}

/// 引入型顾问：只按类型过滤，为目标追加一个接口的实现
#[derive(Clone)]
pub struct IntroductionAdvisor {
    type_filter: Arc<dyn TypeFilter>,
    interface: InterfaceDef,
    interceptor: Arc<dyn MethodInterceptor>,
    order: i32,
    aspect_name: Option<String>,
}

impl IntroductionAdvisor {
    pub fn new(
        type_filter: Arc<dyn TypeFilter>,
        interface: InterfaceDef,
        interceptor: Arc<dyn MethodInterceptor>,
    ) -> Self {
        Self {
            type_filter,
            interface,
            interceptor,
            order: 0,
            aspect_name: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_aspect_name(mut self, name: impl Into<String>) -> Self {
        self.aspect_name = Some(name.into());
        self
    }

    pub fn type_filter(&self) -> &Arc<dyn TypeFilter> {
        &self.type_filter
    }

    pub fn interface(&self) -> &InterfaceDef {
        &self.interface
    }

    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        &self.interceptor
    }
}

/// 顾问
#[derive(Clone)]
pub enum Advisor {
    Pointcut(PointcutAdvisor),
    Introduction(IntroductionAdvisor),
}

impl Advisor {
    /// 恒真切点的便捷构造
    pub fn simple(advice: Advice) -> Self {
        Advisor::Pointcut(PointcutAdvisor::new(Pointcut::always(), advice))
    }

    /// 声明顺序
    pub fn order(&self) -> i32 {
        match self {
            Advisor::Pointcut(a) => a.order,
            Advisor::Introduction(a) => a.order,
        }
    }

    /// 来源切面名
    pub fn aspect_name(&self) -> Option<&str> {
        match self {
            Advisor::Pointcut(a) => a.aspect_name.as_deref(),
            Advisor::Introduction(a) => a.aspect_name.as_deref(),
        }
    }

    /// 顾问的行为签名
    ///
    /// 用于代理配置的等价性比较：通知类型 + 通知名 + 切点描述。
    pub fn signature(&self) -> String {
        match self {
            Advisor::Pointcut(a) => format!(
                "{:?}:{}@{}",
                a.advice.kind(),
                a.advice.name(),
                a.pointcut.description()
            ),
            Advisor::Introduction(a) => {
                format!("Introduction:{}@{}", a.interface.name, a.interceptor.name())
            }
        }
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advisor({})", self.signature())
    }
}
