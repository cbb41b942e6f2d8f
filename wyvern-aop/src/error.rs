//! 统一的错误类型
//!
//! 配置期错误与调用期错误使用同一个枚举，但语义上严格区分：
//! 配置错误在代理构建或注册时立即失败，调用期错误沿拦截器链向调用方传播。

use thiserror::Error;

/// AOP 引擎的错误类型
#[derive(Debug, Error)]
pub enum AopError {
    /// 配置错误（构建/注册时检测，致命）
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 通知参数绑定与实际方法不匹配（调用期发现的配置问题）
    #[error("advice invocation mismatch: {0}")]
    InvocationMismatch(String),

    /// 方法声明需要返回值，但链执行后没有产生任何值
    #[error("invalid return: method '{0}' requires a value but none was produced")]
    InvalidReturn(String),

    /// 未声明可失败的方法抛出了应用错误，包装后保留原方法契约
    #[error("undeclared failure escaped infallible method '{method}'")]
    UndeclaredFailure {
        method: String,
        #[source]
        source: anyhow::Error,
    },

    /// 目标方法或通知逻辑抛出的应用错误，原样传播
    #[error(transparent)]
    Application(#[from] anyhow::Error),
}

impl AopError {
    /// 创建配置错误
    pub fn config(message: impl Into<String>) -> Self {
        AopError::Configuration(message.into())
    }

    /// 判断是否为配置错误
    pub fn is_configuration(&self) -> bool {
        matches!(self, AopError::Configuration(_))
    }

    /// 获取底层应用错误（如果是应用错误）
    pub fn application(&self) -> Option<&anyhow::Error> {
        match self {
            AopError::Application(e) => Some(e),
            AopError::UndeclaredFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// AOP 引擎的 Result 别名
pub type AopResult<T> = std::result::Result<T, AopError>;
