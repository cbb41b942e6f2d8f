//! 连接点视图
//!
//! 通知方法透过连接点观察（或驱动）被拦截的调用。`JoinPoint` 是
//! 只读快照，所有通知类型都能拿到；`ProceedingJoinPoint` 独占底层
//! 调用的可变借用，只交给环绕通知，用于推进拦截器链。

use std::sync::Arc;

use wyvern_aop::{AopResult, Args, MethodDescriptor, MethodInvocation, ReturnValue, Value};

/// 连接点的静态部分：不随实参变化的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPart {
    /// 目标类型名
    pub target_type: String,

    /// 被拦截的方法名
    pub method_name: String,
}

impl StaticPart {
    /// `类型.方法` 形式的签名
    pub fn signature(&self) -> String {
        format!("{}.{}", self.target_type, self.method_name)
    }
}

/// 被拦截调用的只读快照
#[derive(Clone)]
pub struct JoinPoint {
    static_part: StaticPart,
    method: Arc<MethodDescriptor>,
    args: Args,
}

impl JoinPoint {
    /// 从一次调用构造快照
    pub fn from_invocation(invocation: &MethodInvocation) -> Self {
        Self {
            static_part: StaticPart {
                target_type: invocation.target_class().name().to_string(),
                method_name: invocation.method().name.clone(),
            },
            method: invocation.method().clone(),
            args: invocation.args().to_vec(),
        }
    }

    pub fn static_part(&self) -> &StaticPart {
        &self.static_part
    }

    pub fn target_type(&self) -> &str {
        &self.static_part.target_type
    }

    pub fn method_name(&self) -> &str {
        &self.static_part.method_name
    }

    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// 按位置取实参
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// `类型.方法(参数名…)` 形式的完整签名
    pub fn signature(&self) -> String {
        format!(
            "{}.{}({})",
            self.static_part.target_type,
            self.method.name,
            self.method.param_names.join(", ")
        )
    }
}

impl std::fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JoinPoint({})", self.signature())
    }
}

/// 可推进的连接点
///
/// 独占底层调用的可变借用，因此一个环绕通知同一时刻只能持有
/// 一个推进句柄；通知不调用 `proceed` 即短路整条链。
pub struct ProceedingJoinPoint<'a> {
    invocation: &'a mut MethodInvocation,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub fn new(invocation: &'a mut MethodInvocation) -> Self {
        Self { invocation }
    }

    /// 当前实参的只读快照
    pub fn join_point(&self) -> JoinPoint {
        JoinPoint::from_invocation(self.invocation)
    }

    pub fn method(&self) -> &Arc<MethodDescriptor> {
        self.invocation.method()
    }

    pub fn args(&self) -> &[Value] {
        self.invocation.args()
    }

    /// 以当前实参推进拦截器链
    pub fn proceed(&mut self) -> AopResult<ReturnValue> {
        self.invocation.proceed()
    }

    /// 替换实参后推进拦截器链
    ///
    /// 个数必须与被拦截方法一致，否则报调用不匹配错误。
    pub fn proceed_with(&mut self, args: Args) -> AopResult<ReturnValue> {
        self.invocation.set_args(args)?;
        self.invocation.proceed()
    }
}
