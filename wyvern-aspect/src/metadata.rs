//! 切面元数据模型
//!
//! 声明式切面由元数据描述：类型上的切面标记与实例化模型，方法上
//! 的通知标记与标记属性（切点表达式、参数名、returning/throwing）。
//! 元数据与通知体在注册时一起提供，工厂据此产出标准的顾问。

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use wyvern_aop::{
    AopError, AopResult, InterfaceDef, MethodBody, ReturnValue, Value,
};

use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};

/// 切面实例的统一表示
pub type AspectHandle = Arc<dyn Any + Send + Sync>;

/// 方法上的通知标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceMarker {
    Around,
    Before,
    After,
    AfterReturning,
    AfterThrowing,

    /// 命名切点声明：只提供表达式，本身不产出顾问
    Pointcut,
}

impl AdviceMarker {
    /// 同一切面内的排序优先级（值越小越靠前）
    pub fn precedence(self) -> u8 {
        match self {
            AdviceMarker::Around => 0,
            AdviceMarker::Before => 1,
            AdviceMarker::After => 2,
            AdviceMarker::AfterReturning => 3,
            AdviceMarker::AfterThrowing => 4,
            AdviceMarker::Pointcut => u8::MAX,
        }
    }
}

/// 通知标记的属性
#[derive(Debug, Clone, Default)]
pub struct MarkerAttributes {
    /// 切点表达式（`pointcut` 属性，优先于 `value`）
    pub pointcut: Option<String>,

    /// 切点表达式（`value` 属性）
    pub value: Option<String>,

    /// 显式声明的绑定参数名
    pub arg_names: Vec<String>,

    /// 接收返回值的参数名（仅返回后通知）
    pub returning: Option<String>,

    /// 接收错误的参数名（仅异常通知）
    pub throwing: Option<String>,
}

impl MarkerAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生效的切点表达式：`pointcut` 优先于 `value`
    pub fn expression(&self) -> Option<&str> {
        self.pointcut.as_deref().or(self.value.as_deref())
    }

    pub fn pointcut(mut self, expr: impl Into<String>) -> Self {
        self.pointcut = Some(expr.into());
        self
    }

    pub fn value(mut self, expr: impl Into<String>) -> Self {
        self.value = Some(expr.into());
        self
    }

    pub fn arg_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn returning(mut self, name: impl Into<String>) -> Self {
        self.returning = Some(name.into());
        self
    }

    pub fn throwing(mut self, name: impl Into<String>) -> Self {
        self.throwing = Some(name.into());
        self
    }
}

/// 通知体
///
/// 第一个参数是切面实例，其后是连接点视图与已绑定的实参。
/// 返回值与错误分别通过返回后/异常通知体的专用参数传递。
#[derive(Clone)]
pub enum AdviceBody {
    Around(
        Arc<
            dyn Fn(&AspectHandle, &mut ProceedingJoinPoint<'_>, &[Value]) -> AopResult<ReturnValue>
                + Send
                + Sync,
        >,
    ),
    Before(Arc<dyn Fn(&AspectHandle, &JoinPoint, &[Value]) -> AopResult<()> + Send + Sync>),
    After(Arc<dyn Fn(&AspectHandle, &JoinPoint, &[Value]) + Send + Sync>),
    AfterReturning(
        Arc<
            dyn Fn(&AspectHandle, &JoinPoint, &[Value], ReturnValue) -> AopResult<ReturnValue>
                + Send
                + Sync,
        >,
    ),
    AfterThrowing(Arc<dyn Fn(&AspectHandle, &JoinPoint, &[Value], &AopError) + Send + Sync>),
}

impl AdviceBody {
    /// 体与哪个标记相容
    pub fn marker(&self) -> AdviceMarker {
        match self {
            AdviceBody::Around(_) => AdviceMarker::Around,
            AdviceBody::Before(_) => AdviceMarker::Before,
            AdviceBody::After(_) => AdviceMarker::After,
            AdviceBody::AfterReturning(_) => AdviceMarker::AfterReturning,
            AdviceBody::AfterThrowing(_) => AdviceMarker::AfterThrowing,
        }
    }
}

/// 一个被标记的通知方法
#[derive(Clone)]
pub struct AdviceMethodSpec {
    /// 通知方法名
    pub method_name: String,

    /// 通知标记
    pub marker: AdviceMarker,

    /// 标记属性
    pub attrs: MarkerAttributes,

    /// 需要绑定的声明参数个数（不含前导连接点参数）
    pub param_count: usize,

    /// 通知体；命名切点声明没有体
    pub body: Option<AdviceBody>,

    /// 异常通知的错误类型过滤；缺省匹配任何错误
    pub error_filter: Option<Arc<dyn Fn(&AopError) -> bool + Send + Sync>>,
}

impl AdviceMethodSpec {
    pub fn new(method_name: impl Into<String>, marker: AdviceMarker) -> Self {
        Self {
            method_name: method_name.into(),
            marker,
            attrs: MarkerAttributes::default(),
            param_count: 0,
            body: None,
            error_filter: None,
        }
    }

    pub fn attrs(mut self, attrs: MarkerAttributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn param_count(mut self, count: usize) -> Self {
        self.param_count = count;
        self
    }

    pub fn body(mut self, body: AdviceBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn error_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&AopError) -> bool + Send + Sync + 'static,
    {
        self.error_filter = Some(Arc::new(filter));
        self
    }
}

impl std::fmt::Debug for AdviceMethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdviceMethodSpec")
            .field("method", &self.method_name)
            .field("marker", &self.marker)
            .field("params", &self.param_count)
            .finish()
    }
}

/// 切面实例化模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantiationModel {
    /// 单实例，立即可用
    Singleton,

    /// 每个被通知的目标对象一个实例
    PerTarget,

    /// 每个代理对象一个实例
    PerThis,

    /// 每个匹配类型一个实例
    PerTypeWithin,
}

impl InstantiationModel {
    /// 解析 per 子句关键字
    ///
    /// 控制流作用域的模型需要调用栈追踪，这里不支持，注册时
    /// 即报配置错误而不是静默降级。
    pub fn parse(keyword: &str) -> AopResult<Self> {
        match keyword {
            "singleton" => Ok(InstantiationModel::Singleton),
            "pertarget" => Ok(InstantiationModel::PerTarget),
            "perthis" => Ok(InstantiationModel::PerThis),
            "pertypewithin" => Ok(InstantiationModel::PerTypeWithin),
            "percflow" | "percflowbelow" => Err(AopError::config(format!(
                "instantiation model '{}' is not supported",
                keyword
            ))),
            other => Err(AopError::config(format!(
                "unknown instantiation model '{}'",
                other
            ))),
        }
    }

    pub fn is_singleton(self) -> bool {
        matches!(self, InstantiationModel::Singleton)
    }
}

/// 引入声明：为匹配的目标追加一个接口实现
#[derive(Clone)]
pub struct IntroductionSpec {
    /// 追加的接口
    pub interface: InterfaceDef,

    /// 限定目标类型的模式；缺省匹配任何类型
    pub type_pattern: Option<String>,

    /// 承载接口实现的委托实例
    pub delegate: AspectHandle,

    /// 接口方法名到委托方法体的映射
    pub bodies: HashMap<String, MethodBody>,
}

impl IntroductionSpec {
    pub fn new(interface: InterfaceDef, delegate: AspectHandle) -> Self {
        Self {
            interface,
            type_pattern: None,
            delegate,
            bodies: HashMap::new(),
        }
    }

    pub fn type_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.type_pattern = Some(pattern.into());
        self
    }

    /// 注册接口方法的委托实现
    pub fn method<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&(dyn Any + Send + Sync), &[Value]) -> Result<ReturnValue, anyhow::Error>
            + Send
            + Sync
            + 'static,
    {
        self.bodies.insert(name.into(), Arc::new(body));
        self
    }
}

/// 父切面信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentAspect {
    pub name: String,

    /// 父切面是否为具体（非抽象）切面
    pub is_concrete: bool,
}

/// 一个声明式切面的完整元数据
#[derive(Clone)]
pub struct AspectMetadata {
    name: String,
    type_name: String,
    is_aspect: bool,
    parent: Option<ParentAspect>,
    model: InstantiationModel,
    per_clause: Option<String>,
    advice_methods: Vec<AdviceMethodSpec>,
    pointcuts: HashMap<String, String>,
    introductions: Vec<IntroductionSpec>,
}

impl AspectMetadata {
    pub fn builder(name: impl Into<String>, type_name: impl Into<String>) -> AspectMetadataBuilder {
        AspectMetadataBuilder {
            metadata: AspectMetadata {
                name: name.into(),
                type_name: type_name.into(),
                is_aspect: true,
                parent: None,
                model: InstantiationModel::Singleton,
                per_clause: None,
                advice_methods: Vec::new(),
                pointcuts: HashMap::new(),
                introductions: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_aspect(&self) -> bool {
        self.is_aspect
    }

    pub fn parent(&self) -> Option<&ParentAspect> {
        self.parent.as_ref()
    }

    pub fn model(&self) -> InstantiationModel {
        self.model
    }

    /// 非单例模型的作用域切点表达式
    pub fn per_clause(&self) -> Option<&str> {
        self.per_clause.as_deref()
    }

    pub fn advice_methods(&self) -> &[AdviceMethodSpec] {
        &self.advice_methods
    }

    /// 按名称查找命名切点的表达式
    pub fn pointcut(&self, name: &str) -> Option<&str> {
        self.pointcuts.get(name).map(String::as_str)
    }

    pub fn introductions(&self) -> &[IntroductionSpec] {
        &self.introductions
    }
}

impl std::fmt::Debug for AspectMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AspectMetadata")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("model", &self.model)
            .field("advice_methods", &self.advice_methods.len())
            .field("introductions", &self.introductions.len())
            .finish()
    }
}

/// [`AspectMetadata`] 构建器
pub struct AspectMetadataBuilder {
    metadata: AspectMetadata,
}

impl AspectMetadataBuilder {
    /// 标记类型并未声明为切面（用于表达注册错误的场景）
    pub fn not_aspect(mut self) -> Self {
        self.metadata.is_aspect = false;
        self
    }

    pub fn parent(mut self, name: impl Into<String>, is_concrete: bool) -> Self {
        self.metadata.parent = Some(ParentAspect {
            name: name.into(),
            is_concrete,
        });
        self
    }

    pub fn model(mut self, model: InstantiationModel) -> Self {
        self.metadata.model = model;
        self
    }

    /// 非单例模型的作用域子句
    pub fn per_clause(mut self, expr: impl Into<String>) -> Self {
        self.metadata.per_clause = Some(expr.into());
        self
    }

    pub fn advice(mut self, spec: AdviceMethodSpec) -> Self {
        self.metadata.advice_methods.push(spec);
        self
    }

    /// 声明命名切点
    pub fn pointcut(mut self, name: impl Into<String>, expr: impl Into<String>) -> Self {
        self.metadata.pointcuts.insert(name.into(), expr.into());
        self
    }

    pub fn introduction(mut self, spec: IntroductionSpec) -> Self {
        self.metadata.introductions.push(spec);
        self
    }

    pub fn build(self) -> AspectMetadata {
        self.metadata
    }
}
