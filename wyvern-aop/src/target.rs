//! 目标类型与目标来源
//!
//! `TargetClass` 是运行时子类生成的显式替代：以方法表的形式
//! 描述一个可被代理的具体类型。`TargetSource` 抽象目标实例的
//! 获取方式，引擎从不假设具体的对象创建机制。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AopError, AopResult};
use crate::method::{MethodDescriptor, ReturnValue, Value};

/// 目标实例的统一表示
pub type TargetInstance = Arc<dyn Any + Send + Sync>;

/// 方法体：接收目标实例与参数数组，返回结果或应用错误
pub type MethodBody =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &[Value]) -> Result<ReturnValue, anyhow::Error> + Send + Sync>;

/// 接口定义：名称加上它声明的方法名集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDef {
    /// 接口名称
    pub name: String,

    /// 接口声明的方法名
    pub methods: Vec<String>,
}

impl InterfaceDef {
    /// 创建接口定义
    pub fn new<I, S>(name: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }

    /// 接口是否声明了指定方法
    pub fn declares(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

/// 目标类型的运行时描述
///
/// 持有类型名、实现的接口、方法描述符与每个方法的可调用体。
pub struct TargetClass {
    name: String,
    sealed: bool,
    interfaces: Vec<InterfaceDef>,
    methods: Vec<Arc<MethodDescriptor>>,
    bodies: HashMap<String, MethodBody>,
}

impl TargetClass {
    /// 创建构建器
    pub fn builder(name: impl Into<String>) -> TargetClassBuilder {
        TargetClassBuilder {
            name: name.into(),
            sealed: false,
            interfaces: Vec::new(),
            methods: Vec::new(),
            bodies: HashMap::new(),
        }
    }

    /// 类型名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 类型是否不可被子类化（final）
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// 实现的接口
    pub fn interfaces(&self) -> &[InterfaceDef] {
        &self.interfaces
    }

    /// 所有方法描述符
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    /// 按名称查找方法
    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// 按名称查找方法体
    pub fn body(&self, name: &str) -> Option<&MethodBody> {
        self.bodies.get(name)
    }

    /// 方法是否由任一声明的接口暴露
    pub fn interface_declares(&self, method: &str) -> bool {
        self.interfaces.iter().any(|i| i.declares(method))
    }
}

impl fmt::Debug for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetClass")
            .field("name", &self.name)
            .field("sealed", &self.sealed)
            .field("interfaces", &self.interfaces)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// [`TargetClass`] 构建器
///
/// 重复的方法名在构建时立即报错，而不是等到首次调用。
pub struct TargetClassBuilder {
    name: String,
    sealed: bool,
    interfaces: Vec<InterfaceDef>,
    methods: Vec<Arc<MethodDescriptor>>,
    bodies: HashMap<String, MethodBody>,
}

impl TargetClassBuilder {
    /// 标记类型为不可子类化
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    /// 声明实现的接口
    pub fn interface<I, S>(mut self, name: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interfaces.push(InterfaceDef::new(name, methods));
        self
    }

    /// 注册方法及其可调用体
    pub fn method<F>(mut self, descriptor: MethodDescriptor, body: F) -> Self
    where
        F: Fn(&(dyn Any + Send + Sync), &[Value]) -> Result<ReturnValue, anyhow::Error>
            + Send
            + Sync
            + 'static,
    {
        self.bodies.insert(descriptor.name.clone(), Arc::new(body));
        self.methods.push(Arc::new(descriptor));
        self
    }

    /// 完成构建
    pub fn build(self) -> AopResult<Arc<TargetClass>> {
        let mut seen = std::collections::HashSet::new();
        for m in &self.methods {
            if !seen.insert(m.name.clone()) {
                return Err(AopError::config(format!(
                    "duplicate method '{}' on target class '{}'",
                    m.name, self.name
                )));
            }
        }
        for iface in &self.interfaces {
            for m in &iface.methods {
                if !seen.contains(m) {
                    return Err(AopError::config(format!(
                        "interface '{}' declares method '{}' not present on target class '{}'",
                        iface.name, m, self.name
                    )));
                }
            }
        }
        Ok(Arc::new(TargetClass {
            name: self.name,
            sealed: self.sealed,
            interfaces: self.interfaces,
            methods: self.methods,
            bodies: self.bodies,
        }))
    }
}

/// 目标来源
///
/// 引擎通过该抽象获取目标实例；`release_target` 供池化/原型来源回收实例。
pub trait TargetSource: Send + Sync {
    /// 目标的具体类型描述
    fn target_class(&self) -> &Arc<TargetClass>;

    /// 目标是否固定不变（每次调用返回同一实例）
    fn is_static(&self) -> bool {
        false
    }

    /// 来源背后是否真的存在目标实例
    fn has_target(&self) -> bool {
        true
    }

    /// 获取一个目标实例
    fn get_target(&self) -> AopResult<TargetInstance>;

    /// 归还目标实例
    fn release_target(&self, _target: TargetInstance) {}
}

/// 单例目标来源：固定持有同一个实例
pub struct SingletonTargetSource {
    class: Arc<TargetClass>,
    target: TargetInstance,
}

impl SingletonTargetSource {
    pub fn new(class: Arc<TargetClass>, target: TargetInstance) -> Self {
        Self { class, target }
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> &Arc<TargetClass> {
        &self.class
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> AopResult<TargetInstance> {
        Ok(self.target.clone())
    }
}

/// 原型目标来源：每次调用通过工厂闭包创建新实例
pub struct PrototypeTargetSource {
    class: Arc<TargetClass>,
    factory: Arc<dyn Fn() -> TargetInstance + Send + Sync>,
}

impl PrototypeTargetSource {
    pub fn new<F>(class: Arc<TargetClass>, factory: F) -> Self
    where
        F: Fn() -> TargetInstance + Send + Sync + 'static,
    {
        Self {
            class,
            factory: Arc::new(factory),
        }
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> &Arc<TargetClass> {
        &self.class
    }

    fn get_target(&self) -> AopResult<TargetInstance> {
        Ok((self.factory)())
    }
}

/// 空目标来源：仅有通知、没有真实目标的配置使用
///
/// 链走到终点时会得到配置错误，而不是悄悄返回空值。
pub struct EmptyTargetSource {
    class: Arc<TargetClass>,
}

impl EmptyTargetSource {
    pub fn new(class: Arc<TargetClass>) -> Self {
        Self { class }
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> &Arc<TargetClass> {
        &self.class
    }

    fn is_static(&self) -> bool {
        true
    }

    fn has_target(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<TargetInstance> {
        Err(AopError::config(format!(
            "target class '{}' has no backing target instance",
            self.class.name()
        )))
    }
}
