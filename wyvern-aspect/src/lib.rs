//! Wyvern Aspect - 声明式切面层
//!
//! 在 `wyvern-aop` 引擎之上提供声明式切面：类型与方法的标记
//! 元数据被翻译为标准的顾问/切点/通知三元组。支持：
//! - 五种通知标记与命名切点引用
//! - 按名称的通知参数绑定（returning/throwing 专用参数）
//! - 单例与作用域实例化模型（per-target/per-this/per-type-within）
//! - 惰性切面实例工厂与并发安全的首次创建
//! - 引入声明（为目标追加接口实现）
//! - `inventory` 编译期切面登记

pub mod binding;
pub mod factory;
pub mod instance;
pub mod joinpoint;
pub mod metadata;
pub mod registry;

// 重新导出核心类型
pub use binding::{ParameterBinder, ParameterNameDiscoverer, StrictParameterNameDiscoverer};
pub use factory::AspectAdvisorFactory;
pub use instance::{
    AspectInstanceFactory, BeanAspectInstanceFactory, BeanResolver, LazyAspectInstanceFactory,
    PrototypeAspectInstanceFactory, SingletonAspectInstanceFactory,
};
pub use joinpoint::{JoinPoint, ProceedingJoinPoint, StaticPart};
pub use metadata::{
    AdviceBody, AdviceMarker, AdviceMethodSpec, AspectHandle, AspectMetadata,
    AspectMetadataBuilder, InstantiationModel, IntroductionSpec, MarkerAttributes, ParentAspect,
};
pub use registry::{AspectRegistration, AspectRegistry};

// 供编译期登记使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::binding::{ParameterNameDiscoverer, StrictParameterNameDiscoverer};
    pub use crate::factory::AspectAdvisorFactory;
    pub use crate::instance::{
        AspectInstanceFactory, LazyAspectInstanceFactory, SingletonAspectInstanceFactory,
    };
    pub use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
    pub use crate::metadata::{
        AdviceBody, AdviceMarker, AdviceMethodSpec, AspectHandle, AspectMetadata,
        InstantiationModel, MarkerAttributes,
    };
    pub use crate::registry::{AspectRegistration, AspectRegistry};
}
