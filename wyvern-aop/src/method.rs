//! 方法元数据与调用值类型
//!
//! 引擎不依赖运行时反射，方法以显式的描述符表示，
//! 参数与返回值以 `Arc<dyn Any>` 传递，便于调用克隆与返回值替换。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 调用中传递的单个值（参数或返回值）
pub type Value = Arc<dyn Any + Send + Sync>;

/// 方法参数数组
pub type Args = Vec<Value>;

/// 方法返回值，`None` 表示无返回值（void/null）
pub type ReturnValue = Option<Value>;

/// 将任意值装箱为 [`Value`]
pub fn value<T: Any + Send + Sync>(v: T) -> Value {
    Arc::new(v)
}

/// 尝试从 [`Value`] 中取出具体类型的引用
pub fn downcast<T: Any + Send + Sync>(v: &Value) -> Option<&T> {
    v.downcast_ref::<T>()
}

/// 方法描述符
///
/// 描述目标类型上一个可代理方法的静态信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// 方法名称
    pub name: String,

    /// 参数名列表（按声明顺序）
    pub param_names: Vec<String>,

    /// 调用点是否期待一个返回值
    pub returns_value: bool,

    /// 声明的返回类型是否为目标自身类型（流式 API）
    pub returns_self: bool,

    /// 方法是否声明了可失败契约
    pub fallible: bool,

    /// 是否为 final 方法（子类代理下无法拦截）
    pub is_final: bool,
}

impl MethodDescriptor {
    /// 创建方法描述符，默认：有返回值、不返回自身、不可失败、非 final
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_names: Vec::new(),
            returns_value: true,
            returns_self: false,
            fallible: false,
            is_final: false,
        }
    }

    /// 设置参数名
    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// 声明方法没有返回值
    pub fn returns_unit(mut self) -> Self {
        self.returns_value = false;
        self
    }

    /// 声明方法返回目标自身类型
    pub fn returns_self(mut self) -> Self {
        self.returns_self = true;
        self
    }

    /// 声明方法可失败（错误属于其契约的一部分）
    pub fn fallible(mut self) -> Self {
        self.fallible = true;
        self
    }

    /// 标记为 final 方法
    pub fn final_method(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// 查找参数名对应的位置
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|p| p == name)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.param_names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let m = MethodDescriptor::new("greet").params(["name"]);
        assert!(m.returns_value);
        assert!(!m.returns_self);
        assert!(!m.fallible);
        assert_eq!(m.param_index("name"), Some(0));
        assert_eq!(m.param_index("other"), None);
    }

    #[test]
    fn test_value_roundtrip() {
        let v = value(42u32);
        assert_eq!(downcast::<u32>(&v), Some(&42));
        assert_eq!(downcast::<String>(&v), None);
    }

    #[test]
    fn test_display() {
        let m = MethodDescriptor::new("transfer").params(["from", "to"]);
        assert_eq!(m.to_string(), "transfer(from, to)");
    }
}
