//! 切点（Pointcut）表达式系统
//!
//! 切点由类型过滤器与方法匹配器两个谓词组成。方法匹配器可以声明
//! 自己是运行时匹配器，此时还会在每次调用时针对实参再做一次判断。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::method::{MethodDescriptor, Value};
use crate::target::TargetClass;

/// 通配符模式的编译缓存；无法编译的模式记为 `None`，不再重试
static PATTERN_CACHE: Lazy<Mutex<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// 类型过滤器：决定切点是否适用于某个目标类型
pub trait TypeFilter: Send + Sync {
    fn matches_type(&self, class: &TargetClass) -> bool;
}

/// 方法匹配器
///
/// 静态匹配在链解析时进行；运行时匹配器（`is_runtime` 为 true）
/// 还会在 `proceed` 时针对实参求值。
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配
    fn matches(&self, method: &MethodDescriptor, class: &TargetClass) -> bool;

    /// 是否需要运行时匹配
    fn is_runtime(&self) -> bool {
        false
    }

    /// 运行时匹配（仅在静态匹配通过后调用）
    fn matches_runtime(&self, method: &MethodDescriptor, class: &TargetClass, args: &[Value]) -> bool {
        let _ = (method, class, args);
        true
    }
}

/// 切点：类型过滤器 + 方法匹配器
///
/// 一个方法只有在两个谓词（以及可能的运行时判断）都通过时才被通知。
#[derive(Clone)]
pub struct Pointcut {
    type_filter: Arc<dyn TypeFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
    description: String,
}

impl Pointcut {
    /// 由两个谓词组装切点
    pub fn new(
        type_filter: Arc<dyn TypeFilter>,
        method_matcher: Arc<dyn MethodMatcher>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            type_filter,
            method_matcher,
            description: description.into(),
        }
    }

    /// 恒真切点：匹配任何类型的任何方法
    pub fn always() -> Self {
        let expr = Arc::new(PointcutExpression::All);
        Pointcut {
            type_filter: expr.clone(),
            method_matcher: expr,
            description: "*".to_string(),
        }
    }

    /// 由切点表达式构造切点（表达式同时充当两个谓词）
    pub fn expression(expr: PointcutExpression) -> Self {
        let description = format!("{:?}", expr);
        let expr = Arc::new(expr);
        Pointcut {
            type_filter: expr.clone(),
            method_matcher: expr,
            description,
        }
    }

    /// 替换方法匹配器，保留类型过滤器
    pub fn with_method_matcher(mut self, matcher: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = matcher;
        self
    }

    pub fn type_filter(&self) -> &Arc<dyn TypeFilter> {
        &self.type_filter
    }

    pub fn method_matcher(&self) -> &Arc<dyn MethodMatcher> {
        &self.method_matcher
    }

    /// 切点的文本描述（用于日志与配置等价性比较）
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointcut({})", self.description)
    }
}

/// 切点表达式
///
/// 引擎将其视为不透明的模式匹配谓词；表达式本身支持通配符、
/// 正则与逻辑组合。
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配特定类型的所有方法
    TypePattern(String),

    /// 匹配特定方法名
    MethodPattern(String),

    /// 匹配特定类型的特定方法
    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: String,
        method_pattern: String,
    },

    /// 使用正则表达式匹配类型
    TypeRegex(Regex),

    /// 使用正则表达式匹配方法
    MethodRegex(Regex),

    /// 自定义匹配函数
    Custom(Arc<dyn Fn(&MethodDescriptor, &TargetClass) -> bool + Send + Sync>),

    /// 与运算（AND）
    And(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 或运算（OR）
    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 非运算（NOT）
    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 检查方法是否匹配
    pub fn matches_method(&self, method: &MethodDescriptor, class: &TargetClass) -> bool {
        match self {
            PointcutExpression::All => true,

            PointcutExpression::TypePattern(pattern) => Self::pattern_matches(pattern, class.name()),

            PointcutExpression::MethodPattern(pattern) => {
                Self::pattern_matches(pattern, &method.name)
            }

            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => {
                Self::pattern_matches(type_pattern, class.name())
                    && Self::pattern_matches(method_pattern, &method.name)
            }

            PointcutExpression::TypeRegex(regex) => regex.is_match(class.name()),

            PointcutExpression::MethodRegex(regex) => regex.is_match(&method.name),

            PointcutExpression::Custom(func) => func(method, class),

            PointcutExpression::And(left, right) => {
                left.matches_method(method, class) && right.matches_method(method, class)
            }

            PointcutExpression::Or(left, right) => {
                left.matches_method(method, class) || right.matches_method(method, class)
            }

            PointcutExpression::Not(expr) => !expr.matches_method(method, class),
        }
    }

    /// 表达式对类型层面是否可能匹配
    ///
    /// 仅按类型信息裁剪；无法静态判定的表达式一律返回 true，
    /// 把最终裁决留给方法匹配。
    pub fn matches_class(&self, class: &TargetClass) -> bool {
        match self {
            PointcutExpression::TypePattern(pattern) => Self::pattern_matches(pattern, class.name()),
            PointcutExpression::Execution { type_pattern, .. } => {
                Self::pattern_matches(type_pattern, class.name())
            }
            PointcutExpression::TypeRegex(regex) => regex.is_match(class.name()),
            PointcutExpression::And(left, right) => {
                left.matches_class(class) && right.matches_class(class)
            }
            PointcutExpression::Or(left, right) => {
                left.matches_class(class) || right.matches_class(class)
            }
            _ => true,
        }
    }

    /// 简单的模式匹配（支持 * 通配符）
    ///
    /// 支持的模式：
    /// - `*` - 匹配任意字符串
    /// - `User*` - 以 User 开头
    /// - `*Service` - 以 Service 结尾
    /// - `*Service*` - 包含 Service
    fn pattern_matches(pattern: &str, target: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        if !pattern.contains('*') {
            return pattern == target;
        }

        let mut cache = PATTERN_CACHE.lock().expect("pattern cache lock poisoned");
        let regex = cache.entry(pattern.to_string()).or_insert_with(|| {
            let regex_pattern = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
            Regex::new(&regex_pattern).ok()
        });
        regex.as_ref().map(|r| r.is_match(target)).unwrap_or(false)
    }

    /// 创建 execution 表达式
    ///
    /// 例如：execution("* UserService.get_user(..)")
    /// 格式：返回类型 类型名.方法名(参数)
    pub fn execution(expression: &str) -> Self {
        let parts: Vec<&str> = expression.split_whitespace().collect();

        if parts.len() < 2 {
            return PointcutExpression::All;
        }

        let method_part = parts[1];
        if let Some((type_pattern, method_pattern)) = method_part.split_once('.') {
            let method_pattern = method_pattern.trim_end_matches("(..)").trim_end_matches("()");

            PointcutExpression::Execution {
                type_pattern: type_pattern.to_string(),
                method_pattern: method_pattern.to_string(),
            }
        } else {
            PointcutExpression::MethodPattern(method_part.to_string())
        }
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }
}

impl TypeFilter for PointcutExpression {
    fn matches_type(&self, class: &TargetClass) -> bool {
        self.matches_class(class)
    }
}

impl MethodMatcher for PointcutExpression {
    fn matches(&self, method: &MethodDescriptor, class: &TargetClass) -> bool {
        self.matches_method(method, class)
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::TypePattern(p) => write!(f, "TypePattern({})", p),
            PointcutExpression::MethodPattern(p) => write!(f, "MethodPattern({})", p),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => write!(f, "Execution({}.{})", type_pattern, method_pattern),
            PointcutExpression::TypeRegex(r) => write!(f, "TypeRegex({})", r.as_str()),
            PointcutExpression::MethodRegex(r) => write!(f, "MethodRegex({})", r.as_str()),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 运行时方法匹配器
///
/// 在静态匹配之上追加一个针对实参的守卫；链解析会把命中的
/// 拦截器延迟为调用期判定。
pub struct DynamicMethodMatcher {
    static_part: Arc<dyn MethodMatcher>,
    guard: Arc<dyn Fn(&MethodDescriptor, &TargetClass, &[Value]) -> bool + Send + Sync>,
}

impl DynamicMethodMatcher {
    pub fn new<F>(static_part: Arc<dyn MethodMatcher>, guard: F) -> Self
    where
        F: Fn(&MethodDescriptor, &TargetClass, &[Value]) -> bool + Send + Sync + 'static,
    {
        Self {
            static_part,
            guard: Arc::new(guard),
        }
    }
}

impl MethodMatcher for DynamicMethodMatcher {
    fn matches(&self, method: &MethodDescriptor, class: &TargetClass) -> bool {
        self.static_part.matches(method, class)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_runtime(&self, method: &MethodDescriptor, class: &TargetClass, args: &[Value]) -> bool {
        (self.guard)(method, class, args)
    }
}
