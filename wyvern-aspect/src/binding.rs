//! 通知参数绑定
//!
//! 通知方法声明的绑定参数按名称对应到被拦截方法的实参。参数名
//! 的来源有二：标记属性里的显式声明，或参数名发现策略。绑定计划
//! 在构建顾问时校验完成；调用期只做按名取值。

use std::collections::HashSet;

use wyvern_aop::{AopError, AopResult, MethodDescriptor, Value};

use crate::metadata::AdviceMethodSpec;

/// 参数名发现策略
pub trait ParameterNameDiscoverer: Send + Sync {
    /// 尝试恢复通知方法的绑定参数名；无法确定时返回 `None`
    fn parameter_names(&self, spec: &AdviceMethodSpec) -> Option<Vec<String>>;
}

/// 严格策略：从不猜测
///
/// 参数名既未显式声明又无法发现时，注册立即失败，而不是靠
/// 位置猜测把错误留到运行期。
pub struct StrictParameterNameDiscoverer;

impl ParameterNameDiscoverer for StrictParameterNameDiscoverer {
    fn parameter_names(&self, _spec: &AdviceMethodSpec) -> Option<Vec<String>> {
        None
    }
}

/// 已校验的绑定计划
///
/// 构建时保证：名称数量与声明参数个数一致、无重名、
/// returning/throwing 名称确实在声明之列。
#[derive(Debug, Clone)]
pub struct ParameterBinder {
    names: Vec<String>,
    returning: Option<String>,
    throwing: Option<String>,
}

impl ParameterBinder {
    /// 为一个通知方法制定绑定计划
    pub fn plan(
        spec: &AdviceMethodSpec,
        discoverer: &dyn ParameterNameDiscoverer,
    ) -> AopResult<Self> {
        let names = if spec.param_count == 0 {
            Vec::new()
        } else if !spec.attrs.arg_names.is_empty() {
            spec.attrs.arg_names.clone()
        } else {
            discoverer.parameter_names(spec).ok_or_else(|| {
                AopError::config(format!(
                    "cannot determine parameter names for advice method '{}'",
                    spec.method_name
                ))
            })?
        };

        if names.len() != spec.param_count {
            return Err(AopError::config(format!(
                "advice method '{}' declares {} binding parameter(s) but {} name(s) were resolved",
                spec.method_name,
                spec.param_count,
                names.len()
            )));
        }

        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(AopError::config(format!(
                    "duplicate parameter name '{}' on advice method '{}'",
                    name, spec.method_name
                )));
            }
        }

        let returning = spec.attrs.returning.clone();
        if let Some(r) = &returning {
            if !names.iter().any(|n| n == r) {
                return Err(AopError::config(format!(
                    "returning parameter '{}' is not declared on advice method '{}'",
                    r, spec.method_name
                )));
            }
        }
        let throwing = spec.attrs.throwing.clone();
        if let Some(t) = &throwing {
            if !names.iter().any(|n| n == t) {
                return Err(AopError::config(format!(
                    "throwing parameter '{}' is not declared on advice method '{}'",
                    t, spec.method_name
                )));
            }
        }

        Ok(Self {
            names,
            returning,
            throwing,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 把被拦截方法的实参按名称绑定到通知参数
    ///
    /// returning/throwing 参数由通知体的专用形参传递，这里跳过。
    /// 名称在被拦截方法上不存在视为调用不匹配。
    pub fn bind(&self, method: &MethodDescriptor, args: &[Value]) -> AopResult<Vec<Value>> {
        let mut bound = Vec::with_capacity(self.names.len());
        for name in &self.names {
            if Some(name) == self.returning.as_ref() || Some(name) == self.throwing.as_ref() {
                continue;
            }
            let index = method.param_index(name).ok_or_else(|| {
                AopError::InvocationMismatch(format!(
                    "advised method '{}' has no parameter named '{}'",
                    method.name, name
                ))
            })?;
            let value = args.get(index).ok_or_else(|| {
                AopError::InvocationMismatch(format!(
                    "method '{}' received no argument for parameter '{}'",
                    method.name, name
                ))
            })?;
            bound.push(value.clone());
        }
        Ok(bound)
    }
}
