//! 顾问链解析
//!
//! 给定方法与目标类型，按顾问声明顺序产出适用的拦截器列表；
//! 运行时匹配器被包装为调用期判定的动态项。解析器自身从不重排，
//! 优先级排序必须发生在顾问注册之前。

use std::sync::Arc;

use crate::advisor::Advisor;
use crate::config::ProxyConfig;
use crate::error::AopResult;
use crate::invocation::ChainEntry;
use crate::method::MethodDescriptor;
use crate::target::TargetClass;

/// 顾问链工厂
pub struct AdvisorChainFactory;

impl AdvisorChainFactory {
    /// 解析某方法适用的拦截器链
    pub fn interception_chain(
        config: &ProxyConfig,
        method: &Arc<MethodDescriptor>,
        target_class: &Arc<TargetClass>,
    ) -> AopResult<Vec<ChainEntry>> {
        let method: &MethodDescriptor = method.as_ref();
        let advisors = config.advisors_snapshot();
        let registry = config.adapter_registry();
        let mut chain = Vec::with_capacity(advisors.len());

        for advisor in advisors.iter() {
            match advisor.as_ref() {
                Advisor::Pointcut(pa) => {
                    if !config.is_pre_filtered()
                        && !pa.pointcut().type_filter().matches_type(target_class)
                    {
                        continue;
                    }
                    let matcher = pa.pointcut().method_matcher();
                    if !matcher.matches(method, target_class) {
                        continue;
                    }
                    let interceptors = registry.interceptors(pa.advice())?;
                    if matcher.is_runtime() {
                        // 静态匹配已通过，实参判定延迟到 proceed 时
                        for interceptor in interceptors {
                            chain.push(ChainEntry::Dynamic {
                                interceptor,
                                matcher: matcher.clone(),
                            });
                        }
                    } else {
                        chain.extend(interceptors.into_iter().map(ChainEntry::Static));
                    }
                }
                Advisor::Introduction(ia) => {
                    // 引入型顾问只看类型过滤
                    if config.is_pre_filtered() || ia.type_filter().matches_type(target_class) {
                        chain.push(ChainEntry::Static(ia.interceptor().clone()));
                    }
                }
            }
        }

        tracing::trace!(
            method = %method.name,
            class = %target_class.name(),
            interceptors = chain.len(),
            "resolved interception chain"
        );
        Ok(chain)
    }
}
