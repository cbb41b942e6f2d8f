//! 切面顾问工厂
//!
//! 把切面元数据翻译为引擎的标准顾问：每个通知方法产出一个
//! 切点型顾问，每个引入声明产出一个引入型顾问。非单例实例化
//! 模型额外注入一个实例化拦截器，并给所有通知切点加上
//! "实例已创建" 的运行时门控。

use std::collections::HashMap;
use std::sync::Arc;

use wyvern_aop::{
    Advice, Advisor, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AopError, AopResult,
    BeforeAdvice, IntroductionAdvisor, InterfaceDef, MethodBody, MethodInterceptor,
    MethodInvocation, MethodMatcher, Pointcut, PointcutAdvisor, PointcutExpression, ReturnValue,
    TargetClass, TypeFilter, Value,
};

use crate::binding::{ParameterBinder, ParameterNameDiscoverer, StrictParameterNameDiscoverer};
use crate::instance::{AspectInstanceFactory, LazyAspectInstanceFactory};
use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
use crate::metadata::{
    AdviceBody, AdviceMarker, AdviceMethodSpec, AspectHandle, AspectMetadata,
};

/// 切面顾问工厂
pub struct AspectAdvisorFactory {
    discoverer: Arc<dyn ParameterNameDiscoverer>,
}

impl Default for AspectAdvisorFactory {
    fn default() -> Self {
        Self::new(Arc::new(StrictParameterNameDiscoverer))
    }
}

impl AspectAdvisorFactory {
    pub fn new(discoverer: Arc<dyn ParameterNameDiscoverer>) -> Self {
        Self { discoverer }
    }

    /// 校验类型能否作为切面使用
    pub fn validate(&self, meta: &AspectMetadata) -> AopResult<()> {
        if !meta.is_aspect() {
            return Err(AopError::config(format!(
                "type '{}' is not declared as an aspect",
                meta.type_name()
            )));
        }
        if let Some(parent) = meta.parent() {
            if parent.is_concrete {
                return Err(AopError::config(format!(
                    "aspect '{}' cannot extend concrete aspect '{}'",
                    meta.type_name(),
                    parent.name
                )));
            }
        }
        Ok(())
    }

    /// 把切面元数据翻译为顾问列表
    ///
    /// 通知按标记优先级、再按方法名排序，保证同一切面内确定的
    /// 执行顺序。命名切点声明不产出顾问。
    pub fn build_advisors(
        &self,
        meta: &AspectMetadata,
        instance_factory: Arc<dyn AspectInstanceFactory>,
    ) -> AopResult<Vec<Advisor>> {
        self.validate(meta)?;

        // 非单例模型：每次翻译都包一层新的惰性工厂，作用域实例互不共享
        let lazy = if meta.model().is_singleton() {
            None
        } else {
            Some(Arc::new(LazyAspectInstanceFactory::new(
                instance_factory.clone(),
            )))
        };
        let factory: Arc<dyn AspectInstanceFactory> = match &lazy {
            Some(l) => l.clone(),
            None => instance_factory,
        };

        let mut specs: Vec<&AdviceMethodSpec> = meta
            .advice_methods()
            .iter()
            .filter(|s| s.marker != AdviceMarker::Pointcut)
            .collect();
        specs.sort_by(|a, b| {
            a.marker
                .precedence()
                .cmp(&b.marker.precedence())
                .then_with(|| a.method_name.cmp(&b.method_name))
        });

        let mut advisors = Vec::new();
        let mut order = 0i32;

        // 作用域实例化拦截器：第一个匹配 per 子句的调用创建实例
        if let Some(lazy) = &lazy {
            let per_expr = match meta.per_clause() {
                Some(raw) => parse_expression(raw),
                None => PointcutExpression::All,
            };
            let interceptor: Arc<dyn MethodInterceptor> = Arc::new(AspectMaterializer {
                name: format!("{}::materialize", meta.name()),
                factory: lazy.clone(),
            });
            advisors.push(Advisor::Pointcut(
                PointcutAdvisor::new(Pointcut::expression(per_expr), Advice::Around(interceptor))
                    .with_order(order)
                    .with_aspect_name(meta.name()),
            ));
            order += 1;
        }

        for spec in specs {
            let expr = self.resolve_expression(spec, meta)?;
            let binder = ParameterBinder::plan(spec, self.discoverer.as_ref())?;
            let advice = self.advice_for(spec, meta, factory.clone(), binder)?;
            let pointcut = gated_pointcut(expr, lazy.as_ref());

            tracing::debug!(
                aspect = meta.name(),
                method = %spec.method_name,
                marker = ?spec.marker,
                "translated advice method"
            );
            advisors.push(Advisor::Pointcut(
                PointcutAdvisor::new(pointcut, advice)
                    .with_order(order)
                    .with_aspect_name(meta.name()),
            ));
            order += 1;
        }

        for intro in meta.introductions() {
            for method in &intro.interface.methods {
                if !intro.bodies.contains_key(method) {
                    return Err(AopError::config(format!(
                        "introduction '{}' on aspect '{}' lacks a delegate for method '{}'",
                        intro.interface.name,
                        meta.name(),
                        method
                    )));
                }
            }
            let type_filter: Arc<dyn TypeFilter> = match &intro.type_pattern {
                Some(p) => Arc::new(PointcutExpression::TypePattern(p.clone())),
                None => Arc::new(PointcutExpression::All),
            };
            let interceptor = Arc::new(DelegatingIntroductionInterceptor {
                name: format!("{}::{}", meta.name(), intro.interface.name),
                interface: intro.interface.clone(),
                delegate: intro.delegate.clone(),
                bodies: intro.bodies.clone(),
            });
            advisors.push(Advisor::Introduction(
                IntroductionAdvisor::new(type_filter, intro.interface.clone(), interceptor)
                    .with_order(order)
                    .with_aspect_name(meta.name()),
            ));
            order += 1;
        }

        tracing::info!(
            aspect = meta.name(),
            advisors = advisors.len(),
            model = ?meta.model(),
            "built advisors for aspect"
        );
        Ok(advisors)
    }

    /// 解析标记上的切点表达式
    ///
    /// 以 `()` 结尾的表达式视为对同一切面内命名切点的引用。
    fn resolve_expression(
        &self,
        spec: &AdviceMethodSpec,
        meta: &AspectMetadata,
    ) -> AopResult<PointcutExpression> {
        let raw = spec.attrs.expression().ok_or_else(|| {
            AopError::config(format!(
                "advice method '{}' on aspect '{}' declares no pointcut expression",
                spec.method_name,
                meta.name()
            ))
        })?;

        let resolved = match raw.strip_suffix("()") {
            Some(name) if !name.contains('(') => meta.pointcut(name).ok_or_else(|| {
                AopError::config(format!(
                    "unresolvable pointcut reference '{}' on aspect '{}'",
                    name,
                    meta.name()
                ))
            })?,
            _ => raw,
        };
        Ok(parse_expression(resolved))
    }

    fn advice_for(
        &self,
        spec: &AdviceMethodSpec,
        meta: &AspectMetadata,
        factory: Arc<dyn AspectInstanceFactory>,
        binder: ParameterBinder,
    ) -> AopResult<Advice> {
        let body = spec.body.clone().ok_or_else(|| {
            AopError::config(format!(
                "advice method '{}' on aspect '{}' has no body",
                spec.method_name,
                meta.name()
            ))
        })?;
        if body.marker() != spec.marker {
            return Err(AopError::config(format!(
                "advice method '{}' is marked {:?} but its body is {:?}",
                spec.method_name,
                spec.marker,
                body.marker()
            )));
        }

        let name = format!("{}::{}", meta.name(), spec.method_name);
        let advice = match body {
            AdviceBody::Around(f) => Advice::Around(Arc::new(AspectAroundAdvice {
                name,
                factory,
                binder,
                body: f,
            })),
            AdviceBody::Before(f) => Advice::Before(Arc::new(AspectBeforeAdvice {
                name,
                factory,
                binder,
                body: f,
            })),
            AdviceBody::After(f) => Advice::After(Arc::new(AspectAfterAdvice {
                name,
                factory,
                binder,
                body: f,
            })),
            AdviceBody::AfterReturning(f) => {
                Advice::AfterReturning(Arc::new(AspectAfterReturningAdvice {
                    name,
                    factory,
                    binder,
                    body: f,
                }))
            }
            AdviceBody::AfterThrowing(f) => {
                Advice::AfterThrowing(Arc::new(AspectAfterThrowingAdvice {
                    name,
                    factory,
                    binder,
                    body: f,
                    filter: spec.error_filter.clone(),
                }))
            }
        };
        Ok(advice)
    }
}

/// 表达式字符串到切点表达式的转换
fn parse_expression(raw: &str) -> PointcutExpression {
    let raw = raw.trim();
    if raw == "*" {
        return PointcutExpression::All;
    }
    if let Some(inner) = raw.strip_prefix("execution(").and_then(|r| r.strip_suffix(')')) {
        return PointcutExpression::execution(inner);
    }
    if let Some((type_pattern, method_pattern)) = raw.split_once('.') {
        return PointcutExpression::Execution {
            type_pattern: type_pattern.to_string(),
            method_pattern: method_pattern
                .trim_end_matches("(..)")
                .trim_end_matches("()")
                .to_string(),
        };
    }
    PointcutExpression::MethodPattern(raw.to_string())
}

/// 给切点加上实例化门控
///
/// 静态匹配不变；运行时再确认切面实例已创建，未创建的作用域
/// 实例不会被本次调用的通知观察到。
fn gated_pointcut(expr: PointcutExpression, lazy: Option<&Arc<LazyAspectInstanceFactory>>) -> Pointcut {
    let description = format!("{:?}", expr);
    let expr = Arc::new(expr);
    match lazy {
        Some(lazy) => Pointcut::new(
            expr.clone(),
            Arc::new(MaterializationGate {
                inner: expr,
                lazy: lazy.clone(),
            }),
            description,
        ),
        None => Pointcut::new(expr.clone(), expr, description),
    }
}

struct MaterializationGate {
    inner: Arc<PointcutExpression>,
    lazy: Arc<LazyAspectInstanceFactory>,
}

impl MethodMatcher for MaterializationGate {
    fn matches(&self, method: &wyvern_aop::MethodDescriptor, class: &TargetClass) -> bool {
        self.inner.matches_method(method, class)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_runtime(
        &self,
        _method: &wyvern_aop::MethodDescriptor,
        _class: &TargetClass,
        _args: &[Value],
    ) -> bool {
        self.lazy.is_materialized()
    }
}

/// 作用域实例化拦截器：确保匹配 per 子句的调用创建切面实例
struct AspectMaterializer {
    name: String,
    factory: Arc<LazyAspectInstanceFactory>,
}

impl MethodInterceptor for AspectMaterializer {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue> {
        self.factory.aspect_instance()?;
        invocation.proceed()
    }
}

/// 引入委托拦截器
///
/// 引入接口声明的方法分发到委托实例，其余方法原样放行。
struct DelegatingIntroductionInterceptor {
    name: String,
    interface: InterfaceDef,
    delegate: AspectHandle,
    bodies: HashMap<String, MethodBody>,
}

impl MethodInterceptor for DelegatingIntroductionInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue> {
        let method = &invocation.method().name;
        if self.interface.declares(method) {
            let body = self.bodies.get(method).ok_or_else(|| {
                AopError::config(format!(
                    "introduction '{}' has no delegate for method '{}'",
                    self.interface.name, method
                ))
            })?;
            return body(self.delegate.as_ref(), invocation.args())
                .map_err(AopError::Application);
        }
        invocation.proceed()
    }
}

struct AspectAroundAdvice {
    name: String,
    factory: Arc<dyn AspectInstanceFactory>,
    binder: ParameterBinder,
    body: Arc<
        dyn Fn(&AspectHandle, &mut ProceedingJoinPoint<'_>, &[Value]) -> AopResult<ReturnValue>
            + Send
            + Sync,
    >,
}

impl MethodInterceptor for AspectAroundAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, invocation: &mut MethodInvocation) -> AopResult<ReturnValue> {
        let instance = self.factory.aspect_instance()?;
        let bound = self.binder.bind(invocation.method(), invocation.args())?;
        let mut pjp = ProceedingJoinPoint::new(invocation);
        (self.body)(&instance, &mut pjp, &bound)
    }
}

struct AspectBeforeAdvice {
    name: String,
    factory: Arc<dyn AspectInstanceFactory>,
    binder: ParameterBinder,
    body: Arc<dyn Fn(&AspectHandle, &JoinPoint, &[Value]) -> AopResult<()> + Send + Sync>,
}

impl BeforeAdvice for AspectBeforeAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn before(&self, invocation: &MethodInvocation) -> AopResult<()> {
        let instance = self.factory.aspect_instance()?;
        let bound = self.binder.bind(invocation.method(), invocation.args())?;
        let jp = JoinPoint::from_invocation(invocation);
        (self.body)(&instance, &jp, &bound)
    }
}

struct AspectAfterAdvice {
    name: String,
    factory: Arc<dyn AspectInstanceFactory>,
    binder: ParameterBinder,
    body: Arc<dyn Fn(&AspectHandle, &JoinPoint, &[Value]) + Send + Sync>,
}

impl AfterAdvice for AspectAfterAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn after(&self, invocation: &MethodInvocation) {
        let instance = match self.factory.aspect_instance() {
            Ok(instance) => instance,
            Err(error) => {
                tracing::warn!(advice = %self.name, %error, "after advice skipped: no aspect instance");
                return;
            }
        };
        let bound = match self.binder.bind(invocation.method(), invocation.args()) {
            Ok(bound) => bound,
            Err(error) => {
                tracing::warn!(advice = %self.name, %error, "after advice skipped: binding failed");
                return;
            }
        };
        let jp = JoinPoint::from_invocation(invocation);
        (self.body)(&instance, &jp, &bound);
    }
}

struct AspectAfterReturningAdvice {
    name: String,
    factory: Arc<dyn AspectInstanceFactory>,
    binder: ParameterBinder,
    body: Arc<
        dyn Fn(&AspectHandle, &JoinPoint, &[Value], ReturnValue) -> AopResult<ReturnValue>
            + Send
            + Sync,
    >,
}

impl AfterReturningAdvice for AspectAfterReturningAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn after_returning(
        &self,
        invocation: &MethodInvocation,
        value: ReturnValue,
    ) -> AopResult<ReturnValue> {
        let instance = self.factory.aspect_instance()?;
        let bound = self.binder.bind(invocation.method(), invocation.args())?;
        let jp = JoinPoint::from_invocation(invocation);
        (self.body)(&instance, &jp, &bound, value)
    }
}

struct AspectAfterThrowingAdvice {
    name: String,
    factory: Arc<dyn AspectInstanceFactory>,
    binder: ParameterBinder,
    body: Arc<dyn Fn(&AspectHandle, &JoinPoint, &[Value], &AopError) + Send + Sync>,
    filter: Option<Arc<dyn Fn(&AopError) -> bool + Send + Sync>>,
}

impl AfterThrowingAdvice for AspectAfterThrowingAdvice {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, error: &AopError) -> bool {
        match &self.filter {
            Some(filter) => filter(error),
            None => true,
        }
    }

    fn after_throwing(&self, invocation: &MethodInvocation, error: &AopError) {
        let instance = match self.factory.aspect_instance() {
            Ok(instance) => instance,
            Err(e) => {
                tracing::warn!(advice = %self.name, error = %e, "throwing advice skipped: no aspect instance");
                return;
            }
        };
        let bound = match self.binder.bind(invocation.method(), invocation.args()) {
            Ok(bound) => bound,
            Err(e) => {
                tracing::warn!(advice = %self.name, error = %e, "throwing advice skipped: binding failed");
                return;
            }
        };
        let jp = JoinPoint::from_invocation(invocation);
        (self.body)(&instance, &jp, &bound, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{PrototypeAspectInstanceFactory, SingletonAspectInstanceFactory};
    use crate::metadata::{InstantiationModel, IntroductionSpec, MarkerAttributes};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wyvern_aop::{
        value, MethodDescriptor, ProxyConfig, ProxyFactory, SingletonTargetSource, TargetInstance,
    };

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn service_class() -> Arc<TargetClass> {
        TargetClass::builder("OrderService")
            .interface("Orders", ["place", "cancel"])
            .method(
                MethodDescriptor::new("place").params(["item"]),
                |_t, args| {
                    let item = args[0].downcast_ref::<String>().cloned().unwrap_or_default();
                    Ok(Some(value(format!("placed:{}", item))))
                },
            )
            .method(MethodDescriptor::new("cancel").params(["id"]), |_t, _a| {
                Ok(Some(value("cancelled".to_string())))
            })
            .build()
            .unwrap()
    }

    fn proxy_for(advisors: Vec<Advisor>) -> Arc<dyn wyvern_aop::AopProxy> {
        let target: TargetInstance = Arc::new(());
        let config = ProxyConfig::new(Arc::new(SingletonTargetSource::new(service_class(), target)));
        for advisor in advisors {
            config.add_advisor(advisor).unwrap();
        }
        ProxyFactory::new(config).create().unwrap()
    }

    fn singleton_factory(name: &str) -> Arc<dyn AspectInstanceFactory> {
        Arc::new(SingletonAspectInstanceFactory::new(
            name,
            Arc::new(()) as AspectHandle,
        ))
    }

    #[test]
    fn test_singleton_aspect_advises_proxy() {
        init_tracing();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let meta = AspectMetadata::builder("auditing", "AuditAspect")
            .advice(
                AdviceMethodSpec::new("record", AdviceMarker::Before)
                    .attrs(MarkerAttributes::new().value("*"))
                    .body(AdviceBody::Before(Arc::new(move |_aspect, jp, _bound| {
                        assert_eq!(jp.target_type(), "OrderService");
                        hits2.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }))),
            )
            .build();

        let advisors = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("auditing"))
            .unwrap();
        assert_eq!(advisors.len(), 1);

        let proxy = proxy_for(advisors);
        let out = proxy.call("place", vec![value("book".to_string())]).unwrap().unwrap();
        assert_eq!(out.downcast_ref::<String>().unwrap(), "placed:book");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_advice_sorted_by_marker_precedence() {
        let noop_after = AdviceBody::After(Arc::new(|_a, _jp, _b| {}));
        let noop_before = AdviceBody::Before(Arc::new(|_a, _jp, _b| Ok(())));
        let noop_around = AdviceBody::Around(Arc::new(|_a, pjp, _b| pjp.proceed()));

        let meta = AspectMetadata::builder("ordering", "OrderingAspect")
            .advice(
                AdviceMethodSpec::new("cleanup", AdviceMarker::After)
                    .attrs(MarkerAttributes::new().value("*"))
                    .body(noop_after),
            )
            .advice(
                AdviceMethodSpec::new("check", AdviceMarker::Before)
                    .attrs(MarkerAttributes::new().value("*"))
                    .body(noop_before),
            )
            .advice(
                AdviceMethodSpec::new("time", AdviceMarker::Around)
                    .attrs(MarkerAttributes::new().value("*"))
                    .body(noop_around),
            )
            .build();

        let advisors = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("ordering"))
            .unwrap();
        let signatures: Vec<String> = advisors.iter().map(|a| a.signature()).collect();
        assert!(signatures[0].starts_with("Around:"));
        assert!(signatures[1].starts_with("Before:"));
        assert!(signatures[2].starts_with("After:"));
    }

    #[test]
    fn test_named_pointcut_reference() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let meta = AspectMetadata::builder("placement", "PlacementAspect")
            .pointcut("placements", "execution(* OrderService.place(..))")
            .advice(
                AdviceMethodSpec::new("observe", AdviceMarker::Before)
                    .attrs(MarkerAttributes::new().pointcut("placements()"))
                    .body(AdviceBody::Before(Arc::new(move |_a, _jp, _b| {
                        hits2.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }))),
            )
            .build();

        let advisors = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("placement"))
            .unwrap();
        let proxy = proxy_for(advisors);

        proxy.call("place", vec![value("pen".to_string())]).unwrap();
        proxy.call("cancel", vec![value(1u64)]).unwrap();
        // 命名切点只命中 place，不命中 cancel
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unresolvable_pointcut_reference_rejected() {
        let meta = AspectMetadata::builder("broken", "BrokenAspect")
            .advice(
                AdviceMethodSpec::new("observe", AdviceMarker::Before)
                    .attrs(MarkerAttributes::new().pointcut("ghost()"))
                    .body(AdviceBody::Before(Arc::new(|_a, _jp, _b| Ok(())))),
            )
            .build();

        let err = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("broken"))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_expression_rejected() {
        let meta = AspectMetadata::builder("silent", "SilentAspect")
            .advice(
                AdviceMethodSpec::new("observe", AdviceMarker::Before)
                    .body(AdviceBody::Before(Arc::new(|_a, _jp, _b| Ok(())))),
            )
            .build();

        let err = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("silent"))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_body_marker_mismatch_rejected() {
        let meta = AspectMetadata::builder("mismatched", "MismatchedAspect")
            .advice(
                AdviceMethodSpec::new("observe", AdviceMarker::Before)
                    .attrs(MarkerAttributes::new().value("*"))
                    .body(AdviceBody::After(Arc::new(|_a, _jp, _b| {}))),
            )
            .build();

        let err = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("mismatched"))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate_rejects_non_aspect() {
        let meta = AspectMetadata::builder("plain", "PlainType").not_aspect().build();
        let err = AspectAdvisorFactory::default().validate(&meta).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate_rejects_concrete_parent() {
        let meta = AspectMetadata::builder("child", "ChildAspect")
            .parent("ParentAspect", true)
            .build();
        let err = AspectAdvisorFactory::default().validate(&meta).unwrap_err();
        assert!(err.is_configuration());

        let abstract_parent = AspectMetadata::builder("child", "ChildAspect")
            .parent("AbstractParent", false)
            .build();
        assert!(AspectAdvisorFactory::default().validate(&abstract_parent).is_ok());
    }

    struct CountingAspect {
        calls: AtomicUsize,
    }

    #[test]
    fn test_per_target_instances_are_independent() {
        let instances: Arc<Mutex<Vec<Arc<CountingAspect>>>> = Arc::new(Mutex::new(Vec::new()));
        let instances2 = instances.clone();
        let creator = Arc::new(PrototypeAspectInstanceFactory::new("counting", move || {
            let aspect = Arc::new(CountingAspect {
                calls: AtomicUsize::new(0),
            });
            instances2.lock().unwrap().push(aspect.clone());
            aspect as AspectHandle
        }));

        let meta = AspectMetadata::builder("counting", "CountingAspect")
            .model(InstantiationModel::PerTarget)
            .advice(
                AdviceMethodSpec::new("count", AdviceMarker::Before)
                    .attrs(MarkerAttributes::new().value("*"))
                    .body(AdviceBody::Before(Arc::new(|aspect, _jp, _b| {
                        let counting = aspect
                            .downcast_ref::<CountingAspect>()
                            .ok_or_else(|| AopError::config("wrong aspect instance type"))?;
                        counting.calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }))),
            )
            .build();

        // 每个目标各翻译一次：作用域实例互不共享
        let factory = AspectAdvisorFactory::default();
        let first = proxy_for(factory.build_advisors(&meta, creator.clone()).unwrap());
        let second = proxy_for(factory.build_advisors(&meta, creator).unwrap());

        first.call("place", vec![value("a".to_string())]).unwrap();
        first.call("place", vec![value("b".to_string())]).unwrap();
        second.call("place", vec![value("c".to_string())]).unwrap();

        let instances = instances.lock().unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].calls.load(Ordering::SeqCst), 2);
        assert_eq!(instances[1].calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_aspect_materializes_on_first_call() {
        let meta = AspectMetadata::builder("scoped", "ScopedAspect")
            .model(InstantiationModel::PerTarget)
            .advice(
                AdviceMethodSpec::new("observe", AdviceMarker::Before)
                    .attrs(MarkerAttributes::new().value("*"))
                    .body(AdviceBody::Before(Arc::new(|_a, _jp, _b| Ok(())))),
            )
            .build();

        let creator = Arc::new(PrototypeAspectInstanceFactory::new("scoped", || {
            Arc::new(()) as AspectHandle
        }));
        let advisors = AspectAdvisorFactory::default()
            .build_advisors(&meta, creator)
            .unwrap();
        // 实例化拦截器排在通知顾问之前
        assert_eq!(advisors.len(), 2);

        let proxy = proxy_for(advisors);
        let out = proxy.call("place", vec![value("x".to_string())]).unwrap().unwrap();
        assert_eq!(out.downcast_ref::<String>().unwrap(), "placed:x");
    }

    #[test]
    fn test_introduction_delegates_interface_method() {
        struct TagDelegate {
            tag: String,
        }
        let delegate = Arc::new(TagDelegate {
            tag: "audited".to_string(),
        }) as AspectHandle;

        let meta = AspectMetadata::builder("tagging", "TaggingAspect")
            .introduction(
                IntroductionSpec::new(InterfaceDef::new("Tagged", ["tag"]), delegate).method(
                    "tag",
                    |delegate, _args| {
                        let tagged = delegate
                            .downcast_ref::<TagDelegate>()
                            .ok_or_else(|| anyhow::anyhow!("wrong delegate type"))?;
                        Ok(Some(value(tagged.tag.clone())))
                    },
                ),
            )
            .build();

        let advisors = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("tagging"))
            .unwrap();

        // 目标类型自带 tag 方法的占位实现，引入委托覆盖它
        let class = TargetClass::builder("OrderService")
            .interface("Orders", ["place"])
            .method(MethodDescriptor::new("place").params(["item"]), |_t, _a| {
                Ok(Some(value("placed".to_string())))
            })
            .method(MethodDescriptor::new("tag"), |_t, _a| {
                Ok(Some(value("untagged".to_string())))
            })
            .build()
            .unwrap();
        let target: TargetInstance = Arc::new(());
        let config = ProxyConfig::new(Arc::new(SingletonTargetSource::new(class, target)))
            .proxy_target_class(true);
        for advisor in advisors {
            config.add_advisor(advisor).unwrap();
        }
        let proxy = ProxyFactory::new(config).create().unwrap();

        let out = proxy.call("tag", vec![]).unwrap().unwrap();
        assert_eq!(out.downcast_ref::<String>().unwrap(), "audited");
        let out = proxy.call("place", vec![value("pen".to_string())]).unwrap().unwrap();
        assert_eq!(out.downcast_ref::<String>().unwrap(), "placed");
    }

    #[test]
    fn test_missing_introduction_body_rejected() {
        let meta = AspectMetadata::builder("incomplete", "IncompleteAspect")
            .introduction(IntroductionSpec::new(
                InterfaceDef::new("Tagged", ["tag"]),
                Arc::new(()) as AspectHandle,
            ))
            .build();

        let err = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("incomplete"))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bound_arguments_reach_advice() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen2 = seen.clone();
        let meta = AspectMetadata::builder("binding", "BindingAspect")
            .advice(
                AdviceMethodSpec::new("observe", AdviceMarker::Before)
                    .attrs(MarkerAttributes::new().value("*").arg_names(["item"]))
                    .param_count(1)
                    .body(AdviceBody::Before(Arc::new(move |_a, _jp, bound| {
                        let item = bound[0]
                            .downcast_ref::<String>()
                            .cloned()
                            .unwrap_or_default();
                        seen2.lock().unwrap().push(item);
                        Ok(())
                    }))),
            )
            .build();

        let advisors = AspectAdvisorFactory::default()
            .build_advisors(&meta, singleton_factory("binding"))
            .unwrap();
        let proxy = proxy_for(advisors);
        proxy.call("place", vec![value("lamp".to_string())]).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["lamp".to_string()]);
    }
}
