//! 代理构建与按调用分发
//!
//! 两种构建策略：接口代理只路由声明接口上的方法；类代理覆盖
//! 目标类型方法表上的全部非 final 方法，冻结配置下为每个方法
//! 预计算分发方案。策略选择与不可行配置的拒绝都发生在构建时。

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::chain::AdvisorChainFactory;
use crate::config::ProxyConfig;
use crate::context::ExposedProxyGuard;
use crate::error::{AopError, AopResult};
use crate::invocation::{ChainEntry, MethodInvocation};
use crate::method::{Args, MethodDescriptor, ReturnValue, Value};

/// 内部标记接口名
///
/// 仅携带该接口的配置不算“有可用接口”，会回退到类代理。
pub const MARKER_INTERFACE: &str = "WyvernProxy";

/// 运行时代理
///
/// 相等性与哈希由专门的处理器按配置计算，而不是默认的对象语义：
/// 包装了等价配置与目标的两个代理相等。
pub trait AopProxy: Send + Sync {
    /// 通过代理调用方法
    fn call(&self, method: &str, args: Args) -> AopResult<ReturnValue>;

    /// 代理背后的配置
    fn config(&self) -> &Arc<ProxyConfig>;

    /// 代理自身作为值（用于返回值替换与上下文暴露）
    fn proxy_value(&self) -> Value;

    /// 按配置比较两个代理
    fn proxy_equals(&self, other: &dyn AopProxy) -> bool {
        self.config().config_equals(other.config())
    }

    /// 按配置计算代理哈希
    fn proxy_hash(&self) -> u64 {
        self.config().config_hash()
    }
}

/// 代理工厂：策略选择器
///
/// 决策顺序：强制类代理、优化开关、没有可用接口 → 类代理；
/// 否则接口代理。不可子类化的目标在此处立即失败。
pub struct ProxyFactory {
    config: ProxyConfig,
}

impl ProxyFactory {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    /// 配置访问（注册顾问等）
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// 构建代理
    pub fn create(self) -> AopResult<Arc<dyn AopProxy>> {
        Self::create_with(Arc::new(self.config))
    }

    /// 基于共享配置构建代理
    pub fn create_with(config: Arc<ProxyConfig>) -> AopResult<Arc<dyn AopProxy>> {
        if config.advisor_count() == 0 && !config.target_source().has_target() {
            return Err(AopError::config(
                "cannot create proxy: no advisors and no target",
            ));
        }

        let class = config.target_source().target_class().clone();
        let forced = config.is_proxy_target_class() || config.is_optimize();
        let usable_interface = config
            .interfaces()
            .iter()
            .any(|i| i.name != MARKER_INTERFACE);

        if forced || !usable_interface {
            if !forced {
                tracing::info!(
                    class = %class.name(),
                    "no usable proxied interface found; falling back to class-based proxying"
                );
            }
            if class.is_sealed() {
                return Err(AopError::config(format!(
                    "target class '{}' is sealed and cannot be class-proxied",
                    class.name()
                )));
            }
            let proxy: Arc<dyn AopProxy> = ClassProxy::create(config)?;
            Ok(proxy)
        } else {
            let proxy: Arc<dyn AopProxy> = InterfaceProxy::create(config);
            Ok(proxy)
        }
    }
}

/// 接口代理
///
/// 只有被代理接口声明的方法可以通过该代理调用。
pub struct InterfaceProxy {
    config: Arc<ProxyConfig>,
    weak_self: Weak<InterfaceProxy>,
}

impl InterfaceProxy {
    fn create(config: Arc<ProxyConfig>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            weak_self: weak.clone(),
        })
    }
}

impl AopProxy for InterfaceProxy {
    fn call(&self, method: &str, args: Args) -> AopResult<ReturnValue> {
        let declared = self.config.interfaces().iter().any(|i| i.declares(method));
        if !declared {
            return Err(AopError::InvocationMismatch(format!(
                "method '{}' is not declared by any proxied interface",
                method
            )));
        }
        let class = self.config.target_source().target_class().clone();
        let descriptor = class.method(method).cloned().ok_or_else(|| {
            AopError::InvocationMismatch(format!(
                "interface method '{}' has no descriptor on target class '{}'",
                method,
                class.name()
            ))
        })?;

        invoke_through(&self.config, None, self.proxy_value(), &descriptor, args)
    }

    fn config(&self) -> &Arc<ProxyConfig> {
        &self.config
    }

    fn proxy_value(&self) -> Value {
        let me: Arc<InterfaceProxy> = self
            .weak_self
            .upgrade()
            .expect("proxy used after it was dropped");
        me
    }
}

/// 单个方法的分发方案
enum DispatchPlan {
    /// 直接透传：无通知、不需要暴露代理、返回类型不可能是目标自身
    Direct,

    /// 轻量路径：无通知，但仍做自返回替换与代理暴露
    Unadvised,

    /// 完整拦截：每次调用重新解析链
    Advised,

    /// 预计算的固定链（冻结 + 固定目标）
    Fixed(Arc<Vec<ChainEntry>>),
}

/// 类代理：运行时生成子类的显式替代
///
/// 覆盖目标方法表上的全部方法，构建时为每个方法指定分发方案。
pub struct ClassProxy {
    config: Arc<ProxyConfig>,
    plans: HashMap<String, DispatchPlan>,
    weak_self: Weak<ClassProxy>,
}

impl ClassProxy {
    fn create(config: Arc<ProxyConfig>) -> AopResult<Arc<Self>> {
        let class = config.target_source().target_class().clone();
        let frozen = config.is_frozen();
        let fixed_eligible = frozen && config.target_source().is_static();
        let mut plans = HashMap::new();

        for method in class.methods() {
            if method.is_final {
                tracing::warn!(
                    class = %class.name(),
                    method = %method.name,
                    "final method cannot be advised under class-based proxying"
                );
                plans.insert(method.name.clone(), DispatchPlan::Direct);
                continue;
            }

            // 未冻结的配置随时可能追加顾问，方案只能是每次调用重新解析链；
            // 冻结后顾问列表不再变化，才能按构建时的链固化快路径。
            let plan = if !frozen {
                DispatchPlan::Advised
            } else {
                let chain = AdvisorChainFactory::interception_chain(&config, method, &class)?;
                if chain.is_empty() {
                    if !config.is_expose_proxy() && !method.returns_self {
                        DispatchPlan::Direct
                    } else {
                        DispatchPlan::Unadvised
                    }
                } else if fixed_eligible {
                    DispatchPlan::Fixed(Arc::new(chain))
                } else {
                    DispatchPlan::Advised
                }
            };
            plans.insert(method.name.clone(), plan);
        }

        Ok(Arc::new_cyclic(|weak| Self {
            config,
            plans,
            weak_self: weak.clone(),
        }))
    }
}

impl AopProxy for ClassProxy {
    fn call(&self, method: &str, args: Args) -> AopResult<ReturnValue> {
        let plan = self.plans.get(method).ok_or_else(|| {
            AopError::InvocationMismatch(format!(
                "method '{}' does not exist on proxied class '{}'",
                method,
                self.config.target_source().target_class().name()
            ))
        })?;
        let class = self.config.target_source().target_class().clone();
        let descriptor = class
            .method(method)
            .cloned()
            .ok_or_else(|| AopError::config(format!("missing descriptor for '{}'", method)))?;

        match plan {
            DispatchPlan::Direct => {
                let source = self.config.target_source();
                let target = source.get_target()?;
                let body = class.body(&descriptor.name).cloned().ok_or_else(|| {
                    AopError::config(format!("no body registered for '{}'", descriptor.name))
                })?;
                let result = body(target.as_ref(), &args).map_err(AopError::Application);
                let result = postprocess(result, None, &descriptor);
                if !source.is_static() {
                    source.release_target(target);
                }
                result
            }
            DispatchPlan::Unadvised => invoke_through(
                &self.config,
                Some(Arc::new(Vec::new())),
                self.proxy_value(),
                &descriptor,
                args,
            ),
            DispatchPlan::Advised => {
                invoke_through(&self.config, None, self.proxy_value(), &descriptor, args)
            }
            DispatchPlan::Fixed(chain) => invoke_through(
                &self.config,
                Some(chain.clone()),
                self.proxy_value(),
                &descriptor,
                args,
            ),
        }
    }

    fn config(&self) -> &Arc<ProxyConfig> {
        &self.config
    }

    fn proxy_value(&self) -> Value {
        let me: Arc<ClassProxy> = self
            .weak_self
            .upgrade()
            .expect("proxy used after it was dropped");
        me
    }
}

/// 两种代理共用的调用路径
///
/// 暴露代理 → 取目标 → 解析或复用链 → 执行 → 返回值后处理 →
/// 归还非固定目标。
fn invoke_through(
    config: &Arc<ProxyConfig>,
    fixed_chain: Option<Arc<Vec<ChainEntry>>>,
    proxy_value: Value,
    method: &Arc<MethodDescriptor>,
    args: Args,
) -> AopResult<ReturnValue> {
    let _guard = config
        .is_expose_proxy()
        .then(|| ExposedProxyGuard::expose(proxy_value.clone()));

    let source = config.target_source();
    let class = source.target_class().clone();
    let target = source.get_target()?;

    let chain = match fixed_chain {
        Some(chain) => chain,
        None => config.chain_for(method)?,
    };

    let result = if chain.is_empty() {
        let body = class.body(&method.name).cloned().ok_or_else(|| {
            AopError::config(format!("no body registered for '{}'", method.name))
        })?;
        body(target.as_ref(), &args).map_err(AopError::Application)
    } else {
        let mut invocation = MethodInvocation::new(
            Some(proxy_value.clone()),
            Some(target.clone()),
            class,
            method.clone(),
            args,
            chain,
        );
        invocation.proceed()
    };

    let result = postprocess(result, Some((&target, &proxy_value)), method);
    if !source.is_static() {
        source.release_target(target);
    }
    result
}

/// 返回值与错误的边界后处理
///
/// - 目标返回自身时以代理替换，保持引用同一性预期；
/// - 需要返回值的方法得到空值是 `InvalidReturn`；
/// - 应用错误逃出未声明可失败的方法时包装为 `UndeclaredFailure`。
fn postprocess(
    result: AopResult<ReturnValue>,
    substitution: Option<(&Value, &Value)>,
    method: &MethodDescriptor,
) -> AopResult<ReturnValue> {
    match result {
        Ok(Some(value)) => {
            if let Some((target, proxy_value)) = substitution {
                if same_allocation(&value, target) {
                    return Ok(Some(proxy_value.clone()));
                }
            }
            Ok(Some(value))
        }
        Ok(None) => {
            if method.returns_value {
                Err(AopError::InvalidReturn(method.name.clone()))
            } else {
                Ok(None)
            }
        }
        Err(AopError::Application(source)) if !method.fallible => Err(AopError::UndeclaredFailure {
            method: method.name.clone(),
            source,
        }),
        Err(err) => Err(err),
    }
}

/// 两个值是否指向同一份分配（引用同一性）
fn same_allocation(a: &Value, b: &Value) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const u8, Arc::as_ptr(b) as *const u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::context::current_proxy;
    use crate::method::{value, MethodDescriptor};
    use crate::target::{SingletonTargetSource, TargetClass, TargetInstance};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct GreeterService;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn greeter_config() -> ProxyConfig {
        let class = TargetClass::builder("GreeterService")
            .interface("Greeter", ["greet", "fail", "nothing"])
            .method(
                MethodDescriptor::new("greet").params(["name"]),
                |_t, args| {
                    let name = args[0]
                        .downcast_ref::<String>()
                        .ok_or_else(|| anyhow::anyhow!("name must be a string"))?;
                    Ok(Some(value(format!("Hi, {}", name))))
                },
            )
            .method(
                MethodDescriptor::new("fail").fallible().returns_unit(),
                |_t, _a| Err(anyhow::anyhow!("expected failure")),
            )
            .method(MethodDescriptor::new("nothing").returns_unit(), |_t, _a| Ok(None))
            .build()
            .unwrap();
        let target: TargetInstance = Arc::new(GreeterService);
        ProxyConfig::new(Arc::new(SingletonTargetSource::new(class, target)))
    }

    #[test]
    fn test_zero_advisors_passthrough() {
        let proxy = ProxyFactory::new(greeter_config()).create().unwrap();
        let out = proxy
            .call("greet", vec![value("Ann".to_string())])
            .unwrap()
            .unwrap();
        assert_eq!(out.downcast_ref::<String>().unwrap(), "Hi, Ann");

        // 目标声明可失败，错误原样传播
        let err = proxy.call("fail", vec![]).unwrap_err();
        let app = err.application().unwrap();
        assert_eq!(app.to_string(), "expected failure");
    }

    #[test]
    fn test_before_advisors_run_in_declaration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let cfg = greeter_config();
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            cfg.add_advice(Advice::before_fn(tag, move |_inv| {
                order.lock().unwrap().push(tag);
                Ok(())
            }))
            .unwrap();
        }
        let proxy = ProxyFactory::new(cfg).create().unwrap();
        proxy.call("greet", vec![value("Bob".to_string())]).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_around_short_circuit_prevents_target() {
        let target_hits = Arc::new(AtomicUsize::new(0));
        let hits = target_hits.clone();
        let class = TargetClass::builder("Counter")
            .interface("Api", ["tick"])
            .method(MethodDescriptor::new("tick"), move |_t, _a| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(Some(value(true)))
            })
            .build()
            .unwrap();
        let cfg = ProxyConfig::new(Arc::new(SingletonTargetSource::new(
            class,
            Arc::new(()) as TargetInstance,
        )));
        cfg.add_advice(Advice::around_fn("short-circuit", |_inv| {
            Ok(Some(value(false)))
        }))
        .unwrap();

        let proxy = ProxyFactory::new(cfg).create().unwrap();
        let out = proxy.call("tick", vec![]).unwrap().unwrap();
        assert_eq!(out.downcast_ref::<bool>(), Some(&false));
        assert_eq!(target_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_greet_scenario_with_before_and_after_returning() {
        init_tracing();
        let before_hits = Arc::new(AtomicUsize::new(0));
        let cfg = greeter_config();
        let hits = before_hits.clone();
        cfg.add_advice(Advice::before_fn("log-entry", move |_inv| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();
        cfg.add_advice(Advice::after_returning_fn("uppercase", |_inv, v| {
            let s = v
                .as_ref()
                .and_then(|v| v.downcast_ref::<String>())
                .map(|s| s.to_uppercase())
                .ok_or_else(|| AopError::InvocationMismatch("expected string result".into()))?;
            Ok(Some(value(s)))
        }))
        .unwrap();

        let proxy = ProxyFactory::new(cfg).create().unwrap();
        let out = proxy
            .call("greet", vec![value("Ann".to_string())])
            .unwrap()
            .unwrap();
        assert_eq!(out.downcast_ref::<String>().unwrap(), "HI, ANN");
        assert_eq!(before_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_self_return_substituted_with_proxy() {
        let me: TargetInstance = Arc::new(GreeterService);
        let me_for_body = me.clone();
        let class = TargetClass::builder("Fluent")
            .interface("Chainable", ["me"])
            .method(
                MethodDescriptor::new("me").returns_self(),
                move |_t, _a| Ok(Some(me_for_body.clone())),
            )
            .build()
            .unwrap();
        let cfg = ProxyConfig::new(Arc::new(SingletonTargetSource::new(class, me)));
        let proxy = ProxyFactory::new(cfg).create().unwrap();

        let out = proxy.call("me", vec![]).unwrap().unwrap();
        assert!(same_allocation(&out, &proxy.proxy_value()));
    }

    #[test]
    fn test_proxy_equality_by_configuration() {
        let make = |kind: u8| {
            let cfg = greeter_config();
            match kind {
                0 => cfg
                    .add_advice(Advice::before_fn("log", |_inv| Ok(())))
                    .unwrap(),
                _ => cfg.add_advice(Advice::after_fn("log", |_inv| {})).unwrap(),
            }
            ProxyFactory::new(cfg).create().unwrap()
        };
        let a = make(0);
        let b = make(0);
        let c = make(1);

        assert!(a.proxy_equals(b.as_ref()));
        assert_eq!(a.proxy_hash(), b.proxy_hash());
        assert!(!a.proxy_equals(c.as_ref()));
    }

    #[test]
    fn test_frozen_config_keeps_serving_original_advisors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cfg = greeter_config();
        for i in 0..3 {
            let hits = hits.clone();
            cfg.add_advice(Advice::before_fn(format!("b{}", i), move |_inv| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        }
        cfg.freeze();
        assert!(cfg
            .add_advice(Advice::before_fn("rejected", |_inv| Ok(())))
            .is_err());

        let proxy = ProxyFactory::new(cfg).create().unwrap();
        proxy.call("greet", vec![value("Eve".to_string())]).unwrap();
        proxy.call("greet", vec![value("Eve".to_string())]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_sealed_class_rejected_for_class_proxy() {
        let class = TargetClass::builder("Sealed")
            .sealed()
            .method(MethodDescriptor::new("run"), |_t, _a| Ok(Some(value(0u8))))
            .build()
            .unwrap();
        let cfg = ProxyConfig::new(Arc::new(SingletonTargetSource::new(
            class,
            Arc::new(()) as TargetInstance,
        )))
        .proxy_target_class(true);

        let err = ProxyFactory::new(cfg).create().err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_no_interface_falls_back_to_class_proxy() {
        let class = TargetClass::builder("Plain")
            .method(MethodDescriptor::new("run"), |_t, _a| Ok(Some(value(7u8))))
            .build()
            .unwrap();
        let cfg = ProxyConfig::new(Arc::new(SingletonTargetSource::new(
            class,
            Arc::new(()) as TargetInstance,
        )));
        let proxy = ProxyFactory::new(cfg).create().unwrap();
        let out = proxy.call("run", vec![]).unwrap().unwrap();
        assert_eq!(out.downcast_ref::<u8>(), Some(&7));
    }

    #[test]
    fn test_class_proxy_sees_advisors_added_after_creation() {
        let hits = Arc::new(AtomicUsize::new(0));
        let class = TargetClass::builder("Mutable")
            .method(MethodDescriptor::new("run"), |_t, _a| Ok(Some(value(9u8))))
            .build()
            .unwrap();
        let cfg = Arc::new(ProxyConfig::new(Arc::new(SingletonTargetSource::new(
            class,
            Arc::new(()) as TargetInstance,
        ))));
        let proxy = ProxyFactory::create_with(cfg.clone()).unwrap();

        // 构建时链为空，调用走透传
        proxy.call("run", vec![]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // 未冻结配置在代理存在期间追加顾问，后续调用必须命中
        let hits2 = hits.clone();
        cfg.add_advice(Advice::before_fn("count", move |_inv| {
            hits2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();
        proxy.call("run", vec![]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interface_proxy_rejects_undeclared_method() {
        let cfg = greeter_config();
        cfg.add_advice(Advice::before_fn("b", |_inv| Ok(()))).unwrap();
        let proxy = ProxyFactory::new(cfg).create().unwrap();
        let err = proxy.call("not_there", vec![]).unwrap_err();
        assert!(matches!(err, AopError::InvocationMismatch(_)));
    }

    #[test]
    fn test_expose_proxy_visible_during_call() {
        let seen = Arc::new(Mutex::new(None));
        let cfg = greeter_config().expose_proxy(true);
        let seen2 = seen.clone();
        cfg.add_advice(Advice::before_fn("capture", move |_inv| {
            *seen2.lock().unwrap() = current_proxy();
            Ok(())
        }))
        .unwrap();

        let proxy = ProxyFactory::new(cfg).create().unwrap();
        proxy.call("greet", vec![value("Ann".to_string())]).unwrap();

        let captured = seen.lock().unwrap().take().unwrap();
        assert!(same_allocation(&captured, &proxy.proxy_value()));
        // 调用结束后槽位恢复
        assert!(current_proxy().is_none());
    }

    #[test]
    fn test_invalid_return_detected() {
        let cfg = greeter_config();
        cfg.add_advice(Advice::around_fn("swallow", |_inv| Ok(None))).unwrap();
        let proxy = ProxyFactory::new(cfg).create().unwrap();
        let err = proxy
            .call("greet", vec![value("Ann".to_string())])
            .unwrap_err();
        assert!(matches!(err, AopError::InvalidReturn(_)));
    }

    #[test]
    fn test_undeclared_failure_wrapped() {
        let class = TargetClass::builder("Brittle")
            .interface("Api", ["run"])
            .method(MethodDescriptor::new("run").returns_unit(), |_t, _a| {
                Err(anyhow::anyhow!("surprise"))
            })
            .build()
            .unwrap();
        let cfg = ProxyConfig::new(Arc::new(SingletonTargetSource::new(
            class,
            Arc::new(()) as TargetInstance,
        )));
        let proxy = ProxyFactory::new(cfg).create().unwrap();
        let err = proxy.call("run", vec![]).unwrap_err();
        assert!(matches!(err, AopError::UndeclaredFailure { .. }));
    }

    #[test]
    fn test_final_method_not_advised_under_class_proxy() {
        let hits = Arc::new(AtomicUsize::new(0));
        let class = TargetClass::builder("WithFinal")
            .method(MethodDescriptor::new("locked").final_method(), |_t, _a| {
                Ok(Some(value(1u8)))
            })
            .method(MethodDescriptor::new("open"), |_t, _a| Ok(Some(value(2u8))))
            .build()
            .unwrap();
        let cfg = ProxyConfig::new(Arc::new(SingletonTargetSource::new(
            class,
            Arc::new(()) as TargetInstance,
        )))
        .proxy_target_class(true);
        let hits2 = hits.clone();
        cfg.add_advice(Advice::before_fn("count", move |_inv| {
            hits2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();

        let proxy = ProxyFactory::new(cfg).create().unwrap();
        proxy.call("locked", vec![]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        proxy.call("open", vec![]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_advisors_and_no_target_rejected() {
        let class = TargetClass::builder("Ghost")
            .method(MethodDescriptor::new("run"), |_t, _a| Ok(None))
            .build()
            .unwrap();
        let cfg = ProxyConfig::new(Arc::new(crate::target::EmptyTargetSource::new(class)));
        let err = ProxyFactory::new(cfg).create().err().unwrap();
        assert!(err.is_configuration());
    }
}
