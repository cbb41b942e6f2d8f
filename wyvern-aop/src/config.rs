//! 代理配置
//!
//! 持有有序的顾问列表、目标来源、被代理接口与各项开关。
//! 顾问列表以快照（`Arc<Vec<_>>`）形式暴露：读者在快速路径上
//! 不持锁，写者在配置自身的锁内整体替换。冻结后列表不可再变，
//! 并允许按方法预计算固定链。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::adapter::AdviceAdapterRegistry;
use crate::advice::Advice;
use crate::advisor::Advisor;
use crate::chain::AdvisorChainFactory;
use crate::error::{AopError, AopResult};
use crate::invocation::ChainEntry;
use crate::method::MethodDescriptor;
use crate::target::{InterfaceDef, TargetSource};

/// 代理配置
pub struct ProxyConfig {
    target_source: Arc<dyn TargetSource>,
    advisors: RwLock<Arc<Vec<Arc<Advisor>>>>,
    interfaces: Vec<InterfaceDef>,
    adapter_registry: Arc<AdviceAdapterRegistry>,

    proxy_target_class: bool,
    optimize: bool,
    expose_proxy: bool,
    pre_filtered: bool,
    frozen: AtomicBool,

    /// 冻结 + 固定目标时的按方法固定链缓存
    method_cache: Mutex<HashMap<String, Arc<Vec<ChainEntry>>>>,
}

impl ProxyConfig {
    /// 基于目标来源创建配置；被代理接口默认取目标声明的接口
    pub fn new(target_source: Arc<dyn TargetSource>) -> Self {
        let interfaces = target_source.target_class().interfaces().to_vec();
        Self {
            target_source,
            advisors: RwLock::new(Arc::new(Vec::new())),
            interfaces,
            adapter_registry: Arc::new(AdviceAdapterRegistry::with_defaults()),
            proxy_target_class: false,
            optimize: false,
            expose_proxy: false,
            pre_filtered: false,
            frozen: AtomicBool::new(false),
            method_cache: Mutex::new(HashMap::new()),
        }
    }

    /// 替换适配器注册表
    pub fn with_adapter_registry(mut self, registry: AdviceAdapterRegistry) -> Self {
        self.adapter_registry = Arc::new(registry);
        self
    }

    /// 显式指定被代理接口
    pub fn with_interfaces(mut self, interfaces: Vec<InterfaceDef>) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// 强制按具体类型代理
    pub fn proxy_target_class(mut self, flag: bool) -> Self {
        self.proxy_target_class = flag;
        self
    }

    /// 开启激进优化（选择子类策略）
    pub fn optimize(mut self, flag: bool) -> Self {
        self.optimize = flag;
        self
    }

    /// 调用期间把代理暴露到线程上下文
    pub fn expose_proxy(mut self, flag: bool) -> Self {
        self.expose_proxy = flag;
        self
    }

    /// 声明顾问已按目标类型预过滤，链解析跳过类型过滤
    pub fn pre_filtered(mut self, flag: bool) -> Self {
        self.pre_filtered = flag;
        self
    }

    pub fn target_source(&self) -> &Arc<dyn TargetSource> {
        &self.target_source
    }

    pub fn interfaces(&self) -> &[InterfaceDef] {
        &self.interfaces
    }

    pub fn adapter_registry(&self) -> &Arc<AdviceAdapterRegistry> {
        &self.adapter_registry
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.proxy_target_class
    }

    pub fn is_optimize(&self) -> bool {
        self.optimize
    }

    pub fn is_expose_proxy(&self) -> bool {
        self.expose_proxy
    }

    pub fn is_pre_filtered(&self) -> bool {
        self.pre_filtered
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// 冻结配置：此后顾问列表不可再变
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
        tracing::debug!(target = %self.target_source.target_class().name(), "proxy configuration frozen");
    }

    /// 当前顾问列表快照
    pub fn advisors_snapshot(&self) -> Arc<Vec<Arc<Advisor>>> {
        self.advisors.read().expect("advisor list lock poisoned").clone()
    }

    /// 注册顾问（冻结后拒绝）
    pub fn add_advisor(&self, advisor: Advisor) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::config(
                "cannot add advisor: proxy configuration is frozen",
            ));
        }
        let mut guard = self.advisors.write().expect("advisor list lock poisoned");
        let mut next = guard.as_ref().clone();
        tracing::debug!(advisor = %advisor.signature(), "registering advisor");
        next.push(Arc::new(advisor));
        *guard = Arc::new(next);
        Ok(())
    }

    /// 注册裸通知：包装为匹配一切的顾问
    pub fn add_advice(&self, advice: Advice) -> AopResult<()> {
        let advisor = self.adapter_registry.wrap(advice)?;
        self.add_advisor(advisor)
    }

    /// 移除指定位置的顾问（冻结后拒绝）
    pub fn remove_advisor(&self, index: usize) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::config(
                "cannot remove advisor: proxy configuration is frozen",
            ));
        }
        let mut guard = self.advisors.write().expect("advisor list lock poisoned");
        if index >= guard.len() {
            return Err(AopError::config(format!(
                "advisor index {} out of bounds ({} registered)",
                index,
                guard.len()
            )));
        }
        let mut next = guard.as_ref().clone();
        next.remove(index);
        *guard = Arc::new(next);
        Ok(())
    }

    /// 顾问数量
    pub fn advisor_count(&self) -> usize {
        self.advisors.read().expect("advisor list lock poisoned").len()
    }

    /// 解析某方法的拦截器链
    ///
    /// 非冻结配置每次调用重新解析；冻结 + 固定目标时按方法缓存。
    pub fn chain_for(&self, method: &Arc<MethodDescriptor>) -> AopResult<Arc<Vec<ChainEntry>>> {
        let cacheable = self.is_frozen() && self.target_source.is_static();
        if cacheable {
            let cache = self.method_cache.lock().expect("method cache lock poisoned");
            if let Some(chain) = cache.get(&method.name) {
                return Ok(chain.clone());
            }
        }

        let chain = Arc::new(AdvisorChainFactory::interception_chain(
            self,
            method,
            self.target_source.target_class(),
        )?);

        if cacheable {
            let mut cache = self.method_cache.lock().expect("method cache lock poisoned");
            cache.insert(method.name.clone(), chain.clone());
        }
        Ok(chain)
    }

    /// 配置的行为等价性
    ///
    /// 比较目标类型、接口、开关与顾问签名序列；以行为而非
    /// 实例身份比较，两个包装了等价配置的代理视为相等。
    pub fn config_equals(&self, other: &ProxyConfig) -> bool {
        if self.target_source.target_class().name() != other.target_source.target_class().name() {
            return false;
        }
        if self.interfaces != other.interfaces {
            return false;
        }
        if (
            self.proxy_target_class,
            self.optimize,
            self.expose_proxy,
        ) != (
            other.proxy_target_class,
            other.optimize,
            other.expose_proxy,
        ) {
            return false;
        }
        let ours = self.advisors_snapshot();
        let theirs = other.advisors_snapshot();
        if ours.len() != theirs.len() {
            return false;
        }
        ours.iter()
            .zip(theirs.iter())
            .all(|(a, b)| a.signature() == b.signature())
    }

    /// 与 [`ProxyConfig::config_equals`] 一致的哈希
    pub fn config_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.target_source.target_class().name().hash(&mut hasher);
        for iface in &self.interfaces {
            iface.name.hash(&mut hasher);
        }
        self.proxy_target_class.hash(&mut hasher);
        self.optimize.hash(&mut hasher);
        self.expose_proxy.hash(&mut hasher);
        for advisor in self.advisors_snapshot().iter() {
            advisor.signature().hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("target", &self.target_source.target_class().name())
            .field("advisors", &self.advisor_count())
            .field("interfaces", &self.interfaces.len())
            .field("proxy_target_class", &self.proxy_target_class)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
