//! 切面实例工厂
//!
//! 工厂抽象切面实例的获取方式。非单例实例化模型依赖
//! [`LazyAspectInstanceFactory`]：首次访问才创建实例，创建互斥锁
//! 保证并发首访下恰好创建一次。

use std::sync::{Arc, Mutex, RwLock};

use wyvern_aop::{AopError, AopResult};

use crate::metadata::AspectHandle;

/// 切面实例工厂
pub trait AspectInstanceFactory: Send + Sync {
    /// 获取切面实例
    fn aspect_instance(&self) -> AopResult<AspectHandle>;

    /// 实例（或其来源）的名称，用于日志与诊断
    fn instance_name(&self) -> &str;

    /// 工厂间的排序依据
    fn order(&self) -> i32 {
        0
    }
}

/// 单例工厂：持有一个现成的实例
pub struct SingletonAspectInstanceFactory {
    name: String,
    instance: AspectHandle,
    order: i32,
}

impl SingletonAspectInstanceFactory {
    pub fn new(name: impl Into<String>, instance: AspectHandle) -> Self {
        Self {
            name: name.into(),
            instance,
            order: 0,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl AspectInstanceFactory for SingletonAspectInstanceFactory {
    fn aspect_instance(&self) -> AopResult<AspectHandle> {
        Ok(self.instance.clone())
    }

    fn instance_name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }
}

/// 原型工厂：每次请求都通过闭包创建新实例
pub struct PrototypeAspectInstanceFactory {
    name: String,
    creator: Arc<dyn Fn() -> AspectHandle + Send + Sync>,
    order: i32,
}

impl PrototypeAspectInstanceFactory {
    pub fn new<F>(name: impl Into<String>, creator: F) -> Self
    where
        F: Fn() -> AspectHandle + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            creator: Arc::new(creator),
            order: 0,
        }
    }
}

impl AspectInstanceFactory for PrototypeAspectInstanceFactory {
    fn aspect_instance(&self) -> AopResult<AspectHandle> {
        Ok((self.creator)())
    }

    fn instance_name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }
}

/// 惰性装饰器
///
/// 包装任意工厂，把实例创建推迟到首次访问；已创建后走读锁快速
/// 路径。创建互斥锁与实例槽位分离，持锁期间执行内层工厂，并发
/// 首访只会创建一个实例。
pub struct LazyAspectInstanceFactory {
    inner: Arc<dyn AspectInstanceFactory>,
    instance: RwLock<Option<AspectHandle>>,
    creation_lock: Mutex<()>,
}

impl LazyAspectInstanceFactory {
    pub fn new(inner: Arc<dyn AspectInstanceFactory>) -> Self {
        Self {
            inner,
            instance: RwLock::new(None),
            creation_lock: Mutex::new(()),
        }
    }

    /// 实例是否已经创建
    pub fn is_materialized(&self) -> bool {
        self.instance
            .read()
            .expect("aspect instance lock poisoned")
            .is_some()
    }
}

impl AspectInstanceFactory for LazyAspectInstanceFactory {
    fn aspect_instance(&self) -> AopResult<AspectHandle> {
        if let Some(existing) = self
            .instance
            .read()
            .expect("aspect instance lock poisoned")
            .clone()
        {
            return Ok(existing);
        }

        let _creation = self.creation_lock.lock().expect("aspect creation lock poisoned");
        // 竞争失败的线程在这里看到已创建的实例
        if let Some(existing) = self
            .instance
            .read()
            .expect("aspect instance lock poisoned")
            .clone()
        {
            return Ok(existing);
        }

        let created = self.inner.aspect_instance()?;
        *self
            .instance
            .write()
            .expect("aspect instance lock poisoned") = Some(created.clone());
        tracing::debug!(aspect = %self.inner.instance_name(), "materialized aspect instance");
        Ok(created)
    }

    fn instance_name(&self) -> &str {
        self.inner.instance_name()
    }

    fn order(&self) -> i32 {
        self.inner.order()
    }
}

/// 按名称解析实例的容器抽象
///
/// 引擎不关心实例从哪里来；容器侧实现该 Trait 即可把托管对象
/// 当作切面实例使用。
pub trait BeanResolver: Send + Sync {
    /// 解析命名实例
    fn resolve(&self, name: &str) -> AopResult<AspectHandle>;
}

/// 容器支撑的工厂：每次访问都向解析器要实例
pub struct BeanAspectInstanceFactory {
    resolver: Arc<dyn BeanResolver>,
    bean_name: String,
    order: i32,
}

impl BeanAspectInstanceFactory {
    pub fn new(resolver: Arc<dyn BeanResolver>, bean_name: impl Into<String>) -> Self {
        Self {
            resolver,
            bean_name: bean_name.into(),
            order: 0,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl AspectInstanceFactory for BeanAspectInstanceFactory {
    fn aspect_instance(&self) -> AopResult<AspectHandle> {
        self.resolver.resolve(&self.bean_name).map_err(|e| {
            AopError::config(format!(
                "failed to resolve aspect instance '{}': {}",
                self.bean_name, e
            ))
        })
    }

    fn instance_name(&self) -> &str {
        &self.bean_name
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lazy_factory_creates_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let created2 = created.clone();
        let inner = PrototypeAspectInstanceFactory::new("counter", move || {
            created2.fetch_add(1, Ordering::SeqCst);
            Arc::new(()) as AspectHandle
        });
        let lazy = LazyAspectInstanceFactory::new(Arc::new(inner));

        assert!(!lazy.is_materialized());
        let a = lazy.aspect_instance().unwrap();
        let b = lazy.aspect_instance().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(lazy.is_materialized());
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_factory_concurrent_first_access() {
        let created = Arc::new(AtomicUsize::new(0));
        let created2 = created.clone();
        let inner = PrototypeAspectInstanceFactory::new("shared", move || {
            created2.fetch_add(1, Ordering::SeqCst);
            Arc::new(0u64) as AspectHandle
        });
        let lazy = Arc::new(LazyAspectInstanceFactory::new(Arc::new(inner)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = lazy.clone();
                std::thread::spawn(move || lazy.aspect_instance().unwrap())
            })
            .collect();
        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        for pair in instances.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn test_prototype_factory_creates_fresh_instances() {
        let factory = PrototypeAspectInstanceFactory::new("proto", || Arc::new(()) as AspectHandle);
        let a = factory.aspect_instance().unwrap();
        let b = factory.aspect_instance().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_bean_factory_wraps_resolution_failure() {
        struct MapResolver(HashMap<String, AspectHandle>);

        impl BeanResolver for MapResolver {
            fn resolve(&self, name: &str) -> AopResult<AspectHandle> {
                self.0
                    .get(name)
                    .cloned()
                    .ok_or_else(|| AopError::config(format!("no bean named '{}'", name)))
            }
        }

        let mut beans = HashMap::new();
        beans.insert("audit".to_string(), Arc::new(1u8) as AspectHandle);
        let resolver = Arc::new(MapResolver(beans));

        let found = BeanAspectInstanceFactory::new(resolver.clone(), "audit");
        assert!(found.aspect_instance().is_ok());

        let missing = BeanAspectInstanceFactory::new(resolver, "ghost");
        let err = missing.aspect_instance().unwrap_err();
        assert!(err.is_configuration());
    }
}
