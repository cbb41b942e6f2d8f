//! 切面注册表
//!
//! 集中管理已注册的切面，并把它们统一翻译为顾问。切面既可以在
//! 运行时显式注册，也可以通过 `inventory` 在编译期登记、启动时
//! 一次性装载。

use std::sync::Arc;

use wyvern_aop::{Advisor, AopResult, ProxyConfig};

use crate::factory::AspectAdvisorFactory;
use crate::instance::{AspectInstanceFactory, SingletonAspectInstanceFactory};
use crate::metadata::{AspectHandle, AspectMetadata};

/// 编译期切面登记项
///
/// 通过 `inventory::submit!` 提交；元数据与实例都由无参函数
/// 延迟构造，登记本身保持常量。
pub struct AspectRegistration {
    pub name: &'static str,
    pub metadata: fn() -> AspectMetadata,
    pub instance: fn() -> AspectHandle,
}

impl AspectRegistration {
    pub const fn new(
        name: &'static str,
        metadata: fn() -> AspectMetadata,
        instance: fn() -> AspectHandle,
    ) -> Self {
        Self {
            name,
            metadata,
            instance,
        }
    }
}

inventory::collect!(AspectRegistration);

struct RegistryEntry {
    metadata: AspectMetadata,
    instances: Arc<dyn AspectInstanceFactory>,
}

/// 切面注册表
pub struct AspectRegistry {
    factory: AspectAdvisorFactory,
    entries: Vec<RegistryEntry>,
}

impl AspectRegistry {
    pub fn new() -> Self {
        Self::with_factory(AspectAdvisorFactory::default())
    }

    pub fn with_factory(factory: AspectAdvisorFactory) -> Self {
        Self {
            factory,
            entries: Vec::new(),
        }
    }

    /// 注册一个切面
    ///
    /// 元数据在注册时即校验，不合法的切面不会进入注册表。
    pub fn register(
        &mut self,
        metadata: AspectMetadata,
        instances: Arc<dyn AspectInstanceFactory>,
    ) -> AopResult<()> {
        self.factory.validate(&metadata)?;
        tracing::debug!(aspect = metadata.name(), "registered aspect");
        self.entries.push(RegistryEntry {
            metadata,
            instances,
        });
        Ok(())
    }

    /// 装载所有编译期登记的切面
    pub fn load_registered(&mut self) -> AopResult<usize> {
        let mut count = 0;
        for registration in inventory::iter::<AspectRegistration> {
            let metadata = (registration.metadata)();
            let instances = Arc::new(SingletonAspectInstanceFactory::new(
                registration.name,
                (registration.instance)(),
            ));
            self.register(metadata, instances)?;
            count += 1;
        }
        tracing::info!(count, "loaded registered aspects");
        Ok(count)
    }

    /// 已注册切面的数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 把所有切面翻译为顾问
    ///
    /// 先按实例工厂的 order 排序，order 相同的保持注册顺序。
    pub fn advisors(&self) -> AopResult<Vec<Advisor>> {
        let mut ordered: Vec<&RegistryEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|entry| entry.instances.order());

        let mut advisors = Vec::new();
        for entry in ordered {
            advisors.extend(
                self.factory
                    .build_advisors(&entry.metadata, entry.instances.clone())?,
            );
        }
        Ok(advisors)
    }

    /// 把所有切面的顾问注册到一份代理配置
    pub fn apply_to(&self, config: &ProxyConfig) -> AopResult<usize> {
        let advisors = self.advisors()?;
        let count = advisors.len();
        for advisor in advisors {
            config.add_advisor(advisor)?;
        }
        tracing::debug!(
            target = %config.target_source().target_class().name(),
            advisors = count,
            "applied aspect advisors"
        );
        Ok(count)
    }
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
