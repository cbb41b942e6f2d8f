//! 调用上下文中的代理暴露
//!
//! 开启 expose-proxy 时，执行链前把当前代理压入线程局部槽位，
//! 退出时恢复为之前的值（而不是清空），守卫的 Drop 保证所有
//! 退出路径都会恢复。

use std::cell::RefCell;

use crate::method::Value;

thread_local! {
    static CURRENT_PROXY: RefCell<Option<Value>> = const { RefCell::new(None) };
}

/// 当前线程上正在执行的代理（若有）
pub fn current_proxy() -> Option<Value> {
    CURRENT_PROXY.with(|slot| slot.borrow().clone())
}

/// 代理暴露守卫
///
/// 创建时替换槽位内容并记住旧值，Drop 时恢复旧值。
pub struct ExposedProxyGuard {
    previous: Option<Value>,
}

impl ExposedProxyGuard {
    /// 把代理压入当前线程的槽位
    pub fn expose(proxy: Value) -> Self {
        let previous = CURRENT_PROXY.with(|slot| slot.borrow_mut().replace(proxy));
        Self { previous }
    }
}

impl Drop for ExposedProxyGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_PROXY.with(|slot| {
            *slot.borrow_mut() = previous;
        });
    }
}
