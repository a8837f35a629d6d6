//! 显式引用计数
//!
//! 复制句柄（`Clone`）不改变计数；拥有者创建时调用 `increase_reference_count`，
//! 释放时调用 `decrease_reference_count`。计数从 1 降到 0 时恰好关闭一次。

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::VALIDATION;

/// 计数归零时的回调
pub trait OnClosed {
    fn on_closed(&self);
}

struct RefCountInner<T> {
    count: AtomicUsize,
    closed: AtomicBool,
    value: T,
}

/// 引用计数句柄
pub struct RefCounted<T: OnClosed> {
    inner: Arc<RefCountInner<T>>,
}

impl<T: OnClosed> RefCounted<T> {
    /// 新建句柄，计数为 0，尚无拥有者
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RefCountInner { count: AtomicUsize::new(0), closed: AtomicBool::new(false), value }),
        }
    }

    pub fn reference_count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn increase_reference_count(&self) {
        if VALIDATION {
            assert!(!self.is_closed(), "increase reference count of a closed resource");
        }
        self.inner.count.fetch_add(1, Ordering::AcqRel);
    }

    /// 仅在资源仍被持有时增加计数（用于从缓存复用）
    pub fn try_increase_reference_count(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| (count > 0).then_some(count + 1))
            .is_ok()
    }

    pub fn decrease_reference_count(&self) {
        match self
            .inner
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
        {
            Ok(1) => self.close(),
            Ok(_) => {}
            Err(_) => {
                if VALIDATION {
                    panic!("reference count underflow");
                }
                log::error!("[RefCount] 引用计数下溢");
            }
        }
    }

    fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.value.on_closed();
        }
    }

    /// 校验资源仍在使用（计数大于 0 且未关闭）
    pub fn check_in_use(&self) {
        if VALIDATION {
            assert!(!self.is_closed(), "resource used after close");
            assert!(self.reference_count() > 0, "resource has no owner");
        }
    }

    pub fn get(&self) -> &T {
        if VALIDATION {
            assert!(!self.is_closed(), "resource read after close");
        }
        &self.inner.value
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: OnClosed> Clone for RefCounted<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: OnClosed + fmt::Debug> fmt::Debug for RefCounted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCounted")
            .field("count", &self.reference_count())
            .field("closed", &self.is_closed())
            .field("value", &self.inner.value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Probe(AtomicUsize);

    impl OnClosed for Probe {
        fn on_closed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_closed_exactly_once_at_zero() {
        let handle = RefCounted::new(Probe::default());
        let copy = handle.clone();

        handle.increase_reference_count();
        copy.increase_reference_count();
        handle.decrease_reference_count();
        assert_eq!(handle.get().0.load(Ordering::SeqCst), 0);
        assert!(!handle.is_closed());

        copy.decrease_reference_count();
        assert!(handle.is_closed());
        assert_eq!(handle.inner.value.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_try_increase_requires_owner() {
        let handle = RefCounted::new(Probe::default());
        assert!(!handle.try_increase_reference_count());

        handle.increase_reference_count();
        assert!(handle.try_increase_reference_count());
        assert_eq!(handle.reference_count(), 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "underflow")]
    fn test_underflow_panics() {
        let handle = RefCounted::new(Probe::default());
        handle.decrease_reference_count();
    }
}
