//! 延迟结果
//!
//! `Deferred<T>` 是可克隆、可多次等待的 future；`Promise<T>` 是写入端，
//! 在加载线程上解决一次。

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;

use super::ResourceError;

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, ResourceError>>>;

/// 延迟结果（可共享）
pub struct Deferred<T: Clone + Send + Sync + 'static> {
    inner: SharedResult<T>,
}

/// 延迟结果的写入端
pub struct Promise<T> {
    sender: async_channel::Sender<Result<T, ResourceError>>,
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    /// 创建一对未解决的 Promise / Deferred
    pub fn pending() -> (Promise<T>, Self) {
        let (sender, receiver) = async_channel::bounded(1);
        let future = async move {
            // 写入端未解决就被丢弃
            receiver.recv().await.unwrap_or(Err(ResourceError::Abandoned))
        };
        (Promise { sender }, Self { inner: future.boxed().shared() })
    }

    /// 已解决的结果
    pub fn ready(result: Result<T, ResourceError>) -> Self {
        Self { inner: futures_util::future::ready(result).boxed().shared() }
    }

    /// 由任意 future 构造
    pub fn from_future(future: impl Future<Output = Result<T, ResourceError>> + Send + 'static) -> Self {
        Self { inner: future.boxed().shared() }
    }

    /// 是否为同一次请求的克隆；自身已被等待完成的句柄总是返回 false
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// 已解决时返回结果，不阻塞
    pub fn peek(&self) -> Option<&Result<T, ResourceError>> {
        self.inner.peek()
    }
}

impl<T> Promise<T> {
    pub fn resolve(self, result: Result<T, ResourceError>) {
        // 容量为 1 且只发送一次；接收端全部丢弃时忽略
        let _ = self.sender.try_send(result);
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Clone + Send + Sync + 'static> Future for Deferred<T> {
    type Output = Result<T, ResourceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.peek() {
            None => "pending",
            Some(Ok(_)) => "ready",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promise_resolves_all_clones() {
        let (promise, deferred) = Deferred::<u32>::pending();
        let other = deferred.clone();
        assert!(deferred.peek().is_none());

        std::thread::spawn(move || promise.resolve(Ok(7)));

        assert_eq!(pollster::block_on(deferred).unwrap(), 7);
        assert_eq!(pollster::block_on(other).unwrap(), 7);
    }

    #[test]
    fn test_clone_shares_identity() {
        let deferred = Deferred::ready(Ok(1u32));
        assert!(deferred.ptr_eq(&deferred.clone()));
        assert!(!deferred.ptr_eq(&Deferred::ready(Ok(1u32))));
    }

    #[test]
    fn test_dropped_promise_is_abandoned() {
        let (promise, deferred) = Deferred::<u32>::pending();
        drop(promise);
        assert!(matches!(pollster::block_on(deferred), Err(ResourceError::Abandoned)));
    }
}
