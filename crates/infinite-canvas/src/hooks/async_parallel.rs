use std::fmt;
use std::future::Future;

use anyhow::Result;
use futures::future::{try_join_all, LocalBoxFuture};
use futures::FutureExt;

type AsyncListener<A> = Box<dyn Fn(&A) -> LocalBoxFuture<'static, Result<()>>>;

/// Asynchronous hook whose listeners run concurrently.
///
/// `promise` starts every listener, polls them jointly and resolves once all
/// have completed. The first failure wins; the remaining listener futures are
/// dropped at that point, so each listener must keep its own state consistent
/// across cancellation.
pub struct AsyncParallelHook<A> {
    taps: Vec<AsyncListener<A>>,
}

impl<A> AsyncParallelHook<A> {
    #[inline]
    pub fn new() -> Self {
        Self { taps: Vec::new() }
    }

    /// Appends an async listener.
    pub fn tap_promise<F, Fut>(&mut self, listener: F)
    where
        F: Fn(&A) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.taps.push(Box::new(move |args| listener(args).boxed_local()));
    }

    /// Runs all listeners concurrently and waits for the joint result.
    pub async fn promise(&self, args: A) -> Result<()> {
        let pending: Vec<_> = self.taps.iter().map(|tap| tap(&args)).collect();
        try_join_all(pending).await.map(|_| ())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.taps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

impl<A> Default for AsyncParallelHook<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for AsyncParallelHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncParallelHook").field("taps", &self.taps.len()).finish()
    }
}
