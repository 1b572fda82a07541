use std::fmt;
use std::future::Future;

use anyhow::Result;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

/// Synchronous pipeline hook.
///
/// The first listener receives the original value; each later listener
/// receives the previous listener's output. With no listeners, `call`
/// returns `None` without invoking anything.
pub struct SyncWaterfallHook<T> {
    taps: Vec<Box<dyn Fn(T) -> T>>,
}

impl<T> SyncWaterfallHook<T> {
    #[inline]
    pub fn new() -> Self {
        Self { taps: Vec::new() }
    }

    pub fn tap<F>(&mut self, listener: F)
    where
        F: Fn(T) -> T + 'static,
    {
        self.taps.push(Box::new(listener));
    }

    pub fn call(&self, args: T) -> Option<T> {
        if self.taps.is_empty() {
            return None;
        }
        Some(self.taps.iter().fold(args, |value, tap| tap(value)))
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

impl<T> Default for SyncWaterfallHook<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SyncWaterfallHook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncWaterfallHook").field("taps", &self.taps.len()).finish()
    }
}

type AsyncStage<T> = Box<dyn Fn(T) -> LocalBoxFuture<'static, Result<T>>>;

/// Asynchronous pipeline hook; listeners run one after another.
///
/// Same piping rules as [`SyncWaterfallHook`]. A failing stage stops the
/// pipeline and its error is returned.
pub struct AsyncSeriesWaterfallHook<T> {
    taps: Vec<AsyncStage<T>>,
}

impl<T: 'static> AsyncSeriesWaterfallHook<T> {
    #[inline]
    pub fn new() -> Self {
        Self { taps: Vec::new() }
    }

    pub fn tap_promise<F, Fut>(&mut self, listener: F)
    where
        F: Fn(T) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        self.taps.push(Box::new(move |value| listener(value).boxed_local()));
    }

    pub async fn promise(&self, args: T) -> Result<Option<T>> {
        if self.taps.is_empty() {
            return Ok(None);
        }

        let mut value = args;
        for tap in &self.taps {
            value = tap(value).await?;
        }
        Ok(Some(value))
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

impl<T: 'static> Default for AsyncSeriesWaterfallHook<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AsyncSeriesWaterfallHook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSeriesWaterfallHook")
            .field("taps", &self.taps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_pipes_each_output_into_the_next_listener() {
        let mut hook = SyncWaterfallHook::<Vec<&'static str>>::new();
        hook.tap(|mut v| {
            v.push("a");
            v
        });
        hook.tap(|mut v| {
            v.push("b");
            v
        });
        hook.tap(|mut v| {
            v.push("c");
            v
        });

        assert_eq!(hook.call(vec!["seed"]), Some(vec!["seed", "a", "b", "c"]));
    }

    #[test]
    fn sync_without_listeners_yields_none() {
        let hook = SyncWaterfallHook::<u32>::new();
        assert_eq!(hook.call(1), None);
    }

    #[test]
    fn async_series_pipes_in_registration_order() {
        let mut hook = AsyncSeriesWaterfallHook::<i32>::new();
        hook.tap_promise(|v| async move { Ok(v + 1) });
        hook.tap_promise(|v| async move { Ok(v * 10) });
        hook.tap_promise(|v| async move { Ok(v - 3) });

        let out = pollster::block_on(hook.promise(2)).expect("pipeline succeeds");
        assert_eq!(out, Some(27));
    }

    #[test]
    fn async_series_stops_at_first_failure() {
        let mut hook = AsyncSeriesWaterfallHook::<i32>::new();
        hook.tap_promise(|v| async move { Ok(v + 1) });
        hook.tap_promise(|_| async move { Err::<i32, _>(anyhow::anyhow!("stage two failed")) });
        hook.tap_promise(|v| async move { Ok(v * 1000) });

        let err = pollster::block_on(hook.promise(0)).expect_err("pipeline fails");
        assert_eq!(err.to_string(), "stage two failed");
    }

    #[test]
    fn async_series_without_listeners_yields_none() {
        let hook = AsyncSeriesWaterfallHook::<i32>::default();
        assert_eq!(pollster::block_on(hook.promise(5)).ok().flatten(), None);
    }
}
