use std::fmt;

type Listener<A> = Box<dyn Fn(&A)>;

/// Synchronous fan-out hook.
///
/// `call` invokes every listener in registration order, discarding results.
pub struct SyncHook<A> {
    taps: Vec<Listener<A>>,
}

impl<A> SyncHook<A> {
    #[inline]
    pub fn new() -> Self {
        Self { taps: Vec::new() }
    }

    /// Appends a listener.
    pub fn tap<F>(&mut self, listener: F)
    where
        F: Fn(&A) + 'static,
    {
        self.taps.push(Box::new(listener));
    }

    /// Invokes every listener with `args`, in registration order.
    pub fn call(&self, args: A) {
        for tap in &self.taps {
            tap(&args);
        }
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

impl<A> Default for SyncHook<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for SyncHook<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHook").field("taps", &self.taps.len()).finish()
    }
}
