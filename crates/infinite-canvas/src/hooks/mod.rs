//! Typed listener registries used as the plugin extension mechanism.
//!
//! Every hook is write-once-then-read: listeners are tapped during setup and
//! never removed. Sync hooks fan out in registration order on the calling
//! thread; the async-parallel hook polls all listeners concurrently and
//! completes once every listener has settled or the first one failed.

mod async_parallel;
mod sync;
mod waterfall;

pub use async_parallel::AsyncParallelHook;
pub use sync::SyncHook;
pub use waterfall::{AsyncSeriesWaterfallHook, SyncWaterfallHook};
