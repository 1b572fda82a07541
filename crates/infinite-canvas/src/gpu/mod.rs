//! GPU capability interface consumed by the renderer plugin and shapes.
//!
//! The core never talks to a graphics API directly. It drives a [`Device`]
//! through opaque handles, obtains it from a [`SwapChain`], and gets the
//! swap chain from a [`DeviceContribution`] chosen per backend:
//! - [`wgpu_backend`]: real GPU output through wgpu
//! - [`headless`]: records every call without touching a GPU

mod device;
mod tracker;
mod types;

pub mod headless;
pub mod wgpu_backend;

pub use device::{
    ContextCallback, ContextCallbacks, Device, DeviceContribution, SharedDevice, SwapChain,
};
pub use tracker::{report_leaks, LiveResource, ResourceTracker};
pub use types::*;
