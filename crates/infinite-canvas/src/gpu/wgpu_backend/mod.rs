//! wgpu implementation of the device capability interface.
//!
//! This backend is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue for a canvas
//! - creating & configuring the Surface (swap chain)
//! - recording pass commands and replaying them into a command encoder
//! - copying the offscreen target into the acquired surface texture

mod contribution;
mod convert;
mod device;
mod surface;
mod swap_chain;

pub use contribution::{WgpuContribution, WgpuOptions};
pub use device::WgpuDevice;
pub use surface::SurfaceErrorAction;
pub use swap_chain::WgpuSwapChain;
