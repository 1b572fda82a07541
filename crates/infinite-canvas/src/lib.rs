//! Infinite canvas crate.
//!
//! A plugin-driven canvas over a GPU device: plugins tap lifecycle hooks,
//! the renderer plugin owns the device and opens one render pass per frame,
//! and shapes lazily create the device resources they draw with.

pub mod canvas;
pub mod error;
pub mod gpu;
pub mod hooks;
pub mod logging;
pub mod plugin;
pub mod renderer;
pub mod shapes;

pub use canvas::{CanvasHandle, Environment, InfiniteCanvas, InfiniteCanvasConfig, RendererKind};
pub use error::CanvasError;
pub use plugin::{Hooks, LifecycleContext, Plugin};
pub use renderer::Renderer;
pub use shapes::{AntiAliasingType, Circle, CircleConfig, Renderable, Shape, SharedShape};
