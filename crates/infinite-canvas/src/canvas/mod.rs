//! The canvas orchestrator and its configuration.

mod config;
mod env;
mod handle;
mod infinite;

pub use config::{InfiniteCanvasConfig, RendererKind};
pub use env::Environment;
pub use handle::CanvasHandle;
pub use infinite::InfiniteCanvas;
