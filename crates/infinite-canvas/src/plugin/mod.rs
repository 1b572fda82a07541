//! Plugin contract and the lifecycle context plugins extend.
//!
//! A plugin receives the shared [`LifecycleContext`] exactly once, when the
//! canvas is constructed, and participates by tapping [`Hooks`].

use std::rc::Rc;

use crate::canvas::{CanvasHandle, Environment, RendererKind};
use crate::hooks::{AsyncParallelHook, SyncHook};
use crate::shapes::SharedShape;

/// Lifecycle hooks, in the order the canvas drives them.
#[derive(Debug, Default)]
pub struct Hooks {
    pub init: SyncHook<()>,
    pub init_async: AsyncParallelHook<()>,
    pub begin_frame: SyncHook<()>,
    pub render: SyncHook<SharedShape>,
    pub end_frame: SyncHook<()>,
    pub destroy: SyncHook<()>,
    /// Logical width and height.
    pub resize: SyncHook<(f32, f32)>,
}

/// State shared by every plugin of one canvas.
pub struct LifecycleContext {
    pub canvas: Rc<dyn CanvasHandle>,
    pub renderer: RendererKind,
    pub shader_compiler_path: String,
    /// Effective ratio, resolved once at construction.
    pub device_pixel_ratio: f32,
    pub environment: Environment,
    pub hooks: Hooks,
}

impl std::fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("renderer", &self.renderer)
            .field("shader_compiler_path", &self.shader_compiler_path)
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .field("environment", &self.environment)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Extension point of the canvas.
///
/// `apply` consumes the plugin, so it runs at most once per instance. Any
/// state the hooks need is moved into the listeners (typically behind an
/// `Rc<RefCell<_>>`).
pub trait Plugin {
    fn apply(self: Box<Self>, context: &mut LifecycleContext);
}
