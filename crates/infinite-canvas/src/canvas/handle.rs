use std::sync::Arc;

use winit::window::Window;

/// Drawing surface the canvas renders into.
///
/// Sizes are in physical pixels.
pub trait CanvasHandle {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Target for a wgpu surface. Handles without one can only be driven by
    /// backends that do not present (e.g. headless).
    fn surface_target(&self) -> Option<wgpu::SurfaceTarget<'static>> {
        None
    }
}

impl CanvasHandle for Arc<Window> {
    fn width(&self) -> u32 {
        self.inner_size().width
    }

    fn height(&self) -> u32 {
        self.inner_size().height
    }

    fn surface_target(&self) -> Option<wgpu::SurfaceTarget<'static>> {
        Some(self.clone().into())
    }
}
