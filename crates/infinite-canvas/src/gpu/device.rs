use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use futures::future::LocalBoxFuture;

use crate::canvas::CanvasHandle;

use super::tracker::LiveResource;
use super::types::*;

/// Device shared between the renderer plugin and the shapes it draws.
pub type SharedDevice = Rc<RefCell<dyn Device>>;

/// GPU resource creation and command submission.
///
/// Resources are referred to by opaque handles. Creation does not fail at
/// this level; a backend that cannot honor a request logs it and returns a
/// handle whose commands are skipped. Render pass commands are valid between
/// `create_render_pass` and `submit_pass`.
pub trait Device {
    fn create_buffer(&mut self, desc: &BufferDescriptor<'_>) -> Buffer;
    fn write_buffer(&mut self, buffer: Buffer, offset: u64, data: &[u8]);
    fn create_texture(&mut self, desc: &TextureDescriptor<'_>) -> Texture;
    /// Wraps `texture` as a color attachment. The render target takes
    /// ownership: releasing it releases the texture too.
    fn create_render_target_from_texture(&mut self, texture: Texture) -> RenderTarget;
    fn create_program(&mut self, desc: &ProgramDescriptor<'_>) -> Program;
    fn create_input_layout(&mut self, desc: &InputLayoutDescriptor<'_>) -> InputLayout;
    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor<'_>) -> RenderPipeline;
    fn create_bindings(&mut self, desc: &BindingsDescriptor<'_>) -> Bindings;

    fn begin_frame(&mut self);
    fn create_render_pass(&mut self, desc: &RenderPassDescriptor<'_>) -> RenderPass;
    fn set_viewport(&mut self, pass: RenderPass, x: f32, y: f32, width: f32, height: f32);
    fn set_pipeline(&mut self, pass: RenderPass, pipeline: RenderPipeline);
    fn set_vertex_input(
        &mut self,
        pass: RenderPass,
        layout: InputLayout,
        vertex_buffers: &[Buffer],
        index_buffer: Option<Buffer>,
    );
    fn set_bindings(&mut self, pass: RenderPass, bindings: Bindings);
    fn draw_indexed(&mut self, pass: RenderPass, index_count: u32, instance_count: u32);
    fn submit_pass(&mut self, pass: RenderPass);
    /// Ends the frame and presents the onscreen texture, if one was acquired.
    fn end_frame(&mut self);

    fn destroy_resource(&mut self, resource: ResourceHandle);
    /// Tears the device down. Resources not released before this call are
    /// still reported by [`Device::check_for_leaks`].
    fn destroy(&mut self);
    fn check_for_leaks(&self) -> Vec<LiveResource>;
}

/// Presentable surface bound to a canvas.
pub trait SwapChain {
    /// Resizes the drawable surface, in physical pixels.
    fn configure(&mut self, width: u32, height: u32);
    /// Current drawable size in physical pixels.
    fn canvas_size(&self) -> (u32, u32);
    /// Acquires (once per frame) the texture presented at `end_frame`.
    ///
    /// `None` means no texture could be acquired and the frame renders
    /// offscreen only.
    fn onscreen_texture(&mut self) -> Option<Texture>;
    fn device(&self) -> SharedDevice;
}

/// Backend strategy producing a swap chain (and its device) for a canvas.
pub trait DeviceContribution {
    fn create_swap_chain(
        &self,
        canvas: Rc<dyn CanvasHandle>,
    ) -> LocalBoxFuture<'static, Result<Box<dyn SwapChain>>>;
}

pub type ContextCallback = Arc<dyn Fn() + Send + Sync>;

/// Backend context notifications.
///
/// These are notification points only; no resources are rebuilt when a
/// context is restored.
#[derive(Clone)]
pub struct ContextCallbacks {
    pub on_context_creation_error: ContextCallback,
    pub on_context_lost: ContextCallback,
    pub on_context_restored: ContextCallback,
}

impl Default for ContextCallbacks {
    fn default() -> Self {
        Self {
            on_context_creation_error: Arc::new(|| {}),
            on_context_lost: Arc::new(|| {}),
            on_context_restored: Arc::new(|| {}),
        }
    }
}

impl fmt::Debug for ContextCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextCallbacks").finish_non_exhaustive()
    }
}
