//! Recording backend with no GPU behind it.
//!
//! Every device call is appended to a trace shared with a [`HeadlessProbe`],
//! which makes lifecycle ordering, allocation counts and leaks observable.
//! Swap-chain creation can be delayed or made to fail.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use anyhow::Result;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::canvas::CanvasHandle;

use super::device::{Device, DeviceContribution, SharedDevice, SwapChain};
use super::tracker::{LiveResource, ResourceTracker};
use super::types::*;

/// One recorded device or swap-chain call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Configure { width: u32, height: u32 },
    CreateBuffer {
        buffer: Buffer,
        label: Option<String>,
        usage: BufferUsage,
        hint: BufferFrequencyHint,
        size: u64,
    },
    WriteBuffer { buffer: Buffer, offset: u64, data: Vec<u8> },
    CreateTexture { texture: Texture, width: u32, height: u32 },
    CreateRenderTarget { target: RenderTarget, texture: Texture },
    CreateProgram { program: Program },
    CreateInputLayout { layout: InputLayout, streams: usize },
    CreateRenderPipeline {
        pipeline: RenderPipeline,
        format: Format,
        blend: Option<wgpu::BlendState>,
    },
    CreateBindings { bindings: Bindings, uniform_buffers: Vec<Buffer> },
    BeginFrame,
    CreateRenderPass {
        pass: RenderPass,
        color_attachment: RenderTarget,
        clear_color: Option<wgpu::Color>,
        resolve_to: Option<Texture>,
    },
    SetViewport { pass: RenderPass, x: f32, y: f32, width: f32, height: f32 },
    SetPipeline { pass: RenderPass, pipeline: RenderPipeline },
    SetVertexInput {
        pass: RenderPass,
        layout: InputLayout,
        vertex_buffers: Vec<Buffer>,
        index_buffer: Option<Buffer>,
    },
    SetBindings { pass: RenderPass, bindings: Bindings },
    DrawIndexed { pass: RenderPass, index_count: u32, instance_count: u32 },
    SubmitPass { pass: RenderPass },
    EndFrame,
    Destroy { resource: ResourceHandle },
    DestroyDevice,
}

#[derive(Debug, Default)]
struct HeadlessState {
    calls: Vec<DeviceCall>,
    tracker: ResourceTracker,
    render_targets: HashMap<RenderTarget, Texture>,
}

impl HeadlessState {
    fn record(&mut self, call: DeviceCall) {
        log::trace!("headless: {call:?}");
        self.calls.push(call);
    }
}

/// Read access to a headless device's trace and resource registry.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessProbe {
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| predicate(*c)).count()
    }

    /// Position of the first call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&DeviceCall) -> bool) -> Option<usize> {
        self.state.borrow().calls.iter().position(predicate)
    }

    /// Handle of the first buffer created with `label`.
    pub fn buffer_labeled(&self, label: &str) -> Option<Buffer> {
        self.state.borrow().calls.iter().find_map(|call| match call {
            DeviceCall::CreateBuffer { buffer, label: Some(l), .. } if l == label => Some(*buffer),
            _ => None,
        })
    }

    /// Total number of resources ever allocated.
    pub fn allocations(&self) -> u64 {
        self.state.borrow().tracker.allocations()
    }

    pub fn live_count(&self) -> usize {
        self.state.borrow().tracker.live_count()
    }

    pub fn leaks(&self) -> Vec<LiveResource> {
        self.state.borrow().tracker.leaks()
    }

    /// Last size passed to the swap chain's `configure`.
    pub fn configured_size(&self) -> Option<(u32, u32)> {
        self.state.borrow().calls.iter().rev().find_map(|call| match call {
            DeviceCall::Configure { width, height } => Some((*width, *height)),
            _ => None,
        })
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }
}

/// Fixed-size canvas for headless use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeadlessCanvas {
    pub width: u32,
    pub height: u32,
}

impl HeadlessCanvas {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl CanvasHandle for HeadlessCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Device contribution producing headless swap chains.
#[derive(Debug, Default)]
pub struct HeadlessContribution {
    state: Rc<RefCell<HeadlessState>>,
    failure: Option<String>,
    latency: u32,
}

impl HeadlessContribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap-chain creation fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Swap-chain creation yields to the executor `polls` times first.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: self.state.clone(),
        }
    }
}

impl DeviceContribution for HeadlessContribution {
    fn create_swap_chain(
        &self,
        canvas: Rc<dyn CanvasHandle>,
    ) -> LocalBoxFuture<'static, Result<Box<dyn SwapChain>>> {
        let state = self.state.clone();
        let failure = self.failure.clone();
        let latency = self.latency;

        async move {
            YieldNow(latency).await;
            if let Some(message) = failure {
                anyhow::bail!(message);
            }

            let device: SharedDevice = Rc::new(RefCell::new(HeadlessDevice {
                state: state.clone(),
            }));
            let swap_chain: Box<dyn SwapChain> = Box::new(HeadlessSwapChain {
                state,
                device,
                size: (canvas.width(), canvas.height()),
            });
            Ok(swap_chain)
        }
        .boxed_local()
    }
}

/// Returns `Pending` (waking itself) the given number of times before
/// completing, so concurrent futures get a chance to interleave.
pub(crate) struct YieldNow(pub(crate) u32);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 == 0 {
            return Poll::Ready(());
        }
        self.0 -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

struct HeadlessSwapChain {
    state: Rc<RefCell<HeadlessState>>,
    device: SharedDevice,
    size: (u32, u32),
}

impl SwapChain for HeadlessSwapChain {
    fn configure(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.state.borrow_mut().record(DeviceCall::Configure { width, height });
    }

    fn canvas_size(&self) -> (u32, u32) {
        self.size
    }

    fn onscreen_texture(&mut self) -> Option<Texture> {
        Some(Texture::ONSCREEN)
    }

    fn device(&self) -> SharedDevice {
        self.device.clone()
    }
}

/// Device that records calls and tracks resources.
pub struct HeadlessDevice {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessDevice {
    fn allocate(&self, kind: ResourceKind, label: Option<&str>) -> u64 {
        self.state.borrow_mut().tracker.allocate(kind, label)
    }

    fn record(&self, call: DeviceCall) {
        self.state.borrow_mut().record(call);
    }
}

impl Device for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor<'_>) -> Buffer {
        let buffer = Buffer::from_raw(self.allocate(ResourceKind::Buffer, desc.label));
        self.record(DeviceCall::CreateBuffer {
            buffer,
            label: desc.label.map(str::to_owned),
            usage: desc.usage,
            hint: desc.hint,
            size: desc.contents.byte_len(),
        });
        buffer
    }

    fn write_buffer(&mut self, buffer: Buffer, offset: u64, data: &[u8]) {
        self.record(DeviceCall::WriteBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor<'_>) -> Texture {
        let texture = Texture::from_raw(self.allocate(ResourceKind::Texture, desc.label));
        self.record(DeviceCall::CreateTexture {
            texture,
            width: desc.width,
            height: desc.height,
        });
        texture
    }

    fn create_render_target_from_texture(&mut self, texture: Texture) -> RenderTarget {
        let target = RenderTarget::from_raw(self.allocate(ResourceKind::RenderTarget, None));
        self.state.borrow_mut().render_targets.insert(target, texture);
        self.record(DeviceCall::CreateRenderTarget { target, texture });
        target
    }

    fn create_program(&mut self, desc: &ProgramDescriptor<'_>) -> Program {
        let program = Program::from_raw(self.allocate(ResourceKind::Program, desc.label));
        self.record(DeviceCall::CreateProgram { program });
        program
    }

    fn create_input_layout(&mut self, desc: &InputLayoutDescriptor<'_>) -> InputLayout {
        let layout = InputLayout::from_raw(self.allocate(ResourceKind::InputLayout, desc.label));
        self.record(DeviceCall::CreateInputLayout {
            layout,
            streams: desc.vertex_buffers.len(),
        });
        layout
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor<'_>) -> RenderPipeline {
        let pipeline =
            RenderPipeline::from_raw(self.allocate(ResourceKind::RenderPipeline, desc.label));
        self.record(DeviceCall::CreateRenderPipeline {
            pipeline,
            format: desc.color_attachment_format,
            blend: desc.blend,
        });
        pipeline
    }

    fn create_bindings(&mut self, desc: &BindingsDescriptor<'_>) -> Bindings {
        let bindings = Bindings::from_raw(self.allocate(ResourceKind::Bindings, desc.label));
        self.record(DeviceCall::CreateBindings {
            bindings,
            uniform_buffers: desc.uniform_buffers.to_vec(),
        });
        bindings
    }

    fn begin_frame(&mut self) {
        self.record(DeviceCall::BeginFrame);
    }

    fn create_render_pass(&mut self, desc: &RenderPassDescriptor<'_>) -> RenderPass {
        let pass = RenderPass::from_raw(self.state.borrow_mut().tracker.next_untracked_id());
        self.record(DeviceCall::CreateRenderPass {
            pass,
            color_attachment: desc.color_attachment,
            clear_color: desc.clear_color,
            resolve_to: desc.resolve_to,
        });
        pass
    }

    fn set_viewport(&mut self, pass: RenderPass, x: f32, y: f32, width: f32, height: f32) {
        self.record(DeviceCall::SetViewport { pass, x, y, width, height });
    }

    fn set_pipeline(&mut self, pass: RenderPass, pipeline: RenderPipeline) {
        self.record(DeviceCall::SetPipeline { pass, pipeline });
    }

    fn set_vertex_input(
        &mut self,
        pass: RenderPass,
        layout: InputLayout,
        vertex_buffers: &[Buffer],
        index_buffer: Option<Buffer>,
    ) {
        self.record(DeviceCall::SetVertexInput {
            pass,
            layout,
            vertex_buffers: vertex_buffers.to_vec(),
            index_buffer,
        });
    }

    fn set_bindings(&mut self, pass: RenderPass, bindings: Bindings) {
        self.record(DeviceCall::SetBindings { pass, bindings });
    }

    fn draw_indexed(&mut self, pass: RenderPass, index_count: u32, instance_count: u32) {
        self.record(DeviceCall::DrawIndexed {
            pass,
            index_count,
            instance_count,
        });
    }

    fn submit_pass(&mut self, pass: RenderPass) {
        self.record(DeviceCall::SubmitPass { pass });
    }

    fn end_frame(&mut self) {
        self.record(DeviceCall::EndFrame);
    }

    fn destroy_resource(&mut self, resource: ResourceHandle) {
        let mut state = self.state.borrow_mut();
        if state.tracker.release(resource) {
            if let ResourceHandle::RenderTarget(target) = resource {
                if let Some(texture) = state.render_targets.remove(&target) {
                    state.tracker.release(texture.into());
                }
            }
        }
        state.record(DeviceCall::Destroy { resource });
    }

    fn destroy(&mut self) {
        self.record(DeviceCall::DestroyDevice);
    }

    fn check_for_leaks(&self) -> Vec<LiveResource> {
        self.state.borrow().tracker.leaks()
    }
}
