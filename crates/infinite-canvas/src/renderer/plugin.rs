use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};

use crate::canvas::{CanvasHandle, RendererKind};
use crate::error::CanvasError;
use crate::gpu::wgpu_backend::WgpuContribution;
use crate::gpu::*;
use crate::plugin::{LifecycleContext, Plugin};
use crate::shapes::{Renderable, SharedShape};

/// Per-frame uniform shared by every shape: the logical canvas size.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CanvasUniform {
    pub resolution: [f32; 2],
}

impl CanvasUniform {
    /// Logical size of a canvas measuring `width`x`height` physical pixels.
    pub fn from_physical(width: u32, height: u32, device_pixel_ratio: f32) -> Self {
        Self {
            resolution: [
                width as f32 / device_pixel_ratio,
                height as f32 / device_pixel_ratio,
            ],
        }
    }
}

/// Device state held while the renderer is ready.
struct GpuState {
    swap_chain: Box<dyn SwapChain>,
    device: SharedDevice,
    render_target: RenderTarget,
    uniform_buffer: Buffer,
    /// Open between `begin_frame` and `end_frame`.
    render_pass: Option<RenderPass>,
}

enum Phase {
    Uninitialized,
    Initializing,
    Ready(GpuState),
    Destroyed,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Initializing => "initializing",
            Phase::Ready(_) => "ready",
            Phase::Destroyed => "destroyed",
        }
    }
}

struct RendererCore {
    phase: Phase,
    device_pixel_ratio: f32,
}

impl RendererCore {
    /// Device state, or `None` (logged) when `operation` arrives outside `Ready`.
    fn ready(&mut self, operation: &str) -> Option<&mut GpuState> {
        match &mut self.phase {
            Phase::Ready(gpu) => Some(gpu),
            other => {
                log::warn!("{operation} ignored: renderer is {}", other.name());
                None
            }
        }
    }
}

type SharedCore = Rc<RefCell<RendererCore>>;

/// Plugin owning the GPU device of a canvas.
///
/// On `init_async` it selects a device contribution for the configured
/// backend, creates and configures the swap chain and allocates the
/// offscreen render target and the canvas uniform buffer. Each frame renders
/// into the offscreen target, which is resolved to the onscreen texture when
/// the pass is submitted.
pub struct Renderer {
    contribution: Option<Rc<dyn DeviceContribution>>,
    callbacks: ContextCallbacks,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            contribution: None,
            callbacks: logging_callbacks(),
        }
    }

    /// Uses `contribution` instead of selecting one by backend kind.
    pub fn with_contribution(contribution: Rc<dyn DeviceContribution>) -> Self {
        Self {
            contribution: Some(contribution),
            ..Self::new()
        }
    }

    /// Context notifications forwarded by the wgpu backends.
    pub fn with_callbacks(mut self, callbacks: ContextCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Renderer {
    fn apply(self: Box<Self>, context: &mut LifecycleContext) {
        let Renderer {
            contribution,
            callbacks,
        } = *self;

        let core: SharedCore = Rc::new(RefCell::new(RendererCore {
            phase: Phase::Uninitialized,
            device_pixel_ratio: context.device_pixel_ratio,
        }));
        let hooks = &mut context.hooks;

        hooks.init.tap(|_| log::debug!("renderer plugin applied"));

        {
            let core = core.clone();
            let canvas = context.canvas.clone();
            let kind = context.renderer;
            let shader_compiler_path = context.shader_compiler_path.clone();
            hooks.init_async.tap_promise(move |_| {
                let selected = select_contribution(
                    kind,
                    &shader_compiler_path,
                    contribution.as_ref(),
                    &callbacks,
                );
                initialize(core.clone(), canvas.clone(), selected)
            });
        }

        {
            let core = core.clone();
            hooks.resize.tap(move |&(width, height)| resize(&core, width, height));
        }

        {
            let core = core.clone();
            hooks.begin_frame.tap(move |_| begin_frame(&core));
        }

        {
            let core = core.clone();
            hooks.render.tap(move |shape| render(&core, shape));
        }

        {
            let core = core.clone();
            hooks.end_frame.tap(move |_| end_frame(&core));
        }

        hooks.destroy.tap(move |_| destroy(&core));
    }
}

fn logging_callbacks() -> ContextCallbacks {
    ContextCallbacks {
        on_context_creation_error: Arc::new(|| log::error!("graphics context creation failed")),
        on_context_lost: Arc::new(|| log::warn!("graphics context lost")),
        on_context_restored: Arc::new(|| log::info!("graphics context restored")),
    }
}

fn select_contribution(
    kind: RendererKind,
    shader_compiler_path: &str,
    injected: Option<&Rc<dyn DeviceContribution>>,
    callbacks: &ContextCallbacks,
) -> Result<Rc<dyn DeviceContribution>, CanvasError> {
    if kind == RendererKind::WebGpu && shader_compiler_path.is_empty() {
        return Err(CanvasError::MissingShaderCompilerPath);
    }

    if let Some(contribution) = injected {
        return Ok(contribution.clone());
    }

    log::info!("selecting {kind} device contribution");
    let contribution = match kind {
        RendererKind::WebGl => WgpuContribution::webgl(),
        RendererKind::WebGpu => WgpuContribution::webgpu(shader_compiler_path),
    };
    Ok(Rc::new(contribution.with_callbacks(callbacks.clone())))
}

/// Returns the renderer to `Uninitialized` unless disarmed, so a failed or
/// dropped initialization keeps no partial state.
struct InitGuard {
    core: SharedCore,
    armed: bool,
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut core = self.core.borrow_mut();
        if let Phase::Initializing = core.phase {
            log::debug!("renderer initialization abandoned");
            core.phase = Phase::Uninitialized;
        }
    }
}

async fn initialize(
    core: SharedCore,
    canvas: Rc<dyn CanvasHandle>,
    contribution: Result<Rc<dyn DeviceContribution>, CanvasError>,
) -> Result<()> {
    {
        let mut core = core.borrow_mut();
        if !matches!(core.phase, Phase::Uninitialized) {
            log::warn!("init_async ignored: renderer is {}", core.phase.name());
            return Ok(());
        }
        core.phase = Phase::Initializing;
    }
    let mut guard = InitGuard {
        core: core.clone(),
        armed: true,
    };

    let contribution = contribution?;
    let mut swap_chain = contribution
        .create_swap_chain(canvas.clone())
        .await
        .context("failed to create swap chain")?;

    let (width, height) = (canvas.width(), canvas.height());
    swap_chain.configure(width, height);
    let device = swap_chain.device();

    let device_pixel_ratio = core.borrow().device_pixel_ratio;
    let (render_target, uniform_buffer) = {
        let mut dev = device.borrow_mut();
        let render_target = create_render_target(&mut *dev, width, height);
        let uniform = CanvasUniform::from_physical(width, height, device_pixel_ratio);
        let uniform_buffer = dev.create_buffer(&BufferDescriptor {
            label: Some("canvas uniforms"),
            contents: BufferContents::Data(bytemuck::bytes_of(&uniform)),
            usage: BufferUsage::Uniform,
            hint: BufferFrequencyHint::Dynamic,
        });
        (render_target, uniform_buffer)
    };

    guard.armed = false;
    core.borrow_mut().phase = Phase::Ready(GpuState {
        swap_chain,
        device,
        render_target,
        uniform_buffer,
        render_pass: None,
    });
    log::info!("renderer ready ({width}x{height}, dpr {device_pixel_ratio})");
    Ok(())
}

fn create_render_target(device: &mut dyn Device, width: u32, height: u32) -> RenderTarget {
    let texture = device.create_texture(&TextureDescriptor {
        label: Some("canvas render target"),
        format: Format::U8RgbaRt,
        width,
        height,
        usage: TextureUsage::RenderTarget,
    });
    device.create_render_target_from_texture(texture)
}

fn resize(core: &SharedCore, width: f32, height: f32) {
    if !width.is_finite() || !height.is_finite() {
        log::warn!("resize ignored: non-finite size {width}x{height}");
        return;
    }
    let mut core = core.borrow_mut();
    let device_pixel_ratio = core.device_pixel_ratio;
    let Some(gpu) = core.ready("resize") else {
        return;
    };

    let physical_width = (width * device_pixel_ratio).round().max(0.0) as u32;
    let physical_height = (height * device_pixel_ratio).round().max(0.0) as u32;
    gpu.swap_chain.configure(physical_width, physical_height);

    if physical_width == 0 || physical_height == 0 {
        return;
    }
    let mut dev = gpu.device.borrow_mut();
    dev.destroy_resource(gpu.render_target.into());
    gpu.render_target = create_render_target(&mut *dev, physical_width, physical_height);
}

fn begin_frame(core: &SharedCore) {
    let mut core = core.borrow_mut();
    let device_pixel_ratio = core.device_pixel_ratio;
    let Some(gpu) = core.ready("begin_frame") else {
        return;
    };

    let onscreen = gpu.swap_chain.onscreen_texture();
    let (width, height) = gpu.swap_chain.canvas_size();

    let mut dev = gpu.device.borrow_mut();
    if let Some(stale) = gpu.render_pass.take() {
        log::warn!("render pass #{} was never submitted", stale.id());
    }

    let uniform = CanvasUniform::from_physical(width, height, device_pixel_ratio);
    dev.write_buffer(gpu.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    dev.begin_frame();
    let pass = dev.create_render_pass(&RenderPassDescriptor {
        label: Some("canvas pass"),
        color_attachment: gpu.render_target,
        clear_color: Some(TRANSPARENT_WHITE),
        resolve_to: onscreen,
    });
    dev.set_viewport(pass, 0.0, 0.0, width as f32, height as f32);
    gpu.render_pass = Some(pass);
}

fn render(core: &SharedCore, shape: &SharedShape) {
    let (device, pass, uniform_buffer) = {
        let mut core = core.borrow_mut();
        let Some(gpu) = core.ready("render") else {
            return;
        };
        let Some(pass) = gpu.render_pass else {
            log::warn!("render ignored: no frame in progress");
            return;
        };
        (gpu.device.clone(), pass, gpu.uniform_buffer)
    };

    shape.borrow_mut().render(&device, pass, uniform_buffer);
}

fn end_frame(core: &SharedCore) {
    let mut core = core.borrow_mut();
    let Some(gpu) = core.ready("end_frame") else {
        return;
    };
    let Some(pass) = gpu.render_pass.take() else {
        log::warn!("end_frame ignored: no frame in progress");
        return;
    };

    let mut dev = gpu.device.borrow_mut();
    dev.submit_pass(pass);
    dev.end_frame();
}

fn destroy(core: &SharedCore) {
    let phase = std::mem::replace(&mut core.borrow_mut().phase, Phase::Destroyed);
    let gpu = match phase {
        Phase::Ready(gpu) => gpu,
        other => {
            log::debug!("renderer destroyed while {}", other.name());
            return;
        }
    };

    let mut dev = gpu.device.borrow_mut();
    dev.destroy_resource(gpu.render_target.into());
    dev.destroy_resource(gpu.uniform_buffer.into());
    dev.destroy();

    let leaked = report_leaks(&dev.check_for_leaks());
    if leaked == 0 {
        log::info!("renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::canvas::Environment;
    use crate::gpu::headless::{DeviceCall, HeadlessCanvas, HeadlessContribution, HeadlessProbe};
    use crate::plugin::Hooks;

    fn context(renderer: RendererKind, shader_compiler_path: &str, dpr: f32) -> LifecycleContext {
        LifecycleContext {
            canvas: Rc::new(HeadlessCanvas::new(200, 100)),
            renderer,
            shader_compiler_path: shader_compiler_path.to_owned(),
            device_pixel_ratio: dpr,
            environment: Environment::default(),
            hooks: Hooks::default(),
        }
    }

    fn ready(dpr: f32) -> (LifecycleContext, HeadlessProbe) {
        let contribution = HeadlessContribution::new();
        let probe = contribution.probe();
        let mut ctx = context(RendererKind::WebGl, "", dpr);
        Box::new(Renderer::with_contribution(Rc::new(contribution))).apply(&mut ctx);
        pollster::block_on(ctx.hooks.init_async.promise(())).unwrap();
        (ctx, probe)
    }

    fn uniform_buffer(probe: &HeadlessProbe) -> Buffer {
        probe.buffer_labeled("canvas uniforms").unwrap()
    }

    fn uniform_writes(probe: &HeadlessProbe, uniforms: Buffer) -> Vec<Vec<u8>> {
        probe
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::WriteBuffer { buffer, data, .. } if buffer == uniforms => Some(data),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn apply_taps_every_lifecycle_hook() {
        let mut ctx = context(RendererKind::WebGl, "", 1.0);
        Box::new(Renderer::new()).apply(&mut ctx);

        let hooks = &ctx.hooks;
        assert_eq!(hooks.init.len(), 1);
        assert_eq!(hooks.init_async.len(), 1);
        assert_eq!(hooks.begin_frame.len(), 1);
        assert_eq!(hooks.render.len(), 1);
        assert_eq!(hooks.end_frame.len(), 1);
        assert_eq!(hooks.destroy.len(), 1);
        assert_eq!(hooks.resize.len(), 1);
    }

    #[test]
    fn init_configures_swap_chain_and_allocates_target() {
        let (_ctx, probe) = ready(2.0);

        assert_eq!(probe.configured_size(), Some((200, 100)));
        assert_eq!(probe.allocations(), 3);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateRenderTarget { .. })), 1);

        let size = probe.calls().into_iter().find_map(|call| match call {
            DeviceCall::CreateBuffer { label: Some(l), size, .. } if l == "canvas uniforms" => Some(size),
            _ => None,
        });
        assert_eq!(size, Some(8));
    }

    #[test]
    fn frame_opens_and_submits_one_pass() {
        let (ctx, probe) = ready(1.0);
        ctx.hooks.begin_frame.call(());
        ctx.hooks.end_frame.call(());

        let calls = probe.calls();
        let pass = calls.iter().find_map(|call| match call {
            DeviceCall::CreateRenderPass {
                pass,
                clear_color,
                resolve_to,
                ..
            } => {
                assert_eq!(*clear_color, Some(TRANSPARENT_WHITE));
                assert_eq!(*resolve_to, Some(Texture::ONSCREEN));
                Some(*pass)
            }
            _ => None,
        });
        let pass = pass.unwrap();
        assert!(calls.contains(&DeviceCall::SetViewport {
            pass,
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 100.0,
        }));

        assert_eq!(
            uniform_writes(&probe, uniform_buffer(&probe)),
            vec![bytemuck::cast_slice::<f32, u8>(&[200.0, 100.0]).to_vec()]
        );

        let begin = probe.position(|c| matches!(c, DeviceCall::BeginFrame)).unwrap();
        let submit = probe.position(|c| matches!(c, DeviceCall::SubmitPass { .. })).unwrap();
        let end = probe.position(|c| matches!(c, DeviceCall::EndFrame)).unwrap();
        assert!(begin < submit && submit < end);
    }

    #[test]
    fn resize_scales_by_pixel_ratio_and_recreates_target() {
        let (ctx, probe) = ready(2.0);
        let uniforms = uniform_buffer(&probe);
        probe.clear_calls();

        ctx.hooks.resize.call((300.0, 150.0));

        assert_eq!(probe.configured_size(), Some((600, 300)));
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateRenderTarget { .. })), 1);
        assert_eq!(
            probe.count(|c| matches!(
                c,
                DeviceCall::CreateTexture {
                    width: 600,
                    height: 300,
                    ..
                }
            )),
            1
        );
        assert_eq!(probe.live_count(), 3);

        // The next frame sees the new logical size.
        ctx.hooks.begin_frame.call(());
        let written = uniform_writes(&probe, uniforms);
        assert_eq!(written, vec![bytemuck::cast_slice::<f32, u8>(&[300.0, 150.0]).to_vec()]);
    }

    #[test]
    fn zero_sized_resize_keeps_target() {
        let (ctx, probe) = ready(1.0);
        probe.clear_calls();

        ctx.hooks.resize.call((0.0, 0.0));
        assert_eq!(probe.configured_size(), Some((0, 0)));
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateRenderTarget { .. })), 0);
    }

    #[test]
    fn non_finite_resize_is_ignored() {
        let (ctx, probe) = ready(1.0);
        probe.clear_calls();

        ctx.hooks.resize.call((f32::NAN, 100.0));
        ctx.hooks.resize.call((200.0, f32::INFINITY));
        assert!(probe.calls().is_empty());
        assert_eq!(probe.live_count(), 3);
    }

    #[test]
    fn hooks_before_ready_are_ignored() {
        let contribution = HeadlessContribution::new();
        let probe = contribution.probe();
        let mut ctx = context(RendererKind::WebGl, "", 1.0);
        Box::new(Renderer::with_contribution(Rc::new(contribution))).apply(&mut ctx);

        ctx.hooks.begin_frame.call(());
        ctx.hooks.resize.call((10.0, 10.0));
        ctx.hooks.end_frame.call(());
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn failed_init_returns_to_uninitialized() {
        let contribution = HeadlessContribution::failing("no adapter");
        let mut ctx = context(RendererKind::WebGl, "", 1.0);
        Box::new(Renderer::with_contribution(Rc::new(contribution))).apply(&mut ctx);

        let err = pollster::block_on(ctx.hooks.init_async.promise(())).unwrap_err();
        assert!(format!("{err:#}").contains("no adapter"));

        // A second attempt runs again instead of being ignored as in progress.
        let err = pollster::block_on(ctx.hooks.init_async.promise(())).unwrap_err();
        assert!(format!("{err:#}").contains("no adapter"));
    }

    #[test]
    fn sibling_failure_during_init_leaves_nothing_allocated() {
        let contribution = HeadlessContribution::new().with_latency(5);
        let probe = contribution.probe();
        let mut ctx = context(RendererKind::WebGl, "", 1.0);
        Box::new(Renderer::with_contribution(Rc::new(contribution))).apply(&mut ctx);

        let first_attempt = Rc::new(Cell::new(true));
        ctx.hooks.init_async.tap_promise(move |_| {
            let fail = first_attempt.replace(false);
            async move {
                if fail {
                    anyhow::bail!("sibling plugin failed");
                }
                Ok(())
            }
        });

        let err = pollster::block_on(ctx.hooks.init_async.promise(())).unwrap_err();
        assert!(format!("{err:#}").contains("sibling plugin failed"));
        assert_eq!(probe.allocations(), 0);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateBuffer { .. })), 0);

        // The abandoned init released its phase, so a retry starts over.
        pollster::block_on(ctx.hooks.init_async.promise(())).unwrap();
        assert_eq!(probe.allocations(), 3);
        assert_eq!(probe.configured_size(), Some((200, 100)));
    }

    #[test]
    fn webgpu_requires_shader_compiler_path() {
        let mut ctx = context(RendererKind::WebGpu, "", 1.0);
        Box::new(Renderer::with_contribution(Rc::new(HeadlessContribution::new()))).apply(&mut ctx);

        let err = pollster::block_on(ctx.hooks.init_async.promise(())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CanvasError>(),
            Some(CanvasError::MissingShaderCompilerPath)
        ));
    }

    #[test]
    fn webgpu_with_path_initializes() {
        let contribution = HeadlessContribution::new();
        let probe = contribution.probe();
        let mut ctx = context(RendererKind::WebGpu, "/glsl_wgsl_compiler_bg.wasm", 1.0);
        Box::new(Renderer::with_contribution(Rc::new(contribution))).apply(&mut ctx);

        pollster::block_on(ctx.hooks.init_async.promise(())).unwrap();
        assert_eq!(probe.allocations(), 3);
    }

    #[test]
    fn destroy_releases_device_without_leaks() {
        let (ctx, probe) = ready(1.0);
        ctx.hooks.destroy.call(());

        assert_eq!(probe.count(|c| matches!(c, DeviceCall::DestroyDevice)), 1);
        assert!(probe.leaks().is_empty());

        // Destroyed: later frames and a second destroy do nothing.
        probe.clear_calls();
        ctx.hooks.begin_frame.call(());
        ctx.hooks.destroy.call(());
        assert!(probe.calls().is_empty());
    }
}
