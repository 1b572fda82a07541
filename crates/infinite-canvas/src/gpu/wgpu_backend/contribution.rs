use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::canvas::CanvasHandle;
use crate::gpu::{ContextCallbacks, DeviceContribution, SwapChain};

use super::device::WgpuDevice;
use super::surface::{SurfacePreferences, SurfaceState};
use super::swap_chain::WgpuSwapChain;

/// Initialization parameters for the wgpu backend.
#[derive(Debug, Clone)]
pub struct WgpuOptions {
    /// Backends tried first.
    pub backends: wgpu::Backends,

    /// Backends tried when no adapter is found on `backends`.
    pub fallback_backends: Option<wgpu::Backends>,

    pub instance_flags: wgpu::InstanceFlags,

    /// Keep a registry of live resources for the leak check on destroy.
    pub track_resources: bool,

    /// Location of the shader compiler assets required by the WebGPU path.
    pub shader_compiler_path: Option<String>,

    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    pub present_mode: wgpu::PresentMode,

    /// Compositing mode asked of the canvas surface; when the surface does
    /// not list it, its first listed mode is used.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,

    /// Frames the surface may queue ahead of the one being drawn.
    pub desired_maximum_frame_latency: u32,

    pub callbacks: ContextCallbacks,
}

impl Default for WgpuOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            fallback_backends: None,
            instance_flags: wgpu::InstanceFlags::default(),
            track_resources: true,
            shader_compiler_path: None,
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
            callbacks: ContextCallbacks::default(),
        }
    }
}

/// [`DeviceContribution`] creating wgpu devices bound to a canvas surface.
#[derive(Debug, Clone, Default)]
pub struct WgpuContribution {
    options: WgpuOptions,
}

impl WgpuContribution {
    pub fn new(options: WgpuOptions) -> Self {
        Self { options }
    }

    /// GL backend with debugging enabled, falling back to any backend when
    /// no GL adapter is available.
    pub fn webgl() -> Self {
        Self::new(WgpuOptions {
            backends: wgpu::Backends::GL,
            fallback_backends: Some(wgpu::Backends::all()),
            instance_flags: wgpu::InstanceFlags::debugging(),
            required_limits: wgpu::Limits::downlevel_webgl2_defaults(),
            ..WgpuOptions::default()
        })
    }

    /// Primary backends (Vulkan, Metal, DX12, browser WebGPU).
    pub fn webgpu(shader_compiler_path: impl Into<String>) -> Self {
        Self::new(WgpuOptions {
            backends: wgpu::Backends::PRIMARY,
            shader_compiler_path: Some(shader_compiler_path.into()),
            ..WgpuOptions::default()
        })
    }

    pub fn with_callbacks(mut self, callbacks: ContextCallbacks) -> Self {
        self.options.callbacks = callbacks;
        self
    }

    pub fn options(&self) -> &WgpuOptions {
        &self.options
    }
}

impl DeviceContribution for WgpuContribution {
    fn create_swap_chain(
        &self,
        canvas: Rc<dyn CanvasHandle>,
    ) -> LocalBoxFuture<'static, Result<Box<dyn SwapChain>>> {
        let options = self.options.clone();
        async move {
            let callbacks = options.callbacks.clone();
            let result = create(canvas, options).await;
            if result.is_err() {
                (callbacks.on_context_creation_error)();
            }
            result
        }
        .boxed_local()
    }
}

async fn request_adapter(
    canvas: &dyn CanvasHandle,
    backends: wgpu::Backends,
    flags: wgpu::InstanceFlags,
) -> Result<(wgpu::Instance, wgpu::Surface<'static>, wgpu::Adapter)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends,
        flags,
        ..Default::default()
    });

    let target = canvas
        .surface_target()
        .context("canvas does not expose a surface target")?;
    let surface = instance
        .create_surface(target)
        .context("failed to create wgpu surface")?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .with_context(|| format!("failed to find a suitable GPU adapter on {backends:?}"))?;

    Ok((instance, surface, adapter))
}

async fn create(canvas: Rc<dyn CanvasHandle>, options: WgpuOptions) -> Result<Box<dyn SwapChain>> {
    let (width, height) = (canvas.width(), canvas.height());

    if let Some(path) = &options.shader_compiler_path {
        log::debug!("shader compiler path: {path}");
    }

    let (_instance, surface, adapter) =
        match request_adapter(canvas.as_ref(), options.backends, options.instance_flags).await {
            Ok(found) => found,
            Err(err) => match options.fallback_backends {
                Some(fallback) => {
                    log::warn!("{err:#}; falling back to {fallback:?}");
                    request_adapter(canvas.as_ref(), fallback, options.instance_flags).await?
                }
                None => return Err(err),
            },
        };

    let info = adapter.get_info();
    log::info!("using {} ({:?})", info.name, info.backend);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("infinite-canvas device"),
            required_features: options.required_features,
            required_limits: options.required_limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .context("failed to create wgpu device/queue")?;

    let on_lost = options.callbacks.on_context_lost.clone();
    device.set_device_lost_callback(move |reason, message| {
        log::warn!("wgpu device lost ({reason:?}): {message}");
        on_lost();
    });

    let preferences = SurfacePreferences {
        srgb: options.prefer_srgb,
        present_mode: options.present_mode,
        alpha_mode: options.alpha_mode,
        frame_latency: options.desired_maximum_frame_latency,
    };
    let state = SurfaceState::negotiate(surface, &adapter, &device, &preferences, (width, height))
        .context("no supported surface formats")?;
    let format = state.format();
    let surface = Rc::new(RefCell::new(state));

    let shared = Rc::new(RefCell::new(WgpuDevice::new(
        device.clone(),
        queue,
        surface.clone(),
        format,
        options.track_resources,
    )));

    Ok(Box::new(WgpuSwapChain::new(device, surface, shared)))
}
