use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::error::CanvasError;

use super::env::Environment;
use super::handle::CanvasHandle;

/// Graphics backend requested for the canvas.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum RendererKind {
    #[default]
    WebGl,
    WebGpu,
}

impl RendererKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            RendererKind::WebGl => "webgl",
            RendererKind::WebGpu => "webgpu",
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RendererKind {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webgl" => Ok(RendererKind::WebGl),
            "webgpu" => Ok(RendererKind::WebGpu),
            other => Err(CanvasError::UnknownRenderer(other.to_owned())),
        }
    }
}

/// Construction options for an [`InfiniteCanvas`](super::InfiniteCanvas).
#[derive(Clone)]
pub struct InfiniteCanvasConfig {
    pub canvas: Rc<dyn CanvasHandle>,
    pub renderer: RendererKind,
    /// Required when `renderer` is [`RendererKind::WebGpu`].
    pub shader_compiler_path: String,
    /// Overrides the ratio reported by the environment.
    pub device_pixel_ratio: Option<f32>,
    pub environment: Environment,
}

impl InfiniteCanvasConfig {
    pub fn new(canvas: Rc<dyn CanvasHandle>) -> Self {
        Self {
            canvas,
            renderer: RendererKind::default(),
            shader_compiler_path: String::new(),
            device_pixel_ratio: None,
            environment: Environment::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: RendererKind) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_shader_compiler_path(mut self, path: impl Into<String>) -> Self {
        self.shader_compiler_path = path.into();
        self
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f32) -> Self {
        self.device_pixel_ratio = Some(ratio);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

impl fmt::Debug for InfiniteCanvasConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfiniteCanvasConfig")
            .field("canvas", &(self.canvas.width(), self.canvas.height()))
            .field("renderer", &self.renderer)
            .field("shader_compiler_path", &self.shader_compiler_path)
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .field("environment", &self.environment)
            .finish()
    }
}
