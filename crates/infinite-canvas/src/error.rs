use thiserror::Error;

/// Errors surfaced by the canvas API.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// The WebGPU renderer needs the location of its shader compiler.
    #[error("`shader_compiler_path` is required by the webgpu renderer")]
    MissingShaderCompilerPath,

    #[error("unknown renderer `{0}`, expected `webgl` or `webgpu`")]
    UnknownRenderer(String),

    #[error("invalid color `{value}`: {reason}")]
    InvalidColor { value: String, reason: String },

    /// A listener of the async initialization hook failed.
    #[error("canvas initialization failed: {0:#}")]
    AggregateInit(#[source] anyhow::Error),
}
