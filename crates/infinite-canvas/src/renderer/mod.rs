//! Renderer plugin: owns the device for the canvas lifetime and turns the
//! frame hooks into one render pass per frame.

mod plugin;

pub use plugin::{CanvasUniform, Renderer};
