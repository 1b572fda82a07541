//! Handles and descriptors exchanged with a [`Device`](super::Device).

use std::fmt;

macro_rules! resource_handles {
    ($($(#[$meta:meta])* $name:ident => $kind:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u64);

            impl $name {
                /// Wraps a backend-assigned id.
                #[inline]
                pub const fn from_raw(id: u64) -> Self {
                    Self(id)
                }

                #[inline]
                pub const fn id(self) -> u64 {
                    self.0
                }
            }

            impl From<$name> for ResourceHandle {
                #[inline]
                fn from(handle: $name) -> Self {
                    ResourceHandle::$kind(handle)
                }
            }
        )*

        /// Kind of a device-owned resource.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum ResourceKind {
            $($kind,)*
        }

        /// Any releasable device resource.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum ResourceHandle {
            $($kind($name),)*
        }

        impl ResourceHandle {
            pub fn kind(self) -> ResourceKind {
                match self {
                    $(ResourceHandle::$kind(_) => ResourceKind::$kind,)*
                }
            }

            pub fn id(self) -> u64 {
                match self {
                    $(ResourceHandle::$kind(h) => h.id(),)*
                }
            }
        }
    };
}

resource_handles! {
    /// GPU buffer (vertex, index or uniform).
    Buffer => Buffer,
    Texture => Texture,
    /// Color attachment built from a texture; owns that texture.
    RenderTarget => RenderTarget,
    /// Compiled shader program (vertex + fragment stage).
    Program => Program,
    InputLayout => InputLayout,
    RenderPipeline => RenderPipeline,
    /// Uniform buffer bindings for one pipeline.
    Bindings => Bindings,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::RenderTarget => "render target",
            ResourceKind::Program => "program",
            ResourceKind::InputLayout => "input layout",
            ResourceKind::RenderPipeline => "render pipeline",
            ResourceKind::Bindings => "bindings",
        };
        f.write_str(name)
    }
}

/// Frame-scoped render pass handle. Valid from `create_render_pass` until
/// `submit_pass`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RenderPass(u64);

impl RenderPass {
    #[inline]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Backend-neutral formats for textures, vertex attributes and indices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    /// The backend's preferred 8-bit RGBA render-target format.
    U8RgbaRt,
    F32R,
    F32Rg,
    F32Rgba,
    U16R,
    U32R,
}

impl Format {
    /// Size in bytes of one element of this format.
    pub const fn byte_size(self) -> u64 {
        match self {
            Format::U8RgbaRt => 4,
            Format::F32R => 4,
            Format::F32Rg => 8,
            Format::F32Rgba => 16,
            Format::U16R => 2,
            Format::U32R => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
}

/// Expected update frequency of a buffer's contents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferFrequencyHint {
    Static,
    Dynamic,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferContents<'a> {
    /// Initial data; the buffer is sized to fit it.
    Data(&'a [u8]),
    /// Zero-initialized buffer of the given byte size.
    Size(u64),
}

impl BufferContents<'_> {
    pub fn byte_len(&self) -> u64 {
        match self {
            BufferContents::Data(data) => data.len() as u64,
            BufferContents::Size(size) => *size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    pub label: Option<&'a str>,
    pub contents: BufferContents<'a>,
    pub usage: BufferUsage,
    pub hint: BufferFrequencyHint,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextureUsage {
    RenderTarget,
    Sampled,
}

#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    pub label: Option<&'a str>,
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub usage: TextureUsage,
}

/// WGSL program with explicit stage entry points.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor<'a> {
    pub label: Option<&'a str>,
    pub wgsl: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub shader_location: u32,
    pub offset: u64,
    pub format: Format,
}

/// One vertex stream of an input layout.
#[derive(Debug, Clone)]
pub struct VertexBufferDescriptor<'a> {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: &'a [VertexAttribute],
}

#[derive(Debug, Clone)]
pub struct InputLayoutDescriptor<'a> {
    pub label: Option<&'a str>,
    pub vertex_buffers: &'a [VertexBufferDescriptor<'a>],
    pub index_format: Option<Format>,
    pub program: Program,
}

#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    pub label: Option<&'a str>,
    pub program: Program,
    pub input_layout: InputLayout,
    pub color_attachment_format: Format,
    pub blend: Option<wgpu::BlendState>,
    pub write_mask: wgpu::ColorWrites,
}

/// Uniform buffers bound to a pipeline; binding index = slice position.
#[derive(Debug, Clone)]
pub struct BindingsDescriptor<'a> {
    pub label: Option<&'a str>,
    pub pipeline: RenderPipeline,
    pub uniform_buffers: &'a [Buffer],
}

#[derive(Debug, Clone)]
pub struct RenderPassDescriptor<'a> {
    pub label: Option<&'a str>,
    pub color_attachment: RenderTarget,
    /// `None` loads the previous contents.
    pub clear_color: Option<wgpu::Color>,
    /// Texture the color attachment is resolved into when the pass is submitted.
    pub resolve_to: Option<Texture>,
}

/// Fully transparent white, the canvas clear color.
pub const TRANSPARENT_WHITE: wgpu::Color = wgpu::Color { r: 1.0, g: 1.0, b: 1.0, a: 0.0 };

/// Standard "over" compositing for straight-alpha fragment output.
pub fn source_over_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

impl Texture {
    /// Reserved id naming the swap chain's current onscreen texture.
    pub const ONSCREEN: Texture = Texture::from_raw(0);
}
