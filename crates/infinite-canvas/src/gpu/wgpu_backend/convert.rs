use crate::gpu::{BufferUsage, Format, TextureUsage};

/// Maps a texture format; `U8RgbaRt` resolves to the surface format so the
/// offscreen target can be copied onto copy-capable swap chains.
pub(super) fn texture_format(format: Format, surface: wgpu::TextureFormat) -> wgpu::TextureFormat {
    match format {
        Format::U8RgbaRt => surface,
        Format::F32R => wgpu::TextureFormat::R32Float,
        Format::F32Rg => wgpu::TextureFormat::Rg32Float,
        Format::F32Rgba => wgpu::TextureFormat::Rgba32Float,
        Format::U16R => wgpu::TextureFormat::R16Uint,
        Format::U32R => wgpu::TextureFormat::R32Uint,
    }
}

pub(super) fn vertex_format(format: Format) -> Option<wgpu::VertexFormat> {
    match format {
        Format::F32R => Some(wgpu::VertexFormat::Float32),
        Format::F32Rg => Some(wgpu::VertexFormat::Float32x2),
        Format::F32Rgba => Some(wgpu::VertexFormat::Float32x4),
        Format::U32R => Some(wgpu::VertexFormat::Uint32),
        Format::U8RgbaRt => Some(wgpu::VertexFormat::Unorm8x4),
        Format::U16R => None,
    }
}

pub(super) fn index_format(format: Format) -> Option<wgpu::IndexFormat> {
    match format {
        Format::U16R => Some(wgpu::IndexFormat::Uint16),
        Format::U32R => Some(wgpu::IndexFormat::Uint32),
        _ => None,
    }
}

pub(super) fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let base = match usage {
        BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
        BufferUsage::Index => wgpu::BufferUsages::INDEX,
        BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
    };
    base | wgpu::BufferUsages::COPY_DST
}

pub(super) fn texture_usages(usage: TextureUsage) -> wgpu::TextureUsages {
    match usage {
        TextureUsage::RenderTarget => {
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING
        }
        TextureUsage::Sampled => wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    }
}

/// Byte size actually allocated for a buffer: copies need 4-byte multiples
/// and uniform bindings are padded to 16 bytes.
pub(super) fn padded_buffer_size(len: u64, usage: BufferUsage) -> u64 {
    let align = match usage {
        BufferUsage::Uniform => 16,
        _ => wgpu::COPY_BUFFER_ALIGNMENT,
    };
    len.max(1).div_ceil(align) * align
}

/// How a finished offscreen target reaches its destination texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ResolveStrategy {
    /// `copy_texture_to_texture`; needs `COPY_DST` and identical formats.
    Copy,
    /// Fullscreen draw sampling the source into the destination view.
    /// GL surfaces only expose `RENDER_ATTACHMENT`, so they land here.
    Draw,
}

pub(super) fn resolve_strategy(
    source: wgpu::TextureFormat,
    destination: wgpu::TextureFormat,
    destination_usage: wgpu::TextureUsages,
) -> Option<ResolveStrategy> {
    if destination_usage.contains(wgpu::TextureUsages::COPY_DST) && source == destination {
        Some(ResolveStrategy::Copy)
    } else if destination_usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
        Some(ResolveStrategy::Draw)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_buffers_are_padded_to_sixteen_bytes() {
        assert_eq!(padded_buffer_size(4, BufferUsage::Uniform), 16);
        assert_eq!(padded_buffer_size(8, BufferUsage::Uniform), 16);
        assert_eq!(padded_buffer_size(20, BufferUsage::Uniform), 32);
    }

    #[test]
    fn vertex_and_index_buffers_are_padded_to_copy_alignment() {
        assert_eq!(padded_buffer_size(32, BufferUsage::Vertex), 32);
        assert_eq!(padded_buffer_size(6, BufferUsage::Index), 8);
        assert_eq!(padded_buffer_size(0, BufferUsage::Vertex), 4);
    }

    #[test]
    fn render_target_format_follows_the_surface() {
        let surface = wgpu::TextureFormat::Bgra8UnormSrgb;
        assert_eq!(texture_format(Format::U8RgbaRt, surface), surface);
        assert_eq!(vertex_format(Format::F32Rg), Some(wgpu::VertexFormat::Float32x2));
        assert_eq!(index_format(Format::U32R), Some(wgpu::IndexFormat::Uint32));
        assert_eq!(index_format(Format::F32Rg), None);
    }

    #[test]
    fn render_only_surfaces_resolve_by_drawing() {
        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        assert_eq!(
            resolve_strategy(format, format, wgpu::TextureUsages::RENDER_ATTACHMENT),
            Some(ResolveStrategy::Draw)
        );
        assert_eq!(
            resolve_strategy(
                format,
                format,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST
            ),
            Some(ResolveStrategy::Copy)
        );
    }

    #[test]
    fn format_mismatch_falls_back_to_drawing() {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST;
        assert_eq!(
            resolve_strategy(
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureFormat::Bgra8Unorm,
                usage
            ),
            Some(ResolveStrategy::Draw)
        );
        assert_eq!(
            resolve_strategy(
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureFormat::Bgra8Unorm,
                wgpu::TextureUsages::COPY_DST
            ),
            None
        );
    }

    #[test]
    fn render_targets_can_be_sampled_for_a_draw_resolve() {
        let usage = texture_usages(TextureUsage::RenderTarget);
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(usage.contains(wgpu::TextureUsages::COPY_SRC));
    }
}
