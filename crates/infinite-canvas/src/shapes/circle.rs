use bytemuck::{Pod, Zeroable};

use crate::error::CanvasError;
use crate::gpu::*;

use super::Renderable;

/// Edge treatment applied by the circle shader.
///
/// The discriminant is the value uploaded to the shader.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AntiAliasingType {
    /// Hard edge: fragments outside the radius are discarded.
    #[default]
    None = 0,
    Smoothstep = 1,
    /// Distance to the edge divided by its screen-space derivative.
    Divide = 2,
    Fwidth = 3,
}

impl AntiAliasingType {
    pub const ALL: [AntiAliasingType; 4] = [
        AntiAliasingType::None,
        AntiAliasingType::Smoothstep,
        AntiAliasingType::Divide,
        AntiAliasingType::Fwidth,
    ];
}

/// Construction attributes of a [`Circle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CircleConfig {
    pub anti_aliasing: AntiAliasingType,
    pub cx: f32,
    pub cy: f32,
    /// Any CSS color string.
    pub fill: String,
    pub r: f32,
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            anti_aliasing: AntiAliasingType::None,
            cx: 0.0,
            cy: 0.0,
            fill: "black".to_owned(),
            r: 0.0,
        }
    }
}

// ── gpu data ──────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct CircleInstance {
    center: [f32; 2],
    radius: [f32; 2],
    color: [f32; 4],
}

const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

const QUAD_ATTRIBUTES: [VertexAttribute; 1] = [VertexAttribute {
    shader_location: 0,
    offset: 0,
    format: Format::F32Rg,
}];

const INSTANCE_ATTRIBUTES: [VertexAttribute; 3] = [
    VertexAttribute {
        shader_location: 1,
        offset: 0,
        format: Format::F32Rg,
    },
    VertexAttribute {
        shader_location: 2,
        offset: 8,
        format: Format::F32Rg,
    },
    VertexAttribute {
        shader_location: 3,
        offset: 16,
        format: Format::F32Rgba,
    },
];

/// Every device resource a circle owns once it has been rendered.
struct CircleResources {
    device: SharedDevice,
    uniform_buffer: Buffer,
    program: Program,
    instance_buffer: Buffer,
    quad_buffer: Buffer,
    index_buffer: Buffer,
    input_layout: InputLayout,
    pipeline: RenderPipeline,
    bindings: Bindings,
}

impl CircleResources {
    fn create(
        device: &SharedDevice,
        anti_aliasing: AntiAliasingType,
        frame_uniforms: Buffer,
    ) -> Self {
        let mut dev = device.borrow_mut();

        let aa = [anti_aliasing as u8 as f32];
        let uniform_buffer = dev.create_buffer(&BufferDescriptor {
            label: Some("circle uniforms"),
            contents: BufferContents::Data(bytemuck::cast_slice(&aa)),
            usage: BufferUsage::Uniform,
            hint: BufferFrequencyHint::Static,
        });

        let program = dev.create_program(&ProgramDescriptor {
            label: Some("circle program"),
            wgsl: include_str!("shaders/circle.wgsl"),
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
        });

        let instance_buffer = dev.create_buffer(&BufferDescriptor {
            label: Some("circle instances"),
            contents: BufferContents::Size(std::mem::size_of::<CircleInstance>() as u64),
            usage: BufferUsage::Vertex,
            hint: BufferFrequencyHint::Dynamic,
        });
        let quad_buffer = dev.create_buffer(&BufferDescriptor {
            label: Some("circle quad"),
            contents: BufferContents::Data(bytemuck::cast_slice(&QUAD_VERTICES)),
            usage: BufferUsage::Vertex,
            hint: BufferFrequencyHint::Static,
        });
        let index_buffer = dev.create_buffer(&BufferDescriptor {
            label: Some("circle indices"),
            contents: BufferContents::Data(bytemuck::cast_slice(&QUAD_INDICES)),
            usage: BufferUsage::Index,
            hint: BufferFrequencyHint::Static,
        });

        let input_layout = dev.create_input_layout(&InputLayoutDescriptor {
            label: Some("circle input layout"),
            vertex_buffers: &[
                VertexBufferDescriptor {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &QUAD_ATTRIBUTES,
                },
                VertexBufferDescriptor {
                    array_stride: std::mem::size_of::<CircleInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &INSTANCE_ATTRIBUTES,
                },
            ],
            index_format: Some(Format::U32R),
            program,
        });

        let pipeline = dev.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("circle pipeline"),
            program,
            input_layout,
            color_attachment_format: Format::U8RgbaRt,
            blend: Some(source_over_blend()),
            write_mask: wgpu::ColorWrites::ALL,
        });

        let bindings = dev.create_bindings(&BindingsDescriptor {
            label: Some("circle bindings"),
            pipeline,
            uniform_buffers: &[frame_uniforms, uniform_buffer],
        });

        drop(dev);
        Self {
            device: device.clone(),
            uniform_buffer,
            program,
            instance_buffer,
            quad_buffer,
            index_buffer,
            input_layout,
            pipeline,
            bindings,
        }
    }

    fn release(self) {
        let mut dev = self.device.borrow_mut();
        dev.destroy_resource(self.bindings.into());
        dev.destroy_resource(self.pipeline.into());
        dev.destroy_resource(self.input_layout.into());
        dev.destroy_resource(self.program.into());
        dev.destroy_resource(self.instance_buffer.into());
        dev.destroy_resource(self.quad_buffer.into());
        dev.destroy_resource(self.index_buffer.into());
        dev.destroy_resource(self.uniform_buffer.into());
    }
}

enum GpuState {
    /// Nothing allocated yet; resources are created on first render.
    Pending,
    Ready(CircleResources),
    Destroyed,
}

// ── circle ────────────────────────────────────────────────────────────────

/// Filled circle drawn as one instanced quad.
///
/// Attribute changes only mark the circle dirty; the instance data is
/// uploaded on the next render.
pub struct Circle {
    anti_aliasing: AntiAliasingType,
    cx: f32,
    cy: f32,
    r: f32,
    fill: String,
    fill_rgba: [f32; 4],
    render_dirty: bool,
    gpu: GpuState,
}

impl Circle {
    pub fn new(config: CircleConfig) -> Result<Self, CanvasError> {
        let fill_rgba = parse_fill(&config.fill)?;
        Ok(Self {
            anti_aliasing: config.anti_aliasing,
            cx: config.cx,
            cy: config.cy,
            r: config.r,
            fill: config.fill,
            fill_rgba,
            render_dirty: true,
            gpu: GpuState::Pending,
        })
    }

    /// Fixed at construction.
    #[inline]
    pub fn anti_aliasing(&self) -> AntiAliasingType {
        self.anti_aliasing
    }

    #[inline]
    pub fn cx(&self) -> f32 {
        self.cx
    }

    #[inline]
    pub fn cy(&self) -> f32 {
        self.cy
    }

    #[inline]
    pub fn r(&self) -> f32 {
        self.r
    }

    #[inline]
    pub fn fill(&self) -> &str {
        &self.fill
    }

    /// Fill as normalized RGBA.
    #[inline]
    pub fn fill_rgba(&self) -> [f32; 4] {
        self.fill_rgba
    }

    pub fn set_cx(&mut self, cx: f32) {
        if self.cx != cx {
            self.cx = cx;
            self.render_dirty = true;
        }
    }

    pub fn set_cy(&mut self, cy: f32) {
        if self.cy != cy {
            self.cy = cy;
            self.render_dirty = true;
        }
    }

    pub fn set_r(&mut self, r: f32) {
        if self.r != r {
            self.r = r;
            self.render_dirty = true;
        }
    }

    /// Sets the fill from a CSS color string. On error the previous fill is
    /// kept.
    pub fn set_fill(&mut self, fill: &str) -> Result<(), CanvasError> {
        if self.fill == fill {
            return Ok(());
        }
        self.fill_rgba = parse_fill(fill)?;
        self.fill = fill.to_owned();
        self.render_dirty = true;
        Ok(())
    }

    fn instance(&self) -> CircleInstance {
        CircleInstance {
            center: [self.cx, self.cy],
            radius: [self.r, self.r],
            color: self.fill_rgba,
        }
    }
}

impl Renderable for Circle {
    fn render(&mut self, device: &SharedDevice, pass: RenderPass, frame_uniforms: Buffer) {
        if let GpuState::Pending = self.gpu {
            log::debug!("creating circle resources ({:?})", self.anti_aliasing);
            self.gpu = GpuState::Ready(CircleResources::create(
                device,
                self.anti_aliasing,
                frame_uniforms,
            ));
        }

        let res = match &self.gpu {
            GpuState::Ready(res) => res,
            GpuState::Pending => return,
            GpuState::Destroyed => {
                log::warn!("render of a destroyed circle ignored");
                return;
            }
        };

        let mut dev = device.borrow_mut();
        if self.render_dirty {
            let instance = self.instance();
            dev.write_buffer(res.instance_buffer, 0, bytemuck::bytes_of(&instance));
            self.render_dirty = false;
        }

        dev.set_pipeline(pass, res.pipeline);
        dev.set_vertex_input(
            pass,
            res.input_layout,
            &[res.quad_buffer, res.instance_buffer],
            Some(res.index_buffer),
        );
        dev.set_bindings(pass, res.bindings);
        dev.draw_indexed(pass, QUAD_INDICES.len() as u32, 1);
    }

    fn destroy(&mut self) {
        match std::mem::replace(&mut self.gpu, GpuState::Destroyed) {
            GpuState::Ready(res) => res.release(),
            GpuState::Pending | GpuState::Destroyed => {}
        }
    }

    #[inline]
    fn is_render_dirty(&self) -> bool {
        self.render_dirty
    }
}

impl std::fmt::Debug for Circle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gpu = match self.gpu {
            GpuState::Pending => "pending",
            GpuState::Ready(_) => "ready",
            GpuState::Destroyed => "destroyed",
        };
        f.debug_struct("Circle")
            .field("anti_aliasing", &self.anti_aliasing)
            .field("cx", &self.cx)
            .field("cy", &self.cy)
            .field("r", &self.r)
            .field("fill", &self.fill)
            .field("render_dirty", &self.render_dirty)
            .field("gpu", &gpu)
            .finish()
    }
}

fn parse_fill(value: &str) -> Result<[f32; 4], CanvasError> {
    csscolorparser::parse(value)
        .map(|color| color.to_array().map(|c| c as f32))
        .map_err(|err| CanvasError::InvalidColor {
            value: value.to_owned(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::gpu::headless::{DeviceCall, HeadlessCanvas, HeadlessContribution, HeadlessProbe};

    fn red_circle() -> Circle {
        Circle::new(CircleConfig {
            cx: 50.0,
            cy: 50.0,
            r: 25.0,
            fill: "red".to_owned(),
            ..CircleConfig::default()
        })
        .unwrap()
    }

    struct Frame {
        device: SharedDevice,
        probe: HeadlessProbe,
        pass: RenderPass,
        uniforms: Buffer,
    }

    fn frame() -> Frame {
        let contribution = HeadlessContribution::new();
        let probe = contribution.probe();
        let swap_chain =
            pollster::block_on(contribution.create_swap_chain(Rc::new(HeadlessCanvas::new(100, 100))))
                .unwrap();
        let device = swap_chain.device();

        let (uniforms, pass) = {
            let mut dev = device.borrow_mut();
            let uniforms = dev.create_buffer(&BufferDescriptor {
                label: Some("frame uniforms"),
                contents: BufferContents::Size(8),
                usage: BufferUsage::Uniform,
                hint: BufferFrequencyHint::Dynamic,
            });
            let pass = dev.create_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachment: RenderTarget::from_raw(0),
                clear_color: None,
                resolve_to: None,
            });
            (uniforms, pass)
        };

        Frame {
            device,
            probe,
            pass,
            uniforms,
        }
    }

    fn instance_writes(probe: &HeadlessProbe) -> Vec<Vec<u8>> {
        let instances = probe.buffer_labeled("circle instances").unwrap();
        probe
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::WriteBuffer { buffer, data, .. } if buffer == instances => Some(data),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn new_circle_is_dirty_with_parsed_fill() {
        let circle = red_circle();
        assert!(circle.is_render_dirty());
        assert_eq!(circle.fill_rgba(), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(circle.anti_aliasing(), AntiAliasingType::None);
    }

    #[test]
    fn setting_same_value_keeps_clean() {
        let f = frame();
        let mut circle = red_circle();
        circle.render(&f.device, f.pass, f.uniforms);
        assert!(!circle.is_render_dirty());

        circle.set_cx(50.0);
        circle.set_cy(50.0);
        circle.set_r(25.0);
        circle.set_fill("red").unwrap();
        assert!(!circle.is_render_dirty());

        circle.set_r(30.0);
        assert!(circle.is_render_dirty());
        circle.render(&f.device, f.pass, f.uniforms);
        assert!(!circle.is_render_dirty());

        circle.set_fill("#00ff00").unwrap();
        assert!(circle.is_render_dirty());
        assert_eq!(circle.fill_rgba(), [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn invalid_fill_is_rejected() {
        let mut circle = red_circle();
        circle.render_dirty = false;

        let err = circle.set_fill("not-a-color").unwrap_err();
        assert!(matches!(err, CanvasError::InvalidColor { ref value, .. } if value == "not-a-color"));
        assert_eq!(circle.fill(), "red");
        assert!(!circle.is_render_dirty());

        let err = Circle::new(CircleConfig {
            fill: "nope".to_owned(),
            ..CircleConfig::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn resources_are_created_once() {
        let f = frame();
        let mut circle = red_circle();
        let before = f.probe.allocations();

        circle.render(&f.device, f.pass, f.uniforms);
        assert_eq!(f.probe.allocations(), before + 8);

        circle.render(&f.device, f.pass, f.uniforms);
        circle.render(&f.device, f.pass, f.uniforms);
        assert_eq!(f.probe.allocations(), before + 8);
        assert_eq!(f.probe.count(|c| matches!(c, DeviceCall::CreateProgram { .. })), 1);
        assert_eq!(
            f.probe.count(|c| matches!(
                c,
                DeviceCall::DrawIndexed {
                    index_count: 6,
                    instance_count: 1,
                    ..
                }
            )),
            3
        );
    }

    #[test]
    fn instance_data_is_uploaded_only_when_dirty() {
        let f = frame();
        let mut circle = red_circle();

        circle.render(&f.device, f.pass, f.uniforms);
        circle.render(&f.device, f.pass, f.uniforms);
        let writes = instance_writes(&f.probe);
        assert_eq!(writes.len(), 1);

        let expected: [f32; 8] = [50.0, 50.0, 25.0, 25.0, 1.0, 0.0, 0.0, 1.0];
        assert_eq!(writes[0], bytemuck::cast_slice::<f32, u8>(&expected));

        circle.set_cx(60.0);
        circle.render(&f.device, f.pass, f.uniforms);
        assert_eq!(instance_writes(&f.probe).len(), 2);
    }

    #[test]
    fn bindings_use_frame_then_shape_uniforms() {
        let f = frame();
        let mut circle = red_circle();
        circle.render(&f.device, f.pass, f.uniforms);

        let own = f.probe.buffer_labeled("circle uniforms").unwrap();
        let bound = f.probe.calls().into_iter().find_map(|call| match call {
            DeviceCall::CreateBindings { uniform_buffers, .. } => Some(uniform_buffers),
            _ => None,
        });
        assert_eq!(bound, Some(vec![f.uniforms, own]));
    }

    #[test]
    fn destroy_releases_everything_once() {
        let f = frame();
        let mut circle = red_circle();
        circle.render(&f.device, f.pass, f.uniforms);
        assert_eq!(f.probe.live_count(), 9);

        circle.destroy();
        circle.destroy();
        assert_eq!(f.probe.live_count(), 1);
        assert_eq!(f.probe.count(|c| matches!(c, DeviceCall::Destroy { .. })), 8);
    }

    #[test]
    fn destroy_before_render_is_a_no_op() {
        let f = frame();
        let mut circle = red_circle();
        circle.destroy();
        assert_eq!(f.probe.count(|c| matches!(c, DeviceCall::Destroy { .. })), 0);

        circle.render(&f.device, f.pass, f.uniforms);
        assert_eq!(f.probe.count(|c| matches!(c, DeviceCall::CreateProgram { .. })), 0);
        assert_eq!(f.probe.count(|c| matches!(c, DeviceCall::DrawIndexed { .. })), 0);
    }
}
