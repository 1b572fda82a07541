use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wgpu::util::DeviceExt;

use crate::gpu::*;

use super::convert::{self, ResolveStrategy};
use super::surface::SurfaceState;

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct ProgramEntry {
    module: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
}

struct StreamLayout {
    array_stride: u64,
    step_mode: wgpu::VertexStepMode,
    attributes: Vec<wgpu::VertexAttribute>,
}

struct LayoutEntry {
    streams: Vec<StreamLayout>,
    index_format: Option<wgpu::IndexFormat>,
}

enum PassCommand {
    Viewport { x: f32, y: f32, width: f32, height: f32 },
    Pipeline(RenderPipeline),
    VertexInput {
        layout: InputLayout,
        vertex_buffers: Vec<Buffer>,
        index_buffer: Option<Buffer>,
    },
    Bindings(Bindings),
    DrawIndexed { index_count: u32, instance_count: u32 },
}

/// Pass commands are recorded against handles and replayed into a wgpu
/// render pass at submission, when every referenced resource is resolved.
struct RecordedPass {
    label: Option<String>,
    color_attachment: RenderTarget,
    clear_color: Option<wgpu::Color>,
    resolve_to: Option<Texture>,
    commands: Vec<PassCommand>,
}

/// Sampling pass used to resolve into textures that refuse copies.
/// Pipelines are built on first use, one per destination format.
struct DrawResolve {
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pipelines: RefCell<HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>>,
}

impl DrawResolve {
    fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("infinite-canvas resolve shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/resolve.wgsl").into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("infinite-canvas resolve bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("infinite-canvas resolve pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        // Source and destination share a size, so nearest sampling is exact.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("infinite-canvas resolve sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        Self {
            module,
            bind_group_layout,
            pipeline_layout,
            sampler,
            pipelines: RefCell::new(HashMap::new()),
        }
    }

    fn pipeline(&self, device: &wgpu::Device, format: wgpu::TextureFormat) -> wgpu::RenderPipeline {
        self.pipelines
            .borrow_mut()
            .entry(format)
            .or_insert_with(|| {
                log::debug!("building resolve pipeline for {format:?}");
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("infinite-canvas resolve pipeline"),
                    layout: Some(&self.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &self.module,
                        entry_point: Some("vs_main"),
                        compilation_options: Default::default(),
                        buffers: &[],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &self.module,
                        entry_point: Some("fs_main"),
                        compilation_options: Default::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview_mask: None,
                    cache: None,
                })
            })
            .clone()
    }

    fn draw(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        destination: &wgpu::Texture,
    ) {
        let pipeline = self.pipeline(device, destination.format());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("infinite-canvas resolve bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        let view = destination.create_view(&wgpu::TextureViewDescriptor::default());

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("infinite-canvas resolve pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_pipeline(&pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}

/// [`Device`] backed by a wgpu device/queue pair.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Rc<RefCell<SurfaceState>>,
    surface_format: wgpu::TextureFormat,
    track_resources: bool,
    draw_resolve: DrawResolve,

    tracker: ResourceTracker,
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, TextureEntry>,
    render_targets: HashMap<u64, Texture>,
    programs: HashMap<u64, ProgramEntry>,
    layouts: HashMap<u64, LayoutEntry>,
    pipelines: HashMap<u64, wgpu::RenderPipeline>,
    bindings: HashMap<u64, wgpu::BindGroup>,
    passes: HashMap<u64, RecordedPass>,
}

impl WgpuDevice {
    pub(super) fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Rc<RefCell<SurfaceState>>,
        surface_format: wgpu::TextureFormat,
        track_resources: bool,
    ) -> Self {
        let draw_resolve = DrawResolve::new(&device);
        Self {
            device,
            queue,
            surface,
            surface_format,
            track_resources,
            draw_resolve,
            tracker: ResourceTracker::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            render_targets: HashMap::new(),
            programs: HashMap::new(),
            layouts: HashMap::new(),
            pipelines: HashMap::new(),
            bindings: HashMap::new(),
            passes: HashMap::new(),
        }
    }

    /// Returns a reference to the logical device.
    pub fn raw(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn record(&mut self, pass: RenderPass, command: PassCommand) {
        match self.passes.get_mut(&pass.id()) {
            Some(recorded) => recorded.commands.push(command),
            None => log::warn!("command for unknown or submitted render pass #{}", pass.id()),
        }
    }

    fn target_entry(&self, target: RenderTarget) -> Option<&TextureEntry> {
        let texture = self.render_targets.get(&target.id())?;
        self.textures.get(&texture.id())
    }

    fn replay(
        &self,
        rpass: &mut wgpu::RenderPass<'_>,
        command: &PassCommand,
        index_format: &mut Option<wgpu::IndexFormat>,
    ) {
        match command {
            PassCommand::Viewport { x, y, width, height } => {
                rpass.set_viewport(*x, *y, *width, *height, 0.0, 1.0);
            }
            PassCommand::Pipeline(pipeline) => {
                if let Some(pipeline) = self.pipelines.get(&pipeline.id()) {
                    rpass.set_pipeline(pipeline);
                }
            }
            PassCommand::VertexInput {
                layout,
                vertex_buffers,
                index_buffer,
            } => {
                for (slot, buffer) in vertex_buffers.iter().enumerate() {
                    if let Some(buffer) = self.buffers.get(&buffer.id()) {
                        rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
                    }
                }
                *index_format = self.layouts.get(&layout.id()).and_then(|l| l.index_format);
                if let (Some(buffer), Some(format)) = (index_buffer, *index_format) {
                    if let Some(buffer) = self.buffers.get(&buffer.id()) {
                        rpass.set_index_buffer(buffer.slice(..), format);
                    }
                }
            }
            PassCommand::Bindings(bindings) => {
                if let Some(group) = self.bindings.get(&bindings.id()) {
                    rpass.set_bind_group(0, group, &[]);
                }
            }
            PassCommand::DrawIndexed {
                index_count,
                instance_count,
            } => {
                if index_format.is_some() {
                    rpass.draw_indexed(0..*index_count, 0, 0..*instance_count);
                }
            }
        }
    }

    /// Writes the rendered target into `destination`, by copy when the
    /// destination accepts one and by a sampling draw otherwise.
    fn resolve(&self, encoder: &mut wgpu::CommandEncoder, source: &TextureEntry, destination: &wgpu::Texture) {
        let strategy = convert::resolve_strategy(
            source.texture.format(),
            destination.format(),
            destination.usage(),
        );
        match strategy {
            Some(ResolveStrategy::Copy) => {
                let extent = wgpu::Extent3d {
                    width: source.texture.width().min(destination.width()),
                    height: source.texture.height().min(destination.height()),
                    depth_or_array_layers: 1,
                };
                encoder.copy_texture_to_texture(
                    source.texture.as_image_copy(),
                    destination.as_image_copy(),
                    extent,
                );
            }
            Some(ResolveStrategy::Draw) => {
                self.draw_resolve
                    .draw(&self.device, encoder, &source.view, destination);
            }
            None => log::warn!(
                "cannot resolve {:?} target into {:?} texture with usage {:?}",
                source.texture.format(),
                destination.format(),
                destination.usage()
            ),
        }
    }

    fn release_texture(&mut self, texture: Texture) {
        if let Some(entry) = self.textures.remove(&texture.id()) {
            entry.texture.destroy();
        }
    }
}

impl Device for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor<'_>) -> Buffer {
        let id = self.tracker.allocate(ResourceKind::Buffer, desc.label);
        let size = convert::padded_buffer_size(desc.contents.byte_len(), desc.usage);
        let usage = convert::buffer_usages(desc.usage);

        let buffer = match desc.contents {
            BufferContents::Data(data) => {
                let mut contents = data.to_vec();
                contents.resize(size as usize, 0);
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: desc.label,
                    contents: &contents,
                    usage,
                })
            }
            BufferContents::Size(_) => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: desc.label,
                size,
                usage,
                mapped_at_creation: false,
            }),
        };

        self.buffers.insert(id, buffer);
        Buffer::from_raw(id)
    }

    fn write_buffer(&mut self, buffer: Buffer, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer.id()) {
            Some(target) => self.queue.write_buffer(target, offset, data),
            None => log::warn!("write to unknown buffer #{}", buffer.id()),
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor<'_>) -> Texture {
        let id = self.tracker.allocate(ResourceKind::Texture, desc.label);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label,
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format, self.surface_format),
            usage: convert::texture_usages(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.textures.insert(id, TextureEntry { texture, view });
        Texture::from_raw(id)
    }

    fn create_render_target_from_texture(&mut self, texture: Texture) -> RenderTarget {
        let id = self.tracker.allocate(ResourceKind::RenderTarget, None);
        if !self.textures.contains_key(&texture.id()) {
            log::error!("render target #{id} wraps unknown texture #{}", texture.id());
        }
        self.render_targets.insert(id, texture);
        RenderTarget::from_raw(id)
    }

    fn create_program(&mut self, desc: &ProgramDescriptor<'_>) -> Program {
        let id = self.tracker.allocate(ResourceKind::Program, desc.label);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: desc.label,
            source: wgpu::ShaderSource::Wgsl(desc.wgsl.into()),
        });

        self.programs.insert(
            id,
            ProgramEntry {
                module,
                vertex_entry: desc.vertex_entry.to_owned(),
                fragment_entry: desc.fragment_entry.to_owned(),
            },
        );
        Program::from_raw(id)
    }

    fn create_input_layout(&mut self, desc: &InputLayoutDescriptor<'_>) -> InputLayout {
        let id = self.tracker.allocate(ResourceKind::InputLayout, desc.label);

        let streams = desc
            .vertex_buffers
            .iter()
            .map(|stream| StreamLayout {
                array_stride: stream.array_stride,
                step_mode: stream.step_mode,
                attributes: stream
                    .attributes
                    .iter()
                    .filter_map(|attr| match convert::vertex_format(attr.format) {
                        Some(format) => Some(wgpu::VertexAttribute {
                            format,
                            offset: attr.offset,
                            shader_location: attr.shader_location,
                        }),
                        None => {
                            log::error!(
                                "unsupported vertex format {:?} at location {}",
                                attr.format,
                                attr.shader_location
                            );
                            None
                        }
                    })
                    .collect(),
            })
            .collect();

        let index_format = desc.index_format.and_then(convert::index_format);
        self.layouts.insert(id, LayoutEntry { streams, index_format });
        InputLayout::from_raw(id)
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor<'_>) -> RenderPipeline {
        let id = self.tracker.allocate(ResourceKind::RenderPipeline, desc.label);

        let (Some(program), Some(layout)) = (
            self.programs.get(&desc.program.id()),
            self.layouts.get(&desc.input_layout.id()),
        ) else {
            log::error!("render pipeline #{id} references an unknown program or input layout");
            return RenderPipeline::from_raw(id);
        };

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = layout
            .streams
            .iter()
            .map(|stream| wgpu::VertexBufferLayout {
                array_stride: stream.array_stride,
                step_mode: stream.step_mode,
                attributes: &stream.attributes,
            })
            .collect();

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: desc.label,
            layout: None,
            vertex: wgpu::VertexState {
                module: &program.module,
                entry_point: Some(&program.vertex_entry),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.module,
                entry_point: Some(&program.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: convert::texture_format(desc.color_attachment_format, self.surface_format),
                    blend: desc.blend,
                    write_mask: desc.write_mask,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipelines.insert(id, pipeline);
        RenderPipeline::from_raw(id)
    }

    fn create_bindings(&mut self, desc: &BindingsDescriptor<'_>) -> Bindings {
        let id = self.tracker.allocate(ResourceKind::Bindings, desc.label);

        let Some(pipeline) = self.pipelines.get(&desc.pipeline.id()) else {
            log::error!("bindings #{id} reference unknown pipeline #{}", desc.pipeline.id());
            return Bindings::from_raw(id);
        };

        let mut entries = Vec::with_capacity(desc.uniform_buffers.len());
        for (binding, buffer) in desc.uniform_buffers.iter().enumerate() {
            let Some(buffer) = self.buffers.get(&buffer.id()) else {
                log::error!("bindings #{id} reference unknown buffer #{}", buffer.id());
                return Bindings::from_raw(id);
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            });
        }

        let layout = pipeline.get_bind_group_layout(0);
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: desc.label,
            layout: &layout,
            entries: &entries,
        });

        self.bindings.insert(id, group);
        Bindings::from_raw(id)
    }

    fn begin_frame(&mut self) {
        if !self.passes.is_empty() {
            log::warn!("{} render pass(es) were never submitted", self.passes.len());
            self.passes.clear();
        }
    }

    fn create_render_pass(&mut self, desc: &RenderPassDescriptor<'_>) -> RenderPass {
        let id = self.tracker.next_untracked_id();
        self.passes.insert(
            id,
            RecordedPass {
                label: desc.label.map(str::to_owned),
                color_attachment: desc.color_attachment,
                clear_color: desc.clear_color,
                resolve_to: desc.resolve_to,
                commands: Vec::new(),
            },
        );
        RenderPass::from_raw(id)
    }

    fn set_viewport(&mut self, pass: RenderPass, x: f32, y: f32, width: f32, height: f32) {
        self.record(pass, PassCommand::Viewport { x, y, width, height });
    }

    fn set_pipeline(&mut self, pass: RenderPass, pipeline: RenderPipeline) {
        self.record(pass, PassCommand::Pipeline(pipeline));
    }

    fn set_vertex_input(
        &mut self,
        pass: RenderPass,
        layout: InputLayout,
        vertex_buffers: &[Buffer],
        index_buffer: Option<Buffer>,
    ) {
        self.record(
            pass,
            PassCommand::VertexInput {
                layout,
                vertex_buffers: vertex_buffers.to_vec(),
                index_buffer,
            },
        );
    }

    fn set_bindings(&mut self, pass: RenderPass, bindings: Bindings) {
        self.record(pass, PassCommand::Bindings(bindings));
    }

    fn draw_indexed(&mut self, pass: RenderPass, index_count: u32, instance_count: u32) {
        self.record(
            pass,
            PassCommand::DrawIndexed {
                index_count,
                instance_count,
            },
        );
    }

    fn submit_pass(&mut self, pass: RenderPass) {
        let Some(recorded) = self.passes.remove(&pass.id()) else {
            log::warn!("submit of unknown render pass #{}", pass.id());
            return;
        };
        let Some(target) = self.target_entry(recorded.color_attachment) else {
            log::warn!(
                "render pass #{} targets unknown render target #{}",
                pass.id(),
                recorded.color_attachment.id()
            );
            return;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("infinite-canvas frame encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: recorded.label.as_deref(),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match recorded.clear_color {
                            Some(color) => wgpu::LoadOp::Clear(color),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let mut index_format = None;
            for command in &recorded.commands {
                self.replay(&mut rpass, command, &mut index_format);
            }
        }

        match recorded.resolve_to {
            Some(texture) if texture == Texture::ONSCREEN => {
                let surface = self.surface.borrow();
                if let Some(frame) = surface.current() {
                    self.resolve(&mut encoder, target, &frame.texture);
                }
            }
            Some(texture) => {
                if let Some(entry) = self.textures.get(&texture.id()) {
                    self.resolve(&mut encoder, target, &entry.texture);
                }
            }
            None => {}
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn end_frame(&mut self) {
        self.surface.borrow_mut().present();
    }

    fn destroy_resource(&mut self, resource: ResourceHandle) {
        if !self.tracker.release(resource) {
            return;
        }

        match resource {
            ResourceHandle::Buffer(buffer) => {
                if let Some(buffer) = self.buffers.remove(&buffer.id()) {
                    buffer.destroy();
                }
            }
            ResourceHandle::Texture(texture) => self.release_texture(texture),
            ResourceHandle::RenderTarget(target) => {
                if let Some(texture) = self.render_targets.remove(&target.id()) {
                    self.tracker.release(texture.into());
                    self.release_texture(texture);
                }
            }
            ResourceHandle::Program(program) => {
                self.programs.remove(&program.id());
            }
            ResourceHandle::InputLayout(layout) => {
                self.layouts.remove(&layout.id());
            }
            ResourceHandle::RenderPipeline(pipeline) => {
                self.pipelines.remove(&pipeline.id());
            }
            ResourceHandle::Bindings(bindings) => {
                self.bindings.remove(&bindings.id());
            }
        }
    }

    fn destroy(&mut self) {
        self.passes.clear();
        self.draw_resolve.pipelines.borrow_mut().clear();
        self.bindings.clear();
        self.pipelines.clear();
        self.layouts.clear();
        self.programs.clear();
        self.render_targets.clear();
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy();
        }
        for (_, entry) in self.textures.drain() {
            entry.texture.destroy();
        }
        self.surface.borrow_mut().release();
        self.device.destroy();
        log::info!("wgpu device destroyed");
    }

    fn check_for_leaks(&self) -> Vec<LiveResource> {
        if !self.track_resources {
            return Vec::new();
        }
        self.tracker.leaks()
    }
}
