//! wgpu implementation of [`GpuBackend`]
//!
//! The engine core issues immediate-mode style calls (bind a framebuffer,
//! bind textures, draw). wgpu wants whole render passes, so this backend
//! records the calls into pass records and replays them in
//! [`WgpuBackend::render_frame`].
//!
//! Every program shares one pipeline layout:
//! - group 0: camera uniform (binding 0), point light storage (binding 1)
//! - group 1: per-draw uniform block with a dynamic offset
//! - group 2: ten 2D texture slots, the cubemap slot (10), a linear sampler (11)
//!
//! Empty texture slots read a 1x1 white texture so every shader sees a
//! complete bind group.

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::*;
use crate::error::EmberError;
use crate::gfx::resources::texture::expand_rgb_to_rgba;
use crate::wgpu_utils::{self, DynamicUniformBuffer};

const TEXTURE_SLOTS: usize = 10;
const CUBE_SLOT: usize = 10;
const SLOT_COUNT: usize = TEXTURE_SLOTS + 1;
const SAMPLER_BINDING: u32 = 11;

/// Size of the `Draw` block declared in the shared shader header.
const DRAW_BLOCK_SIZE: u64 = 192;
const INITIAL_DRAW_CAPACITY: u64 = 256;
/// Header plus one light; the smallest valid binding of the lights array.
const MIN_STORAGE_SIZE: u64 = 64;

const CAMERA_BINDING: u32 = 0;
const LIGHTS_BINDING: u32 = 1;

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        // Rgb8 uploads are widened to RGBA before the copy
        PixelFormat::Rgba8 | PixelFormat::Rgb8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        4 => wgpu::VertexFormat::Float32x4,
        n => panic!("Unsupported vertex attribute of {} floats", n),
    }
}

fn vertex_attributes(layout: &VertexLayout) -> Vec<wgpu::VertexAttribute> {
    let mut offset = 0;
    layout
        .attributes
        .iter()
        .enumerate()
        .map(|(location, &components)| {
            let attribute = wgpu::VertexAttribute {
                format: vertex_format(components),
                offset,
                shader_location: location as u32,
            };
            offset += components as u64 * 4;
            attribute
        })
        .collect()
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

struct GpuVertexArray {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    layout: VertexLayout,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    binding: u32,
}

struct GpuShader {
    name: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
}

struct GpuFramebuffer {
    desc: FramebufferDesc,
    colors: Vec<TextureId>,
    depth: Option<TextureId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: ShaderId,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    layout: VertexLayout,
    state: RenderState,
}

struct DrawCall {
    shader: ShaderId,
    vertex_array: VertexArrayId,
    textures: [Option<TextureId>; SLOT_COUNT],
    uniform_offset: u32,
    state: RenderState,
}

struct PassRecord {
    target: Option<FramebufferId>,
    clear: Option<[f32; 4]>,
    draws: Vec<DrawCall>,
}

impl PassRecord {
    fn new(target: Option<FramebufferId>) -> Self {
        Self {
            target,
            clear: None,
            draws: Vec::new(),
        }
    }
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    surface_format: wgpu::TextureFormat,
    next_handle: u32,

    textures: HashMap<TextureId, GpuTexture>,
    vertex_arrays: HashMap<VertexArrayId, GpuVertexArray>,
    buffers: HashMap<BufferId, GpuBuffer>,
    shaders: HashMap<ShaderId, GpuShader>,
    framebuffers: HashMap<FramebufferId, GpuFramebuffer>,

    globals_layout: wgpu::BindGroupLayout,
    draw_layout: wgpu::BindGroupLayout,
    textures_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    globals_bind_group: Option<wgpu::BindGroup>,
    draw_uniforms: DynamicUniformBuffer,
    draw_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    fallback_view: wgpu::TextureView,
    fallback_cube_view: wgpu::TextureView,
    fallback_camera: wgpu::Buffer,
    fallback_lights: wgpu::Buffer,

    screen_depth: wgpu::TextureView,
    viewport: (u32, u32, u32, u32),
    render_state: RenderState,

    bound_textures: [Option<TextureId>; SLOT_COUNT],
    bound_shader: Option<ShaderId>,
    pending_uniforms: Vec<u8>,
    current_pass: Option<PassRecord>,
    passes: Vec<PassRecord>,
}

impl WgpuBackend {
    /// Wraps an existing device. `surface_format` is the format of the views
    /// later handed to [`WgpuBackend::render_frame`]; it should be a non-sRGB
    /// format since the composite pass applies gamma itself.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        adapter_info: wgpu::AdapterInfo,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let vertex_fragment = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let fragment = wgpu::ShaderStages::FRAGMENT;

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Globals Layout"),
            entries: &[
                wgpu_utils::entry(CAMERA_BINDING, vertex_fragment, wgpu_utils::uniform()),
                wgpu_utils::entry(LIGHTS_BINDING, fragment, wgpu_utils::storage_buffer_read_only()),
            ],
        });

        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniforms Layout"),
            entries: &[wgpu_utils::entry(
                0,
                vertex_fragment,
                wgpu_utils::uniform_dynamic(DRAW_BLOCK_SIZE),
            )],
        });

        let mut texture_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..TEXTURE_SLOTS as u32)
            .map(|slot| wgpu_utils::entry(slot, fragment, wgpu_utils::texture_2d()))
            .collect();
        texture_entries.push(wgpu_utils::entry(CUBE_SLOT as u32, fragment, wgpu_utils::texture_cube()));
        texture_entries.push(wgpu_utils::entry(
            SAMPLER_BINDING,
            fragment,
            wgpu_utils::sampler(wgpu::SamplerBindingType::Filtering),
        ));
        let textures_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Slots Layout"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Engine Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &draw_layout, &textures_layout],
            push_constant_ranges: &[],
        });

        let draw_uniforms = DynamicUniformBuffer::new(&device, "Draw", DRAW_BLOCK_SIZE, INITIAL_DRAW_CAPACITY);
        let draw_bind_group = Self::create_draw_bind_group(&device, &draw_layout, &draw_uniforms);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white = [255u8; 4 * 6];
        let fallback = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("Fallback White"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &white[..4],
        );
        let fallback_cube = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("Fallback Cube"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &white,
        );
        let fallback_view = fallback.create_view(&wgpu::TextureViewDescriptor::default());
        let fallback_cube_view = fallback_cube.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let fallback_camera = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fallback Camera"),
            size: 80,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });
        let fallback_lights = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fallback Lights"),
            size: MIN_STORAGE_SIZE,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let screen_depth = Self::create_screen_depth(&device, 1, 1);

        Self {
            device,
            queue,
            adapter_info,
            surface_format,
            next_handle: 1,
            textures: HashMap::new(),
            vertex_arrays: HashMap::new(),
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            framebuffers: HashMap::new(),
            globals_layout,
            draw_layout,
            textures_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            globals_bind_group: None,
            draw_uniforms,
            draw_bind_group,
            sampler,
            fallback_view,
            fallback_cube_view,
            fallback_camera,
            fallback_lights,
            screen_depth,
            viewport: (0, 0, 1, 1),
            render_state: RenderState::default(),
            bound_textures: [None; SLOT_COUNT],
            bound_shader: None,
            pending_uniforms: vec![0; DRAW_BLOCK_SIZE as usize],
            current_pass: None,
            passes: Vec::new(),
        }
    }

    /// Backend on the default adapter without any surface. Frames are
    /// rendered into caller-provided texture views.
    pub fn new_headless(surface_format: wgpu::TextureFormat) -> crate::error::Result<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| EmberError::Device(e.to_string()))?;

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("Ember Device"),
                    required_features: wgpu::Features::default(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: 4096,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                    memory_hints: wgpu::MemoryHints::default(),
                    trace: wgpu::Trace::Off,
                })
                .await
                .map_err(|e| EmberError::Device(e.to_string()))?;

            Ok(Self::new(
                Arc::new(device),
                Arc::new(queue),
                adapter.get_info(),
                surface_format,
            ))
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    fn next(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn create_draw_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniforms: &DynamicUniformBuffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Uniforms"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.binding_resource(),
            }],
        })
    }

    fn create_screen_depth(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Screen Depth"),
                size: wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Depth32Float,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn allocate_texture(&self, desc: &TextureDesc) -> GpuTexture {
        let usage = match (desc.kind, desc.format.is_depth()) {
            (TextureKind::Cube, _) => wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            (TextureKind::D2, true) => wgpu::TextureUsages::RENDER_ATTACHMENT,
            (TextureKind::D2, false) => {
                wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
            }
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: desc.kind.layers(),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage,
            view_formats: &[],
        });

        let dimension = match desc.kind {
            TextureKind::D2 => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        });

        GpuTexture {
            texture,
            view,
            desc: desc.clone(),
        }
    }

    fn attachment_descs(desc: &FramebufferDesc) -> (Vec<TextureDesc>, Option<TextureDesc>) {
        let colors = desc
            .color_formats
            .iter()
            .enumerate()
            .map(|(i, format)| TextureDesc::new_2d(&format!("{} Color {}", desc.label, i), desc.width, desc.height, *format))
            .collect();
        let depth = desc.depth.then(|| {
            TextureDesc::new_2d(
                &format!("{} Depth", desc.label),
                desc.width,
                desc.height,
                PixelFormat::Depth32Float,
            )
        });
        (colors, depth)
    }

    fn pass_mut(&mut self) -> &mut PassRecord {
        self.current_pass.get_or_insert_with(|| PassRecord::new(None))
    }

    fn finish_pass(&mut self) {
        if let Some(pass) = self.current_pass.take() {
            self.passes.push(pass);
        }
    }

    fn create_globals_bind_group(&self) -> wgpu::BindGroup {
        let find = |binding: u32| {
            self.buffers
                .values()
                .find(|b| b.binding == binding)
                .map(|b| &b.buffer)
        };
        let camera = find(CAMERA_BINDING).unwrap_or(&self.fallback_camera);
        let lights = find(LIGHTS_BINDING).unwrap_or(&self.fallback_lights);

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Globals"),
            layout: &self.globals_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: CAMERA_BINDING,
                    resource: camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: LIGHTS_BINDING,
                    resource: lights.as_entire_binding(),
                },
            ],
        })
    }

    fn create_textures_bind_group(&self, slots: &[Option<TextureId>; SLOT_COUNT]) -> wgpu::BindGroup {
        let view_for = |slot: usize, kind: TextureKind| -> Option<&wgpu::TextureView> {
            slots[slot]
                .and_then(|id| self.textures.get(&id))
                .filter(|t| t.desc.kind == kind && !t.desc.format.is_depth())
                .map(|t| &t.view)
        };

        let views: Vec<&wgpu::TextureView> = (0..TEXTURE_SLOTS)
            .map(|slot| view_for(slot, TextureKind::D2).unwrap_or(&self.fallback_view))
            .chain(std::iter::once(
                view_for(CUBE_SLOT, TextureKind::Cube).unwrap_or(&self.fallback_cube_view),
            ))
            .collect();

        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture Slots"),
            layout: &self.textures_layout,
            entries: &entries,
        })
    }

    /// Color and depth formats of a pass target.
    fn target_formats(&self, target: Option<FramebufferId>) -> (Vec<wgpu::TextureFormat>, Option<wgpu::TextureFormat>) {
        match target.and_then(|id| self.framebuffers.get(&id)) {
            Some(fb) => (
                fb.desc.color_formats.iter().map(|f| texture_format(*f)).collect(),
                fb.desc.depth.then_some(wgpu::TextureFormat::Depth32Float),
            ),
            None => (vec![self.surface_format], Some(wgpu::TextureFormat::Depth32Float)),
        }
    }

    fn pipeline_key(&self, draw: &DrawCall, target: Option<FramebufferId>) -> Option<PipelineKey> {
        let layout = self.vertex_arrays.get(&draw.vertex_array)?.layout.clone();
        let (color_formats, depth_format) = self.target_formats(target);
        Some(PipelineKey {
            shader: draw.shader,
            color_formats,
            depth_format,
            layout,
            state: draw.state,
        })
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        let Some(shader) = self.shaders.get(&key.shader) else {
            return;
        };

        let attributes = vertex_attributes(&key.layout);
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: key.layout.stride(),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let blend = key.state.blending.then_some(wgpu::BlendState::ALPHA_BLENDING);
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        let depth_compare = if key.state.depth_test {
            wgpu::CompareFunction::LessEqual
        } else {
            wgpu::CompareFunction::Always
        };
        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&shader.name),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader.vertex,
                entry_point: Some("vs_main"),
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader.fragment,
                entry_point: Some("fs_main"),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Two-sided materials are resolved in the fragment stage
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => log::error!("Failed to create pipeline for '{}': {}", shader.name, err),
            None => {
                log::debug!("Created pipeline for '{}'", shader.name);
                self.pipelines.insert(key.clone(), pipeline);
            }
        }
    }

    /// Replays every call recorded since the previous frame. Screen passes
    /// render into `target`, which must have the surface format and the
    /// size of the last viewport.
    pub fn render_frame(&mut self, target: &wgpu::TextureView) {
        self.finish_pass();
        let passes = std::mem::take(&mut self.passes);

        if self.draw_uniforms.upload(&self.device, &self.queue) {
            self.draw_bind_group = Self::create_draw_bind_group(&self.device, &self.draw_layout, &self.draw_uniforms);
        }
        if self.globals_bind_group.is_none() {
            self.globals_bind_group = Some(self.create_globals_bind_group());
        }

        for pass in &passes {
            for draw in &pass.draws {
                if let Some(key) = self.pipeline_key(draw, pass.target) {
                    self.ensure_pipeline(&key);
                }
            }
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        for pass in &passes {
            self.encode_pass(&mut encoder, pass, target);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.draw_uniforms.clear();
    }

    fn encode_pass(&self, encoder: &mut wgpu::CommandEncoder, pass: &PassRecord, target: &wgpu::TextureView) {
        let texture_groups: Vec<wgpu::BindGroup> = pass
            .draws
            .iter()
            .map(|draw| self.create_textures_bind_group(&draw.textures))
            .collect();

        let load = match pass.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = match pass.clear {
            Some(_) => wgpu::LoadOp::Clear(1.0),
            None => wgpu::LoadOp::Load,
        };

        let (color_views, depth_view): (Vec<&wgpu::TextureView>, Option<&wgpu::TextureView>) =
            match pass.target.and_then(|id| self.framebuffers.get(&id)) {
                Some(fb) => (
                    fb.colors
                        .iter()
                        .filter_map(|id| self.textures.get(id).map(|t| &t.view))
                        .collect(),
                    fb.depth.and_then(|id| self.textures.get(&id)).map(|t| &t.view),
                ),
                None => (vec![target], Some(&self.screen_depth)),
            };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .into_iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Engine Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        if pass.target.is_none() {
            let (x, y, width, height) = self.viewport;
            render_pass.set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
        }
        if let Some(globals) = &self.globals_bind_group {
            render_pass.set_bind_group(0, globals, &[]);
        }

        for (draw, textures) in pass.draws.iter().zip(&texture_groups) {
            let Some(vertex_array) = self.vertex_arrays.get(&draw.vertex_array) else {
                continue;
            };
            let Some(pipeline) = self
                .pipeline_key(draw, pass.target)
                .and_then(|key| self.pipelines.get(&key))
            else {
                continue;
            };

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(1, &self.draw_bind_group, &[draw.uniform_offset]);
            render_pass.set_bind_group(2, textures, &[]);
            render_pass.set_vertex_buffer(0, vertex_array.vertex_buffer.slice(..));
            render_pass.set_index_buffer(vertex_array.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..vertex_array.index_count, 0, 0..1);
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            // WebGPU exposes a single feature level
            api_version: ApiVersion::new(1, 0),
            backend: format!("{:?}", self.adapter_info.backend),
            vendor: format!("{:#06x}", self.adapter_info.vendor),
            device: self.adapter_info.name.clone(),
            driver: format!("{} {}", self.adapter_info.driver, self.adapter_info.driver_info),
            shading_language: "WGSL".to_string(),
        }
    }

    fn enable_debug_output(&mut self) {
        self.device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            log::error!("wgpu: {}", error);
        }));
    }

    fn set_render_state(&mut self, state: RenderState) {
        if !state.scissor_test {
            log::debug!("Scissor test is always on for render passes");
        }
        self.render_state = state;
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        let (_, _, old_width, old_height) = self.viewport;
        if (old_width, old_height) != (width, height) {
            self.screen_depth = Self::create_screen_depth(&self.device, width, height);
        }
        self.viewport = (x, y, width.max(1), height.max(1));
    }

    fn clear(&mut self, color: [f32; 4]) {
        let pass = self.pass_mut();
        if pass.draws.is_empty() {
            pass.clear = Some(color);
            return;
        }
        let target = pass.target;
        self.finish_pass();
        let mut pass = PassRecord::new(target);
        pass.clear = Some(color);
        self.current_pass = Some(pass);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId(self.next());
        let texture = self.allocate_texture(desc);
        self.textures.insert(id, texture);
        id
    }

    fn write_texture(&mut self, id: TextureId, layer: u32, pixels: &[u8]) {
        let Some(texture) = self.textures.get(&id) else {
            log::warn!("write_texture on unknown texture {:?}", id);
            return;
        };
        let desc = &texture.desc;
        if desc.format.is_depth() {
            log::warn!("Depth texture '{}' can't be written from the CPU", desc.label);
            return;
        }
        assert_eq!(pixels.len(), desc.layer_size(), "Texture data must cover the whole layer");

        let (data, bytes_per_pixel) = match desc.format {
            PixelFormat::Rgb8 => (std::borrow::Cow::Owned(expand_rgb_to_rgba(pixels)), 4),
            format => (std::borrow::Cow::Borrowed(pixels), format.bytes_per_pixel() as u32),
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            &data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * bytes_per_pixel),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(texture) = self.textures.remove(&id) {
            texture.texture.destroy();
        }
    }

    fn bind_texture(&mut self, slot: u32, id: TextureId) {
        match self.bound_textures.get_mut(slot as usize) {
            Some(bound) => *bound = Some(id),
            None => log::warn!("Texture slot {} is out of range", slot),
        }
    }

    fn unbind_texture(&mut self, slot: u32) {
        if let Some(bound) = self.bound_textures.get_mut(slot as usize) {
            *bound = None;
        }
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> VertexArrayId {
        assert!(!desc.layout.attributes.is_empty(), "Vertex buffer has no layout!");

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertices", desc.label)),
            contents: desc.vertices,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Indices", desc.label)),
            contents: bytemuck::cast_slice(desc.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let id = VertexArrayId(self.next());
        self.vertex_arrays.insert(
            id,
            GpuVertexArray {
                vertex_buffer,
                index_buffer,
                index_count: desc.indices.len() as u32,
                layout: desc.layout.clone(),
            },
        );
        id
    }

    fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        self.vertex_arrays.remove(&id);
    }

    fn create_buffer(&mut self, kind: BufferKind, binding: u32, size: u64) -> BufferId {
        let (usage, size) = match kind {
            BufferKind::Uniform => (wgpu::BufferUsages::UNIFORM, size),
            BufferKind::Storage => (wgpu::BufferUsages::STORAGE, size.max(MIN_STORAGE_SIZE)),
        };
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{:?} Buffer (binding {})", kind, binding)),
            size: size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let id = BufferId(self.next());
        self.buffers.insert(id, GpuBuffer { buffer, binding });
        self.globals_bind_group = None;
        id
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) {
        if let Some(buffer) = self.buffers.get(&id) {
            assert!(offset + data.len() as u64 <= buffer.buffer.size(), "Data exceeds buffer capacity");
            self.queue.write_buffer(&buffer.buffer, offset, data);
        }
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(&id) {
            buffer.buffer.destroy();
            self.globals_bind_group = None;
        }
    }

    fn compile_shader(&mut self, name: &str, source: &ShaderSource) -> crate::error::Result<ShaderId> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} (vertex)", name)),
            source: wgpu::ShaderSource::Wgsl(source.vertex.as_str().into()),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} (fragment)", name)),
            source: wgpu::ShaderSource::Wgsl(source.fragment.as_str().into()),
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(EmberError::ShaderCompile {
                name: name.to_owned(),
                reason: err.to_string(),
            });
        }

        let id = ShaderId(self.next());
        self.shaders.insert(
            id,
            GpuShader {
                name: name.to_owned(),
                vertex,
                fragment,
            },
        );
        Ok(id)
    }

    fn destroy_shader(&mut self, id: ShaderId) {
        self.shaders.remove(&id);
        self.pipelines.retain(|key, _| key.shader != id);
        if self.bound_shader == Some(id) {
            self.bound_shader = None;
        }
    }

    fn bind_shader(&mut self, id: ShaderId) {
        self.bound_shader = Some(id);
    }

    fn unbind_shader(&mut self) {
        self.bound_shader = None;
    }

    fn set_draw_uniforms(&mut self, data: &[u8]) {
        self.pending_uniforms.clear();
        self.pending_uniforms.extend_from_slice(data);
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> FramebufferId {
        let (color_descs, depth_desc) = Self::attachment_descs(desc);
        let colors = color_descs.iter().map(|d| self.create_texture(d)).collect();
        let depth = depth_desc.map(|d| self.create_texture(&d));

        let id = FramebufferId(self.next());
        self.framebuffers.insert(
            id,
            GpuFramebuffer {
                desc: desc.clone(),
                colors,
                depth,
            },
        );
        id
    }

    fn resize_framebuffer(&mut self, id: FramebufferId, width: u32, height: u32) {
        let Some(fb) = self.framebuffers.get_mut(&id) else {
            return;
        };
        fb.desc.width = width;
        fb.desc.height = height;
        let attachments: Vec<TextureId> = fb.colors.iter().copied().chain(fb.depth).collect();

        for texture_id in attachments {
            let Some(mut desc) = self.textures.get(&texture_id).map(|t| t.desc.clone()) else {
                continue;
            };
            desc.width = width;
            desc.height = height;
            let texture = self.allocate_texture(&desc);
            if let Some(old) = self.textures.insert(texture_id, texture) {
                old.texture.destroy();
            }
        }
    }

    fn framebuffer_attachment(&self, id: FramebufferId, index: usize) -> Option<TextureId> {
        let fb = self.framebuffers.get(&id)?;
        fb.colors.get(index).copied().or_else(|| {
            (index == fb.colors.len()).then_some(fb.depth).flatten()
        })
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        if let Some(fb) = self.framebuffers.remove(&id) {
            for texture in fb.colors.into_iter().chain(fb.depth) {
                self.destroy_texture(texture);
            }
        }
    }

    fn bind_framebuffer(&mut self, id: Option<FramebufferId>) {
        self.finish_pass();
        self.current_pass = Some(PassRecord::new(id));
    }

    fn draw_indexed(&mut self, vertex_array: VertexArrayId) {
        let Some(shader) = self.bound_shader else {
            log::warn!("draw_indexed without a bound shader");
            return;
        };
        let uniform_offset = self.draw_uniforms.push(&self.pending_uniforms);
        let textures = self.bound_textures;
        let state = self.render_state;
        self.pass_mut().draws.push(DrawCall {
            shader,
            vertex_array,
            textures,
            uniform_offset,
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_attributes_are_packed() {
        let layout = VertexLayout::new(&[3, 2, 3, 3, 3]);
        let attributes = vertex_attributes(&layout);

        let offsets: Vec<u64> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 20, 32, 44]);
        assert_eq!(attributes[1].format, wgpu::VertexFormat::Float32x2);
        assert_eq!(attributes[4].shader_location, 4);
    }

    #[test]
    fn test_rgb_shares_rgba_storage() {
        assert_eq!(texture_format(PixelFormat::Rgb8), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(texture_format(PixelFormat::Depth32Float), wgpu::TextureFormat::Depth32Float);
    }
}
