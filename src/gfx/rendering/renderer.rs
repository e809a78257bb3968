//! Frame-level rendering
//!
//! [`Renderer`] owns everything that lives for the whole session on the GPU
//! side: the camera and light blocks, the default textures, the built-in
//! programs and the offscreen targets of the deferred and bloom passes. The
//! resource cache is passed in per call; the renderer never owns assets.
//!
//! A frame is either driven piecewise (`begin_scene`, `submit_model`,
//! `end_scene`) with a caller-supplied shader, or in one call through
//! [`Renderer::render`], which runs the configured [`RenderPath`].

use cgmath::{Matrix4, Vector3};

use crate::config::{RenderPath, RendererConfig};
use crate::error::Result;
use crate::gfx::backend::{
    BackendInfo, BufferId, BufferKind, FramebufferDesc, FramebufferId, GpuBackend, PixelFormat, RenderState,
    ShaderId, VertexArrayId,
};
use crate::gfx::resources::cache::ResourceCache;
use crate::gfx::resources::mesh::{MeshId, Model, ModelHandle};
use crate::gfx::resources::shader::Shader;
use crate::gfx::resources::texture::{Texture, TextureSlot};
use crate::gfx::scene::light::{Light, LightId, LightList, PointLight};

use super::bloom::BloomPass;
use super::default_textures::DefaultTextures;
use super::deferred::GBuffer;
use super::primitives::Primitives;
use super::skybox::Skybox;
use super::uniforms::{
    lights_buffer_size, CameraUniform, DrawUniforms, LightsHeader, PointLightUniform, CAMERA_BINDING,
    LIGHTS_BINDING,
};

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
const FORWARD_WGSL: &str = include_str!("shaders/forward.wgsl");

/// Compiles one of the built-in programs with the shared declarations in front.
pub(crate) fn builtin_shader(gpu: &mut dyn GpuBackend, name: &str, body: &str) -> Result<Shader> {
    Shader::from_source(gpu, name, &format!("{}\n{}", COMMON_WGSL, body))
}

/// Binds `shader`, uploads `uniforms` and issues one indexed draw.
pub(crate) fn submit_draw(
    gpu: &mut dyn GpuBackend,
    stats: &mut RendererStatistics,
    shader: ShaderId,
    vertex_array: VertexArrayId,
    uniforms: &DrawUniforms,
) {
    gpu.bind_shader(shader);
    gpu.set_draw_uniforms(uniforms.as_bytes());
    gpu.draw_indexed(vertex_array);
    stats.draw_calls += 1;
}

/// Driver strings captured at init plus counters of the current frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RendererStatistics {
    pub backend: BackendInfo,
    pub draw_calls: u32,
    pub meshes: u32,
    pub models: u32,
}

impl RendererStatistics {
    fn reset_frame(&mut self) {
        self.draw_calls = 0;
        self.meshes = 0;
        self.models = 0;
    }
}

fn scene_target_desc(width: u32, height: u32) -> FramebufferDesc {
    FramebufferDesc {
        label: "Scene".to_string(),
        width,
        height,
        color_formats: vec![PixelFormat::Rgba16Float],
        depth: true,
    }
}

#[derive(Debug)]
pub struct Renderer {
    config: RendererConfig,
    stats: RendererStatistics,
    camera_buffer: BufferId,
    lights_buffer: BufferId,
    defaults: DefaultTextures,
    directional_light: Light,
    lights: LightList,
    forward_shader: Shader,
    primitives: Primitives,
    scene_target: FramebufferId,
    gbuffer: GBuffer,
    bloom: BloomPass,
    skybox: Option<Skybox>,
    viewport: (u32, u32),
}

impl Renderer {
    /// Sets up GPU state and every session-long resource.
    ///
    /// # Panics
    /// When the backend reports an API version below
    /// `config.required_api_version`. There is no degraded mode.
    pub fn init(gpu: &mut dyn GpuBackend, config: RendererConfig) -> Result<Self> {
        let info = gpu.info();
        assert!(
            info.api_version >= config.required_api_version,
            "GPU API version {} is below the required {}",
            info.api_version,
            config.required_api_version
        );
        log::info!("Backend: {} {}", info.backend, info.api_version);
        log::info!("  Vendor: {}", info.vendor);
        log::info!("  Device: {}", info.device);
        log::info!("  Driver: {}", info.driver);

        if cfg!(debug_assertions) {
            gpu.enable_debug_output();
        }
        gpu.set_render_state(RenderState::default());

        let (width, height) = config.viewport;
        gpu.set_viewport(0, 0, width, height);

        let defaults = DefaultTextures::load(gpu, config.temp_albedo_path.as_deref());
        let camera_buffer = gpu.create_buffer(
            BufferKind::Uniform,
            CAMERA_BINDING,
            std::mem::size_of::<CameraUniform>() as u64,
        );
        let lights_buffer = gpu.create_buffer(
            BufferKind::Storage,
            LIGHTS_BINDING,
            lights_buffer_size(config.max_lights),
        );

        let forward_shader = builtin_shader(gpu, "forward", FORWARD_WGSL)?;
        let primitives = Primitives::upload(gpu);
        let scene_target = gpu.create_framebuffer(&scene_target_desc(width, height));
        let gbuffer = GBuffer::new(gpu, width, height)?;
        let bloom = BloomPass::new(gpu, width, height)?;

        let skybox = config
            .skybox_faces
            .as_ref()
            .and_then(|faces| match Skybox::load(gpu, faces) {
                Ok(skybox) => Some(skybox),
                Err(err) => {
                    log::warn!("Couldn't load skybox: {}", err);
                    None
                }
            });

        Ok(Self {
            lights: LightList::new(config.max_lights),
            stats: RendererStatistics {
                backend: info,
                ..RendererStatistics::default()
            },
            config,
            camera_buffer,
            lights_buffer,
            defaults,
            directional_light: Light::default(),
            forward_shader,
            primitives,
            scene_target,
            gbuffer,
            bloom,
            skybox,
            viewport: (width, height),
        })
    }

    /// Releases every GPU object created in [`Renderer::init`].
    pub fn shutdown(mut self, gpu: &mut dyn GpuBackend) {
        self.defaults.destroy(gpu);
        gpu.destroy_buffer(self.camera_buffer);
        gpu.destroy_buffer(self.lights_buffer);
        self.forward_shader.destroy(gpu);
        self.primitives.destroy(gpu);
        gpu.destroy_framebuffer(self.scene_target);
        self.gbuffer.destroy(gpu);
        self.bloom.destroy(gpu);
        if let Some(skybox) = &self.skybox {
            skybox.destroy(gpu);
        }
        self.lights.clear();
        log::debug!("Renderer shut down");
    }

    /// Clears color and depth of the bound target to the configured background.
    pub fn clear_renderer(&self, gpu: &mut dyn GpuBackend) {
        gpu.clear(self.config.clear_color);
    }

    /// Resizes the viewport and every offscreen target. Zero sizes are ignored.
    pub fn on_window_resized(&mut self, gpu: &mut dyn GpuBackend, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        gpu.set_viewport(0, 0, width, height);
        gpu.resize_framebuffer(self.scene_target, width, height);
        self.gbuffer.resize(gpu, width, height);
        self.bloom.resize(gpu, width, height);
        self.viewport = (width, height);
    }

    /// Uploads the camera block and the active point lights, and starts a
    /// new statistics frame.
    ///
    /// Active lights are packed into a contiguous prefix of the lights
    /// buffer; the header holds the prefix length.
    pub fn begin_scene(&mut self, gpu: &mut dyn GpuBackend, view_projection: Matrix4<f32>, camera_position: Vector3<f32>) {
        let camera = CameraUniform::new(view_projection, camera_position);
        gpu.write_buffer(self.camera_buffer, 0, bytemuck::bytes_of(&camera));

        let entries: Vec<PointLightUniform> = self
            .lights
            .active()
            .take(self.config.max_lights)
            .map(PointLightUniform::from)
            .collect();
        let header = LightsHeader {
            count: [entries.len() as i32, 0, 0, 0],
        };
        gpu.write_buffer(self.lights_buffer, 0, bytemuck::bytes_of(&header));
        if !entries.is_empty() {
            let offset = std::mem::size_of::<LightsHeader>() as u64;
            gpu.write_buffer(self.lights_buffer, offset, bytemuck::cast_slice(&entries));
        }

        self.stats.reset_frame();
    }

    /// Ends the frame and returns its statistics.
    pub fn end_scene(&mut self) -> RendererStatistics {
        log::trace!(
            "Frame: {} draw calls, {} meshes, {} models",
            self.stats.draw_calls,
            self.stats.meshes,
            self.stats.models
        );
        self.stats.clone()
    }

    /// Draws the mesh tree of `model` with `shader`. Inactive models are skipped.
    pub fn submit_model(&mut self, gpu: &mut dyn GpuBackend, cache: &ResourceCache, shader: &Shader, model: &Model) {
        self.draw_model(gpu, cache, shader.id(), model);
    }

    fn draw_model(&mut self, gpu: &mut dyn GpuBackend, cache: &ResourceCache, shader: ShaderId, model: &Model) {
        if !model.transform.active {
            return;
        }
        let Some(root) = model.root() else {
            return;
        };

        gpu.bind_shader(shader);
        self.stats.models += 1;
        self.render_mesh(gpu, cache, shader, root, model.transform.matrix());
        gpu.unbind_shader();
    }

    /// Post-order walk: children draw before their parent.
    fn render_mesh(
        &mut self,
        gpu: &mut dyn GpuBackend,
        cache: &ResourceCache,
        shader: ShaderId,
        mesh_id: MeshId,
        transform: Matrix4<f32>,
    ) {
        let Some(mesh) = cache.mesh(mesh_id) else {
            log::warn!("Skipping missing mesh {}", mesh_id);
            return;
        };
        for &child in mesh.submeshes() {
            self.render_mesh(gpu, cache, shader, child, transform);
        }

        let Some(material) = cache.resolve_material(mesh.material()) else {
            return;
        };

        let albedo = self.bind_material_texture(gpu, TextureSlot::Albedo, material.albedo_texture.as_deref());
        let normal = self.bind_material_texture(gpu, TextureSlot::Normal, material.normal_texture.as_deref());
        let bump = self.bind_material_texture(gpu, TextureSlot::Bump, material.bump_texture.as_deref());

        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        let mut uniforms = DrawUniforms::default()
            .with_model(transform)
            .with_colors(material.albedo_color, material.emissive_color)
            .with_light(&self.directional_light);
        uniforms.texture_slots = [albedo.index() as i32, normal.index() as i32, bump.index() as i32, 0];
        uniforms.material = [
            material.smoothness,
            flag(material.is_emissive),
            flag(material.is_transparent),
            flag(material.is_two_sided),
        ];

        if let Some(vertex_array) = mesh.vertex_array() {
            submit_draw(gpu, &mut self.stats, shader, vertex_array, &uniforms);
            self.stats.meshes += 1;
        }

        self.unbind_texture(gpu, bump);
        self.unbind_texture(gpu, normal);
        self.unbind_texture(gpu, albedo);
    }

    /// Binds a material map, or the default for its slot when the material
    /// has none. Returns the slot actually bound.
    fn bind_material_texture(&self, gpu: &mut dyn GpuBackend, slot: TextureSlot, texture: Option<&Texture>) -> TextureSlot {
        let bound = match (texture, slot) {
            (Some(_), _) => slot,
            (None, TextureSlot::Albedo) => TextureSlot::Magenta,
            (None, TextureSlot::Normal) => TextureSlot::FlatNormal,
            (None, _) => TextureSlot::Black,
        };
        self.bind_texture(gpu, bound, texture);
        bound
    }

    /// Single draw of `vertex_array` with `shader` and a model matrix.
    pub fn submit(&mut self, gpu: &mut dyn GpuBackend, shader: &Shader, vertex_array: VertexArrayId, transform: Matrix4<f32>) {
        let uniforms = DrawUniforms::default()
            .with_model(transform)
            .with_light(&self.directional_light);
        submit_draw(gpu, &mut self.stats, shader.id(), vertex_array, &uniforms);
    }

    /// Binds `texture` at `slot`. Slots below [`TextureSlot::Albedo`] always
    /// bind their built-in default and ignore `texture`.
    pub fn bind_texture(&self, gpu: &mut dyn GpuBackend, slot: TextureSlot, texture: Option<&Texture>) {
        if slot.is_default() {
            if let Some(default) = self.defaults.get(slot) {
                gpu.bind_texture(slot.index(), default.id());
            }
            return;
        }
        match texture {
            Some(texture) => gpu.bind_texture(slot.index(), texture.id()),
            None => log::warn!("No texture to bind at material slot {:?}", slot),
        }
    }

    pub fn unbind_texture(&self, gpu: &mut dyn GpuBackend, slot: TextureSlot) {
        gpu.unbind_texture(slot.index());
    }

    /// Adds a point light, or logs and returns `None` when the list is full.
    pub fn add_light(&mut self) -> Option<&mut PointLight> {
        self.lights.add()
    }

    pub fn remove_light(&mut self, id: LightId) -> bool {
        self.lights.remove(id)
    }

    pub fn lights(&self) -> &LightList {
        &self.lights
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut PointLight> {
        self.lights.get_mut(id)
    }

    pub fn directional_light(&self) -> &Light {
        &self.directional_light
    }

    pub fn directional_light_mut(&mut self) -> &mut Light {
        &mut self.directional_light
    }

    pub fn statistics(&self) -> &RendererStatistics {
        &self.stats
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RendererConfig {
        &mut self.config
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn skybox(&self) -> Option<&Skybox> {
        self.skybox.as_ref()
    }

    /// Renders one whole frame of `models` onto the screen.
    pub fn render(
        &mut self,
        gpu: &mut dyn GpuBackend,
        cache: &ResourceCache,
        view_projection: Matrix4<f32>,
        camera_position: Vector3<f32>,
        models: &[ModelHandle],
    ) -> RendererStatistics {
        self.begin_scene(gpu, view_projection, camera_position);

        match self.config.render_path {
            RenderPath::Forward => {
                gpu.bind_framebuffer(Some(self.scene_target));
                self.clear_renderer(gpu);
                let shader = self.forward_shader.id();
                for model in models {
                    self.draw_model(gpu, cache, shader, &model.borrow());
                }
                self.draw_skybox(gpu);
            }
            RenderPath::Deferred => {
                self.gbuffer.begin_geometry_pass(gpu);
                let shader = self.gbuffer.geometry_shader().id();
                for model in models {
                    self.draw_model(gpu, cache, shader, &model.borrow());
                }
                self.gbuffer.end_geometry_pass(gpu);

                gpu.bind_framebuffer(Some(self.scene_target));
                self.clear_renderer(gpu);
                self.draw_skybox(gpu);
                self.gbuffer
                    .compose(gpu, &mut self.stats, self.primitives.quad, &self.directional_light);
            }
        }

        match gpu.framebuffer_attachment(self.scene_target, 0) {
            Some(scene) => self.bloom.apply(
                gpu,
                &mut self.stats,
                self.primitives.quad,
                scene,
                &self.config.bloom,
                None,
            ),
            None => log::error!("Scene target has no color attachment"),
        }

        self.end_scene()
    }

    fn draw_skybox(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(skybox) = &self.skybox {
            skybox.draw(gpu, &mut self.stats, self.primitives.cube);
        }
    }
}
