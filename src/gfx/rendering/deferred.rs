//! Deferred shading
//!
//! The geometry pass writes surface attributes into a four-attachment
//! G-buffer. The lighting pass then binds those attachments as textures and
//! shades one full-screen quad, so lighting cost no longer scales with mesh
//! count.

use crate::error::Result;
use crate::gfx::backend::{
    FramebufferDesc, FramebufferId, GpuBackend, PixelFormat, RenderState, VertexArrayId,
};
use crate::gfx::resources::shader::Shader;
use crate::gfx::resources::texture::TextureSlot;
use crate::gfx::scene::light::Light;

use super::renderer::{builtin_shader, submit_draw, RendererStatistics};
use super::uniforms::DrawUniforms;

const GBUFFER_WGSL: &str = include_str!("shaders/gbuffer.wgsl");
const LIGHTING_WGSL: &str = include_str!("shaders/deferred_lighting.wgsl");

/// Color, normal, position, smoothness. The smoothness attachment carries
/// emission in its remaining three channels.
pub const GBUFFER_FORMATS: [PixelFormat; 4] = [
    PixelFormat::Rgba8,
    PixelFormat::Rgba16Float,
    PixelFormat::Rgba16Float,
    PixelFormat::Rgba8,
];

/// Attachments are read back starting at the first material slot.
const FIRST_INPUT_SLOT: u32 = TextureSlot::FIRST_MATERIAL_SLOT as u32;

#[derive(Debug)]
pub struct GBuffer {
    framebuffer: FramebufferId,
    geometry: Shader,
    lighting: Shader,
    size: (u32, u32),
}

impl GBuffer {
    pub fn new(gpu: &mut dyn GpuBackend, width: u32, height: u32) -> Result<Self> {
        let geometry = builtin_shader(gpu, "gbuffer", GBUFFER_WGSL)?;
        let lighting = builtin_shader(gpu, "deferred_lighting", LIGHTING_WGSL)?;
        let framebuffer = gpu.create_framebuffer(&FramebufferDesc {
            label: "GBuffer".to_string(),
            width,
            height,
            color_formats: GBUFFER_FORMATS.to_vec(),
            depth: true,
        });

        Ok(Self {
            framebuffer,
            geometry,
            lighting,
            size: (width, height),
        })
    }

    /// Offscreen target holding the attachments plus depth.
    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    /// Program meshes are drawn with during the geometry pass.
    pub fn geometry_shader(&self) -> &Shader {
        &self.geometry
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Targets the G-buffer and clears it. Position alpha 0 marks "no geometry".
    ///
    /// Blending is off until [`GBuffer::end_geometry_pass`]: attachment alpha
    /// channels hold data, not coverage.
    pub fn begin_geometry_pass(&self, gpu: &mut dyn GpuBackend) {
        gpu.set_render_state(RenderState {
            blending: false,
            ..RenderState::default()
        });
        gpu.bind_framebuffer(Some(self.framebuffer));
        gpu.clear([0.0; 4]);
    }

    /// Restores the regular blended render state.
    pub fn end_geometry_pass(&self, gpu: &mut dyn GpuBackend) {
        gpu.set_render_state(RenderState::default());
    }

    pub fn resize(&mut self, gpu: &mut dyn GpuBackend, width: u32, height: u32) {
        if self.size == (width, height) {
            return;
        }
        gpu.resize_framebuffer(self.framebuffer, width, height);
        self.size = (width, height);
    }

    /// Binds the color attachments at slots 5 through 8.
    pub fn bind_inputs(&self, gpu: &mut dyn GpuBackend) {
        for index in 0..GBUFFER_FORMATS.len() {
            if let Some(texture) = gpu.framebuffer_attachment(self.framebuffer, index) {
                gpu.bind_texture(FIRST_INPUT_SLOT + index as u32, texture);
            }
        }
    }

    pub fn unbind_inputs(&self, gpu: &mut dyn GpuBackend) {
        for index in (0..GBUFFER_FORMATS.len()).rev() {
            gpu.unbind_texture(FIRST_INPUT_SLOT + index as u32);
        }
    }

    /// Lighting pass into the currently bound target.
    ///
    /// Pixels without geometry come out fully transparent so whatever was
    /// drawn underneath (the skybox) shows through.
    pub fn compose(
        &self,
        gpu: &mut dyn GpuBackend,
        stats: &mut RendererStatistics,
        quad: VertexArrayId,
        light: &Light,
    ) {
        self.bind_inputs(gpu);
        let uniforms = DrawUniforms::default().with_light(light);
        submit_draw(gpu, stats, self.lighting.id(), quad, &uniforms);
        gpu.unbind_shader();
        self.unbind_inputs(gpu);
    }

    pub fn destroy(&self, gpu: &mut dyn GpuBackend) {
        gpu.destroy_framebuffer(self.framebuffer);
        self.geometry.destroy(gpu);
        self.lighting.destroy(gpu);
    }
}
