//! Cubemap skybox drawn behind all opaque geometry.

use crate::error::Result;
use crate::gfx::backend::{GpuBackend, VertexArrayId};
use crate::gfx::resources::shader::Shader;
use crate::gfx::resources::texture::Texture;

use super::renderer::{builtin_shader, submit_draw, RendererStatistics};
use super::uniforms::DrawUniforms;

const SKYBOX_WGSL: &str = include_str!("shaders/skybox.wgsl");

/// Binding slot of the cubemap, right after the ten 2D slots.
pub const CUBEMAP_SLOT: u32 = 10;

#[derive(Debug)]
pub struct Skybox {
    cubemap: Texture,
    shader: Shader,
}

impl Skybox {
    /// Loads six face images: right, left, bottom, top, front, back.
    pub fn load(gpu: &mut dyn GpuBackend, faces: &[String; 6]) -> Result<Self> {
        let cubemap = Texture::cubemap_from_files(gpu, faces)?;
        let shader = match builtin_shader(gpu, "skybox", SKYBOX_WGSL) {
            Ok(shader) => shader,
            Err(err) => {
                cubemap.destroy(gpu);
                return Err(err);
            }
        };
        log::debug!("Loaded skybox ({}x{} faces)", cubemap.width(), cubemap.height());

        Ok(Self { cubemap, shader })
    }

    pub fn cubemap(&self) -> &Texture {
        &self.cubemap
    }

    /// Draws `cube` around the camera at the far plane of the bound target.
    pub fn draw(&self, gpu: &mut dyn GpuBackend, stats: &mut RendererStatistics, cube: VertexArrayId) {
        gpu.bind_texture(CUBEMAP_SLOT, self.cubemap.id());
        submit_draw(gpu, stats, self.shader.id(), cube, &DrawUniforms::default());
        gpu.unbind_shader();
        gpu.unbind_texture(CUBEMAP_SLOT);
    }

    pub fn destroy(&self, gpu: &mut dyn GpuBackend) {
        self.cubemap.destroy(gpu);
        self.shader.destroy(gpu);
    }
}
