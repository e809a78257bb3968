//! Bloom post-process
//!
//! Bright regions of the HDR scene are extracted into a half-resolution
//! target, blurred back and forth between two ping-pong targets and finally
//! added over the scene while tonemapping onto the output.

use crate::config::BloomSettings;
use crate::error::Result;
use crate::gfx::backend::{FramebufferDesc, FramebufferId, GpuBackend, PixelFormat, TextureId, VertexArrayId};
use crate::gfx::resources::shader::Shader;

use super::renderer::{builtin_shader, submit_draw, RendererStatistics};
use super::uniforms::DrawUniforms;

const EXTRACT_WGSL: &str = include_str!("shaders/bloom_extract.wgsl");
const BLUR_WGSL: &str = include_str!("shaders/blur.wgsl");
const COMPOSITE_WGSL: &str = include_str!("shaders/composite.wgsl");

const SOURCE_SLOT: u32 = 5;
const BLOOM_SLOT: u32 = 6;

fn half(size: u32) -> u32 {
    (size / 2).max(1)
}

fn ping_pong_desc(label: &str, width: u32, height: u32) -> FramebufferDesc {
    FramebufferDesc {
        label: label.to_string(),
        width: half(width),
        height: half(height),
        color_formats: vec![PixelFormat::Rgba16Float],
        depth: false,
    }
}

fn post_uniforms(settings: &BloomSettings) -> DrawUniforms {
    let mut uniforms = DrawUniforms::default();
    uniforms.post = [0.0, settings.blur_radius, settings.threshold, settings.exposure];
    uniforms.tone = [settings.gamma, 0.0, 0.0, 0.0];
    uniforms
}

#[derive(Debug)]
pub struct BloomPass {
    ping: FramebufferId,
    pong: FramebufferId,
    extract: Shader,
    blur: Shader,
    composite: Shader,
    size: (u32, u32),
}

impl BloomPass {
    /// `width`/`height` are the full scene size; the blur targets use half of it.
    pub fn new(gpu: &mut dyn GpuBackend, width: u32, height: u32) -> Result<Self> {
        let extract = builtin_shader(gpu, "bloom_extract", EXTRACT_WGSL)?;
        let blur = builtin_shader(gpu, "blur", BLUR_WGSL)?;
        let composite = builtin_shader(gpu, "composite", COMPOSITE_WGSL)?;
        let ping = gpu.create_framebuffer(&ping_pong_desc("Bloom Ping", width, height));
        let pong = gpu.create_framebuffer(&ping_pong_desc("Bloom Pong", width, height));

        Ok(Self {
            ping,
            pong,
            extract,
            blur,
            composite,
            size: (width, height),
        })
    }

    pub fn resize(&mut self, gpu: &mut dyn GpuBackend, width: u32, height: u32) {
        if self.size == (width, height) {
            return;
        }
        gpu.resize_framebuffer(self.ping, half(width), half(height));
        gpu.resize_framebuffer(self.pong, half(width), half(height));
        self.size = (width, height);
    }

    /// Runs extract and blur, returning the texture holding the final blur.
    fn blur_highlights(
        &self,
        gpu: &mut dyn GpuBackend,
        stats: &mut RendererStatistics,
        quad: VertexArrayId,
        scene: TextureId,
        settings: &BloomSettings,
    ) -> Option<TextureId> {
        let mut uniforms = post_uniforms(settings);

        gpu.bind_framebuffer(Some(self.ping));
        gpu.clear([0.0, 0.0, 0.0, 1.0]);
        gpu.bind_texture(SOURCE_SLOT, scene);
        submit_draw(gpu, stats, self.extract.id(), quad, &uniforms);

        let (mut source, mut target) = (self.ping, self.pong);
        for i in 0..settings.iterations {
            uniforms.post[0] = if i % 2 == 0 { 1.0 } else { 0.0 };
            gpu.bind_framebuffer(Some(target));
            if let Some(texture) = gpu.framebuffer_attachment(source, 0) {
                gpu.bind_texture(SOURCE_SLOT, texture);
            }
            submit_draw(gpu, stats, self.blur.id(), quad, &uniforms);
            std::mem::swap(&mut source, &mut target);
        }
        gpu.unbind_texture(SOURCE_SLOT);

        // After the final swap `source` holds the last written target
        gpu.framebuffer_attachment(source, 0)
    }

    /// Tonemaps `scene` into `output` (`None` = screen), adding the blurred
    /// highlights when bloom is enabled.
    pub fn apply(
        &self,
        gpu: &mut dyn GpuBackend,
        stats: &mut RendererStatistics,
        quad: VertexArrayId,
        scene: TextureId,
        settings: &BloomSettings,
        output: Option<FramebufferId>,
    ) {
        let bloom = if settings.enabled {
            self.blur_highlights(gpu, stats, quad, scene, settings)
        } else {
            None
        };

        let mut uniforms = post_uniforms(settings);
        gpu.bind_framebuffer(output);
        gpu.bind_texture(SOURCE_SLOT, scene);
        if let Some(bloom) = bloom {
            gpu.bind_texture(BLOOM_SLOT, bloom);
            uniforms.tone[1] = 1.0;
        }
        submit_draw(gpu, stats, self.composite.id(), quad, &uniforms);
        gpu.unbind_shader();

        if bloom.is_some() {
            gpu.unbind_texture(BLOOM_SLOT);
        }
        gpu.unbind_texture(SOURCE_SLOT);
    }

    pub fn destroy(&self, gpu: &mut dyn GpuBackend) {
        gpu.destroy_framebuffer(self.ping);
        gpu.destroy_framebuffer(self.pong);
        self.extract.destroy(gpu);
        self.blur.destroy(gpu);
        self.composite.destroy(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::{HeadlessBackend, TextureDesc};
    use crate::gfx::rendering::primitives::Primitives;

    fn setup() -> (HeadlessBackend, BloomPass, VertexArrayId, TextureId) {
        let mut gpu = HeadlessBackend::new();
        let bloom = BloomPass::new(&mut gpu, 64, 48).unwrap();
        let quad = Primitives::upload(&mut gpu).quad;
        let scene = gpu.create_texture(&TextureDesc::new_2d("scene", 64, 48, PixelFormat::Rgba16Float));
        (gpu, bloom, quad, scene)
    }

    #[test]
    fn test_ping_pong_is_half_resolution() {
        let (gpu, bloom, _, _) = setup();
        assert_eq!(gpu.framebuffer_size(bloom.ping), Some((32, 24)));
        assert_eq!(gpu.framebuffer_size(bloom.pong), Some((32, 24)));
    }

    #[test]
    fn test_pass_count_follows_iterations() {
        let (mut gpu, bloom, quad, scene) = setup();
        let mut stats = RendererStatistics::default();
        let settings = BloomSettings {
            iterations: 4,
            ..BloomSettings::default()
        };

        bloom.apply(&mut gpu, &mut stats, quad, scene, &settings, None);

        // extract + blur passes + composite
        assert_eq!(gpu.draw_count(), 6);
        assert_eq!(stats.draw_calls, 6);

        let draws: Vec<_> = gpu.draws().collect();
        let horizontal: Vec<f32> = draws[1..5]
            .iter()
            .map(|d| {
                let uniforms: DrawUniforms = bytemuck::pod_read_unaligned(&d.uniforms);
                uniforms.post[0]
            })
            .collect();
        assert_eq!(horizontal, vec![1.0, 0.0, 1.0, 0.0]);

        let composite = draws.last().unwrap();
        assert_eq!(composite.framebuffer, None);
        assert_eq!(composite.textures[5], Some(scene));
        assert_eq!(composite.textures[6], gpu.framebuffer_attachment(bloom.ping, 0));
    }

    #[test]
    fn test_disabled_bloom_only_composites() {
        let (mut gpu, bloom, quad, scene) = setup();
        let mut stats = RendererStatistics::default();
        let settings = BloomSettings {
            enabled: false,
            ..BloomSettings::default()
        };

        bloom.apply(&mut gpu, &mut stats, quad, scene, &settings, None);

        assert_eq!(gpu.draw_count(), 1);
        let draw = gpu.draws().next().unwrap();
        let uniforms: DrawUniforms = bytemuck::pod_read_unaligned(&draw.uniforms);
        assert_eq!(uniforms.tone[1], 0.0);
        assert_eq!(uniforms.tone[0], settings.gamma);
    }
}
