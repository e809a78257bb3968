//! GPU abstraction layer
//!
//! The resource cache and renderer never talk to a graphics API directly.
//! They go through [`GpuBackend`], which hands out opaque handles for
//! textures, vertex arrays, buffers, shader programs and framebuffers and
//! exposes a small bind/submit/draw surface over them.
//!
//! Two implementations ship with the crate:
//! - [`HeadlessBackend`] records every call, for tools and tests
//! - [`WgpuBackend`] drives a real device and replays each frame into wgpu passes

pub mod headless;
pub mod wgpu_backend;

pub use headless::{BackendCommand, HeadlessBackend};
pub use wgpu_backend::WgpuBackend;

use crate::error::Result;

macro_rules! gpu_handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_handle!(TextureId);
gpu_handle!(VertexArrayId);
gpu_handle!(BufferId);
gpu_handle!(ShaderId);
gpu_handle!(FramebufferId);

/// Major/minor version of the graphics API the backend talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Driver strings captured once at renderer init.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendInfo {
    pub api_version: ApiVersion,
    pub backend: String,
    pub vendor: String,
    pub device: String,
    pub driver: String,
    pub shading_language: String,
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Pixel formats a texture may be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
    Rgba16Float,
    Depth32Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::Depth32Float => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, PixelFormat::Depth32Float)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    /// Six square layers: right, left, bottom, top, front, back.
    Cube,
}

impl TextureKind {
    pub fn layers(self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub kind: TextureKind,
}

impl TextureDesc {
    pub fn new_2d(label: &str, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            label: label.to_owned(),
            width,
            height,
            format,
            kind: TextureKind::D2,
        }
    }

    pub fn new_cube(label: &str, size: u32, format: PixelFormat) -> Self {
        Self {
            label: label.to_owned(),
            width: size,
            height: size,
            format,
            kind: TextureKind::Cube,
        }
    }

    /// Byte count of a single layer.
    pub fn layer_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Interleaved float vertex attributes, in shader-location order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Component count of each attribute (1..=4 floats).
    pub attributes: Vec<u32>,
}

impl VertexLayout {
    pub fn new(attributes: &[u32]) -> Self {
        Self {
            attributes: attributes.to_vec(),
        }
    }

    pub fn stride(&self) -> u64 {
        self.attributes.iter().map(|&n| n as u64 * 4).sum()
    }
}

/// Geometry handed to [`GpuBackend::create_vertex_array`].
#[derive(Debug, Clone)]
pub struct VertexArrayDesc<'a> {
    pub label: &'a str,
    pub vertices: &'a [u8],
    pub layout: &'a VertexLayout,
    pub indices: &'a [u32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Uniform,
    Storage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub color_formats: Vec<PixelFormat>,
    pub depth: bool,
}

/// Fixed-function state set once at renderer init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    /// Source-alpha / one-minus-source-alpha blending.
    pub blending: bool,
    pub depth_test: bool,
    pub scissor_test: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            blending: true,
            depth_test: true,
            scissor_test: true,
        }
    }
}

/// Both stages of one shader program. Text before the first `#type` marker
/// has already been prepended to each stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

/// The narrow surface the engine core drives the GPU through.
///
/// Calls are made from the single render thread in submission order. Handles
/// stay valid until the matching `destroy_*` call.
pub trait GpuBackend {
    fn info(&self) -> BackendInfo;
    fn enable_debug_output(&mut self);
    fn set_render_state(&mut self, state: RenderState);
    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);
    /// Clears color and depth of the bound target.
    fn clear(&mut self, color: [f32; 4]);

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;
    /// Replaces one layer of a texture. `pixels` must cover the whole layer.
    fn write_texture(&mut self, id: TextureId, layer: u32, pixels: &[u8]);
    fn destroy_texture(&mut self, id: TextureId);
    fn bind_texture(&mut self, slot: u32, id: TextureId);
    fn unbind_texture(&mut self, slot: u32);

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> VertexArrayId;
    fn destroy_vertex_array(&mut self, id: VertexArrayId);

    fn create_buffer(&mut self, kind: BufferKind, binding: u32, size: u64) -> BufferId;
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]);
    fn destroy_buffer(&mut self, id: BufferId);

    fn compile_shader(&mut self, name: &str, source: &ShaderSource) -> Result<ShaderId>;
    fn destroy_shader(&mut self, id: ShaderId);
    fn bind_shader(&mut self, id: ShaderId);
    fn unbind_shader(&mut self);
    /// Per-draw uniform block consumed by the next `draw_indexed`.
    fn set_draw_uniforms(&mut self, data: &[u8]);

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> FramebufferId;
    fn resize_framebuffer(&mut self, id: FramebufferId, width: u32, height: u32);
    /// Color attachments first, then depth if present.
    fn framebuffer_attachment(&self, id: FramebufferId, index: usize) -> Option<TextureId>;
    fn destroy_framebuffer(&mut self, id: FramebufferId);
    /// `None` targets the screen.
    fn bind_framebuffer(&mut self, id: Option<FramebufferId>);

    fn draw_indexed(&mut self, vertex_array: VertexArrayId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_ordering() {
        assert!(ApiVersion::new(4, 5) > ApiVersion::new(4, 3));
        assert!(ApiVersion::new(4, 0) > ApiVersion::new(3, 9));
        assert_eq!(ApiVersion::new(1, 0).to_string(), "1.0");
    }

    #[test]
    fn test_layer_size() {
        let desc = TextureDesc::new_2d("t", 4, 2, PixelFormat::Rgb8);
        assert_eq!(desc.layer_size(), 24);
        let cube = TextureDesc::new_cube("c", 2, PixelFormat::Rgba8);
        assert_eq!(cube.layer_size(), 16);
        assert_eq!(cube.kind.layers(), 6);
    }

    #[test]
    fn test_vertex_layout_stride() {
        let layout = VertexLayout::new(&[3, 2, 3, 3, 3]);
        assert_eq!(layout.stride(), 56);
    }
}
