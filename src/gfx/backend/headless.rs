//! Recording backend with no GPU behind it
//!
//! Allocates handles, keeps every uploaded byte and logs each call as a
//! [`BackendCommand`]. Tools can run the whole engine core against it and
//! tests assert on the recorded command stream.

use std::collections::HashMap;

use super::*;
use crate::error::EmberError;

const TEXTURE_SLOTS: usize = 16;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    SetRenderState(RenderState),
    SetViewport { width: u32, height: u32 },
    Clear([f32; 4]),
    CreateTexture(TextureId),
    WriteTexture { id: TextureId, layer: u32 },
    DestroyTexture(TextureId),
    BindTexture { slot: u32, id: TextureId },
    UnbindTexture { slot: u32 },
    CreateVertexArray(VertexArrayId),
    DestroyVertexArray(VertexArrayId),
    WriteBuffer { id: BufferId, offset: u64, len: usize },
    BindShader(ShaderId),
    UnbindShader,
    SetDrawUniforms(Vec<u8>),
    BindFramebuffer(Option<FramebufferId>),
    Draw(DrawRecord),
}

/// State captured at each `draw_indexed`.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub vertex_array: VertexArrayId,
    pub index_count: u32,
    pub shader: Option<ShaderId>,
    pub framebuffer: Option<FramebufferId>,
    pub textures: [Option<TextureId>; TEXTURE_SLOTS],
    pub uniforms: Vec<u8>,
    pub render_state: Option<RenderState>,
}

#[derive(Debug)]
struct StoredTexture {
    desc: TextureDesc,
    layers: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct StoredFramebuffer {
    desc: FramebufferDesc,
    attachments: Vec<TextureId>,
}

/// See module docs.
#[derive(Debug)]
pub struct HeadlessBackend {
    info: BackendInfo,
    next_handle: u32,
    textures: HashMap<TextureId, StoredTexture>,
    vertex_arrays: HashMap<VertexArrayId, u32>,
    buffers: HashMap<BufferId, (BufferKind, u32, Vec<u8>)>,
    shaders: HashMap<ShaderId, (String, ShaderSource)>,
    framebuffers: HashMap<FramebufferId, StoredFramebuffer>,
    bound_textures: [Option<TextureId>; TEXTURE_SLOTS],
    bound_shader: Option<ShaderId>,
    bound_framebuffer: Option<FramebufferId>,
    draw_uniforms: Vec<u8>,
    viewport: (u32, u32),
    render_state: Option<RenderState>,
    debug_output: bool,
    reject_shaders: bool,
    commands: Vec<BackendCommand>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_api_version(ApiVersion::new(1, 0))
    }

    /// Backend that reports `version` from [`GpuBackend::info`].
    pub fn with_api_version(version: ApiVersion) -> Self {
        Self {
            info: BackendInfo {
                api_version: version,
                backend: "Headless".to_string(),
                vendor: "ember".to_string(),
                device: "Recording Device".to_string(),
                driver: env!("CARGO_PKG_VERSION").to_string(),
                shading_language: "WGSL".to_string(),
            },
            next_handle: 1,
            textures: HashMap::new(),
            vertex_arrays: HashMap::new(),
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            framebuffers: HashMap::new(),
            bound_textures: [None; TEXTURE_SLOTS],
            bound_shader: None,
            bound_framebuffer: None,
            draw_uniforms: Vec::new(),
            viewport: (0, 0),
            render_state: None,
            debug_output: false,
            reject_shaders: false,
            commands: Vec::new(),
        }
    }

    /// Makes every following `compile_shader` fail, for exercising error paths.
    pub fn reject_shaders(&mut self, reject: bool) {
        self.reject_shaders = reject;
    }

    fn next(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn alloc_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId(self.next());
        let layers = vec![Vec::new(); desc.kind.layers() as usize];
        self.textures.insert(
            id,
            StoredTexture {
                desc: desc.clone(),
                layers,
            },
        );
        id
    }

    fn attachment_descs(desc: &FramebufferDesc) -> Vec<TextureDesc> {
        let mut descs: Vec<TextureDesc> = desc
            .color_formats
            .iter()
            .enumerate()
            .map(|(i, format)| {
                TextureDesc::new_2d(
                    &format!("{} Color {}", desc.label, i),
                    desc.width,
                    desc.height,
                    *format,
                )
            })
            .collect();
        if desc.depth {
            descs.push(TextureDesc::new_2d(
                &format!("{} Depth", desc.label),
                desc.width,
                desc.height,
                PixelFormat::Depth32Float,
            ));
        }
        descs
    }

    // Inspection helpers

    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|c| match c {
            BackendCommand::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.draws().count()
    }

    pub fn bound_texture(&self, slot: u32) -> Option<TextureId> {
        self.bound_textures.get(slot as usize).copied().flatten()
    }

    pub fn bound_shader(&self) -> Option<ShaderId> {
        self.bound_shader
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id).map(|t| &t.desc)
    }

    pub fn texture_data(&self, id: TextureId, layer: u32) -> Option<&[u8]> {
        self.textures
            .get(&id)
            .and_then(|t| t.layers.get(layer as usize))
            .map(Vec::as_slice)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    pub fn has_vertex_array(&self, id: VertexArrayId) -> bool {
        self.vertex_arrays.contains_key(&id)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Finds the buffer created for `binding`.
    pub fn buffer_at_binding(&self, binding: u32) -> Option<&[u8]> {
        self.buffers
            .values()
            .find(|(_, b, _)| *b == binding)
            .map(|(_, _, data)| data.as_slice())
    }

    pub fn shader_source(&self, id: ShaderId) -> Option<&ShaderSource> {
        self.shaders.get(&id).map(|(_, source)| source)
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn render_state(&self) -> Option<RenderState> {
        self.render_state
    }

    pub fn debug_output_enabled(&self) -> bool {
        self.debug_output
    }

    pub fn framebuffer_size(&self, id: FramebufferId) -> Option<(u32, u32)> {
        self.framebuffers
            .get(&id)
            .map(|fb| (fb.desc.width, fb.desc.height))
    }
}

impl GpuBackend for HeadlessBackend {
    fn info(&self) -> BackendInfo {
        self.info.clone()
    }

    fn enable_debug_output(&mut self) {
        self.debug_output = true;
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.render_state = Some(state);
        self.commands.push(BackendCommand::SetRenderState(state));
    }

    fn set_viewport(&mut self, _x: u32, _y: u32, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands
            .push(BackendCommand::SetViewport { width, height });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.commands.push(BackendCommand::Clear(color));
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = self.alloc_texture(desc);
        self.commands.push(BackendCommand::CreateTexture(id));
        id
    }

    fn write_texture(&mut self, id: TextureId, layer: u32, pixels: &[u8]) {
        let Some(texture) = self.textures.get_mut(&id) else {
            log::warn!("write_texture on unknown texture {:?}", id);
            return;
        };
        assert_eq!(
            pixels.len(),
            texture.desc.layer_size(),
            "Texture data must cover the whole layer"
        );
        if let Some(slot) = texture.layers.get_mut(layer as usize) {
            *slot = pixels.to_vec();
        }
        self.commands
            .push(BackendCommand::WriteTexture { id, layer });
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.commands.push(BackendCommand::DestroyTexture(id));
        }
    }

    fn bind_texture(&mut self, slot: u32, id: TextureId) {
        if let Some(bound) = self.bound_textures.get_mut(slot as usize) {
            *bound = Some(id);
        }
        self.commands.push(BackendCommand::BindTexture { slot, id });
    }

    fn unbind_texture(&mut self, slot: u32) {
        if let Some(bound) = self.bound_textures.get_mut(slot as usize) {
            *bound = None;
        }
        self.commands.push(BackendCommand::UnbindTexture { slot });
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> VertexArrayId {
        assert!(
            !desc.layout.attributes.is_empty(),
            "Vertex buffer has no layout!"
        );
        let id = VertexArrayId(self.next());
        self.vertex_arrays.insert(id, desc.indices.len() as u32);
        self.commands.push(BackendCommand::CreateVertexArray(id));
        id
    }

    fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        if self.vertex_arrays.remove(&id).is_some() {
            self.commands.push(BackendCommand::DestroyVertexArray(id));
        }
    }

    fn create_buffer(&mut self, kind: BufferKind, binding: u32, size: u64) -> BufferId {
        let id = BufferId(self.next());
        self.buffers
            .insert(id, (kind, binding, vec![0; size as usize]));
        id
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) {
        if let Some((_, _, bytes)) = self.buffers.get_mut(&id) {
            let start = offset as usize;
            let end = start + data.len();
            assert!(end <= bytes.len(), "Data exceeds buffer capacity");
            bytes[start..end].copy_from_slice(data);
            self.commands.push(BackendCommand::WriteBuffer {
                id,
                offset,
                len: data.len(),
            });
        }
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        self.buffers.remove(&id);
    }

    fn compile_shader(&mut self, name: &str, source: &ShaderSource) -> crate::error::Result<ShaderId> {
        if self.reject_shaders {
            return Err(EmberError::ShaderCompile {
                name: name.to_owned(),
                reason: "rejected by headless backend".to_owned(),
            });
        }
        let id = ShaderId(self.next());
        self.shaders.insert(id, (name.to_owned(), source.clone()));
        Ok(id)
    }

    fn destroy_shader(&mut self, id: ShaderId) {
        self.shaders.remove(&id);
        if self.bound_shader == Some(id) {
            self.bound_shader = None;
        }
    }

    fn bind_shader(&mut self, id: ShaderId) {
        self.bound_shader = Some(id);
        self.commands.push(BackendCommand::BindShader(id));
    }

    fn unbind_shader(&mut self) {
        self.bound_shader = None;
        self.commands.push(BackendCommand::UnbindShader);
    }

    fn set_draw_uniforms(&mut self, data: &[u8]) {
        self.draw_uniforms = data.to_vec();
        self.commands
            .push(BackendCommand::SetDrawUniforms(data.to_vec()));
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> FramebufferId {
        let id = FramebufferId(self.next());
        let attachments = Self::attachment_descs(desc)
            .iter()
            .map(|d| self.alloc_texture(d))
            .collect();
        self.framebuffers.insert(
            id,
            StoredFramebuffer {
                desc: desc.clone(),
                attachments,
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
        for texture in &fb.attachments {
            if let Some(stored) = self.textures.get_mut(texture) {
                stored.desc.width = width;
                stored.desc.height = height;
                stored.layers = vec![Vec::new(); stored.desc.kind.layers() as usize];
            }
        }
    }

    fn framebuffer_attachment(&self, id: FramebufferId, index: usize) -> Option<TextureId> {
        self.framebuffers
            .get(&id)
            .and_then(|fb| fb.attachments.get(index).copied())
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        if let Some(fb) = self.framebuffers.remove(&id) {
            for texture in fb.attachments {
                self.textures.remove(&texture);
            }
        }
        if self.bound_framebuffer == Some(id) {
            self.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, id: Option<FramebufferId>) {
        self.bound_framebuffer = id;
        self.commands.push(BackendCommand::BindFramebuffer(id));
    }

    fn draw_indexed(&mut self, vertex_array: VertexArrayId) {
        let Some(&index_count) = self.vertex_arrays.get(&vertex_array) else {
            log::warn!("draw_indexed on unknown vertex array {:?}", vertex_array);
            return;
        };
        let record = DrawRecord {
            vertex_array,
            index_count,
            shader: self.bound_shader,
            framebuffer: self.bound_framebuffer,
            textures: self.bound_textures,
            uniforms: self.draw_uniforms.clone(),
            render_state: self.render_state,
        };
        self.commands.push(BackendCommand::Draw(record));
    }
}
