//! Material definitions
//!
//! Materials are owned by the [`ResourceCache`](super::cache::ResourceCache)
//! and referenced from meshes by [`MaterialId`]. ID 0 is the fallback material
//! every mesh reverts to when its own material is deleted.

use std::rc::Rc;

use cgmath::Vector4;

use super::texture::{Texture, TextureSlot};

/// Material ID for referencing materials
pub type MaterialId = u32;

/// Reserved ID of the fallback material.
pub const FALLBACK_MATERIAL: MaterialId = 0;

/// Shading parameters and optional texture maps of a surface.
#[derive(Debug, Clone)]
pub struct Material {
    id: MaterialId,
    pub name: String,
    pub albedo_color: Vector4<f32>,
    pub emissive_color: Vector4<f32>,
    pub specular_color: Vector4<f32>,
    pub smoothness: f32,
    pub is_two_sided: bool,
    pub is_emissive: bool,
    pub is_transparent: bool,
    pub albedo_texture: Option<Rc<Texture>>,
    pub emissive_texture: Option<Rc<Texture>>,
    pub specular_texture: Option<Rc<Texture>>,
    pub normal_texture: Option<Rc<Texture>>,
    pub bump_texture: Option<Rc<Texture>>,
}

impl Material {
    pub(crate) fn new(id: MaterialId, name: &str) -> Self {
        Self {
            id,
            name: strip_extension(name).to_owned(),
            albedo_color: Vector4::new(1.0, 1.0, 1.0, 1.0),
            emissive_color: Vector4::new(0.0, 0.0, 0.0, 0.0),
            specular_color: Vector4::new(0.0, 0.0, 0.0, 0.0),
            smoothness: 0.01,
            is_two_sided: false,
            is_emissive: false,
            is_transparent: false,
            albedo_texture: None,
            emissive_texture: None,
            specular_texture: None,
            normal_texture: None,
            bump_texture: None,
        }
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// Texture stored for one of the five material slots.
    pub fn texture(&self, slot: TextureSlot) -> Option<&Rc<Texture>> {
        match slot {
            TextureSlot::Albedo => self.albedo_texture.as_ref(),
            TextureSlot::Emissive => self.emissive_texture.as_ref(),
            TextureSlot::Specular => self.specular_texture.as_ref(),
            TextureSlot::Normal => self.normal_texture.as_ref(),
            TextureSlot::Bump => self.bump_texture.as_ref(),
            _ => None,
        }
    }

    /// Stores a texture in one of the five material slots. Default slots are ignored.
    pub fn set_texture(&mut self, slot: TextureSlot, texture: Option<Rc<Texture>>) {
        match slot {
            TextureSlot::Albedo => self.albedo_texture = texture,
            TextureSlot::Emissive => self.emissive_texture = texture,
            TextureSlot::Specular => self.specular_texture = texture,
            TextureSlot::Normal => self.normal_texture = texture,
            TextureSlot::Bump => self.bump_texture = texture,
            _ => log::warn!("Material '{}' has no texture slot {:?}", self.name, slot),
        }
    }

    /// Iterates the occupied texture slots.
    pub fn textures(&self) -> impl Iterator<Item = &Rc<Texture>> {
        [
            &self.albedo_texture,
            &self.emissive_texture,
            &self.specular_texture,
            &self.normal_texture,
            &self.bump_texture,
        ]
        .into_iter()
        .flatten()
    }
}

/// Keeps everything before the last `.` so "Wood.mtl" names the material "Wood".
pub(crate) fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => name,
    }
}
