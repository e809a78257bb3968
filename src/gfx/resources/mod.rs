//! GPU-backed resources
//!
//! Textures, shaders, materials and meshes, plus the [`ResourceCache`] that
//! deduplicates and owns them.

pub mod cache;
pub mod importer;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod texture;

pub use cache::ResourceCache;
pub use importer::MeshImporter;
pub use material::{Material, MaterialId};
pub use mesh::{Mesh, MeshId, Model, ModelHandle};
pub use shader::Shader;
pub use texture::{Texture, TextureSlot};
