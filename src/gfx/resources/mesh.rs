//! Mesh tree nodes and model instances
//!
//! Meshes live in the resource cache's registry and point at each other by
//! [`MeshId`]: a node keeps an ordered child list and a non-owning parent
//! back-reference. A [`Model`] is a named, transformable wrapper around a
//! root mesh. Several models may share one root (instancing).

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::gfx::backend::VertexArrayId;
use crate::gfx::scene::transform::Transform;

use super::material::{MaterialId, FALLBACK_MATERIAL};

pub type MeshId = u32;

/// Shared handle to a cached model.
pub type ModelHandle = Rc<RefCell<Model>>;

#[derive(Debug, Clone)]
pub struct Mesh {
    id: MeshId,
    pub name: String,
    pub(crate) material: MaterialId,
    pub(crate) submeshes: Vec<MeshId>,
    pub(crate) parent: Option<MeshId>,
    vertex_array: Option<VertexArrayId>,
}

impl Mesh {
    pub(crate) fn new(
        id: MeshId,
        vertex_array: Option<VertexArrayId>,
        material: MaterialId,
        parent: Option<MeshId>,
    ) -> Self {
        Self {
            id,
            name: "unnamed".to_string(),
            material,
            submeshes: Vec::new(),
            parent,
            vertex_array,
        }
    }

    /// Cache-assigned ID, never reused.
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// Assigned material. Reverts to the fallback when that material is deleted.
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Child meshes in draw order.
    pub fn submeshes(&self) -> &[MeshId] {
        &self.submeshes
    }

    /// `None` for a model root.
    pub fn parent(&self) -> Option<MeshId> {
        self.parent
    }

    /// `None` for interior nodes that only group children.
    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.vertex_array
    }

    pub fn uses_fallback_material(&self) -> bool {
        self.material == FALLBACK_MATERIAL
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    path: Option<String>,
    pub name: String,
    pub(crate) root: Option<MeshId>,
    pub transform: Transform,
}

impl Model {
    /// Model named after the file stem of `path`.
    pub(crate) fn new(path: Option<&str>, root: Option<MeshId>) -> Self {
        let name = path
            .and_then(|p| Path::new(p).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());

        Self {
            path: path.map(str::to_owned),
            name,
            root,
            transform: Transform::default(),
        }
    }

    /// `None` for models that were not loaded from a file.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Cleared when the root mesh is deleted from the cache.
    pub fn root(&self) -> Option<MeshId> {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_is_file_stem() {
        let model = Model::new(Some("assets/models/Car.obj"), None);
        assert_eq!(model.name, "Car");
        assert_eq!(model.path(), Some("assets/models/Car.obj"));

        let unpathed = Model::new(None, None);
        assert_eq!(unpathed.name, "unnamed");
        assert!(unpathed.path().is_none());
    }

    #[test]
    fn test_new_mesh_is_a_leaf() {
        let mesh = Mesh::new(4, None, FALLBACK_MATERIAL, Some(1));
        assert_eq!(mesh.parent(), Some(1));
        assert!(mesh.submeshes().is_empty());
        assert!(mesh.uses_fallback_material());
    }
}
