//! Central resource cache
//!
//! Owns every texture, model, mesh and material the engine loads. Textures
//! and models are deduplicated by source path and handed out as shared
//! handles; meshes and materials live in ID-keyed registries and are never
//! deduplicated. The cache is an explicit context object: create one at
//! startup, pass it to whoever needs it, and call [`ResourceCache::clean_up`]
//! at shutdown.
//!
//! Mesh IDs and material IDs come from counters that only go up, so an ID is
//! never handed out twice during the cache's lifetime.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::gfx::backend::{GpuBackend, PixelFormat, VertexArrayId};

use super::importer::MeshImporter;
use super::material::{Material, MaterialId, FALLBACK_MATERIAL};
use super::mesh::{Mesh, MeshId, Model, ModelHandle};
use super::texture::Texture;

const FALLBACK_MATERIAL_NAME: &str = "Default";

#[derive(Debug)]
pub struct ResourceCache {
    textures: Vec<Rc<Texture>>,
    models: Vec<ModelHandle>,
    meshes: BTreeMap<MeshId, Mesh>,
    materials: BTreeMap<MaterialId, Material>,
    next_mesh_id: MeshId,
    next_material_id: MaterialId,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    /// Empty cache holding only the fallback material.
    pub fn new() -> Self {
        let mut cache = Self {
            textures: Vec::new(),
            models: Vec::new(),
            meshes: BTreeMap::new(),
            materials: BTreeMap::new(),
            next_mesh_id: 0,
            next_material_id: 0,
        };
        cache.seed_fallback_material();
        cache
    }

    fn seed_fallback_material(&mut self) {
        let id = self.create_material(FALLBACK_MATERIAL_NAME).id();
        debug_assert_eq!(id, FALLBACK_MATERIAL);
    }

    // ---------------------------------------------------------------------
    // Textures
    // ---------------------------------------------------------------------

    /// Returns the cached texture loaded from `path`, loading it on first use.
    ///
    /// Returns `None` when the file cannot be read or decoded.
    pub fn create_texture(&mut self, gpu: &mut dyn GpuBackend, path: &str) -> Option<Rc<Texture>> {
        if let Some(existing) = self.texture_by_path(path) {
            return Some(existing);
        }

        match Texture::from_file(gpu, path) {
            Ok(texture) => {
                log::debug!(
                    "Loaded texture '{}' ({}x{})",
                    path,
                    texture.width(),
                    texture.height()
                );
                let texture = Rc::new(texture);
                self.textures.push(Rc::clone(&texture));
                Some(texture)
            }
            Err(err) => {
                log::error!("Failed to load texture data from path '{}': {}", path, err);
                None
            }
        }
    }

    /// Registers an unpathed texture built from raw pixels. Such textures are
    /// never returned by a path lookup.
    pub fn create_texture_from_pixels(
        &mut self,
        gpu: &mut dyn GpuBackend,
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: &[u8],
        label: &str,
    ) -> Rc<Texture> {
        let texture = Rc::new(Texture::from_pixels(gpu, width, height, format, pixels, label));
        self.textures.push(Rc::clone(&texture));
        texture
    }

    /// Cached texture for `path`, without loading it when absent.
    pub fn texture_by_path(&self, path: &str) -> Option<Rc<Texture>> {
        self.textures
            .iter()
            .find(|t| t.path() == Some(path))
            .cloned()
    }

    /// Frees textures nobody but the cache holds. Returns how many were freed.
    pub fn release_unused_textures(&mut self, gpu: &mut dyn GpuBackend) -> usize {
        let before = self.textures.len();
        self.textures.retain(|texture| {
            if Rc::strong_count(texture) > 1 {
                return true;
            }
            texture.destroy(gpu);
            false
        });
        before - self.textures.len()
    }

    /// Every cached texture in load order.
    pub fn textures(&self) -> &[Rc<Texture>] {
        &self.textures
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    // ---------------------------------------------------------------------
    // Models
    // ---------------------------------------------------------------------

    /// Returns the cached model loaded from `path`, importing it on first use.
    ///
    /// Returns `None` when the import fails (unreadable file, corrupt or empty scene).
    pub fn create_model(&mut self, gpu: &mut dyn GpuBackend, path: &str) -> Option<ModelHandle> {
        if let Some(existing) = self
            .models
            .iter()
            .find(|m| m.borrow().path() == Some(path))
        {
            return Some(Rc::clone(existing));
        }

        match MeshImporter::load_model(gpu, self, path) {
            Ok(model) => {
                let handle = Rc::new(RefCell::new(model));
                self.models.push(Rc::clone(&handle));
                Some(handle)
            }
            Err(err) => {
                log::error!("{}", err);
                None
            }
        }
    }

    /// Registers an already assembled model without dedup.
    pub(crate) fn register_model(&mut self, model: Model) -> ModelHandle {
        let handle = Rc::new(RefCell::new(model));
        self.models.push(Rc::clone(&handle));
        handle
    }

    /// Clones `source` as a new instance named `new_name`.
    ///
    /// The clone copies the transform and shares the root mesh. The source
    /// keeps its name.
    pub fn create_model_from(&mut self, source: &ModelHandle, new_name: &str) -> ModelHandle {
        let mut model = source.borrow().clone();
        model.name = new_name.to_owned();
        self.register_model(model)
    }

    /// Every registered model, clones included.
    pub fn models(&self) -> &[ModelHandle] {
        &self.models
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    // ---------------------------------------------------------------------
    // Meshes
    // ---------------------------------------------------------------------

    /// Registers a new mesh under the next mesh ID.
    ///
    /// When `parent` names a live mesh the new mesh is appended to its submeshes.
    pub fn create_mesh(
        &mut self,
        vertex_array: Option<VertexArrayId>,
        material: MaterialId,
        parent: Option<MeshId>,
    ) -> MeshId {
        let id = self.next_mesh_id;
        self.next_mesh_id += 1;
        self.meshes
            .insert(id, Mesh::new(id, vertex_array, material, None));

        if let Some(parent) = parent {
            self.add_submesh(parent, id);
        }
        id
    }

    /// Appends `child` to `parent`'s submeshes, detaching it from any previous
    /// parent first.
    ///
    /// Refused (returns false) when either mesh is missing or when the link
    /// would create a cycle.
    pub fn add_submesh(&mut self, parent: MeshId, child: MeshId) -> bool {
        if !self.meshes.contains_key(&parent) || !self.meshes.contains_key(&child) {
            return false;
        }
        if self.is_ancestor_or_self(child, parent) {
            log::warn!(
                "Refusing to add mesh {} under mesh {}: it would create a cycle",
                child,
                parent
            );
            return false;
        }

        self.detach_from_parent(child);
        if let Some(p) = self.meshes.get_mut(&parent) {
            p.submeshes.push(child);
        }
        if let Some(c) = self.meshes.get_mut(&child) {
            c.parent = Some(parent);
        }
        true
    }

    /// True when `ancestor` is `mesh` or lies on the path from `mesh` to its root.
    fn is_ancestor_or_self(&self, ancestor: MeshId, mesh: MeshId) -> bool {
        let mut current = Some(mesh);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.meshes.get(&id).and_then(|m| m.parent);
        }
        false
    }

    fn detach_from_parent(&mut self, child: MeshId) {
        let Some(parent) = self.meshes.get(&child).and_then(|m| m.parent) else {
            return;
        };
        if let Some(p) = self.meshes.get_mut(&parent) {
            if let Some(pos) = p.submeshes.iter().position(|&id| id == child) {
                p.submeshes.remove(pos);
            }
        }
        if let Some(c) = self.meshes.get_mut(&child) {
            c.parent = None;
        }
    }

    /// Removes a mesh and its whole subtree from the registry.
    ///
    /// The mesh is first detached from its parent. Vertex arrays of every
    /// removed mesh are destroyed, and models rooted at a removed mesh lose
    /// their root. Absent IDs are ignored.
    pub fn delete_mesh_references(&mut self, gpu: &mut dyn GpuBackend, id: MeshId) {
        if !self.meshes.contains_key(&id) {
            return;
        }
        self.detach_from_parent(id);

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(mesh) = self.meshes.remove(&current) {
                stack.extend(mesh.submeshes.iter().copied());
                if let Some(vertex_array) = mesh.vertex_array() {
                    gpu.destroy_vertex_array(vertex_array);
                }
                removed.push(current);
            }
        }

        for model in &self.models {
            let mut model = model.borrow_mut();
            if model.root.is_some_and(|root| removed.contains(&root)) {
                model.root = None;
            }
        }
        log::debug!("Deleted mesh {} ({} nodes)", id, removed.len());
    }

    /// Mesh registered under `id`, if it has not been deleted.
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(&id)
    }

    /// Mutable access for renaming or re-parenting outside the tree helpers.
    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.get_mut(&id)
    }

    /// Live meshes in ascending ID order.
    pub fn meshes(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.values()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Reassigns a mesh's material. Ignored unless both IDs exist.
    pub fn set_mesh_material(&mut self, mesh: MeshId, material: MaterialId) -> bool {
        if !self.materials.contains_key(&material) {
            return false;
        }
        match self.meshes.get_mut(&mesh) {
            Some(m) => {
                m.material = material;
                true
            }
            None => false,
        }
    }

    // ---------------------------------------------------------------------
    // Materials
    // ---------------------------------------------------------------------

    /// Registers a new material under the next material ID. A trailing file
    /// extension is stripped from `name`.
    pub fn create_material(&mut self, name: &str) -> &mut Material {
        let id = self.next_material_id;
        self.next_material_id += 1;
        self.materials
            .entry(id)
            .or_insert_with(|| Material::new(id, name))
    }

    /// Deletes a material, reverting every mesh that used it to the fallback.
    /// The fallback material itself cannot be deleted. Absent IDs are ignored.
    pub fn delete_material_references(&mut self, id: MaterialId) {
        if id == FALLBACK_MATERIAL {
            log::warn!("The fallback material cannot be deleted");
            return;
        }
        if !self.materials.contains_key(&id) {
            return;
        }

        for mesh in self.meshes.values_mut() {
            if mesh.material == id {
                mesh.material = FALLBACK_MATERIAL;
            }
        }
        self.materials.remove(&id);
    }

    /// Material registered under `id`. Unlike [`ResourceCache::resolve_material`]
    /// this does not fall back.
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    /// Mutable access for editing colors, flags and maps in place.
    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(&id)
    }

    /// The material `id`, or the fallback material if `id` is gone.
    pub fn resolve_material(&self, id: MaterialId) -> Option<&Material> {
        self.materials
            .get(&id)
            .or_else(|| self.materials.get(&FALLBACK_MATERIAL))
    }

    /// Live materials in ascending ID order, the fallback first.
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.materials.values()
    }

    /// Includes the fallback material.
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    // ---------------------------------------------------------------------
    // Lifetime
    // ---------------------------------------------------------------------

    /// Empties all four registries and frees the GPU objects they own.
    ///
    /// Texture handles still held elsewhere keep their metadata but their GPU
    /// texture is gone. The fallback material is recreated.
    pub fn clean_up(&mut self, gpu: &mut dyn GpuBackend) {
        for mesh in self.meshes.values() {
            if let Some(vertex_array) = mesh.vertex_array() {
                gpu.destroy_vertex_array(vertex_array);
            }
        }
        for texture in &self.textures {
            texture.destroy(gpu);
        }

        log::info!(
            "Cleaning up resources: {} textures, {} models, {} meshes, {} materials",
            self.textures.len(),
            self.models.len(),
            self.meshes.len(),
            self.materials.len()
        );

        self.textures.clear();
        self.models.clear();
        self.meshes.clear();
        self.materials.clear();
        self.next_mesh_id = 0;
        self.next_material_id = 0;
        self.seed_fallback_material();
    }

    /// Human readable listing of every cached resource and its share count.
    pub fn references_report(&self) -> Vec<String> {
        let mut lines = vec!["----- RESOURCES REFERENCES -----".to_string()];

        lines.push(format!("- Materials ({})", self.materials.len()));
        for material in self.materials.values() {
            let users = self
                .meshes
                .values()
                .filter(|m| m.material == material.id())
                .count();
            lines.push(format!(
                "\tMat {} '{}' -> Meshes: {}",
                material.id(),
                material.name,
                users
            ));
        }

        lines.push(format!("- Meshes ({})", self.meshes.len()));
        for mesh in self.meshes.values() {
            lines.push(format!(
                "\tMesh {} (MatID: {}) '{}' -> Submeshes: {}",
                mesh.id(),
                mesh.material,
                mesh.name,
                mesh.submeshes.len()
            ));
        }

        lines.push(format!("- Models ({})", self.models.len()));
        for model in &self.models {
            lines.push(format!(
                "\tModel '{}' -> Refs: {}",
                model.borrow().name,
                Rc::strong_count(model)
            ));
        }

        lines.push(format!("- Textures ({})", self.textures.len()));
        for texture in &self.textures {
            lines.push(format!(
                "\tTexture {} '{}' -> Refs: {}",
                texture.id().raw(),
                texture.path().unwrap_or("unpathed"),
                Rc::strong_count(texture)
            ));
        }

        lines
    }

    /// Writes [`ResourceCache::references_report`] to the info log.
    pub fn log_references(&self) {
        for line in self.references_report() {
            log::info!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::HeadlessBackend;

    #[test]
    fn test_new_cache_has_fallback_material() {
        let cache = ResourceCache::new();
        assert_eq!(cache.material_count(), 1);
        assert_eq!(cache.material(FALLBACK_MATERIAL).unwrap().name, "Default");
    }

    #[test]
    fn test_material_ids_are_sequential() {
        let mut cache = ResourceCache::new();
        let a = cache.create_material("a").id();
        let b = cache.create_material("b").id();
        let c = cache.create_material("c").id();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut cache = ResourceCache::new();
        let first = cache.create_material("first").id();
        cache.delete_material_references(first);
        let second = cache.create_material("second").id();
        assert!(second > first);

        let mut gpu = HeadlessBackend::new();
        let m0 = cache.create_mesh(None, FALLBACK_MATERIAL, None);
        cache.delete_mesh_references(&mut gpu, m0);
        let m1 = cache.create_mesh(None, FALLBACK_MATERIAL, None);
        assert!(m1 > m0);
    }

    #[test]
    fn test_fallback_material_cannot_be_deleted() {
        let mut cache = ResourceCache::new();
        cache.delete_material_references(FALLBACK_MATERIAL);
        assert!(cache.material(FALLBACK_MATERIAL).is_some());
    }

    #[test]
    fn test_set_mesh_material_requires_existing_material() {
        let mut cache = ResourceCache::new();
        let mesh = cache.create_mesh(None, FALLBACK_MATERIAL, None);
        assert!(!cache.set_mesh_material(mesh, 99));
        assert_eq!(cache.mesh(mesh).unwrap().material(), FALLBACK_MATERIAL);

        let wood = cache.create_material("Wood").id();
        assert!(cache.set_mesh_material(mesh, wood));
        assert_eq!(cache.mesh(mesh).unwrap().material(), wood);
    }

    #[test]
    fn test_create_mesh_with_parent_links_both_ways() {
        let mut cache = ResourceCache::new();
        let root = cache.create_mesh(None, FALLBACK_MATERIAL, None);
        let child = cache.create_mesh(None, FALLBACK_MATERIAL, Some(root));
        assert_eq!(cache.mesh(child).unwrap().parent(), Some(root));
        assert_eq!(cache.mesh(root).unwrap().submeshes(), &[child]);
    }

    #[test]
    fn test_add_submesh_refuses_cycles() {
        let mut cache = ResourceCache::new();
        let a = cache.create_mesh(None, FALLBACK_MATERIAL, None);
        let b = cache.create_mesh(None, FALLBACK_MATERIAL, Some(a));
        let c = cache.create_mesh(None, FALLBACK_MATERIAL, Some(b));

        assert!(!cache.add_submesh(c, a));
        assert!(!cache.add_submesh(a, a));
        assert_eq!(cache.mesh(a).unwrap().parent(), None);
    }

    #[test]
    fn test_reparenting_moves_child() {
        let mut cache = ResourceCache::new();
        let a = cache.create_mesh(None, FALLBACK_MATERIAL, None);
        let b = cache.create_mesh(None, FALLBACK_MATERIAL, None);
        let child = cache.create_mesh(None, FALLBACK_MATERIAL, Some(a));

        assert!(cache.add_submesh(b, child));
        assert!(cache.mesh(a).unwrap().submeshes().is_empty());
        assert_eq!(cache.mesh(b).unwrap().submeshes(), &[child]);
        assert_eq!(cache.mesh(child).unwrap().parent(), Some(b));
    }

    #[test]
    fn test_clean_up_resets_everything() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = ResourceCache::new();
        cache.create_material("a");
        cache.create_mesh(None, FALLBACK_MATERIAL, None);
        cache.create_texture_from_pixels(&mut gpu, 1, 1, PixelFormat::Rgba8, &[0; 4], "px");

        cache.clean_up(&mut gpu);
        assert_eq!(cache.texture_count(), 0);
        assert_eq!(cache.mesh_count(), 0);
        assert_eq!(cache.model_count(), 0);
        assert_eq!(cache.material_count(), 1);
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(cache.create_material("b").id(), 1);
    }

    #[test]
    fn test_release_unused_textures() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = ResourceCache::new();
        let kept = cache.create_texture_from_pixels(&mut gpu, 1, 1, PixelFormat::Rgba8, &[0; 4], "kept");
        cache.create_texture_from_pixels(&mut gpu, 1, 1, PixelFormat::Rgba8, &[0; 4], "dropped");

        assert_eq!(cache.release_unused_textures(&mut gpu), 1);
        assert_eq!(cache.texture_count(), 1);
        assert_eq!(cache.textures()[0].id(), kept.id());
    }

    #[test]
    fn test_report_lists_every_registry() {
        let mut cache = ResourceCache::new();
        cache.create_material("Wood.mtl");
        let report = cache.references_report();
        assert!(report.iter().any(|l| l.contains("- Materials (2)")));
        assert!(report.iter().any(|l| l.contains("'Wood'")));
        assert!(report.iter().any(|l| l.starts_with("- Textures")));
    }
}
