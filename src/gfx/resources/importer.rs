//! Scene import into the mesh/material model
//!
//! Loading happens in two steps. [`ImportedScene::from_obj`] parses a file
//! with `tobj` into a library-independent scene (flat mesh and material
//! lists plus a node hierarchy), generating smooth normals and tangent space
//! on the way. [`MeshImporter::build_model`] then turns that scene into cache
//! materials, a mesh tree rooted at the first mesh, and a [`Model`].
//!
//! The scene's material list always starts with a synthetic placeholder
//! named [`DEFAULT_MATERIAL_NAME`]; it is never turned into a cache material
//! and meshes that use it keep the fallback material.

use std::collections::HashMap;
use std::path::Path;

use cgmath::{InnerSpace, Vector2, Vector3, Zero};

use crate::error::{EmberError, Result};
use crate::gfx::backend::GpuBackend;
use crate::gfx::scene::vertex::Vertex3D;

use super::cache::ResourceCache;
use super::material::{MaterialId, FALLBACK_MATERIAL};
use super::mesh::{MeshId, Model};
use super::texture::TextureSlot;

/// Name of the placeholder material every imported scene starts with.
pub const DEFAULT_MATERIAL_NAME: &str = "DefaultMaterial";

/// One mesh of an imported scene, already in the engine's vertex format.
#[derive(Debug, Clone, Default)]
pub struct ImportedMesh {
    pub name: String,
    pub vertices: Vec<Vertex3D>,
    pub indices: Vec<u32>,
    /// Index into [`ImportedScene::materials`].
    pub material_index: usize,
}

impl ImportedMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.len() < 3
    }
}

/// Material record as the importer reads it.
#[derive(Debug, Clone)]
pub struct ImportedMaterial {
    pub name: String,
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub emissive: [f32; 3],
    pub shininess: f32,
    pub opacity: f32,
    pub two_sided: bool,
    /// File names relative to the model's directory.
    pub textures: Vec<(TextureSlot, String)>,
}

impl ImportedMaterial {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            diffuse: [0.0; 3],
            specular: [0.0; 3],
            emissive: [0.0; 3],
            shininess: 0.0,
            opacity: 1.0,
            two_sided: false,
            textures: Vec::new(),
        }
    }

    fn placeholder() -> Self {
        let mut material = Self::new(DEFAULT_MATERIAL_NAME);
        material.diffuse = [0.6; 3];
        material
    }
}

/// Node of the scene hierarchy. Mesh references index [`ImportedScene::meshes`].
#[derive(Debug, Clone, Default)]
pub struct ImportedNode {
    pub meshes: Vec<usize>,
    pub children: Vec<ImportedNode>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportedScene {
    pub meshes: Vec<ImportedMesh>,
    pub materials: Vec<ImportedMaterial>,
    pub root: ImportedNode,
}

impl ImportedScene {
    /// Parses an OBJ file (and the MTL libraries it references).
    ///
    /// Faces are triangulated and identical vertices joined. Missing normals
    /// are generated smooth, and tangents/bitangents are derived from the UVs.
    pub fn from_obj(path: &Path) -> Result<Self> {
        let import_error = |reason: String| EmberError::ModelImport {
            path: path.display().to_string(),
            reason,
        };

        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|e| import_error(e.to_string()))?;

        let materials = materials.unwrap_or_else(|e| {
            log::warn!(
                "Failed to load materials for '{}': {}",
                path.display(),
                e
            );
            Vec::new()
        });

        let mut scene = ImportedScene::default();
        scene.materials.push(ImportedMaterial::placeholder());
        scene
            .materials
            .extend(materials.iter().map(material_from_mtl));

        for (index, model) in models.into_iter().enumerate() {
            let mesh = model.mesh;
            let vertices = build_vertices(&mesh.positions, &mesh.normals, &mesh.texcoords, &mesh.indices);

            scene.meshes.push(ImportedMesh {
                name: model.name,
                vertices,
                indices: mesh.indices,
                material_index: mesh.material_id.map(|id| id + 1).unwrap_or(0),
            });
            scene.root.children.push(ImportedNode {
                meshes: vec![index],
                children: Vec::new(),
            });
        }

        Ok(scene)
    }
}

fn parse_color(value: &str) -> Option<[f32; 3]> {
    let parts: Vec<f32> = value
        .split_whitespace()
        .filter_map(|v| v.parse().ok())
        .collect();
    match parts.as_slice() {
        [r, g, b, ..] => Some([*r, *g, *b]),
        [v] => Some([*v; 3]),
        _ => None,
    }
}

fn material_from_mtl(mtl: &tobj::Material) -> ImportedMaterial {
    let mut material = ImportedMaterial::new(&mtl.name);
    material.diffuse = mtl.diffuse.unwrap_or([0.0; 3]);
    material.specular = mtl.specular.unwrap_or([0.0; 3]);
    material.shininess = mtl.shininess.unwrap_or(0.0);

    let transparency = mtl
        .unknown_param
        .get("Tr")
        .and_then(|tr| tr.trim().parse::<f32>().ok())
        .map(|tr| 1.0 - tr);
    material.opacity = mtl.dissolve.or(transparency).unwrap_or(1.0);

    if let Some(ke) = mtl.unknown_param.get("Ke").and_then(|v| parse_color(v)) {
        material.emissive = ke;
    }

    let mut textures = Vec::new();
    if let Some(file) = &mtl.diffuse_texture {
        textures.push((TextureSlot::Albedo, file.clone()));
    }
    if let Some(file) = mtl.unknown_param.get("map_Ke") {
        textures.push((TextureSlot::Emissive, file.clone()));
    }
    if let Some(file) = &mtl.specular_texture {
        textures.push((TextureSlot::Specular, file.clone()));
    }
    if let Some(file) = mtl.unknown_param.get("norm") {
        textures.push((TextureSlot::Normal, file.clone()));
    }
    // tobj reads `map_bump` into `normal_texture`; it is a height map.
    if let Some(file) = mtl
        .normal_texture
        .as_ref()
        .or_else(|| mtl.unknown_param.get("bump"))
    {
        textures.push((TextureSlot::Bump, file.clone()));
    }
    material.textures = textures;
    material
}

/// Interleaves tobj's flat arrays into engine vertices.
fn build_vertices(positions: &[f32], normals: &[f32], texcoords: &[f32], indices: &[u32]) -> Vec<Vertex3D> {
    let vertex_count = positions.len() / 3;
    let positions: Vec<Vector3<f32>> = positions
        .chunks_exact(3)
        .map(|p| Vector3::new(p[0], p[1], p[2]))
        .collect();

    let normals: Vec<Vector3<f32>> = if normals.len() == vertex_count * 3 {
        normals
            .chunks_exact(3)
            .map(|n| Vector3::new(n[0], n[1], n[2]))
            .collect()
    } else {
        generate_smooth_normals(&positions, indices)
    };

    let uvs: Vec<Vector2<f32>> = if texcoords.len() == vertex_count * 2 {
        texcoords
            .chunks_exact(2)
            .map(|t| Vector2::new(t[0], t[1]))
            .collect()
    } else {
        vec![Vector2::zero(); vertex_count]
    };

    let (tangents, bitangents) = compute_tangent_space(&positions, &normals, &uvs, indices);

    (0..vertex_count)
        .map(|i| Vertex3D {
            position: positions[i].into(),
            uv: uvs[i].into(),
            normal: normals[i].into(),
            tangent: tangents[i].into(),
            bitangent: bitangents[i].into(),
        })
        .collect()
}

/// Area-weighted average of the adjacent face normals.
pub(crate) fn generate_smooth_normals(positions: &[Vector3<f32>], indices: &[u32]) -> Vec<Vector3<f32>> {
    let mut normals = vec![Vector3::zero(); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let edge1 = positions[i1] - positions[i0];
        let edge2 = positions[i2] - positions[i0];
        let face_normal = edge1.cross(edge2);

        for index in [i0, i1, i2] {
            normals[index] += face_normal;
        }
    }

    normals
        .into_iter()
        .map(|n| {
            if n.magnitude2() > f32::EPSILON {
                n.normalize()
            } else {
                Vector3::unit_y()
            }
        })
        .collect()
}

fn any_perpendicular(n: Vector3<f32>) -> Vector3<f32> {
    let axis = if n.x.abs() < 0.9 {
        Vector3::unit_x()
    } else {
        Vector3::unit_y()
    };
    n.cross(axis).normalize()
}

/// Per-vertex tangent and bitangent, orthogonalized against the normal.
pub(crate) fn compute_tangent_space(
    positions: &[Vector3<f32>],
    normals: &[Vector3<f32>],
    uvs: &[Vector2<f32>],
    indices: &[u32],
) -> (Vec<Vector3<f32>>, Vec<Vector3<f32>>) {
    let mut tangents = vec![Vector3::zero(); positions.len()];
    let mut bitangents = vec![Vector3::zero(); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];

        let edge1 = positions[i1] - positions[i0];
        let edge2 = positions[i2] - positions[i0];
        let uv1 = uvs[i1] - uvs[i0];
        let uv2 = uvs[i2] - uvs[i0];

        let det = uv1.x * uv2.y - uv1.y * uv2.x;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (edge1 * uv2.y - edge2 * uv1.y) * r;
        let bitangent = (edge2 * uv1.x - edge1 * uv2.x) * r;

        for index in [i0, i1, i2] {
            tangents[index] += tangent;
            bitangents[index] += bitangent;
        }
    }

    for i in 0..positions.len() {
        let n = normals[i];
        let t = tangents[i] - n * n.dot(tangents[i]);
        let t = if t.magnitude2() > f32::EPSILON {
            t.normalize()
        } else {
            any_perpendicular(n)
        };

        let handedness = if n.cross(t).dot(bitangents[i]) < 0.0 { -1.0 } else { 1.0 };
        tangents[i] = t;
        bitangents[i] = n.cross(t) * handedness;
    }

    (tangents, bitangents)
}

/// Builds cache resources from imported scenes.
pub struct MeshImporter;

impl MeshImporter {
    /// Parses `path` and assembles a model from it. Materials and meshes are
    /// registered in `cache`, textures are resolved next to the model file.
    pub fn load_model(gpu: &mut dyn GpuBackend, cache: &mut ResourceCache, path: &str) -> Result<Model> {
        let scene = ImportedScene::from_obj(Path::new(path))?;
        let directory = Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self::build_model(gpu, cache, &scene, Some(path), &directory)
    }

    /// Turns an already parsed scene into cache materials, a mesh tree and a model.
    pub fn build_model(
        gpu: &mut dyn GpuBackend,
        cache: &mut ResourceCache,
        scene: &ImportedScene,
        path: Option<&str>,
        directory: &str,
    ) -> Result<Model> {
        let display_path = path.unwrap_or("unpathed");
        let root_index = scene
            .meshes
            .iter()
            .position(|mesh| !mesh.is_empty())
            .ok_or_else(|| EmberError::EmptyScene(display_path.to_owned()))?;

        let materials: Vec<MaterialId> = scene
            .materials
            .iter()
            .map(|material| Self::process_material(gpu, cache, material, directory))
            .collect();

        let root = Self::process_mesh(gpu, cache, &scene.meshes[root_index], &materials, None);
        Self::process_node(gpu, cache, scene, &scene.root, root, root_index, &materials);

        log::info!(
            "Imported '{}': {} meshes, {} materials",
            display_path,
            scene.meshes.len(),
            materials.iter().filter(|&&id| id != FALLBACK_MATERIAL).count()
        );

        Ok(Model::new(path, Some(root)))
    }

    fn process_node(
        gpu: &mut dyn GpuBackend,
        cache: &mut ResourceCache,
        scene: &ImportedScene,
        node: &ImportedNode,
        parent: MeshId,
        root_index: usize,
        materials: &[MaterialId],
    ) {
        for &mesh_index in &node.meshes {
            if mesh_index == root_index {
                continue;
            }
            let Some(mesh) = scene.meshes.get(mesh_index) else {
                log::warn!("Scene node references missing mesh {}", mesh_index);
                continue;
            };
            if mesh.is_empty() {
                log::debug!("Skipping empty mesh '{}'", mesh.name);
                continue;
            }

            let child = Self::process_mesh(gpu, cache, mesh, materials, None);
            cache.add_submesh(parent, child);
        }

        for child in &node.children {
            Self::process_node(gpu, cache, scene, child, parent, root_index, materials);
        }
    }

    fn process_mesh(
        gpu: &mut dyn GpuBackend,
        cache: &mut ResourceCache,
        mesh: &ImportedMesh,
        materials: &[MaterialId],
        parent: Option<MeshId>,
    ) -> MeshId {
        let label = if mesh.name.is_empty() { "unnamed" } else { &mesh.name };
        let vertex_array = Vertex3D::create_vertex_array(gpu, label, &mesh.vertices, &mesh.indices);
        let material = materials
            .get(mesh.material_index)
            .copied()
            .unwrap_or(FALLBACK_MATERIAL);

        let id = cache.create_mesh(Some(vertex_array), material, parent);
        if let Some(created) = cache.mesh_mut(id) {
            created.name = label.to_owned();
        }
        id
    }

    /// Creates the cache material for one scene material. The placeholder
    /// maps to the fallback material.
    fn process_material(
        gpu: &mut dyn GpuBackend,
        cache: &mut ResourceCache,
        imported: &ImportedMaterial,
        directory: &str,
    ) -> MaterialId {
        if imported.name == DEFAULT_MATERIAL_NAME {
            return FALLBACK_MATERIAL;
        }

        let mut textures = HashMap::new();
        for (slot, file) in &imported.textures {
            let texture_path = if directory.is_empty() {
                file.clone()
            } else {
                format!("{}/{}", directory, file)
            };
            if let Some(texture) = cache.create_texture(gpu, &texture_path) {
                textures.insert(*slot, texture);
            }
        }

        let [r, g, b] = imported.diffuse;
        let [er, eg, eb] = imported.emissive;
        let [sr, sg, sb] = imported.specular;
        let opacity = imported.opacity;

        let material = cache.create_material(&imported.name);
        material.albedo_color = cgmath::Vector4::new(r, g, b, opacity);
        material.emissive_color = cgmath::Vector4::new(er, eg, eb, 1.0);
        material.specular_color = cgmath::Vector4::new(sr, sg, sb, 1.0);
        material.smoothness = imported.shininess / 256.0;
        material.is_two_sided = if !imported.two_sided && opacity < 1.0 {
            true
        } else {
            imported.two_sided
        };
        material.is_emissive = imported.emissive != [0.0; 3];
        material.is_transparent = opacity < 1.0;
        for (slot, texture) in textures {
            material.set_texture(slot, Some(texture));
        }

        material.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::HeadlessBackend;

    fn triangle(name: &str, material_index: usize) -> ImportedMesh {
        ImportedMesh {
            name: name.to_string(),
            vertices: vec![
                Vertex3D::new([0.0, 0.0, 0.0], [0.0, 0.0], [0.0, 0.0, 1.0]),
                Vertex3D::new([1.0, 0.0, 0.0], [1.0, 0.0], [0.0, 0.0, 1.0]),
                Vertex3D::new([0.0, 1.0, 0.0], [0.0, 1.0], [0.0, 0.0, 1.0]),
            ],
            indices: vec![0, 1, 2],
            material_index,
        }
    }

    #[test]
    fn test_empty_mesh_between_siblings_is_skipped() {
        let mut gpu = HeadlessBackend::new();
        let mut cache = ResourceCache::new();
        let scene = ImportedScene {
            meshes: vec![
                triangle("Body", 1),
                ImportedMesh {
                    name: "Hollow".to_string(),
                    material_index: 2,
                    ..ImportedMesh::default()
                },
                triangle("Door", 2),
                triangle("Wheel", 0),
            ],
            materials: vec![
                ImportedMaterial::placeholder(),
                ImportedMaterial::new("Paint"),
                ImportedMaterial::new("Glass"),
            ],
            root: ImportedNode {
                meshes: vec![0, 1, 2, 3],
                children: Vec::new(),
            },
        };

        let model = MeshImporter::build_model(&mut gpu, &mut cache, &scene, None, "").unwrap();

        assert_eq!(cache.mesh_count(), 3);
        assert_eq!(gpu.live_vertex_arrays(), 3);
        let root = cache.mesh(model.root().unwrap()).unwrap();
        assert_eq!(root.name, "Body");

        let children: Vec<_> = root.submeshes().iter().map(|&id| cache.mesh(id).unwrap()).collect();
        let names: Vec<_> = children.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Door", "Wheel"]);

        let material_name = |id| cache.material(id).unwrap().name.clone();
        assert_eq!(material_name(root.material()), "Paint");
        assert_eq!(material_name(children[0].material()), "Glass");
        assert!(children[1].uses_fallback_material());
        // Placeholder is not registered: fallback, Paint, Glass
        assert_eq!(cache.material_count(), 3);
    }

    #[test]
    fn test_smooth_normals_of_flat_quad() {
        let positions = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let normals = generate_smooth_normals(&positions, &[0, 1, 2, 0, 2, 3]);
        for n in normals {
            assert!((n - Vector3::unit_z()).magnitude() < 1e-6);
        }
    }

    #[test]
    fn test_tangents_follow_u_axis() {
        let positions = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let normals = vec![Vector3::unit_z(); 3];
        let uvs = vec![Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0)];

        let (tangents, bitangents) = compute_tangent_space(&positions, &normals, &uvs, &[0, 1, 2]);
        assert!((tangents[0] - Vector3::unit_x()).magnitude() < 1e-6);
        assert!((bitangents[0] - Vector3::unit_y()).magnitude() < 1e-6);
    }

    #[test]
    fn test_degenerate_uvs_still_give_a_basis() {
        let positions = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let normals = vec![Vector3::unit_z(); 3];
        let uvs = vec![Vector2::zero(); 3];

        let (tangents, _) = compute_tangent_space(&positions, &normals, &uvs, &[0, 1, 2]);
        assert!((tangents[0].magnitude() - 1.0).abs() < 1e-6);
        assert!(tangents[0].dot(normals[0]).abs() < 1e-6);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("1 0.5 0"), Some([1.0, 0.5, 0.0]));
        assert_eq!(parse_color("0.2"), Some([0.2; 3]));
        assert_eq!(parse_color("nope"), None);
    }
}
