//! # Primitive Shape Generation
//!
//! Geometry the renderer needs for itself: a full-screen quad for the
//! deferred lighting and post-process passes, and a unit cube for the skybox.

use crate::gfx::backend::{GpuBackend, VertexArrayId};
use crate::gfx::scene::vertex::Vertex3D;

/// Quad covering normalized device coordinates at z = 0.
pub fn generate_quad() -> (Vec<Vertex3D>, Vec<u32>) {
    let normal = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex3D::new([-1.0, -1.0, 0.0], [0.0, 0.0], normal),
        Vertex3D::new([1.0, -1.0, 0.0], [1.0, 0.0], normal),
        Vertex3D::new([1.0, 1.0, 0.0], [1.0, 1.0], normal),
        Vertex3D::new([-1.0, 1.0, 0.0], [0.0, 1.0], normal),
    ];
    (vertices, vec![0, 1, 2, 2, 3, 0])
}

/// Unit cube centered at the origin, vertices from -0.5 to 0.5 on all axes.
///
/// Each face has outward normals and UVs from 0 to 1.
pub fn generate_cube() -> (Vec<Vertex3D>, Vec<u32>) {
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        // Front (+Z)
        ([0.0, 0.0, 1.0], [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]]),
        // Back (-Z)
        ([0.0, 0.0, -1.0], [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]]),
        // Left (-X)
        ([-1.0, 0.0, 0.0], [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]]),
        // Right (+X)
        ([1.0, 0.0, 0.0], [[0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]]),
        // Top (+Y)
        ([0.0, 1.0, 0.0], [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]]),
        // Bottom (-Y)
        ([0.0, -1.0, 0.0], [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]]),
    ];
    let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, corners) in faces {
        let base = vertices.len() as u32;
        for (corner, uv) in corners.iter().zip(uvs) {
            vertices.push(Vertex3D::new(*corner, uv, normal));
        }
        // Two counter-clockwise triangles per face
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    (vertices, indices)
}

/// GPU copies of the built-in shapes.
#[derive(Debug, Clone, Copy)]
pub struct Primitives {
    pub quad: VertexArrayId,
    pub cube: VertexArrayId,
}

impl Primitives {
    pub fn upload(gpu: &mut dyn GpuBackend) -> Self {
        let (vertices, indices) = generate_quad();
        let quad = Vertex3D::create_vertex_array(gpu, "Fullscreen Quad", &vertices, &indices);
        let (vertices, indices) = generate_cube();
        let cube = Vertex3D::create_vertex_array(gpu, "Skybox Cube", &vertices, &indices);
        Self { quad, cube }
    }

    pub fn destroy(&self, gpu: &mut dyn GpuBackend) {
        gpu.destroy_vertex_array(self.quad);
        gpu.destroy_vertex_array(self.cube);
    }
}
