//! # Vertex Data Structures
//!
//! GPU-compatible vertex format shared by imported meshes and the built-in
//! primitives. Every vertex array the engine creates uses this layout.

use crate::gfx::backend::{GpuBackend, VertexArrayDesc, VertexArrayId, VertexLayout};

/// Interleaved mesh vertex: position, uv, normal, tangent, bitangent.
///
/// # Memory Layout
///
/// `#[repr(C)]` keeps the field order, which must match the attribute
/// locations declared by the shaders:
///
/// | location | attribute | floats |
/// |----------|-----------|--------|
/// | 0        | position  | 3      |
/// | 1        | uv        | 2      |
/// | 2        | normal    | 3      |
/// | 3        | tangent   | 3      |
/// | 4        | bitangent | 3      |
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex3D {
    /// Vertex with only position, uv and normal filled in.
    pub fn new(position: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            uv,
            normal,
            ..Default::default()
        }
    }

    /// Attribute layout handed to the backend when creating vertex arrays.
    pub fn layout() -> VertexLayout {
        VertexLayout::new(&[3, 2, 3, 3, 3])
    }

    /// Uploads interleaved vertices and indices as one vertex array.
    pub fn create_vertex_array(
        gpu: &mut dyn GpuBackend,
        label: &str,
        vertices: &[Vertex3D],
        indices: &[u32],
    ) -> VertexArrayId {
        let layout = Self::layout();
        gpu.create_vertex_array(&VertexArrayDesc {
            label,
            vertices: bytemuck::cast_slice(vertices),
            layout: &layout,
            indices,
        })
    }
}
