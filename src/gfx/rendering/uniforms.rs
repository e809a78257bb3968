//! CPU-side images of the GPU uniform and storage blocks
//!
//! Field order and padding here are the wire format shared with
//! `shaders/common.wgsl`; both sides must change together.

use cgmath::{Matrix4, Vector3, Vector4};

use crate::gfx::scene::light::{Light, PointLight};

/// Binding of the camera uniform block in the global group.
pub const CAMERA_BINDING: u32 = 0;
/// Binding of the point light storage block in the global group.
pub const LIGHTS_BINDING: u32 = 1;

/// Converts a cgmath matrix to a column-major float array for shaders.
pub fn convert_matrix4_to_array(matrix: Matrix4<f32>) -> [[f32; 4]; 4] {
    matrix.into()
}

/// `mat4 view_projection; vec4 position;` (80 bytes)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub position: [f32; 4],
}

impl CameraUniform {
    pub fn new(view_proj: Matrix4<f32>, position: Vector3<f32>) -> Self {
        Self {
            view_proj: convert_matrix4_to_array(view_proj),
            position: [position.x, position.y, position.z, 0.0],
        }
    }
}

/// Header of the lights storage block: `ivec4(active_count, 0, 0, 0)`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightsHeader {
    pub count: [i32; 4],
}

/// One point light entry (48 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointLightUniform {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub intensity: f32,
    pub att_k: f32,
    pub att_l: f32,
    pub att_q: f32,
}

impl From<&PointLight> for PointLightUniform {
    fn from(light: &PointLight) -> Self {
        Self {
            position: [light.position.x, light.position.y, light.position.z, 0.0],
            color: [light.color.x, light.color.y, light.color.z, 1.0],
            intensity: light.intensity,
            att_k: light.att_k,
            att_l: light.att_l,
            att_q: light.att_q,
        }
    }
}

/// Byte size of the lights storage block for `max_lights` entries.
pub fn lights_buffer_size(max_lights: usize) -> u64 {
    (std::mem::size_of::<LightsHeader>() + max_lights * std::mem::size_of::<PointLightUniform>()) as u64
}

/// Per-draw uniform block (192 bytes).
///
/// Mesh draws fill the model matrix, material and light fields; post-process
/// passes use `post` and `tone`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub albedo_color: [f32; 4],
    pub emissive_color: [f32; 4],
    pub light_direction: [f32; 4],
    /// rgb color, w = intensity.
    pub light_color: [f32; 4],
    /// Albedo, normal and bump slot indices.
    pub texture_slots: [i32; 4],
    /// Smoothness, emissive flag, transparent flag, two-sided flag.
    pub material: [f32; 4],
    /// Horizontal flag, blur radius, bright threshold, exposure.
    pub post: [f32; 4],
    /// Gamma, bloom enabled flag.
    pub tone: [f32; 4],
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            model: convert_matrix4_to_array(cgmath::SquareMatrix::identity()),
            albedo_color: [1.0; 4],
            emissive_color: [0.0; 4],
            light_direction: [0.0; 4],
            light_color: [0.0; 4],
            texture_slots: [0; 4],
            material: [0.0; 4],
            post: [0.0; 4],
            tone: [2.2, 0.0, 0.0, 0.0],
        }
    }
}

fn to_array(v: Vector4<f32>) -> [f32; 4] {
    v.into()
}

impl DrawUniforms {
    pub fn with_model(mut self, model: Matrix4<f32>) -> Self {
        self.model = convert_matrix4_to_array(model);
        self
    }

    pub fn with_light(mut self, light: &Light) -> Self {
        let d = light.direction;
        let c = light.color;
        self.light_direction = [d.x, d.y, d.z, 0.0];
        self.light_color = [c.x, c.y, c.z, light.intensity];
        self
    }

    pub fn with_colors(mut self, albedo: Vector4<f32>, emissive: Vector4<f32>) -> Self {
        self.albedo_color = to_array(albedo);
        self.emissive_color = to_array(emissive);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
