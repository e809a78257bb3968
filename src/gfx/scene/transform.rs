//! Model placement in the world
//!
//! Rotation is stored as Euler angles in degrees. The composed matrix is
//! `T * R * S` with `R = Rz * Ry * Rx`.

use cgmath::{Deg, Matrix3, Matrix4, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Inactive models are skipped at submission.
    pub active: bool,
    pub translation: Vector3<f32>,
    /// Degrees around X, Y and Z.
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            active: true,
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn with_translation(mut self, x: f32, y: f32, z: f32) -> Self {
        self.translation = Vector3::new(x, y, z);
        self
    }

    pub fn with_rotation(mut self, x: f32, y: f32, z: f32) -> Self {
        self.rotation = Vector3::new(x, y, z);
        self
    }

    pub fn with_scale(mut self, x: f32, y: f32, z: f32) -> Self {
        self.scale = Vector3::new(x, y, z);
        self
    }

    fn rotation_matrix(&self) -> Matrix3<f32> {
        Matrix3::from_angle_z(Deg(self.rotation.z))
            * Matrix3::from_angle_y(Deg(self.rotation.y))
            * Matrix3::from_angle_x(Deg(self.rotation.x))
    }

    /// Translation, then rotation, then scale applied to the model.
    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation_matrix())
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn up(&self) -> Vector3<f32> {
        self.rotation_matrix() * Vector3::unit_y()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.rotation_matrix() * Vector3::unit_x()
    }

    /// Looks down -Z when unrotated.
    pub fn forward(&self) -> Vector3<f32> {
        self.rotation_matrix() * -Vector3::unit_z()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, SquareMatrix, Vector4};

    fn approx(a: Vector3<f32>, b: Vector3<f32>) -> bool {
        (a - b).magnitude() < 1e-5
    }

    #[test]
    fn test_identity_by_default() {
        assert_eq!(Transform::default().matrix(), Matrix4::identity());
    }

    #[test]
    fn test_scale_applies_before_translation() {
        let t = Transform::default()
            .with_translation(1.0, 2.0, 3.0)
            .with_scale(2.0, 2.0, 2.0);
        let p = t.matrix() * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert!(approx(p.truncate(), Vector3::new(3.0, 2.0, 3.0)));
    }

    #[test]
    fn test_yaw_rotates_forward() {
        let t = Transform::default().with_rotation(0.0, 90.0, 0.0);
        assert!(approx(t.forward(), Vector3::new(-1.0, 0.0, 0.0)));
        assert!(approx(t.up(), Vector3::unit_y()));
        assert!(approx(t.right(), Vector3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn test_rotation_order_is_z_y_x() {
        let t = Transform::default().with_rotation(90.0, 90.0, 0.0);
        // Rx maps +Y to +Z, then Ry maps +Z to +X.
        let p = t.matrix() * Vector4::new(0.0, 1.0, 0.0, 1.0);
        assert!(approx(p.truncate(), Vector3::new(1.0, 0.0, 0.0)));
    }
}
