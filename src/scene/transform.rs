//! Position / rotation / scale value type

use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Placement of an object or camera rig.
///
/// `rotation` holds Euler angles in degrees. The rotation matrix is
/// `Rx · Ry · Rz`: a point is rotated about Z first, then Y, then X.
/// Components replace the whole value rather than editing fields in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Copy with a different position
    pub fn with_position(self, position: Vec3) -> Self {
        Self { position, ..self }
    }

    /// Copy with a different rotation (degrees)
    pub fn with_rotation(self, rotation: Vec3) -> Self {
        Self { rotation, ..self }
    }

    /// Copy with a different scale
    pub fn with_scale(self, scale: Vec3) -> Self {
        Self { scale, ..self }
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        let r = Vec3::new(
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        Mat3::from_rotation_x(r.x) * Mat3::from_rotation_y(r.y) * Mat3::from_rotation_z(r.z)
    }

    /// Model matrix `T · R · S`. Zero or negative scale is passed through.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * Mat4::from_mat3(self.rotation_matrix())
            * Mat4::from_scale(self.scale)
    }

    /// Inverse of the rigid part (`T · R`), used when the transform places a camera
    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * Mat4::from_mat3(self.rotation_matrix())).inverse()
    }

    /// Local -Z in world space
    pub fn forward(&self) -> Vec3 {
        self.rotation_matrix() * -Vec3::Z
    }

    /// Local +X in world space
    pub fn right(&self) -> Vec3 {
        self.rotation_matrix() * Vec3::X
    }

    /// Local +Y in world space
    pub fn up(&self) -> Vec3 {
        self.rotation_matrix() * Vec3::Y
    }
}
