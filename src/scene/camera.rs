//! Light-field camera rig

use crate::scene::Transform;
use glam::{Mat4, Vec3};

/// Normalized view parameter of the centre camera
pub const CENTER_VIEW: f32 = 0.5;

/// Camera placed by a scene transform, with the parameters of the multi-view sweep.
///
/// Views are produced by a sheared-frustum rig: every view camera sits on the
/// rig's right axis, offset by `(normalized_view - 0.5 + offset) * camera_size`,
/// and its frustum is sheared so the plane `focus` units ahead projects to the
/// same pixels in every view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub transform: Transform,
    /// Width of the camera sweep in world units
    pub camera_size: f32,
    /// Distance from the rig to the zero-parallax plane
    pub focus: f32,
    /// Bias added to every normalized view
    pub offset: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            camera_size: 0.0,
            focus: 0.0,
            offset: 0.0,
            fov: 14.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl CameraRig {
    pub fn forward(&self) -> Vec3 {
        self.transform.forward()
    }

    pub fn right(&self) -> Vec3 {
        self.transform.right()
    }

    pub fn up(&self) -> Vec3 {
        self.transform.up()
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.transform.view_matrix()
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }

    /// Signed shift of the view camera along the rig's right axis
    pub fn view_shift(&self, normalized_view: f32) -> f32 {
        (normalized_view - CENTER_VIEW + self.offset) * self.camera_size
    }

    /// View and projection matrices of the monoscopic camera
    pub fn mono_matrices(&self, aspect: f32) -> (Mat4, Mat4) {
        (self.view_matrix(), self.projection_matrix(aspect))
    }

    /// View and projection matrices for one view of the sweep
    pub fn view_matrices(&self, normalized_view: f32, aspect: f32) -> (Mat4, Mat4) {
        let shift = self.view_shift(normalized_view);
        let view = Mat4::from_translation(Vec3::new(-shift, 0.0, 0.0)) * self.view_matrix();

        let mut projection = self.projection_matrix(aspect);
        if self.focus > self.near {
            projection.z_axis.x += -shift * projection.x_axis.x / self.focus;
        }

        (view, projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3Swizzles, Vec4Swizzles};

    fn rig() -> CameraRig {
        CameraRig {
            transform: Transform::from_position(Vec3::new(0.0, 0.0, 10.0)),
            camera_size: 2.0,
            focus: 10.0,
            ..Default::default()
        }
    }

    fn project(view: Mat4, projection: Mat4, point: Vec3) -> Vec3 {
        let clip = projection * view * point.extend(1.0);
        clip.xyz() / clip.w
    }

    #[test]
    fn centre_view_matches_mono() {
        let rig = rig();
        let (view, projection) = rig.view_matrices(CENTER_VIEW, 1.5);
        let (mono_view, mono_projection) = rig.mono_matrices(1.5);
        assert!(view.abs_diff_eq(mono_view, 1e-6));
        assert!(projection.abs_diff_eq(mono_projection, 1e-6));
    }

    #[test]
    fn focus_plane_has_no_parallax() {
        let rig = rig();
        let on_plane = Vec3::new(0.3, -0.2, 0.0);
        let (v0, p0) = rig.view_matrices(0.0, 1.0);
        let (v1, p1) = rig.view_matrices(1.0, 1.0);
        let a = project(v0, p0, on_plane);
        let b = project(v1, p1, on_plane);
        assert!((a.xy() - b.xy()).length() < 1e-5);

        let off_plane = Vec3::new(0.3, -0.2, 3.0);
        let a = project(v0, p0, off_plane);
        let b = project(v1, p1, off_plane);
        assert!((a.x - b.x).abs() > 1e-3);
    }

    #[test]
    fn sweep_is_monotonic_and_continuous() {
        let rig = rig();
        let steps = 48;
        let mut last = rig.view_shift(0.0);
        for i in 1..steps {
            let shift = rig.view_shift(i as f32 / (steps - 1) as f32);
            assert!(shift > last);
            assert!(shift - last <= rig.camera_size / (steps - 1) as f32 + 1e-6);
            last = shift;
        }
    }

    #[test]
    fn no_shear_inside_near_plane() {
        let rig = CameraRig {
            focus: 0.05,
            ..rig()
        };
        let (_, projection) = rig.view_matrices(0.0, 1.0);
        assert_eq!(projection, rig.projection_matrix(1.0));
    }
}
