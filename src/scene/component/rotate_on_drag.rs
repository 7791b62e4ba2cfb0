use super::{Component, ComponentContext, ComponentError, Lifecycle};
use crate::input::{InputState, MouseButton};
use crate::scene::{CameraRig, Mesh};
use glam::{Vec2, Vec3};
use std::any::Any;

/// Rotates its owner while a mouse button is dragged.
///
/// Vertical drag turns about X, horizontal drag about Y. Screen Y grows
/// downward, so both axes subtract `drag * sensitivity` (degrees per pixel).
#[derive(Debug, Clone)]
pub struct RotateOnDrag {
    pub sensitivity: f32,
    pub button: MouseButton,
    lifecycle: Lifecycle,
    rotation: Vec3,
    pending: Vec2,
}

impl Default for RotateOnDrag {
    fn default() -> Self {
        Self::new(0.1, MouseButton::Left)
    }
}

impl RotateOnDrag {
    pub const NAME: &'static str = "RotateOnDrag";

    pub fn new(sensitivity: f32, button: MouseButton) -> Self {
        Self {
            sensitivity,
            button,
            lifecycle: Lifecycle::Uninitialized,
            rotation: Vec3::ZERO,
            pending: Vec2::ZERO,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Rotation written to the owner on the last update (degrees)
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }
}

impl Component for RotateOnDrag {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn update(&mut self, owner: &mut Mesh, _ctx: &mut ComponentContext<'_>, _dt: f32) {
        if self.lifecycle == Lifecycle::Uninitialized {
            self.rotation = owner.transform.rotation;
            self.lifecycle = Lifecycle::Initialized;
        }

        self.rotation.x -= self.pending.y;
        self.rotation.y -= self.pending.x;
        self.pending = Vec2::ZERO;

        owner.transform = owner.transform.with_rotation(self.rotation);
    }

    fn handle_mouse_input(&mut self, _owner: &mut Mesh, _rig: Option<&CameraRig>, input: &InputState) {
        if input.is_dragging(self.button) {
            self.pending += input.drag_delta(self.button) * self.sensitivity;
        }
    }

    fn clone_box(&self) -> Result<Box<dyn Component>, ComponentError> {
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::test_support::Fixture;

    #[test]
    fn drag_rotates_from_authored_pose() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.transform = mesh.transform.with_rotation(Vec3::new(5.0, 20.0, 0.0));
        mesh.add_component(Box::new(RotateOnDrag::default()));

        fx.input.press_button(MouseButton::Left);
        fx.input.set_cursor(Vec2::new(10.0, 0.0));
        mesh.handle_mouse_input(None, &fx.input);
        fx.update(&mut mesh, 0.016);

        assert_eq!(mesh.transform.rotation, Vec3::new(5.0, 19.0, 0.0));
        let component = mesh.component::<RotateOnDrag>().unwrap();
        assert_eq!(component.lifecycle(), Lifecycle::Initialized);
    }

    #[test]
    fn other_buttons_are_ignored() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.add_component(Box::new(RotateOnDrag::default()));

        fx.input.press_button(MouseButton::Right);
        fx.input.set_cursor(Vec2::new(50.0, 50.0));
        mesh.handle_mouse_input(None, &fx.input);
        fx.update(&mut mesh, 0.016);

        assert_eq!(mesh.transform.rotation, Vec3::ZERO);
    }

    #[test]
    fn preserves_position_and_scale() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.transform = mesh
            .transform
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::new(2.0, 1.0, 1.0));
        mesh.add_component(Box::new(RotateOnDrag::new(1.0, MouseButton::Left)));

        fx.input.press_button(MouseButton::Left);
        fx.input.set_cursor(Vec2::new(0.0, -4.0));
        mesh.handle_mouse_input(None, &fx.input);
        fx.update(&mut mesh, 0.016);

        assert_eq!(mesh.transform.rotation, Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(mesh.transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.transform.scale, Vec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn clone_tracks_rotation_independently() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.add_component(Box::new(RotateOnDrag::default()));
        fx.update(&mut mesh, 0.016);
        let mut copy = mesh.try_clone(&mut fx.backend, "quad#1").unwrap();

        // Drag the original only
        fx.input.press_button(MouseButton::Left);
        fx.input.set_cursor(Vec2::new(10.0, 0.0));
        mesh.handle_mouse_input(None, &fx.input);
        fx.update(&mut mesh, 0.016);
        fx.update(&mut copy, 0.016);

        assert_eq!(mesh.transform.rotation, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(copy.transform.rotation, Vec3::ZERO);
        let copied = copy.component::<RotateOnDrag>().unwrap();
        assert_eq!(copied.rotation(), Vec3::ZERO);
        assert_eq!(copied.lifecycle(), Lifecycle::Initialized);

        // Then the copy only
        fx.input.end_frame();
        fx.input.set_cursor(Vec2::new(10.0, 20.0));
        copy.handle_mouse_input(None, &fx.input);
        fx.update(&mut copy, 0.016);
        fx.update(&mut mesh, 0.016);

        assert_eq!(copy.transform.rotation, Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(mesh.transform.rotation, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(
            mesh.component::<RotateOnDrag>().unwrap().rotation(),
            Vec3::new(0.0, -1.0, 0.0)
        );
    }

    #[test]
    fn clone_of_fresh_component_starts_uninitialized() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.add_component(Box::new(RotateOnDrag::default()));
        let mut copy = mesh.try_clone(&mut fx.backend, "quad#1").unwrap();
        copy.transform = copy.transform.with_rotation(Vec3::new(0.0, 90.0, 0.0));

        fx.update(&mut mesh, 0.016);
        assert_eq!(
            copy.component::<RotateOnDrag>().unwrap().lifecycle(),
            Lifecycle::Uninitialized
        );

        // The copy picks up its own pose when it first updates
        fx.update(&mut copy, 0.016);
        assert_eq!(copy.transform.rotation, Vec3::new(0.0, 90.0, 0.0));
        assert_eq!(mesh.transform.rotation, Vec3::ZERO);
    }
}
