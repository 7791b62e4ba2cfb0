use super::{Component, ComponentContext, ComponentError, EngineRequest, Lifecycle};
use crate::input::{InputState, KeyCode, KeyboardState, MouseButton};
use crate::scene::{CameraRig, Mesh};
use glam::{Vec2, Vec3};
use std::any::Any;

/// Key bindings for the six movement directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanKeys {
    pub forward: KeyCode,
    pub backward: KeyCode,
    pub left: KeyCode,
    pub right: KeyCode,
    pub up: KeyCode,
    pub down: KeyCode,
}

impl Default for PanKeys {
    fn default() -> Self {
        Self {
            forward: KeyCode::KeyW,
            backward: KeyCode::KeyS,
            left: KeyCode::KeyA,
            right: KeyCode::KeyD,
            up: KeyCode::KeyE,
            down: KeyCode::KeyQ,
        }
    }
}

/// Moves and orbits the active scene's camera rig.
///
/// Attached to a mesh but writes to the scene rig, never to its owner.
/// Movement runs along the rig's own axes. With no active scene every
/// callback is a no-op.
#[derive(Debug, Clone)]
pub struct ScenePan {
    /// World units per second
    pub movement_speed: f32,
    /// Degrees per pixel of drag
    pub sensitivity: f32,
    pub button: MouseButton,
    pub keys: PanKeys,
    lifecycle: Lifecycle,
    position: Vec3,
    rotation: Vec3,
    pending_translation: Vec3,
    pending_rotation: Vec2,
}

impl Default for ScenePan {
    fn default() -> Self {
        Self::new(5.0, 0.1)
    }
}

impl ScenePan {
    pub const NAME: &'static str = "ScenePan";

    pub fn new(movement_speed: f32, sensitivity: f32) -> Self {
        Self {
            movement_speed,
            sensitivity,
            button: MouseButton::Right,
            keys: PanKeys::default(),
            lifecycle: Lifecycle::Uninitialized,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            pending_translation: Vec3::ZERO,
            pending_rotation: Vec2::ZERO,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}

impl Component for ScenePan {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn update(&mut self, _owner: &mut Mesh, ctx: &mut ComponentContext<'_>, _dt: f32) {
        let Some(rig) = ctx.rig.as_deref_mut() else {
            return;
        };

        if self.lifecycle == Lifecycle::Uninitialized {
            self.position = rig.transform.position;
            self.rotation = rig.transform.rotation;
            self.lifecycle = Lifecycle::Initialized;
        }

        self.position += self.pending_translation;
        self.rotation.x -= self.pending_rotation.y;
        self.rotation.y -= self.pending_rotation.x;
        self.pending_translation = Vec3::ZERO;
        self.pending_rotation = Vec2::ZERO;

        rig.transform = rig
            .transform
            .with_position(self.position)
            .with_rotation(self.rotation);
    }

    fn handle_mouse_input(&mut self, _owner: &mut Mesh, rig: Option<&CameraRig>, input: &InputState) {
        if rig.is_none() || !input.is_dragging(self.button) {
            return;
        }
        self.pending_rotation += input.drag_delta(self.button) * self.sensitivity;
    }

    fn handle_keyboard_input(
        &mut self,
        _owner: &mut Mesh,
        rig: Option<&CameraRig>,
        keyboard: &KeyboardState,
        dt: f32,
        _requests: &mut Vec<EngineRequest>,
    ) {
        let Some(rig) = rig else {
            return;
        };

        let axes = [
            (self.keys.forward, rig.forward()),
            (self.keys.backward, -rig.forward()),
            (self.keys.right, rig.right()),
            (self.keys.left, -rig.right()),
            (self.keys.up, rig.up()),
            (self.keys.down, -rig.up()),
        ];

        let step = self.movement_speed * dt;
        for (key, direction) in axes {
            if keyboard.is_down(key) {
                self.pending_translation += direction * step;
            }
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
    fn forward_key_moves_rig_along_its_forward_axis() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("anchor");
        mesh.add_component(Box::new(ScenePan::default()));
        let mut rig = CameraRig::default();

        fx.input.keyboard.press(KeyCode::KeyW);
        mesh.handle_keyboard_input(Some(&rig), &fx.input.keyboard, 0.5, &mut Vec::new());
        fx.update_with_rig(&mut mesh, &mut rig, 0.5);

        assert!((rig.transform.position - Vec3::new(0.0, 0.0, -2.5)).length() < 1e-6);
        assert_eq!(mesh.transform.position, Vec3::ZERO);
    }

    #[test]
    fn starts_from_authored_rig_pose() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("anchor");
        mesh.add_component(Box::new(ScenePan::default()));
        let mut rig = CameraRig::default();
        rig.transform = rig
            .transform
            .with_position(Vec3::new(0.0, 1.0, 8.0))
            .with_rotation(Vec3::new(0.0, 90.0, 0.0));

        fx.input.keyboard.press(KeyCode::KeyD);
        mesh.handle_keyboard_input(Some(&rig), &fx.input.keyboard, 1.0, &mut Vec::new());
        fx.update_with_rig(&mut mesh, &mut rig, 1.0);

        // Rig turned 90 degrees about Y: its right axis is -Z
        assert!((rig.transform.position - Vec3::new(0.0, 1.0, 3.0)).length() < 1e-5);
        assert_eq!(rig.transform.rotation, Vec3::new(0.0, 90.0, 0.0));
    }

    #[test]
    fn drag_orbits_rig() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("anchor");
        mesh.add_component(Box::new(ScenePan::new(5.0, 0.5)));
        let mut rig = CameraRig::default();

        fx.input.press_button(MouseButton::Right);
        fx.input.set_cursor(Vec2::new(4.0, 2.0));
        mesh.handle_mouse_input(Some(&rig), &fx.input);
        fx.update_with_rig(&mut mesh, &mut rig, 0.016);

        assert_eq!(rig.transform.rotation, Vec3::new(-1.0, -2.0, 0.0));
    }

    #[test]
    fn no_scene_is_a_no_op() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("anchor");
        mesh.add_component(Box::new(ScenePan::default()));

        fx.input.keyboard.press(KeyCode::KeyW);
        mesh.handle_keyboard_input(None, &fx.input.keyboard, 0.5, &mut Vec::new());
        fx.update(&mut mesh, 0.5);

        let pan = mesh.component::<ScenePan>().unwrap();
        assert_eq!(pan.lifecycle(), Lifecycle::Uninitialized);
        assert_eq!(mesh.transform.position, Vec3::ZERO);
    }
}
