use super::{Component, ComponentContext, ComponentError, EngineRequest};
use crate::input::{KeyCode, KeyboardState};
use crate::scene::{CameraRig, Mesh};
use std::any::Any;

/// Asks the engine to activate another scene when a key goes down
#[derive(Debug, Clone)]
pub struct SceneSwitch {
    pub key: KeyCode,
    pub scene: String,
}

impl SceneSwitch {
    pub const NAME: &'static str = "SceneSwitch";

    pub fn new(key: KeyCode, scene: impl Into<String>) -> Self {
        Self {
            key,
            scene: scene.into(),
        }
    }
}

impl Component for SceneSwitch {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn update(&mut self, _owner: &mut Mesh, _ctx: &mut ComponentContext<'_>, _dt: f32) {}

    fn handle_keyboard_input(
        &mut self,
        _owner: &mut Mesh,
        _rig: Option<&CameraRig>,
        keyboard: &KeyboardState,
        _dt: f32,
        requests: &mut Vec<EngineRequest>,
    ) {
        if keyboard.just_pressed(self.key) {
            log::debug!("{}: requesting scene '{}'", Self::NAME, self.scene);
            requests.push(EngineRequest::SwitchScene(self.scene.clone()));
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
