use super::{Component, ComponentError, DepthDisplacement, RotateOnDrag, ScenePan, SceneSwitch};
use crate::input::{parse_key_code, parse_mouse_button, KeyCode, MouseButton};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

/// Builds one component variant from its description properties
pub type ComponentBuilder = fn(&Properties<'_>) -> Result<Box<dyn Component>, ComponentError>;

/// Typed view over a component's `properties` mapping
pub struct Properties<'a> {
    component: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Properties<'a> {
    pub fn new(component: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { component, map }
    }

    fn invalid(&self, property: &str, message: impl Into<String>) -> ComponentError {
        ComponentError::InvalidProperty {
            component: self.component.to_string(),
            property: property.to_string(),
            message: message.into(),
        }
    }

    pub fn f32_or(&self, name: &str, default: f32) -> Result<f32, ComponentError> {
        match self.map.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| self.invalid(name, "not a finite number")),
            Some(other) => Err(self.invalid(name, format!("expected a number, got {}", other))),
        }
    }

    pub fn string(&self, name: &str) -> Result<Option<&'a str>, ComponentError> {
        match self.map.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.invalid(name, format!("expected a string, got {}", other))),
        }
    }

    pub fn required_string(&self, name: &str) -> Result<&'a str, ComponentError> {
        self.string(name)?
            .ok_or_else(|| self.invalid(name, "missing required property"))
    }

    pub fn key_or(&self, name: &str, default: KeyCode) -> Result<KeyCode, ComponentError> {
        match self.string(name)? {
            None => Ok(default),
            Some(key) => {
                parse_key_code(key).ok_or_else(|| self.invalid(name, format!("unknown key '{}'", key)))
            }
        }
    }

    pub fn button_or(&self, name: &str, default: MouseButton) -> Result<MouseButton, ComponentError> {
        match self.string(name)? {
            None => Ok(default),
            Some(button) => parse_mouse_button(button)
                .ok_or_else(|| self.invalid(name, format!("unknown mouse button '{}'", button))),
        }
    }
}

/// Maps a description's component `type` string to its builder
pub struct ComponentRegistry {
    builders: HashMap<String, ComponentBuilder>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(RotateOnDrag::NAME, build_rotate_on_drag);
        registry.register(ScenePan::NAME, build_scene_pan);
        registry.register(DepthDisplacement::NAME, build_depth_displacement);
        registry.register(SceneSwitch::NAME, build_scene_switch);
        registry
    }
}

impl ComponentRegistry {
    /// Registry with no variants
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Add or replace the builder for `type_name`
    pub fn register(&mut self, type_name: &str, builder: ComponentBuilder) {
        if self.builders.insert(type_name.to_string(), builder).is_some() {
            log::debug!("Replaced component builder '{}'", type_name);
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.builders.contains_key(type_name)
    }

    pub fn build(
        &self,
        type_name: &str,
        properties: &Map<String, Value>,
    ) -> Result<Box<dyn Component>, ComponentError> {
        let builder = self
            .builders
            .get(type_name)
            .ok_or_else(|| ComponentError::UnknownType(type_name.to_string()))?;
        builder(&Properties::new(type_name, properties))
    }
}

fn build_rotate_on_drag(props: &Properties<'_>) -> Result<Box<dyn Component>, ComponentError> {
    let defaults = RotateOnDrag::default();
    Ok(Box::new(RotateOnDrag::new(
        props.f32_or("sensitivity", defaults.sensitivity)?,
        props.button_or("button", defaults.button)?,
    )))
}

fn build_scene_pan(props: &Properties<'_>) -> Result<Box<dyn Component>, ComponentError> {
    let defaults = ScenePan::default();
    let mut pan = ScenePan::new(
        props.f32_or("movementSpeed", defaults.movement_speed)?,
        props.f32_or("sensitivity", defaults.sensitivity)?,
    );
    pan.button = props.button_or("button", defaults.button)?;
    pan.keys.forward = props.key_or("forwardKey", defaults.keys.forward)?;
    pan.keys.backward = props.key_or("backwardKey", defaults.keys.backward)?;
    pan.keys.left = props.key_or("leftKey", defaults.keys.left)?;
    pan.keys.right = props.key_or("rightKey", defaults.keys.right)?;
    pan.keys.up = props.key_or("upKey", defaults.keys.up)?;
    pan.keys.down = props.key_or("downKey", defaults.keys.down)?;
    Ok(Box::new(pan))
}

fn build_depth_displacement(props: &Properties<'_>) -> Result<Box<dyn Component>, ComponentError> {
    let path = props.string("path")?.map(PathBuf::from);
    let depth_scale = props.f32_or("depthScale", DepthDisplacement::default().depth_scale)?;
    Ok(Box::new(DepthDisplacement::new(path, depth_scale)))
}

fn build_scene_switch(props: &Properties<'_>) -> Result<Box<dyn Component>, ComponentError> {
    let key = props.key_or("key", KeyCode::Tab)?;
    let scene = props.required_string("scene")?;
    Ok(Box::new(SceneSwitch::new(key, scene)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn builds_default_variants() {
        let registry = ComponentRegistry::default();
        let rotate = registry
            .build("RotateOnDrag", &props(json!({ "sensitivity": 0.25, "button": "Right" })))
            .unwrap();
        let rotate = rotate.as_any().downcast_ref::<RotateOnDrag>().unwrap();
        assert_eq!(rotate.sensitivity, 0.25);
        assert_eq!(rotate.button, MouseButton::Right);

        let pan = registry
            .build("ScenePan", &props(json!({ "movementSpeed": 2, "upKey": "Space" })))
            .unwrap();
        let pan = pan.as_any().downcast_ref::<ScenePan>().unwrap();
        assert_eq!(pan.movement_speed, 2.0);
        assert_eq!(pan.keys.up, KeyCode::Space);
        assert_eq!(pan.keys.forward, KeyCode::KeyW);

        let depth = registry
            .build("DepthDisplacement", &props(json!({ "path": "photo.png" })))
            .unwrap();
        let depth = depth.as_any().downcast_ref::<DepthDisplacement>().unwrap();
        assert_eq!(depth.path(), Some(std::path::Path::new("photo.png")));
    }

    #[test]
    fn unknown_type_is_reported() {
        let registry = ComponentRegistry::default();
        let err = registry.build("Wobble", &Map::new()).err().unwrap();
        assert!(matches!(err, ComponentError::UnknownType(name) if name == "Wobble"));
    }

    #[test]
    fn bad_properties_name_the_field() {
        let registry = ComponentRegistry::default();
        let err = registry
            .build("RotateOnDrag", &props(json!({ "sensitivity": "fast" })))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ComponentError::InvalidProperty { ref property, .. } if property == "sensitivity"
        ));

        let err = registry.build("SceneSwitch", &Map::new()).err().unwrap();
        assert!(matches!(
            err,
            ComponentError::InvalidProperty { ref property, .. } if property == "scene"
        ));
    }
}
