use crate::backend::GraphicsBackend;
use crate::scene::{Scene, SceneError};
use std::collections::BTreeMap;

/// Named scenes with a single active one.
///
/// Inactive scenes keep their state; switching back resumes them as left.
#[derive(Debug, Default)]
pub struct SceneRegistry {
    scenes: BTreeMap<String, Scene>,
    active: Option<String>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scene, returning the one it replaced
    pub fn insert(&mut self, scene: Scene) -> Option<Scene> {
        let name = scene.name().to_string();
        let previous = self.scenes.insert(name.clone(), scene);
        if previous.is_some() {
            log::warn!("Scene '{}' was registered twice, keeping the latest", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&Scene> {
        self.scenes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Scene> {
        self.scenes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&Scene> {
        self.active.as_deref().and_then(|name| self.scenes.get(name))
    }

    pub fn active_mut(&mut self) -> Option<&mut Scene> {
        match self.active.as_deref() {
            Some(name) => self.scenes.get_mut(name),
            None => None,
        }
    }

    /// Make `name` the active scene.
    ///
    /// An unknown name logs a warning and leaves the current scene active.
    pub fn set_active(&mut self, name: &str) -> Result<(), SceneError> {
        if !self.scenes.contains_key(name) {
            log::warn!("Scene '{}' not found, keeping {:?} active", name, self.active);
            return Err(SceneError::SceneNotFound(name.to_string()));
        }
        if self.active.as_deref() != Some(name) {
            log::info!("Active scene: '{}'", name);
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    /// Remove a scene; removing the active one leaves no scene active
    pub fn remove(&mut self, name: &str) -> Option<Scene> {
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        self.scenes.remove(name)
    }

    /// Release every scene's GPU resources
    pub fn release_all(&mut self, backend: &mut dyn GraphicsBackend) {
        self.active = None;
        for (_, scene) in std::mem::take(&mut self.scenes) {
            scene.release(backend);
        }
    }
}
