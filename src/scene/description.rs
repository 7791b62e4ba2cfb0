//! JSON scene descriptions and the builder that turns them into scenes
//!
//! ```json
//! {
//!   "activeScene": "photo",
//!   "scenes": {
//!     "photo": {
//!       "cameraSize": 2.0, "focus": 10.0, "offset": 0.0,
//!       "transform": { "position": [0, 0, 10] },
//!       "meshes": [{
//!         "meshName": "quad",
//!         "meshParameters": { "Type": "Plane", "width": 2, "depth": 2 },
//!         "components": [{ "type": "RotateOnDrag", "properties": { "sensitivity": 0.1 } }]
//!       }]
//!     }
//!   }
//! }
//! ```

use crate::backend::GraphicsBackend;
use crate::resources::{MeshData, MeshParameters, ResourceManager};
use crate::scene::component::{ComponentError, ComponentRegistry};
use crate::scene::{CameraRig, Mesh, Scene, SceneError, SceneRegistry, TextureBinding, Transform};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneCollectionDescription {
    #[serde(default)]
    pub active_scene: Option<String>,
    pub scenes: BTreeMap<String, SceneDescription>,
}

impl SceneCollectionDescription {
    pub fn from_json_str(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SceneError> {
        let json = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneDescription {
    pub camera_size: f32,
    pub focus: f32,
    pub offset: f32,
    /// Vertical field of view in degrees; the engine default when absent
    pub fov: Option<f32>,
    pub transform: Transform,
    pub meshes: Vec<MeshDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshDescription {
    pub mesh_name: String,
    #[serde(default)]
    pub mesh_parameters: MeshParameters,
    #[serde(default)]
    pub transform: Transform,
    /// Image file shared through the resource manager
    #[serde(default)]
    pub texture: Option<PathBuf>,
    /// Named shader; the default shader when absent
    #[serde(default)]
    pub shader: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentDescription>,
    /// Extra placements, each a deep copy named `<meshName>#<n>`
    #[serde(default)]
    pub instances: Vec<Transform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescription {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Builds scenes from descriptions, skipping what cannot be built
pub struct SceneBuilder<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub resources: &'a mut ResourceManager,
    pub components: &'a ComponentRegistry,
    /// Relative texture paths resolve against this directory
    pub base_dir: Option<&'a Path>,
    pub default_fov: f32,
}

impl<'a> SceneBuilder<'a> {
    pub fn new(
        backend: &'a mut dyn GraphicsBackend,
        resources: &'a mut ResourceManager,
        components: &'a ComponentRegistry,
    ) -> Self {
        Self {
            backend,
            resources,
            components,
            base_dir: None,
            default_fov: CameraRig::default().fov,
        }
    }

    pub fn with_base_dir(mut self, base_dir: Option<&'a Path>) -> Self {
        self.base_dir = base_dir;
        self
    }

    pub fn with_default_fov(mut self, fov: f32) -> Self {
        self.default_fov = fov;
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Build one scene. Meshes that fail are logged and left out.
    pub fn build_scene(&mut self, name: &str, desc: &SceneDescription) -> Scene {
        let rig = CameraRig {
            transform: desc.transform,
            camera_size: desc.camera_size,
            focus: desc.focus,
            offset: desc.offset,
            fov: desc.fov.unwrap_or(self.default_fov),
            ..Default::default()
        };
        let mut scene = Scene::new(name, rig);

        for mesh_desc in &desc.meshes {
            let meshes = match self.build_meshes(mesh_desc) {
                Ok(meshes) => meshes,
                Err(err) => {
                    log::warn!("Scene '{}': skipping mesh '{}': {}", name, mesh_desc.mesh_name, err);
                    continue;
                }
            };
            for mesh in meshes {
                if let Err(err) = scene.add_mesh(self.backend, mesh) {
                    log::warn!("Scene '{}': {}", name, err);
                }
            }
        }

        log::info!("Built scene '{}' with {} meshes", name, scene.meshes().len());
        scene
    }

    /// Build a mesh and its instances
    pub fn build_meshes(&mut self, desc: &MeshDescription) -> Result<Vec<Mesh>, SceneError> {
        let shader = match desc.shader.as_deref() {
            Some(name) => self
                .resources
                .shader_id(name)
                .unwrap_or_else(|| self.resources.default_shader()),
            None => self.resources.default_shader(),
        };

        let data = MeshData::from_parameters(&desc.mesh_parameters);
        let mut mesh = Mesh::new(self.backend, desc.mesh_name.as_str(), data, shader)?;
        mesh.transform = desc.transform;

        if let Some(texture) = &desc.texture {
            let path = self.resolve(texture);
            match self.resources.load_texture(self.backend, &path) {
                Ok(id) => mesh.texture = TextureBinding::Shared(id),
                Err(err) => log::warn!("Mesh '{}': texture {:?} unavailable: {}", desc.mesh_name, path, err),
            }
        }

        for component in &desc.components {
            match self.components.build(&component.type_name, &component.properties) {
                Ok(built) => mesh.add_component(built),
                Err(ComponentError::UnknownType(type_name)) => {
                    log::warn!("Mesh '{}': unknown component type '{}', skipped", desc.mesh_name, type_name)
                }
                Err(err) => log::warn!("Mesh '{}': component skipped: {}", desc.mesh_name, err),
            }
        }

        let mut meshes = Vec::with_capacity(1 + desc.instances.len());
        for (index, transform) in desc.instances.iter().enumerate() {
            let name = format!("{}#{}", desc.mesh_name, index + 1);
            match mesh.try_clone(self.backend, name) {
                Ok(mut copy) => {
                    copy.transform = *transform;
                    meshes.push(copy);
                }
                Err(err) => log::warn!("Mesh '{}': instance {} skipped: {}", desc.mesh_name, index + 1, err),
            }
        }
        meshes.insert(0, mesh);
        Ok(meshes)
    }

    /// Build and register every scene, then pick the active one.
    ///
    /// Returns how many scenes were registered.
    pub fn load_into(
        &mut self,
        collection: &SceneCollectionDescription,
        registry: &mut SceneRegistry,
    ) -> usize {
        let mut loaded = 0;
        for (name, desc) in &collection.scenes {
            let scene = self.build_scene(name, desc);
            if let Some(replaced) = registry.insert(scene) {
                replaced.release(self.backend);
            }
            loaded += 1;
        }

        if let Some(name) = collection.active_scene.as_deref() {
            // Unknown names are logged by the registry
            let _ = registry.set_active(name);
        }
        if registry.active_name().is_none() {
            let first = registry.names().next().map(str::to_string);
            if let Some(first) = first {
                let _ = registry.set_active(&first);
            }
        }
        loaded
    }
}
