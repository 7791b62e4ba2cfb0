//! Scene management
//!
//! A [`Scene`] owns an ordered list of [`Mesh`]es and the [`CameraRig`] they
//! are viewed through. Mesh order is both update order and draw order.

mod camera;
pub mod component;
mod description;
mod mesh;
mod registry;
mod transform;

pub use camera::*;
pub use description::*;
pub use mesh::*;
pub use registry::*;
pub use transform::*;

use crate::backend::{BackendError, GraphicsBackend};
use crate::input::InputState;
use crate::resources::ResourceManager;
use component::{ComponentContext, ComponentError, EngineRequest};
use glam::Vec3;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Scene '{0}' not found")]
    SceneNotFound(String),
    #[error("Scene '{scene}' already contains a mesh named '{mesh}'")]
    DuplicateMesh { scene: String, mesh: String },
    #[error("Cannot clone mesh '{mesh}': {source}")]
    MeshClone {
        mesh: String,
        #[source]
        source: ComponentError,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Invalid scene description: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Meshes plus the camera rig they are seen through
pub struct Scene {
    name: String,
    pub rig: CameraRig,
    meshes: Vec<Mesh>,
}

impl Scene {
    pub fn new(name: impl Into<String>, rig: CameraRig) -> Self {
        Self {
            name: name.into(),
            rig,
            meshes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a mesh. Names are unique within a scene; a rejected mesh is released.
    pub fn add_mesh(&mut self, backend: &mut dyn GraphicsBackend, mesh: Mesh) -> Result<(), SceneError> {
        if self.mesh(mesh.name()).is_some() {
            let err = SceneError::DuplicateMesh {
                scene: self.name.clone(),
                mesh: mesh.name().to_string(),
            };
            mesh.release(backend);
            return Err(err);
        }
        self.meshes.push(mesh);
        Ok(())
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn mesh(&self, name: &str) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.name() == name)
    }

    pub fn mesh_mut(&mut self, name: &str) -> Option<&mut Mesh> {
        self.meshes.iter_mut().find(|m| m.name() == name)
    }

    pub fn forward(&self) -> Vec3 {
        self.rig.forward()
    }

    pub fn right(&self) -> Vec3 {
        self.rig.right()
    }

    pub fn up(&self) -> Vec3 {
        self.rig.up()
    }

    /// Fan the frame's input snapshot out to every mesh
    pub fn handle_input(&mut self, input: &InputState, dt: f32, requests: &mut Vec<EngineRequest>) {
        let rig = &self.rig;
        for mesh in self.meshes.iter_mut() {
            mesh.handle_mouse_input(Some(rig), input);
            mesh.handle_keyboard_input(Some(rig), &input.keyboard, dt, requests);
        }
    }

    pub fn update(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        resources: &mut ResourceManager,
        dropped_file: Option<&Path>,
        dt: f32,
    ) {
        let mut ctx = ComponentContext {
            backend,
            resources,
            rig: Some(&mut self.rig),
            dropped_file,
        };
        for mesh in self.meshes.iter_mut() {
            mesh.update(&mut ctx, dt);
        }
    }

    /// Draw every mesh from the monoscopic camera
    pub fn render_mono(
        &self,
        backend: &mut dyn GraphicsBackend,
        resources: &mut ResourceManager,
        aspect: f32,
    ) {
        let (view, projection) = self.rig.mono_matrices(aspect);
        self.draw_meshes(backend, resources, view, projection);
    }

    /// Draw every mesh from one camera of the view sweep.
    ///
    /// Outside the quilt pass the normalized view is ignored and the
    /// monoscopic camera is used.
    pub fn render_view(
        &self,
        backend: &mut dyn GraphicsBackend,
        resources: &mut ResourceManager,
        normalized_view: f32,
        is_quilt_pass: bool,
        aspect: f32,
    ) {
        if !is_quilt_pass {
            return self.render_mono(backend, resources, aspect);
        }
        let (view, projection) = self.rig.view_matrices(normalized_view, aspect);
        self.draw_meshes(backend, resources, view, projection);
    }

    fn draw_meshes(
        &self,
        backend: &mut dyn GraphicsBackend,
        resources: &mut ResourceManager,
        view: glam::Mat4,
        projection: glam::Mat4,
    ) {
        for mesh in &self.meshes {
            mesh.draw(backend, resources, view, projection);
        }
    }

    /// Release every mesh's GPU resources
    pub fn release(self, backend: &mut dyn GraphicsBackend) {
        for mesh in self.meshes {
            mesh.release(backend);
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("rig", &self.rig)
            .field("meshes", &self.meshes)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resources::MeshData;

    /// Headless backend, resources and input for component and scene tests
    pub(crate) struct Fixture {
        pub backend: RecordingBackend,
        pub resources: ResourceManager,
        pub input: InputState,
    }

    impl Fixture {
        pub fn new() -> Self {
            let mut backend = RecordingBackend::default();
            let resources = ResourceManager::new(&mut backend).unwrap();
            Self {
                backend,
                resources,
                input: InputState::new(),
            }
        }

        /// Unit plane using the default shader
        pub fn mesh(&mut self, name: &str) -> Mesh {
            let shader = self.resources.default_shader();
            Mesh::new(&mut self.backend, name, MeshData::plane(1.0, 1.0, 1), shader).unwrap()
        }

        fn run(&mut self, mesh: &mut Mesh, rig: Option<&mut CameraRig>, dropped: Option<&Path>, dt: f32) {
            let mut ctx = ComponentContext {
                backend: &mut self.backend,
                resources: &mut self.resources,
                rig,
                dropped_file: dropped,
            };
            mesh.update(&mut ctx, dt);
        }

        pub fn update(&mut self, mesh: &mut Mesh, dt: f32) {
            self.run(mesh, None, None, dt);
        }

        pub fn update_with_rig(&mut self, mesh: &mut Mesh, rig: &mut CameraRig, dt: f32) {
            self.run(mesh, Some(rig), None, dt);
        }

        pub fn update_with_drop(&mut self, mesh: &mut Mesh, path: &Path, dt: f32) {
            self.run(mesh, None, Some(path), dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;
    use crate::backend::UniformValue;
    use crate::input::{KeyCode, MouseButton};
    use component::{RotateOnDrag, ScenePan};
    use glam::Vec2;

    #[test]
    fn duplicate_mesh_names_are_rejected() {
        let mut fx = Fixture::new();
        let mut scene = Scene::new("main", CameraRig::default());
        let first = fx.mesh("quad");
        scene.add_mesh(&mut fx.backend, first).unwrap();
        let buffers = fx.backend.live_buffers();

        let second = fx.mesh("quad");
        let err = scene.add_mesh(&mut fx.backend, second).unwrap_err();
        assert!(matches!(err, SceneError::DuplicateMesh { .. }));
        assert_eq!(fx.backend.live_buffers(), buffers);
        assert_eq!(scene.meshes().len(), 1);
    }

    #[test]
    fn pan_component_moves_scene_rig() {
        let mut fx = Fixture::new();
        let mut scene = Scene::new("main", CameraRig::default());
        let mut anchor = fx.mesh("anchor");
        anchor.add_component(Box::new(ScenePan::new(5.0, 0.1)));
        scene.add_mesh(&mut fx.backend, anchor).unwrap();

        fx.input.keyboard.press(KeyCode::KeyW);
        let mut requests = Vec::new();
        scene.handle_input(&fx.input, 0.5, &mut requests);
        scene.update(&mut fx.backend, &mut fx.resources, None, 0.5);

        assert_eq!(scene.forward(), Vec3::new(0.0, 0.0, -1.0));
        assert!((scene.rig.transform.position - Vec3::new(0.0, 0.0, -2.5)).length() < 1e-6);
        assert_eq!(scene.mesh("anchor").unwrap().transform.position, Vec3::ZERO);
    }

    #[test]
    fn draws_meshes_in_order() {
        let mut fx = Fixture::new();
        let mut scene = Scene::new("main", CameraRig::default());
        let first = fx.mesh("first");
        let second = fx.mesh("second");
        let (vb0, vb1) = (first.vertex_buffer(), second.vertex_buffer());
        scene.add_mesh(&mut fx.backend, first).unwrap();
        scene.add_mesh(&mut fx.backend, second).unwrap();

        scene.render_mono(&mut fx.backend, &mut fx.resources, 1.0);

        let draws = fx.backend.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].vertex_buffer, vb0);
        assert_eq!(draws[1].vertex_buffer, vb1);
    }

    #[test]
    fn quilt_views_differ_only_inside_quilt_pass() {
        let mut fx = Fixture::new();
        let rig = CameraRig {
            camera_size: 2.0,
            focus: 10.0,
            ..Default::default()
        };
        let mut scene = Scene::new("main", rig);
        let quad = fx.mesh("quad");
        scene.add_mesh(&mut fx.backend, quad).unwrap();

        scene.render_view(&mut fx.backend, &mut fx.resources, 0.0, false, 1.0);
        scene.render_view(&mut fx.backend, &mut fx.resources, 0.0, true, 1.0);
        scene.render_view(&mut fx.backend, &mut fx.resources, 1.0, true, 1.0);

        let views: Vec<_> = fx
            .backend
            .draws()
            .iter()
            .map(|d| d.uniform("view").copied())
            .collect();
        assert_eq!(views[0], Some(UniformValue::from(scene.rig.view_matrix())));
        assert_ne!(views[1], views[0]);
        assert_ne!(views[2], views[1]);
    }

    #[test]
    fn rotate_component_sees_input_through_scene() {
        let mut fx = Fixture::new();
        let mut scene = Scene::new("main", CameraRig::default());
        let mut quad = fx.mesh("quad");
        quad.add_component(Box::new(RotateOnDrag::default()));
        scene.add_mesh(&mut fx.backend, quad).unwrap();

        fx.input.press_button(MouseButton::Left);
        fx.input.set_cursor(Vec2::new(10.0, 0.0));
        scene.handle_input(&fx.input, 0.016, &mut Vec::new());
        scene.update(&mut fx.backend, &mut fx.resources, None, 0.016);

        let rotation = scene.mesh("quad").unwrap().transform.rotation;
        assert_eq!(rotation, Vec3::new(0.0, -1.0, 0.0));
    }
}
