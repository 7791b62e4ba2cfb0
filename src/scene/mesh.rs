//! Renderable object: geometry, transform and attached components

use crate::backend::{
    BackendError, BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend, TextureHandle,
};
use crate::input::{InputState, KeyboardState};
use crate::resources::{GpuTexture, MeshData, ResourceManager, ShaderId, TextureId};
use crate::scene::component::{Component, ComponentContext, EngineRequest};
use crate::scene::{CameraRig, SceneError, Transform};
use glam::Mat4;

/// Texture a mesh samples on unit 0
#[derive(Debug, Default)]
pub enum TextureBinding {
    /// Use the white fallback
    #[default]
    None,
    /// Texture owned by the resource manager
    Shared(TextureId),
    /// Texture released together with the mesh
    Owned(GpuTexture),
}

/// GPU copies of a mesh's vertex and index arrays
#[derive(Debug, Clone, Copy)]
struct GpuGeometry {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
}

impl GpuGeometry {
    fn upload(
        backend: &mut dyn GraphicsBackend,
        name: &str,
        data: &MeshData,
    ) -> Result<Self, BackendError> {
        let vertex_bytes = data.vertex_bytes();
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} vertices", name)),
                size: vertex_bytes.len() as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            },
            vertex_bytes,
        )?;

        let index_bytes = data.index_bytes();
        let index_buffer = match backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} indices", name)),
                size: index_bytes.len() as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            },
            index_bytes,
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.destroy_buffer(vertex_buffer);
                return Err(err);
            }
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: data.index_count(),
        })
    }

    fn release(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_buffer(self.vertex_buffer);
        backend.destroy_buffer(self.index_buffer);
    }
}

/// A named piece of geometry placed in a scene.
///
/// `data` is the CPU source of truth; the GPU buffers always mirror the last
/// upload. Components run in attachment order and receive the mesh as owner.
pub struct Mesh {
    name: String,
    data: MeshData,
    geometry: GpuGeometry,
    pub transform: Transform,
    pub shader: ShaderId,
    pub texture: TextureBinding,
    /// Hidden meshes still update but are not drawn
    pub visible: bool,
    components: Vec<Box<dyn Component>>,
}

impl Mesh {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        name: impl Into<String>,
        data: MeshData,
        shader: ShaderId,
    ) -> Result<Self, BackendError> {
        let name = name.into();
        let geometry = GpuGeometry::upload(backend, &name, &data)?;
        Ok(Self {
            name,
            data,
            geometry,
            transform: Transform::default(),
            shader,
            texture: TextureBinding::None,
            visible: true,
            components: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &MeshData {
        &self.data
    }

    pub fn index_count(&self) -> u32 {
        self.geometry.index_count
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.geometry.vertex_buffer
    }

    /// Replace the geometry, re-uploading both buffers in full
    pub fn set_data(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        data: MeshData,
    ) -> Result<(), BackendError> {
        let geometry = GpuGeometry::upload(backend, &self.name, &data)?;
        std::mem::replace(&mut self.geometry, geometry).release(backend);
        self.data = data;
        Ok(())
    }

    /// Swap the texture binding, releasing a previously owned texture
    pub fn set_texture(&mut self, backend: &mut dyn GraphicsBackend, texture: TextureBinding) {
        if let TextureBinding::Owned(old) = std::mem::replace(&mut self.texture, texture) {
            old.release(backend);
        }
    }

    pub fn add_component(&mut self, component: Box<dyn Component>) {
        self.components.push(component);
    }

    pub fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    /// First attached component of type `T`
    pub fn component<T: Component + 'static>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn component_mut<T: Component + 'static>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|c| c.as_any_mut().downcast_mut::<T>())
    }

    pub fn update(&mut self, ctx: &mut ComponentContext<'_>, dt: f32) {
        let mut components = std::mem::take(&mut self.components);
        for component in components.iter_mut() {
            component.update(self, ctx, dt);
        }
        self.restore_components(components);
    }

    pub fn handle_mouse_input(&mut self, rig: Option<&CameraRig>, input: &InputState) {
        let mut components = std::mem::take(&mut self.components);
        for component in components.iter_mut() {
            component.handle_mouse_input(self, rig, input);
        }
        self.restore_components(components);
    }

    pub fn handle_keyboard_input(
        &mut self,
        rig: Option<&CameraRig>,
        keyboard: &KeyboardState,
        dt: f32,
        requests: &mut Vec<EngineRequest>,
    ) {
        let mut components = std::mem::take(&mut self.components);
        for component in components.iter_mut() {
            component.handle_keyboard_input(self, rig, keyboard, dt, requests);
        }
        self.restore_components(components);
    }

    // Components attached from inside a callback land after the existing ones
    fn restore_components(&mut self, mut components: Vec<Box<dyn Component>>) {
        components.append(&mut self.components);
        self.components = components;
    }

    fn texture_handle(&self, resources: &ResourceManager) -> TextureHandle {
        match &self.texture {
            TextureBinding::None => resources.white_texture(),
            TextureBinding::Shared(id) => resources.texture(*id).handle,
            TextureBinding::Owned(texture) => texture.handle,
        }
    }

    /// Bind texture and uniforms, flush the shader and draw every index
    pub fn draw(
        &self,
        backend: &mut dyn GraphicsBackend,
        resources: &mut ResourceManager,
        view: Mat4,
        projection: Mat4,
    ) {
        if !self.visible {
            return;
        }

        backend.bind_texture(0, self.texture_handle(resources));

        let shader = resources.shader_mut(self.shader);
        shader.set_uniform("model", self.transform.matrix());
        shader.set_uniform("view", view);
        shader.set_uniform("projection", projection);
        shader.use_program(backend);

        backend.draw_indexed(
            self.geometry.vertex_buffer,
            self.geometry.index_buffer,
            self.geometry.index_count,
        );
    }

    /// Deep copy with fresh GPU buffers.
    ///
    /// Components are cloned first so a non-cloneable component fails the
    /// copy before any GPU work. Shader and shared textures are shared;
    /// an owned texture is not copied and the clone starts untextured.
    pub fn try_clone(
        &self,
        backend: &mut dyn GraphicsBackend,
        name: impl Into<String>,
    ) -> Result<Mesh, SceneError> {
        let name = name.into();
        let components = self
            .components
            .iter()
            .map(|c| c.clone_box())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SceneError::MeshClone {
                mesh: self.name.clone(),
                source,
            })?;

        let data = self.data.clone();
        let geometry = GpuGeometry::upload(backend, &name, &data)?;
        let texture = match &self.texture {
            TextureBinding::Shared(id) => TextureBinding::Shared(*id),
            _ => TextureBinding::None,
        };

        Ok(Mesh {
            name,
            data,
            geometry,
            transform: self.transform,
            shader: self.shader,
            texture,
            visible: self.visible,
            components,
        })
    }

    /// Release GPU buffers and any owned texture
    pub fn release(self, backend: &mut dyn GraphicsBackend) {
        self.geometry.release(backend);
        if let TextureBinding::Owned(texture) = self.texture {
            texture.release(backend);
        }
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("name", &self.name)
            .field("transform", &self.transform)
            .field("index_count", &self.geometry.index_count)
            .field(
                "components",
                &self.components.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::UniformValue;
    use crate::input::MouseButton;
    use crate::scene::component::{ComponentError, RotateOnDrag};
    use crate::scene::test_support::Fixture;
    use glam::{Vec2, Vec3};
    use std::any::Any;

    struct Pinned;

    impl Component for Pinned {
        fn name(&self) -> &str {
            "Pinned"
        }

        fn update(&mut self, owner: &mut Mesh, _ctx: &mut ComponentContext<'_>, _dt: f32) {
            owner.transform = owner.transform.with_rotation(Vec3::ZERO);
        }

        fn clone_box(&self) -> Result<Box<dyn Component>, ComponentError> {
            Err(ComponentError::NotCloneable("Pinned".into()))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn draw_pushes_matrices_and_texture() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));

        mesh.draw(&mut fx.backend, &mut fx.resources, view, Mat4::IDENTITY);

        let draw = &fx.backend.draws()[0];
        assert_eq!(draw.index_count, mesh.index_count());
        assert_eq!(draw.texture, Some(fx.resources.white_texture()));
        assert_eq!(
            draw.uniform("model"),
            Some(&UniformValue::from(mesh.transform.matrix()))
        );
        assert_eq!(draw.uniform("view"), Some(&UniformValue::from(view)));

        // Only names the program declares are written
        let shader = fx.resources.shader(mesh.shader);
        assert_eq!(draw.uniforms.len(), shader.layout().fields.len());
        assert!(shader
            .uniform_names()
            .all(|name| shader.layout().field(name).is_some()));
    }

    #[test]
    fn hidden_mesh_is_not_drawn() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.visible = false;
        mesh.draw(&mut fx.backend, &mut fx.resources, Mat4::IDENTITY, Mat4::IDENTITY);
        assert!(fx.backend.draws().is_empty());
    }

    #[test]
    fn components_run_in_attachment_order() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.add_component(Box::new(RotateOnDrag::new(1.0, MouseButton::Left)));
        mesh.add_component(Box::new(Pinned));

        fx.input.press_button(MouseButton::Left);
        fx.input.set_cursor(Vec2::new(3.0, 0.0));
        mesh.handle_mouse_input(None, &fx.input);
        fx.update(&mut mesh, 0.016);

        // Pinned runs last and overrides the drag
        assert_eq!(mesh.transform.rotation, Vec3::ZERO);
        assert_eq!(mesh.components().len(), 2);
    }

    #[test]
    fn clone_gets_fresh_buffers() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.transform = Transform::from_position(Vec3::X);
        let buffers = fx.backend.live_buffers();

        let copy = mesh.try_clone(&mut fx.backend, "quad#1").unwrap();
        assert_eq!(fx.backend.live_buffers(), buffers + 2);
        assert_ne!(copy.vertex_buffer(), mesh.vertex_buffer());
        assert_eq!(copy.transform, mesh.transform);
        assert_eq!(copy.shader, mesh.shader);
        assert_eq!(copy.data().vertices, mesh.data().vertices);

        mesh.transform = Transform::default();
        assert_eq!(copy.transform.position, Vec3::X);

        copy.release(&mut fx.backend);
        assert_eq!(fx.backend.live_buffers(), buffers);
    }

    #[test]
    fn clone_fails_on_uncloneable_component() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        mesh.add_component(Box::new(Pinned));
        let buffers = fx.backend.live_buffers();

        let err = mesh.try_clone(&mut fx.backend, "quad#1").unwrap_err();
        assert!(matches!(err, SceneError::MeshClone { .. }));
        assert_eq!(fx.backend.live_buffers(), buffers);
    }

    #[test]
    fn set_data_reuploads_whole_buffers() {
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("quad");
        let buffers = fx.backend.live_buffers();

        mesh.set_data(&mut fx.backend, MeshData::cube(1.0)).unwrap();
        assert_eq!(mesh.index_count(), 36);
        assert_eq!(fx.backend.live_buffers(), buffers);
        let uploaded = fx.backend.buffer_data(mesh.vertex_buffer()).unwrap();
        assert_eq!(uploaded, mesh.data().vertex_bytes());
    }
}
