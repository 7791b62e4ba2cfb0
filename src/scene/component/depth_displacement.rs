use super::{Component, ComponentContext, ComponentError, Lifecycle};
use crate::resources::{GpuTexture, ShaderId, ShaderSource};
use crate::scene::{Mesh, TextureBinding};
use std::any::Any;
use std::path::{Path, PathBuf};

/// Displaces its owner along vertex normals using a side-by-side colour+depth image.
///
/// The left half of the texture is colour, the right half depth. Depth is
/// remapped from `[0, 1]` to `[-0.5, 0.5]` and scaled by `depth_scale`.
/// The image is uploaded as linear data so depth reaches the vertex stage
/// unchanged; the fragment stage decodes the colour half itself.
/// Once an image is loaded the owner's X scale is set to the colour half's
/// aspect so a unit quad is never stretched. A file dropped onto the window
/// replaces the current image on the next update.
#[derive(Debug, Clone)]
pub struct DepthDisplacement {
    pub depth_scale: f32,
    lifecycle: Lifecycle,
    shader: Option<ShaderId>,
    path: Option<PathBuf>,
    pending_path: Option<PathBuf>,
    loaded_path: Option<PathBuf>,
    failed_path: Option<PathBuf>,
}

impl Default for DepthDisplacement {
    fn default() -> Self {
        Self::new(None, 1.0)
    }
}

impl DepthDisplacement {
    pub const NAME: &'static str = "DepthDisplacement";

    pub fn new(path: Option<PathBuf>, depth_scale: f32) -> Self {
        Self {
            depth_scale,
            lifecycle: Lifecycle::Uninitialized,
            shader: None,
            pending_path: path.clone(),
            path,
            loaded_path: None,
            failed_path: None,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Image currently requested
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Image currently bound to the owner
    pub fn loaded_path(&self) -> Option<&Path> {
        self.loaded_path.as_deref()
    }

    /// Queue a new image; loaded on the next update
    pub fn set_pending_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.path = Some(path.clone());
        self.pending_path = Some(path);
    }

    fn shader_name(owner: &Mesh) -> String {
        format!("{}::{}", owner.name(), Self::NAME)
    }

    fn ensure_shader(&mut self, owner: &mut Mesh, ctx: &mut ComponentContext<'_>) -> Option<ShaderId> {
        if let Some(id) = self.shader {
            return Some(id);
        }
        let name = Self::shader_name(owner);
        match ctx
            .resources
            .get_or_load_shader(ctx.backend, &name, ShaderSource::depth_displacement)
        {
            Ok(id) => {
                owner.shader = id;
                self.shader = Some(id);
                Some(id)
            }
            Err(err) => {
                log::error!("{}: failed to build shader for '{}': {}", Self::NAME, owner.name(), err);
                None
            }
        }
    }

    fn load_pending(&mut self, owner: &mut Mesh, ctx: &mut ComponentContext<'_>) {
        let Some(path) = self.pending_path.clone() else {
            return;
        };

        let texture = match GpuTexture::load_linear(ctx.backend, &path) {
            Ok(texture) => texture,
            Err(err) => {
                if self.failed_path.as_ref() != Some(&path) {
                    log::warn!("{}: cannot load {:?}, retrying: {}", Self::NAME, path, err);
                    self.failed_path = Some(path);
                }
                return;
            }
        };

        // Colour occupies the left half
        let aspect = (texture.width as f32 / 2.0) / texture.height as f32;
        log::info!(
            "{}: '{}' now shows {:?} ({}x{})",
            Self::NAME,
            owner.name(),
            path,
            texture.width,
            texture.height
        );

        owner.set_texture(ctx.backend, TextureBinding::Owned(texture));
        let mut scale = owner.transform.scale;
        scale.x = aspect;
        scale.y = 1.0;
        owner.transform = owner.transform.with_scale(scale);

        self.pending_path = None;
        self.failed_path = None;
        self.loaded_path = Some(path);
    }
}

impl Component for DepthDisplacement {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn update(&mut self, owner: &mut Mesh, ctx: &mut ComponentContext<'_>, _dt: f32) {
        self.lifecycle = Lifecycle::Initialized;

        if let Some(dropped) = ctx.dropped_file {
            self.set_pending_path(dropped);
        }

        let Some(shader) = self.ensure_shader(owner, ctx) else {
            owner.visible = false;
            return;
        };
        ctx.resources
            .shader_mut(shader)
            .set_uniform("depth_scale", self.depth_scale);

        self.load_pending(owner, ctx);
        owner.visible = self.loaded_path.is_some();
    }

    fn clone_box(&self) -> Result<Box<dyn Component>, ComponentError> {
        // The copy builds its own shader and reloads the image for its owner
        let mut copy = Self::new(self.path.clone(), self.depth_scale);
        copy.failed_path = self.failed_path.clone();
        Ok(Box::new(copy))
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
    use crate::backend::{GraphicsBackend, TextureFormat, UniformValue};
    use crate::scene::test_support::Fixture;
    use glam::Vec3;

    fn write_rgbd(name: &str, width: u32, height: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "quilt-engine-{}-{}.png",
            name,
            std::process::id()
        ));
        image::RgbaImage::from_pixel(width, height, image::Rgba([128, 64, 32, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn loads_image_and_fixes_aspect() {
        let path = write_rgbd("aspect", 8, 2);
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("photo");
        mesh.transform = mesh.transform.with_scale(Vec3::new(1.0, 3.0, 1.0));
        mesh.add_component(Box::new(DepthDisplacement::new(Some(path.clone()), 0.4)));

        fx.update(&mut mesh, 0.016);

        assert_eq!(mesh.transform.scale, Vec3::new(2.0, 1.0, 1.0));
        assert!(mesh.visible);
        assert!(matches!(mesh.texture, TextureBinding::Owned(_)));
        assert_ne!(mesh.shader, fx.resources.default_shader());
        let shader = fx.resources.shader(mesh.shader);
        assert_eq!(shader.uniform("depth_scale"), Some(&UniformValue::Float(0.4)));

        let component = mesh.component::<DepthDisplacement>().unwrap();
        assert_eq!(component.loaded_path(), Some(path.as_path()));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn depth_image_is_sampled_linearly() {
        let path = write_rgbd("linear", 4, 2);
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("photo");
        mesh.add_component(Box::new(DepthDisplacement::new(Some(path.clone()), 1.0)));

        fx.update(&mut mesh, 0.016);

        let TextureBinding::Owned(texture) = &mesh.texture else {
            panic!("expected the component to own the mesh texture");
        };
        assert_eq!(texture.format, TextureFormat::Rgba8Unorm);
        let readback = fx.backend.read_texture(texture.handle).unwrap();
        assert_eq!(&readback.data[..4], &[128, 64, 32, 255]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_image_hides_mesh_and_retries() {
        let path = std::env::temp_dir().join(format!(
            "quilt-engine-late-{}.png",
            std::process::id()
        ));
        std::fs::remove_file(&path).ok();

        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("photo");
        mesh.add_component(Box::new(DepthDisplacement::new(Some(path.clone()), 1.0)));

        fx.update(&mut mesh, 0.016);
        assert!(!mesh.visible);
        assert_eq!(mesh.transform.scale, Vec3::ONE);

        image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]))
            .save(&path)
            .unwrap();
        fx.update(&mut mesh, 0.016);
        assert!(mesh.visible);
        assert_eq!(mesh.transform.scale.x, 0.5);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn dropped_file_replaces_image() {
        let first = write_rgbd("first", 4, 2);
        let second = write_rgbd("second", 12, 2);
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("photo");
        mesh.add_component(Box::new(DepthDisplacement::new(Some(first.clone()), 1.0)));
        fx.update(&mut mesh, 0.016);
        let textures = fx.backend.live_textures();

        fx.update_with_drop(&mut mesh, &second, 0.016);

        assert_eq!(mesh.transform.scale.x, 3.0);
        // The first image was released when replaced
        assert_eq!(fx.backend.live_textures(), textures);
        let component = mesh.component::<DepthDisplacement>().unwrap();
        assert_eq!(component.loaded_path(), Some(second.as_path()));
        std::fs::remove_file(first).ok();
        std::fs::remove_file(second).ok();
    }

    #[test]
    fn clone_builds_its_own_shader() {
        let path = write_rgbd("clone", 4, 4);
        let mut fx = Fixture::new();
        let mut mesh = fx.mesh("photo");
        mesh.add_component(Box::new(DepthDisplacement::new(Some(path.clone()), 1.0)));
        fx.update(&mut mesh, 0.016);

        let mut copy = mesh.try_clone(&mut fx.backend, "photo#1").unwrap();
        copy.component_mut::<DepthDisplacement>().unwrap().depth_scale = 2.0;
        fx.update(&mut copy, 0.016);
        fx.update(&mut mesh, 0.016);

        assert_ne!(copy.shader, mesh.shader);
        assert_eq!(
            fx.resources.shader(mesh.shader).uniform("depth_scale"),
            Some(&UniformValue::Float(1.0))
        );
        assert_eq!(
            fx.resources.shader(copy.shader).uniform("depth_scale"),
            Some(&UniformValue::Float(2.0))
        );
        std::fs::remove_file(path).ok();
    }
}
