//! Main engine orchestrator

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::display::{LightfieldDisplay, QuiltFrame};
use crate::input::{DropSlot, InputState};
use crate::quilt::{QuiltCompositor, QuiltError};
use crate::resources::{ResourceError, ResourceManager};
use crate::scene::component::{ComponentRegistry, EngineRequest};
use crate::scene::{SceneBuilder, SceneCollectionDescription, SceneError, SceneRegistry};
use crate::EngineConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use winit::window::Window as WinitWindow;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Quilt(#[from] QuiltError),
    #[error("No display attached, there is no quilt to capture")]
    NoQuilt,
    #[error("Render target has no colour texture")]
    UnknownTarget,
    #[error("Failed to save capture to {path:?}: {source}")]
    Capture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Owns the backend, resources and scenes and runs one frame at a time
pub struct Engine<B: GraphicsBackend> {
    backend: B,
    config: EngineConfig,
    resources: ResourceManager,
    components: ComponentRegistry,
    scenes: SceneRegistry,
    input: InputState,
    drops: DropSlot,
    display: Option<Box<dyn LightfieldDisplay>>,
    compositor: Option<QuiltCompositor>,
    last_quilt: Option<QuiltFrame>,
    width: u32,
    height: u32,
    shut_down: bool,
}

impl Engine<WgpuBackend> {
    /// Create an engine drawing to `window` through wgpu
    pub fn with_window(window: Arc<WinitWindow>, config: EngineConfig) -> Result<Self, EngineError> {
        let backend = WgpuBackend::new(window, config.vsync)?;
        Self::new(backend, config)
    }
}

impl<B: GraphicsBackend> Engine<B> {
    pub fn new(mut backend: B, config: EngineConfig) -> Result<Self, EngineError> {
        let resources = ResourceManager::new(&mut backend)?;
        let (width, height) = backend.surface_size();
        log::info!("Engine ready ({}x{})", width, height);

        Ok(Self {
            backend,
            config,
            resources,
            components: ComponentRegistry::default(),
            scenes: SceneRegistry::new(),
            input: InputState::new(),
            drops: DropSlot::new(),
            display: None,
            compositor: None,
            last_quilt: None,
            width,
            height,
            shut_down: false,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    /// Registry used for scenes loaded after this call
    pub fn components_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.components
    }

    pub fn scenes(&self) -> &SceneRegistry {
        &self.scenes
    }

    pub fn scenes_mut(&mut self) -> &mut SceneRegistry {
        &mut self.scenes
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// Producer side of the dropped-file handoff
    pub fn drop_slot(&self) -> DropSlot {
        self.drops.clone()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn display(&self) -> Option<&dyn LightfieldDisplay> {
        self.display.as_deref()
    }

    pub fn quilt(&self) -> Option<&QuiltCompositor> {
        self.compositor.as_ref()
    }

    /// Quilt handed to the display on the last frame
    pub fn last_quilt(&self) -> Option<&QuiltFrame> {
        self.last_quilt.as_ref()
    }

    /// Build and register every scene of `collection`.
    ///
    /// Scenes, meshes and components that fail are logged and skipped.
    pub fn load_scenes(&mut self, collection: &SceneCollectionDescription, base_dir: Option<&Path>) -> usize {
        SceneBuilder::new(&mut self.backend, &mut self.resources, &self.components)
            .with_base_dir(base_dir)
            .with_default_fov(self.config.fov)
            .load_into(collection, &mut self.scenes)
    }

    /// Load a JSON scene file; relative texture paths resolve next to it
    pub fn load_scene_file(&mut self, path: &Path) -> Result<usize, EngineError> {
        let collection = SceneCollectionDescription::from_file(path)?;
        let loaded = self.load_scenes(&collection, path.parent());
        log::info!("Loaded {} scenes from {:?}", loaded, path);
        Ok(loaded)
    }

    pub fn set_active_scene(&mut self, name: &str) -> Result<(), EngineError> {
        Ok(self.scenes.set_active(name)?)
    }

    /// Start rendering quilts for `display`, replacing any attached one
    pub fn attach_display(&mut self, display: Box<dyn LightfieldDisplay>) -> Result<(), EngineError> {
        let settings = display.settings();
        match self.compositor.as_mut() {
            Some(compositor) => compositor.reconfigure(&mut self.backend, settings)?,
            None => self.compositor = Some(QuiltCompositor::new(&mut self.backend, settings)?),
        }
        log::info!("Attached display '{}'", display.name());
        self.display = Some(display);
        Ok(())
    }

    /// Stop the quilt pass and hand the display back
    pub fn detach_display(&mut self) -> Option<Box<dyn LightfieldDisplay>> {
        if let Some(compositor) = self.compositor.take() {
            compositor.release(&mut self.backend);
        }
        self.last_quilt = None;
        let display = self.display.take();
        if let Some(display) = &display {
            log::info!("Detached display '{}'", display.name());
        }
        display
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.backend.resize(width, height);
        let (width, height) = self.backend.surface_size();
        if (width, height) != (self.width, self.height) {
            log::debug!("Resized to {}x{}", width, height);
        }
        self.width = width;
        self.height = height;
    }

    /// Run one frame: input, update, monoscopic pass, quilt pass, present
    pub fn frame(&mut self, dt: f32) -> Result<(), EngineError> {
        if self.shut_down {
            return Ok(());
        }

        self.dispatch_input(dt);
        let dropped = self.drops.take();
        if let Some(scene) = self.scenes.active_mut() {
            scene.update(&mut self.backend, &mut self.resources, dropped.as_deref(), dt);
        } else if let Some(path) = dropped {
            log::warn!("Dropped {:?} with no active scene, ignoring", path);
        }

        let result = self.render();
        self.input.end_frame();

        match result {
            Err(EngineError::Backend(BackendError::SurfaceLost)) => {
                log::warn!("Surface lost, reconfiguring");
                self.backend.resize(self.width, self.height);
                Ok(())
            }
            other => other,
        }
    }

    fn dispatch_input(&mut self, dt: f32) {
        let mut requests = Vec::new();
        if let Some(scene) = self.scenes.active_mut() {
            scene.handle_input(&self.input, dt, &mut requests);
        }
        for request in requests {
            match request {
                EngineRequest::SwitchScene(name) => {
                    // Unknown names are logged and leave the current scene active
                    let _ = self.scenes.set_active(&name);
                }
            }
        }
    }

    fn render(&mut self) -> Result<(), EngineError> {
        self.backend.begin_frame()?;
        let scene = self.scenes.active();

        // Monoscopic pass; a surface that cannot be acquired skips only this pass
        let mono = match self.backend.acquire_surface() {
            Ok(frame) => {
                self.backend.bind_render_target(None);
                self.backend.clear(self.config.clear_color, 1.0);
                self.backend.set_viewport(Viewport::full(frame.width, frame.height));
                if let Some(scene) = scene {
                    let aspect = frame.width as f32 / frame.height.max(1) as f32;
                    scene.render_mono(&mut self.backend, &mut self.resources, aspect);
                }
                Ok(())
            }
            Err(err) => Err(err),
        };

        let quilt = match &self.compositor {
            Some(compositor) => Some(compositor.render(
                &mut self.backend,
                &mut self.resources,
                scene,
                self.config.quilt_clear_color,
            )?),
            None => None,
        };

        self.backend.end_frame()?;

        if let (Some(quilt), Some(display)) = (quilt, self.display.as_mut()) {
            display.present(&quilt);
            self.last_quilt = Some(quilt);
        }
        Ok(mono?)
    }

    /// Save the contents of `target` to an image file (format from extension)
    pub fn capture(&mut self, target: RenderTargetHandle, path: &Path) -> Result<(), EngineError> {
        let texture = self
            .backend
            .render_target_texture(target)
            .ok_or(EngineError::UnknownTarget)?;
        let readback = self.backend.read_texture(texture)?;
        let (width, height) = (readback.width, readback.height);
        let pixels = readback.into_rgba8();

        image::save_buffer(path, &pixels, width, height, image::ColorType::Rgba8).map_err(
            |source| EngineError::Capture {
                path: path.to_path_buf(),
                source,
            },
        )?;
        log::info!("Captured {}x{} to {:?}", width, height, path);
        Ok(())
    }

    /// Save the current quilt to an image file
    pub fn capture_quilt(&mut self, path: &Path) -> Result<(), EngineError> {
        let target = self
            .compositor
            .as_ref()
            .map(|c| c.target())
            .ok_or(EngineError::NoQuilt)?;
        self.capture(target, path)
    }

    /// Release every GPU resource; later frames do nothing
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.detach_display();
        self.scenes.release_all(&mut self.backend);
        self.resources.release_all(&mut self.backend);
        self.shut_down = true;
        log::info!("Engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};
    use crate::display::VirtualDisplay;
    use crate::quilt::QuiltSettings;

    fn engine() -> Engine<RecordingBackend> {
        Engine::new(RecordingBackend::new(64, 32), EngineConfig::default()).unwrap()
    }

    const ONE_QUAD: &str = r#"{
        "scenes": {
            "main": {
                "cameraSize": 1.0,
                "focus": 5.0,
                "transform": { "position": [0, 0, 5] },
                "meshes": [{ "meshName": "quad" }]
            }
        }
    }"#;

    fn with_scene(engine: &mut Engine<RecordingBackend>) {
        let collection = SceneCollectionDescription::from_json_str(ONE_QUAD).unwrap();
        assert_eq!(engine.load_scenes(&collection, None), 1);
    }

    #[test]
    fn frame_without_display_draws_mono_only() {
        let mut engine = engine();
        with_scene(&mut engine);
        engine.frame(0.016).unwrap();

        let draws = engine.backend().draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].target, None);
        assert_eq!(draws[0].viewport, Some(Viewport::full(64, 32)));
        assert_eq!(engine.backend().frames_submitted(), 1);
    }

    #[test]
    fn frame_with_display_presents_quilt() {
        let mut engine = engine();
        with_scene(&mut engine);
        engine
            .attach_display(Box::new(VirtualDisplay::new("test", QuiltSettings::new(2, 2, 8, 8))))
            .unwrap();
        engine.frame(0.016).unwrap();

        assert_eq!(engine.backend().draws().len(), 1 + 4);
        let quilt = engine.last_quilt().unwrap();
        assert_eq!((quilt.width, quilt.height, quilt.columns, quilt.rows), (16, 16, 2, 2));

        engine.detach_display();
        engine.backend_mut().clear_log();
        engine.frame(0.016).unwrap();
        assert_eq!(engine.backend().draws().len(), 1);
    }

    #[test]
    fn lost_surface_skips_only_the_mono_pass() {
        let mut engine = engine();
        with_scene(&mut engine);
        engine
            .attach_display(Box::new(VirtualDisplay::new("test", QuiltSettings::new(2, 1, 8, 8))))
            .unwrap();
        engine.backend_mut().lose_surface();

        engine.frame(0.016).unwrap();

        let draws = engine.backend().draws();
        assert_eq!(draws.len(), 2);
        assert!(draws.iter().all(|d| d.target.is_some()));
        assert!(engine.last_quilt().is_some());
        assert_eq!(engine.backend().frames_presented(), 0);

        // The surface was reconfigured, so the next frame draws both passes
        engine.backend_mut().clear_log();
        engine.frame(0.016).unwrap();
        assert_eq!(engine.backend().draws().len(), 1 + 2);
        assert_eq!(engine.backend().frames_presented(), 1);
    }

    #[test]
    fn no_scene_still_clears() {
        let mut engine = engine();
        engine.frame(0.016).unwrap();
        assert!(engine.backend().draws().is_empty());
        assert!(engine
            .backend()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::Clear { .. })));
    }

    #[test]
    fn capture_without_display_fails() {
        let mut engine = engine();
        let err = engine.capture_quilt(Path::new("unused.png")).unwrap_err();
        assert!(matches!(err, EngineError::NoQuilt));
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut engine = engine();
        with_scene(&mut engine);
        engine
            .attach_display(Box::new(VirtualDisplay::new("test", QuiltSettings::new(2, 1, 4, 4))))
            .unwrap();
        engine.frame(0.016).unwrap();
        engine.shutdown();

        let backend = engine.backend();
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_programs(), 0);
        assert!(engine.display().is_none());
    }
}
