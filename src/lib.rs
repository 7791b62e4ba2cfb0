//! Quilt Engine - a real-time 3D renderer for light-field displays
//!
//! Every frame draws the active scene twice:
//! - a monoscopic pass to the window
//! - a quilt pass that tiles many parallax views into one texture for an
//!   attached [`LightfieldDisplay`]
//!
//! Scenes are loaded from JSON descriptions. Per-object behaviour comes from
//! [`Component`](scene::component::Component)s built by name through a
//! [`ComponentRegistry`](scene::component::ComponentRegistry).

pub mod backend;
pub mod display;
pub mod engine;
pub mod input;
pub mod quilt;
pub mod resources;
pub mod scene;
pub mod window;

pub use backend::wgpu_backend::WgpuBackend;
pub use backend::{GraphicsBackend, RecordingBackend};
pub use display::{LightfieldDisplay, QuiltFrame, VirtualDisplay};
pub use engine::{Engine, EngineError};
pub use input::{DropSlot, InputState};
pub use quilt::{QuiltCompositor, QuiltSettings};
pub use scene::{CameraRig, Mesh, Scene, SceneRegistry, Transform};
pub use window::Window;

/// Configuration for initializing the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Clear colour of the monoscopic pass
    pub clear_color: [f32; 4],
    /// Clear colour of the quilt
    pub quilt_clear_color: [f32; 4],
    /// Vertical field of view (degrees) for scenes that do not set one
    pub fov: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Quilt Engine".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            clear_color: [0.1, 0.1, 0.15, 1.0],
            quilt_clear_color: [0.0, 0.0, 0.0, 1.0],
            fov: 14.0,
        }
    }
}
