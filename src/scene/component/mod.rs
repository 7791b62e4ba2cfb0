//! Per-mesh behaviour units
//!
//! A [`Component`] is owned by one [`Mesh`] and receives that mesh as `owner`
//! for every callback. Components run in the order they were attached, so a
//! later component sees the transform written by an earlier one in the same
//! tick. Variants are built by name through a [`ComponentRegistry`].

mod depth_displacement;
mod registry;
mod rotate_on_drag;
mod scene_pan;
mod scene_switch;

pub use depth_displacement::*;
pub use registry::*;
pub use rotate_on_drag::*;
pub use scene_pan::*;
pub use scene_switch::*;

use crate::backend::GraphicsBackend;
use crate::input::{InputState, KeyboardState};
use crate::resources::{ResourceError, ResourceManager};
use crate::scene::{CameraRig, Mesh};
use std::any::Any;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("Unknown component type '{0}'")]
    UnknownType(String),
    #[error("{component}: invalid property '{property}': {message}")]
    InvalidProperty {
        component: String,
        property: String,
        message: String,
    },
    #[error("Component '{0}' cannot be cloned")]
    NotCloneable(String),
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// First-update state shared by every variant.
///
/// Components capture a baseline from their owner (or the scene rig) on the
/// first `update` so they start from the authored pose instead of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Initialized,
}

/// Requests a component can make of the engine during input handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRequest {
    /// Make the named scene active once input dispatch finishes
    SwitchScene(String),
}

/// What a component may touch during `update`
pub struct ComponentContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub resources: &'a mut ResourceManager,
    /// Camera rig of the active scene, if there is one
    pub rig: Option<&'a mut CameraRig>,
    /// File dropped onto the window since the last frame
    pub dropped_file: Option<&'a Path>,
}

/// Polymorphic per-mesh behaviour
pub trait Component {
    /// Registry name of the variant
    fn name(&self) -> &str;

    fn update(&mut self, owner: &mut Mesh, ctx: &mut ComponentContext<'_>, dt: f32);

    /// Called once per frame with the current pointer snapshot
    fn handle_mouse_input(&mut self, _owner: &mut Mesh, _rig: Option<&CameraRig>, _input: &InputState) {}

    /// Called once per frame with the current keyboard snapshot
    fn handle_keyboard_input(
        &mut self,
        _owner: &mut Mesh,
        _rig: Option<&CameraRig>,
        _keyboard: &KeyboardState,
        _dt: f32,
        _requests: &mut Vec<EngineRequest>,
    ) {
    }

    /// Independent copy carrying all mutable state
    fn clone_box(&self) -> Result<Box<dyn Component>, ComponentError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
