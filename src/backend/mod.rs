//! Backend abstraction layer
//!
//! Provides the GPU command contract the renderer is written against, a wgpu
//! implementation and a headless recording implementation.

pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use recording::{Command, DrawRecord, RecordingBackend};
pub use traits::*;
pub use types::*;
