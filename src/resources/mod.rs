//! Resource management
//!
//! Geometry generation, texture loading, shader programs and the manager that
//! owns shared shaders and textures.

mod manager;
mod mesh;
pub mod reflect;
mod shader;
mod texture;

pub use manager::*;
pub use mesh::*;
pub use shader::*;
pub use texture::*;

use crate::backend::BackendError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Failed to load image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Texture '{0}' has no pixels")]
    EmptyTexture(String),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
