//! Shared shader and texture ownership
//!
//! Meshes refer to shared resources by id; the manager is the single owner of
//! the underlying GPU objects and releases them on shutdown.

use crate::backend::{GraphicsBackend, TextureHandle};
use crate::resources::{GpuTexture, ResourceError, Shader, ShaderSource, TextureData};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name of the shader built at startup and used when a mesh names none
pub const DEFAULT_SHADER: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(usize);

pub struct ResourceManager {
    shaders: Vec<Shader>,
    shader_names: HashMap<String, ShaderId>,
    textures: Vec<GpuTexture>,
    texture_paths: HashMap<PathBuf, TextureId>,
    white: TextureId,
    default_shader: ShaderId,
}

impl ResourceManager {
    /// Build the default shader and the white fallback texture
    pub fn new(backend: &mut dyn GraphicsBackend) -> Result<Self, ResourceError> {
        let white = GpuTexture::create(backend, &TextureData::white())?;
        let default_shader = Shader::new(backend, &ShaderSource::textured())?;

        let mut manager = Self {
            shaders: Vec::new(),
            shader_names: HashMap::new(),
            textures: vec![white],
            texture_paths: HashMap::new(),
            white: TextureId(0),
            default_shader: ShaderId(0),
        };
        manager.default_shader = manager.insert_shader(DEFAULT_SHADER, default_shader);
        Ok(manager)
    }

    /// Register a shader under `name`, replacing the mapping of an older one
    pub fn insert_shader(&mut self, name: &str, shader: Shader) -> ShaderId {
        let id = ShaderId(self.shaders.len());
        self.shaders.push(shader);
        self.shader_names.insert(name.to_string(), id);
        id
    }

    /// Compile and register a shader from source
    pub fn load_shader(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        name: &str,
        source: &ShaderSource,
    ) -> Result<ShaderId, ResourceError> {
        let shader = Shader::new(backend, source)?;
        log::info!("Loaded shader '{}'", name);
        Ok(self.insert_shader(name, shader))
    }

    /// Look up a shader by name; unknown names are logged and yield `None`
    pub fn shader_id(&self, name: &str) -> Option<ShaderId> {
        let id = self.shader_names.get(name).copied();
        if id.is_none() {
            log::warn!("Shader '{}' not found", name);
        }
        id
    }

    /// Return the shader registered as `name`, building it from `source` on first use
    pub fn get_or_load_shader(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        name: &str,
        source: impl FnOnce() -> ShaderSource,
    ) -> Result<ShaderId, ResourceError> {
        match self.shader_names.get(name) {
            Some(id) => Ok(*id),
            None => self.load_shader(backend, name, &source()),
        }
    }

    pub fn default_shader(&self) -> ShaderId {
        self.default_shader
    }

    pub fn shader(&self, id: ShaderId) -> &Shader {
        &self.shaders[id.0]
    }

    pub fn shader_mut(&mut self, id: ShaderId) -> &mut Shader {
        &mut self.shaders[id.0]
    }

    /// Load a texture, reusing an earlier upload of the same path
    pub fn load_texture(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        path: &Path,
    ) -> Result<TextureId, ResourceError> {
        if let Some(id) = self.texture_paths.get(path) {
            return Ok(*id);
        }
        let texture = GpuTexture::load(backend, path)?;
        log::info!(
            "Loaded texture {:?} ({}x{})",
            path,
            texture.width,
            texture.height
        );
        let id = TextureId(self.textures.len());
        self.textures.push(texture);
        self.texture_paths.insert(path.to_path_buf(), id);
        Ok(id)
    }

    pub fn texture(&self, id: TextureId) -> &GpuTexture {
        &self.textures[id.0]
    }

    pub fn white_texture(&self) -> TextureHandle {
        self.textures[self.white.0].handle
    }

    /// Release every shader and texture
    pub fn release_all(&mut self, backend: &mut dyn GraphicsBackend) {
        for shader in self.shaders.drain(..) {
            shader.release(backend);
        }
        for texture in self.textures.drain(..) {
            texture.release(backend);
        }
        self.shader_names.clear();
        self.texture_paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn unknown_shader_is_none() {
        let mut backend = RecordingBackend::default();
        let manager = ResourceManager::new(&mut backend).unwrap();
        assert_eq!(manager.shader_id("nope"), None);
        assert_eq!(manager.shader_id(DEFAULT_SHADER), Some(manager.default_shader()));
    }

    #[test]
    fn get_or_load_builds_once() {
        let mut backend = RecordingBackend::default();
        let mut manager = ResourceManager::new(&mut backend).unwrap();
        let a = manager
            .get_or_load_shader(&mut backend, "depth", ShaderSource::depth_displacement)
            .unwrap();
        let b = manager
            .get_or_load_shader(&mut backend, "depth", ShaderSource::depth_displacement)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.live_programs(), 2);

        manager.release_all(&mut backend);
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_textures(), 0);
    }
}
