//! Shader programs with a deferred uniform cache
//!
//! [`Shader::set_uniform`] never touches the GPU. It records the value under
//! the uniform's name, replacing any earlier value. [`Shader::use_program`]
//! binds the program and then writes every cached value, so a uniform set
//! once is re-applied on each later bind until it is overwritten.

use crate::backend::{BackendError, GraphicsBackend, ProgramDescriptor, ProgramHandle, UniformBlockLayout, UniformValue};
use crate::resources::reflect;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Programmable stage a diagnostic refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Failed to compile {stage} stage of shader '{label}':\n{message}")]
    Compile {
        label: String,
        stage: ShaderStage,
        message: String,
    },
    #[error("Failed to link shader '{label}': {message}")]
    Link { label: String, message: String },
    #[error("Backend rejected shader: {0}")]
    Backend(#[from] BackendError),
}

/// WGSL sources of a two-stage program
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    pub fn new(label: &str, vertex: &str, fragment: &str) -> Self {
        Self {
            label: label.to_string(),
            vertex: vertex.to_string(),
            fragment: fragment.to_string(),
        }
    }

    /// Textured, unlit material used by meshes without an explicit shader
    pub fn textured() -> Self {
        Self::new(
            "default",
            include_str!("shaders/textured.vert.wgsl"),
            include_str!("shaders/textured.frag.wgsl"),
        )
    }

    /// Displaces vertices along their normals by the depth half of a
    /// side-by-side colour + depth texture
    pub fn depth_displacement() -> Self {
        Self::new(
            "depth_displacement",
            include_str!("shaders/depth_displacement.vert.wgsl"),
            include_str!("shaders/depth_displacement.frag.wgsl"),
        )
    }
}

/// A linked program plus its cached uniform values
pub struct Shader {
    name: String,
    program: ProgramHandle,
    layout: UniformBlockLayout,
    uniforms: BTreeMap<String, UniformValue>,
}

impl Shader {
    /// Compile, link and upload a program
    pub fn new(backend: &mut dyn GraphicsBackend, source: &ShaderSource) -> Result<Self, ShaderError> {
        let vertex = reflect::compile_stage(&source.label, ShaderStage::Vertex, &source.vertex)?;
        let fragment = reflect::compile_stage(&source.label, ShaderStage::Fragment, &source.fragment)?;
        let layout = reflect::link(&source.label, &vertex, &fragment)?;

        let program = backend.create_program(&ProgramDescriptor {
            label: Some(source.label.clone()),
            vertex_source: source.vertex.clone(),
            fragment_source: source.fragment.clone(),
            uniform_block: layout.clone(),
        })?;

        log::debug!(
            "Created shader '{}' with {} uniforms",
            source.label,
            layout.fields.len()
        );

        Ok(Self {
            name: source.label.clone(),
            program,
            layout,
            uniforms: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    /// Reflected uniform block of the program
    pub fn layout(&self) -> &UniformBlockLayout {
        &self.layout
    }

    /// Cache a uniform value; applied on the next `use_program`
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.uniforms.insert(name.to_string(), value.into());
    }

    /// Currently cached value for `name`
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    /// Names of every cached uniform, in flush order
    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.keys().map(String::as_str)
    }

    /// Bind the program and flush every cached uniform in name order
    pub fn use_program(&self, backend: &mut dyn GraphicsBackend) {
        backend.use_program(self.program);
        for (name, value) in &self.uniforms {
            backend.set_uniform(self.program, name, value);
        }
    }

    pub fn release(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_program(self.program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn builtin_sources_link() {
        let mut backend = RecordingBackend::default();
        let textured = Shader::new(&mut backend, &ShaderSource::textured()).unwrap();
        for name in ["model", "view", "projection"] {
            assert!(textured.layout().field(name).is_some(), "missing {name}");
        }
        let depth = Shader::new(&mut backend, &ShaderSource::depth_displacement()).unwrap();
        assert!(depth.layout().field("depth_scale").is_some());
    }

    #[test]
    fn set_uniform_is_deferred_until_use() {
        let mut backend = RecordingBackend::default();
        let mut shader = Shader::new(&mut backend, &ShaderSource::textured()).unwrap();
        shader.set_uniform("model", glam::Mat4::IDENTITY);
        assert_eq!(backend.uniform_value(shader.program(), "model"), None);

        shader.use_program(&mut backend);
        assert_eq!(
            backend.uniform_value(shader.program(), "model"),
            Some(UniformValue::Mat4(glam::Mat4::IDENTITY))
        );
    }

    #[test]
    fn last_write_wins() {
        let mut backend = RecordingBackend::default();
        let mut shader = Shader::new(&mut backend, &ShaderSource::depth_displacement()).unwrap();
        shader.set_uniform("depth_scale", 1.0f32);
        shader.set_uniform("depth_scale", 3.0f32);
        shader.use_program(&mut backend);
        assert_eq!(
            backend.uniform_value(shader.program(), "depth_scale"),
            Some(UniformValue::Float(3.0))
        );
    }

    #[test]
    fn compile_error_is_reported_per_stage() {
        let mut backend = RecordingBackend::default();
        let source = ShaderSource::new(
            "bad",
            include_str!("shaders/textured.vert.wgsl"),
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0) }",
        );
        match Shader::new(&mut backend, &source) {
            Err(ShaderError::Compile { stage, .. }) => assert_eq!(stage, ShaderStage::Fragment),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("broken shader compiled"),
        }
        assert_eq!(backend.live_programs(), 0);
    }
}
