//! Core backend abstraction traits
//!
//! The renderer talks to the GPU only through [`GraphicsBackend`]. The trait
//! is object-safe so scene code can take `&mut dyn GraphicsBackend`.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create render target: {0}")]
    RenderTargetCreationFailed(String),
    #[error("Failed to create program: {0}")]
    ProgramCreationFailed(String),
    #[error("Failed to read back texture: {0}")]
    ReadbackFailed(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Handle to an offscreen render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(pub(crate) u64);

/// Size of the window surface acquired for a frame
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub width: u32,
    pub height: u32,
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Resize the default (window) target
    fn resize(&mut self, width: u32, height: u32);

    /// Size of the default target
    fn surface_size(&self) -> (u32, u32);

    /// Begin recording a new frame. Offscreen targets are usable right away.
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// Acquire the window surface for the current frame.
    ///
    /// Until this succeeds, passes recorded against the default target are dropped.
    fn acquire_surface(&mut self) -> BackendResult<FrameContext>;

    /// Submit everything recorded since `begin_frame`, presenting the surface if acquired
    fn end_frame(&mut self) -> BackendResult<()>;

    // Render targets

    /// Create an offscreen colour + depth target
    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<RenderTargetHandle>;

    /// Destroy a render target and its attachments
    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    /// Colour attachment of a render target
    fn render_target_texture(&self, target: RenderTargetHandle) -> Option<TextureHandle>;

    /// Bind a target for subsequent draws; `None` is the default target
    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>);

    /// Clear colour and depth of the bound target
    fn clear(&mut self, color: [f32; 4], depth: f32);

    /// Set the viewport on the bound target
    fn set_viewport(&mut self, viewport: Viewport);

    // Buffers

    /// Create a buffer with initial data
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle>;

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // Textures

    /// Create a texture, optionally uploading RGBA8 rows (top row first)
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Bind a texture to a texture unit for subsequent draws
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    /// Copy a texture's contents back to the CPU
    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<TextureReadback>;

    // Programs

    /// Create a program from already validated stage sources
    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    /// Destroy a program
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Make a program current for subsequent draws
    fn use_program(&mut self, program: ProgramHandle);

    /// Write a named uniform. Values persist in the program until overwritten;
    /// names the program does not declare are ignored.
    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: &UniformValue);

    // Drawing

    /// Draw `index_count` indices with the current program, textures and viewport
    fn draw_indexed(
        &mut self,
        vertex_buffer: BufferHandle,
        index_buffer: BufferHandle,
        index_count: u32,
    );
}
