//! Headless recording backend
//!
//! Executes nothing on a GPU. Every call is appended to a command log, each
//! draw is captured together with the viewport, target and the uniform values
//! its program held at that moment. Clears fill the target's pixels so
//! readback and capture work without a device.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{BTreeMap, HashMap};

/// A single recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame,
    AcquireSurface,
    EndFrame,
    BindRenderTarget(Option<RenderTargetHandle>),
    Clear { color: [f32; 4], depth: f32 },
    SetViewport(Viewport),
    BindTexture { unit: u32, texture: TextureHandle },
    UseProgram(ProgramHandle),
    SetUniform {
        program: ProgramHandle,
        name: String,
        value: UniformValue,
    },
    DrawIndexed { index_count: u32 },
}

/// State captured for one indexed draw
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub target: Option<RenderTargetHandle>,
    pub viewport: Option<Viewport>,
    pub program: ProgramHandle,
    pub texture: Option<TextureHandle>,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub uniforms: BTreeMap<String, UniformValue>,
}

impl DrawRecord {
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }
}

struct RecordedTexture {
    desc: TextureDescriptor,
    data: Vec<u8>,
}

struct RecordedProgram {
    layout: UniformBlockLayout,
    uniforms: BTreeMap<String, UniformValue>,
}

/// CPU-only backend used for headless runs and tests
pub struct RecordingBackend {
    surface_width: u32,
    surface_height: u32,
    surface_texture: TextureHandle,
    next_id: u64,

    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, RecordedTexture>,
    targets: HashMap<u64, TextureHandle>,
    programs: HashMap<u64, RecordedProgram>,

    bound_target: Option<RenderTargetHandle>,
    viewport: Option<Viewport>,
    current_program: Option<ProgramHandle>,
    bound_textures: HashMap<u32, TextureHandle>,
    in_frame: bool,
    surface_acquired: bool,
    surface_lost: bool,
    frames_submitted: u64,
    frames_presented: u64,

    commands: Vec<Command>,
    draws: Vec<DrawRecord>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        let mut backend = Self {
            surface_width: width.max(1),
            surface_height: height.max(1),
            surface_texture: TextureHandle(0),
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            bound_target: None,
            viewport: None,
            current_program: None,
            bound_textures: HashMap::new(),
            in_frame: false,
            surface_acquired: false,
            surface_lost: false,
            frames_submitted: 0,
            frames_presented: 0,
            commands: Vec::new(),
            draws: Vec::new(),
        };
        backend.surface_texture = backend.alloc_texture(TextureDescriptor {
            label: Some("Surface".into()),
            width: backend.surface_width,
            height: backend.surface_height,
            format: TextureFormat::Bgra8UnormSrgb,
            usage: TextureUsage::RENDER_ATTACHMENT,
        });
        backend
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn alloc_texture(&mut self, desc: TextureDescriptor) -> TextureHandle {
        let id = self.next_id();
        let size = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
        self.textures.insert(
            id,
            RecordedTexture {
                desc,
                data: vec![0; size],
            },
        );
        TextureHandle(id)
    }

    /// Every call recorded so far
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Every draw recorded so far
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Forget the command and draw logs (resources are kept)
    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    /// Value a program currently holds for a uniform
    pub fn uniform_value(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.programs
            .get(&program.0)
            .and_then(|p| p.uniforms.get(name).copied())
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Live textures, not counting render target attachments or the surface
    pub fn live_textures(&self) -> usize {
        self.textures
            .len()
            .saturating_sub(self.targets.len() + 1)
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .get(&texture.0)
            .map(|t| (t.desc.width, t.desc.height))
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Frames whose window surface was acquired and presented
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Fail surface acquisition with `SurfaceLost` until the next resize
    pub fn lose_surface(&mut self) {
        self.surface_lost = true;
    }

    fn bound_color_texture(&self) -> TextureHandle {
        match self.bound_target {
            Some(target) => self
                .targets
                .get(&target.0)
                .copied()
                .unwrap_or(self.surface_texture),
            None => self.surface_texture,
        }
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl GraphicsBackend for RecordingBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_width = width;
        self.surface_height = height;
        self.surface_lost = false;
        if let Some(surface) = self.textures.get_mut(&self.surface_texture.0) {
            surface.desc.width = width;
            surface.desc.height = height;
            surface.data = vec![0; (width * height * 4) as usize];
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_width, self.surface_height)
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.in_frame = true;
        self.surface_acquired = false;
        self.bound_target = None;
        self.viewport = None;
        self.commands.push(Command::BeginFrame);
        Ok(())
    }

    fn acquire_surface(&mut self) -> BackendResult<FrameContext> {
        if self.surface_lost {
            return Err(BackendError::SurfaceLost);
        }
        self.surface_acquired = true;
        self.commands.push(Command::AcquireSurface);
        Ok(FrameContext {
            width: self.surface_width,
            height: self.surface_height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.in_frame {
            self.frames_submitted += 1;
            if self.surface_acquired {
                self.frames_presented += 1;
            }
        }
        self.in_frame = false;
        self.surface_acquired = false;
        self.commands.push(Command::EndFrame);
        Ok(())
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<RenderTargetHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::RenderTargetCreationFailed(format!(
                "zero-sized target {}x{}",
                desc.width, desc.height
            )));
        }
        let color = self.alloc_texture(TextureDescriptor {
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        });
        let id = self.next_id();
        self.targets.insert(id, color);
        Ok(RenderTargetHandle(id))
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        if let Some(color) = self.targets.remove(&target.0) {
            self.textures.remove(&color.0);
        }
        if self.bound_target == Some(target) {
            self.bound_target = None;
        }
    }

    fn render_target_texture(&self, target: RenderTargetHandle) -> Option<TextureHandle> {
        self.targets.get(&target.0).copied()
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) {
        self.bound_target = target;
        self.viewport = None;
        self.commands.push(Command::BindRenderTarget(target));
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        let texture = self.bound_color_texture();
        if let Some(tex) = self.textures.get_mut(&texture.0) {
            let srgb = tex.desc.format.is_srgb();
            let mut px = [0u8; 4];
            for (i, c) in color.iter().enumerate() {
                let c = c.clamp(0.0, 1.0);
                // Alpha is never encoded
                let c = if srgb && i < 3 { linear_to_srgb(c) } else { c };
                px[i] = (c * 255.0).round() as u8;
            }
            if tex.desc.format.is_bgra() {
                px.swap(0, 2);
            }
            for chunk in tex.data.chunks_exact_mut(4) {
                chunk.copy_from_slice(&px);
            }
        }
        self.commands.push(Command::Clear { color, depth });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
        self.commands.push(Command::SetViewport(viewport));
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        if data.is_empty() {
            return Err(BackendError::BufferCreationFailed(format!(
                "{}: empty buffer",
                desc.label.as_deref().unwrap_or("unnamed")
            )));
        }
        let id = self.next_id();
        self.buffers.insert(id, data.to_vec());
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "zero-sized texture {}x{}",
                desc.width, desc.height
            )));
        }
        let expected = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
        if let Some(data) = data {
            if data.len() != expected {
                return Err(BackendError::TextureCreationFailed(format!(
                    "expected {} bytes of pixel data, got {}",
                    expected,
                    data.len()
                )));
            }
        }
        let handle = self.alloc_texture(desc.clone());
        if let (Some(data), Some(tex)) = (data, self.textures.get_mut(&handle.0)) {
            tex.data.copy_from_slice(data);
        }
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.bound_textures.insert(unit, texture);
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<TextureReadback> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::ReadbackFailed("Texture not found".into()))?;
        Ok(TextureReadback {
            width: tex.desc.width,
            height: tex.desc.height,
            format: tex.desc.format,
            data: tex.data.clone(),
        })
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let id = self.next_id();
        self.programs.insert(
            id,
            RecordedProgram {
                layout: desc.uniform_block.clone(),
                uniforms: BTreeMap::new(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: &UniformValue) {
        let Some(recorded) = self.programs.get_mut(&program.0) else {
            return;
        };
        match recorded.layout.field(name) {
            Some(field) if field.kind == value.kind() => {
                recorded.uniforms.insert(name.to_string(), *value);
            }
            Some(field) => {
                log::warn!(
                    "Uniform '{}' is {:?}, ignoring {:?} value",
                    name,
                    field.kind,
                    value.kind()
                );
                return;
            }
            None => return,
        }
        self.commands.push(Command::SetUniform {
            program,
            name: name.to_string(),
            value: *value,
        });
    }

    fn draw_indexed(
        &mut self,
        vertex_buffer: BufferHandle,
        index_buffer: BufferHandle,
        index_count: u32,
    ) {
        let Some(program) = self.current_program else {
            log::warn!("Draw issued without a program, skipping");
            return;
        };
        let uniforms = self
            .programs
            .get(&program.0)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default();
        self.draws.push(DrawRecord {
            target: self.bound_target,
            viewport: self.viewport,
            program,
            texture: self.bound_textures.get(&0).copied(),
            vertex_buffer,
            index_buffer,
            index_count,
            uniforms,
        });
        self.commands.push(Command::DrawIndexed { index_count });
    }
}
