//! wgpu backend implementation
//!
//! Translates the immediate-style [`GraphicsBackend`] calls into wgpu render
//! passes. Calls made during a frame are buffered per target and encoded in
//! `end_frame`. Uniform values are staged per program and snapshotted into a
//! per-frame arena on every draw, bound with a dynamic offset.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Stride between uniform snapshots in the frame arena, also the largest
/// uniform block a program may declare
const UNIFORM_SLOT_SIZE: u64 = 256;
const INITIAL_UNIFORM_SLOTS: u64 = 256;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Buffered render pass command
#[derive(Clone, Copy)]
enum PassCommand {
    SetViewport(Viewport),
    Draw {
        program: u64,
        uniform_offset: u32,
        texture: u64,
        vertex_buffer: u64,
        index_buffer: u64,
        index_count: u32,
    },
}

/// Pending render pass with buffered commands
struct PendingPass {
    target: Option<u64>,
    clear_color: Option<[f32; 4]>,
    clear_depth: Option<f32>,
    commands: Vec<PassCommand>,
}

impl PendingPass {
    fn new(target: Option<u64>) -> Self {
        Self {
            target,
            clear_color: None,
            clear_depth: None,
            commands: Vec::new(),
        }
    }
}

struct ProgramEntry {
    label: Option<String>,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    layout: UniformBlockLayout,
    staging: Vec<u8>,
}

struct TextureEntry {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    format: TextureFormat,
    width: u32,
    height: u32,
}

struct RenderTargetEntry {
    color: u64,
    color_view: wgpu::TextureView,
    #[allow(dead_code)]
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    height: u32,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    #[allow(dead_code)]
    surface_depth: wgpu::Texture,
    surface_depth_view: wgpu::TextureView,
    current_texture: Option<wgpu::SurfaceTexture>,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_capacity: u64,
    white_texture: u64,

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, TextureEntry>,
    render_targets: HashMap<u64, RenderTargetEntry>,
    programs: HashMap<u64, ProgramEntry>,
    pipelines: HashMap<(u64, wgpu::TextureFormat), wgpu::RenderPipeline>,
    next_id: u64,

    // Frame state
    passes: Vec<PendingPass>,
    frame_uniforms: Vec<u8>,
    current_target: Option<u64>,
    current_viewport: Option<Viewport>,
    current_program: Option<u64>,
    bound_texture: Option<u64>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        }
    }
}

impl WgpuBackend {
    /// Create a backend rendering into `window`
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let (instance, surface, adapter, device, queue) = Self::init_native(window.clone()).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let (width, height) = Self::clamp_size(&device, size.width, size.height);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        let (surface_depth, surface_depth_view) =
            Self::create_depth(&device, width, height, "Surface Depth");

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Block Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Unit Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Program Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_capacity = UNIFORM_SLOT_SIZE * INITIAL_UNIFORM_SLOTS;
        let (uniform_buffer, uniform_bind_group) =
            Self::create_uniform_arena(&device, &uniform_layout, uniform_capacity);

        let mut backend = Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            surface_depth,
            surface_depth_view,
            current_texture: None,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            uniform_buffer,
            uniform_bind_group,
            uniform_capacity,
            white_texture: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            render_targets: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            next_id: 1,
            passes: Vec::new(),
            frame_uniforms: Vec::new(),
            current_target: None,
            current_viewport: None,
            current_program: None,
            bound_texture: None,
        };

        let white = backend.create_texture(
            &TextureDescriptor {
                label: Some("White".into()),
                ..Default::default()
            },
            Some(&[255, 255, 255, 255]),
        )?;
        backend.white_texture = white.0;

        Ok(backend)
    }

    /// Native initialization
    async fn init_native(
        window: Arc<winit::window::Window>,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or_else(wgpu::Backends::all);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Graphics Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }

    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_size(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
        let max_size = device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }

    fn create_depth(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        label: &str,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    fn create_uniform_arena(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        capacity: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Arena"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Arena Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: std::num::NonZeroU64::new(UNIFORM_SLOT_SIZE),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture_bind_group(&self, view: &wgpu::TextureView, label: Option<&str>) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label,
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    /// Pass accepting commands for the bound target
    fn open_pass(&mut self) -> &mut PendingPass {
        let reuse = matches!(self.passes.last(), Some(pass) if pass.target == self.current_target);
        if !reuse {
            let mut pass = PendingPass::new(self.current_target);
            if let Some(viewport) = self.current_viewport {
                pass.commands.push(PassCommand::SetViewport(viewport));
            }
            self.passes.push(pass);
        }
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }

    fn target_format(&self, target: Option<u64>) -> Option<wgpu::TextureFormat> {
        match target {
            None => Some(self.surface_config.format),
            Some(id) => self.render_targets.get(&id).map(|t| t.format),
        }
    }

    fn ensure_pipeline(&mut self, program: u64, format: wgpu::TextureFormat) {
        if self.pipelines.contains_key(&(program, format)) {
            return;
        }
        let Some(entry) = self.programs.get(&program) else {
            return;
        };

        let layout = Vertex::layout();
        let attributes: Vec<wgpu::VertexAttribute> = layout
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(a.format),
                offset: a.offset,
                shader_location: a.location,
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: entry.label.as_deref(),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &entry.vertex,
                    entry_point: "vs_main",
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: layout.array_stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &entry.fragment,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        self.pipelines.insert((program, format), pipeline);
    }

    /// Grow the uniform arena to hold this frame's snapshots and upload them
    fn upload_frame_uniforms(&mut self) {
        let needed = self.frame_uniforms.len() as u64;
        if needed == 0 {
            return;
        }
        if needed > self.uniform_capacity {
            let capacity = needed.next_power_of_two();
            log::debug!("Growing uniform arena to {} bytes", capacity);
            let (buffer, bind_group) =
                Self::create_uniform_arena(&self.device, &self.uniform_layout, capacity);
            self.uniform_buffer = buffer;
            self.uniform_bind_group = bind_group;
            self.uniform_capacity = capacity;
        }
        self.queue
            .write_buffer(&self.uniform_buffer, 0, &self.frame_uniforms);
    }

    fn encode_passes(&self, encoder: &mut wgpu::CommandEncoder, passes: &[PendingPass]) {
        let surface_view = self
            .current_texture
            .as_ref()
            .map(|tex| tex.texture.create_view(&wgpu::TextureViewDescriptor::default()));

        for pending in passes {
            let (color_view, depth_view, format, height) = match pending.target {
                None => match surface_view.as_ref() {
                    Some(view) => (
                        view,
                        &self.surface_depth_view,
                        self.surface_config.format,
                        self.surface_config.height,
                    ),
                    None => continue,
                },
                Some(id) => match self.render_targets.get(&id) {
                    Some(target) => (
                        &target.color_view,
                        &target.depth_view,
                        target.format,
                        target.height,
                    ),
                    None => continue,
                },
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match pending.clear_color {
                            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                                r: c[0] as f64,
                                g: c[1] as f64,
                                b: c[2] as f64,
                                a: c[3] as f64,
                            }),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: match pending.clear_depth {
                            Some(d) => wgpu::LoadOp::Clear(d),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for cmd in &pending.commands {
                match *cmd {
                    PassCommand::SetViewport(viewport) => {
                        let v = viewport.flipped(height);
                        render_pass.set_viewport(v.x, v.y, v.width, v.height, 0.0, 1.0);
                    }
                    PassCommand::Draw {
                        program,
                        uniform_offset,
                        texture,
                        vertex_buffer,
                        index_buffer,
                        index_count,
                    } => {
                        let (Some(pipeline), Some(vb), Some(ib)) = (
                            self.pipelines.get(&(program, format)),
                            self.buffers.get(&vertex_buffer),
                            self.buffers.get(&index_buffer),
                        ) else {
                            continue;
                        };
                        let Some(tex) = self
                            .textures
                            .get(&texture)
                            .or_else(|| self.textures.get(&self.white_texture))
                        else {
                            continue;
                        };
                        render_pass.set_pipeline(pipeline);
                        render_pass.set_bind_group(0, &self.uniform_bind_group, &[uniform_offset]);
                        render_pass.set_bind_group(1, &tex.bind_group, &[]);
                        render_pass.set_vertex_buffer(0, vb.slice(..));
                        render_pass.set_index_buffer(ib.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..index_count, 0, 0..1);
                    }
                }
            }
        }
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to the wgpu queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl GraphicsBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let (width, height) = Self::clamp_size(&self.device, width, height);
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
            let (texture, view) = Self::create_depth(&self.device, width, height, "Surface Depth");
            self.surface_depth = texture;
            self.surface_depth_view = view;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.current_texture = None;
        self.passes.clear();
        self.frame_uniforms.clear();
        self.current_target = None;
        self.current_viewport = None;
        Ok(())
    }

    fn acquire_surface(&mut self) -> BackendResult<FrameContext> {
        let output = self
            .surface
            .get_current_texture()
            .map_err(|e| match e {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => BackendError::SurfaceLost,
                wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
                _ => BackendError::AcquireImageFailed(e.to_string()),
            })?;

        self.current_texture = Some(output);

        Ok(FrameContext {
            width: self.surface_config.width,
            height: self.surface_config.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        let passes = std::mem::take(&mut self.passes);

        let mut needed = Vec::new();
        for pass in &passes {
            let Some(format) = self.target_format(pass.target) else {
                continue;
            };
            for cmd in &pass.commands {
                if let PassCommand::Draw { program, .. } = cmd {
                    needed.push((*program, format));
                }
            }
        }
        for (program, format) in needed {
            self.ensure_pipeline(program, format);
        }

        self.upload_frame_uniforms();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.encode_passes(&mut encoder, &passes);
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }
        self.frame_uniforms.clear();

        Ok(())
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<RenderTargetHandle> {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max_size || desc.height > max_size {
            return Err(BackendError::RenderTargetCreationFailed(format!(
                "{}x{} is outside 1..={}",
                desc.width, desc.height, max_size
            )));
        }

        let format = Self::convert_texture_format(desc.format);
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.texture_bind_group(&color_view, desc.label.as_deref());
        let (depth, depth_view) =
            Self::create_depth(&self.device, desc.width, desc.height, "Render Target Depth");

        let color_id = self.next_id();
        self.textures.insert(
            color_id,
            TextureEntry {
                texture: color,
                bind_group,
                format: desc.format,
                width: desc.width,
                height: desc.height,
            },
        );

        let id = self.next_id();
        self.render_targets.insert(
            id,
            RenderTargetEntry {
                color: color_id,
                color_view,
                depth,
                depth_view,
                format,
                height: desc.height,
            },
        );

        Ok(RenderTargetHandle(id))
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        if let Some(entry) = self.render_targets.remove(&target.0) {
            self.textures.remove(&entry.color);
        }
        if self.current_target == Some(target.0) {
            self.current_target = None;
        }
    }

    fn render_target_texture(&self, target: RenderTargetHandle) -> Option<TextureHandle> {
        self.render_targets
            .get(&target.0)
            .map(|t| TextureHandle(t.color))
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) {
        self.current_target = target.map(|t| t.0);
        self.current_viewport = None;
        self.passes.push(PendingPass::new(self.current_target));
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        let fresh = matches!(
            self.passes.last(),
            Some(pass) if pass.target == self.current_target
                && pass.commands.iter().all(|c| matches!(c, PassCommand::SetViewport(_)))
        );
        if !fresh {
            let mut pass = PendingPass::new(self.current_target);
            if let Some(viewport) = self.current_viewport {
                pass.commands.push(PassCommand::SetViewport(viewport));
            }
            self.passes.push(pass);
        }
        let pass = self.open_pass();
        pass.clear_color = Some(color);
        pass.clear_depth = Some(depth);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.current_viewport = Some(viewport);
        self.open_pass()
            .commands
            .push(PassCommand::SetViewport(viewport));
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
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: Self::convert_buffer_usage(desc.usage),
        });

        let id = self.next_id();
        self.buffers.insert(id, buffer);

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
        let bytes_per_row = desc.width * desc.format.bytes_per_pixel();
        if let Some(data) = data {
            let expected = (bytes_per_row * desc.height) as usize;
            if data.len() != expected {
                return Err(BackendError::TextureCreationFailed(format!(
                    "expected {} bytes of pixel data, got {}",
                    expected,
                    data.len()
                )));
            }
        }

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage)
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        if let Some(data) = data {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.texture_bind_group(&view, desc.label.as_deref());

        let id = self.next_id();
        self.textures.insert(
            id,
            TextureEntry {
                texture,
                bind_group,
                format: desc.format,
                width: desc.width,
                height: desc.height,
            },
        );

        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if texture.0 != self.white_texture {
            self.textures.remove(&texture.0);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        if unit == 0 {
            self.bound_texture = Some(texture.0);
        } else {
            log::warn!("Texture unit {} is not supported, only unit 0 is sampled", unit);
        }
    }

    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<TextureReadback> {
        let entry = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::ReadbackFailed("Texture not found".into()))?;

        let (width, height, format) = (entry.width, entry.height, entry.format);
        let unpadded_row = width * format.bytes_per_pixel();
        let padded_row = unpadded_row.div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let mut data = Vec::with_capacity((unpadded_row * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_row as usize) {
                data.extend_from_slice(&row[..unpadded_row as usize]);
            }
        }
        staging.unmap();

        Ok(TextureReadback {
            width,
            height,
            format,
            data,
        })
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        if desc.uniform_block.size as u64 > UNIFORM_SLOT_SIZE {
            return Err(BackendError::ProgramCreationFailed(format!(
                "uniform block is {} bytes, at most {} are supported",
                desc.uniform_block.size, UNIFORM_SLOT_SIZE
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.vertex_source.as_str().into()),
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.fragment_source.as_str().into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ProgramCreationFailed(error.to_string()));
        }

        let id = self.next_id();
        self.programs.insert(
            id,
            ProgramEntry {
                label: desc.label.clone(),
                vertex,
                fragment,
                layout: desc.uniform_block.clone(),
                staging: vec![0; desc.uniform_block.size as usize],
            },
        );

        Ok(ProgramHandle(id))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        self.pipelines.retain(|(id, _), _| *id != program.0);
        if self.current_program == Some(program.0) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program.0);
    }

    fn set_uniform(&mut self, program: ProgramHandle, name: &str, value: &UniformValue) {
        let Some(entry) = self.programs.get_mut(&program.0) else {
            return;
        };
        let Some(field) = entry.layout.field(name) else {
            return;
        };
        if field.kind != value.kind() {
            log::warn!(
                "Uniform '{}' is {:?}, ignoring {:?} value",
                name,
                field.kind,
                value.kind()
            );
            return;
        }
        let start = field.offset as usize;
        let end = start + field.kind.size();
        if let Some(dst) = entry.staging.get_mut(start..end) {
            value.write_bytes(dst);
        }
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
        let Some(entry) = self.programs.get(&program) else {
            return;
        };

        let uniform_offset = self.frame_uniforms.len();
        self.frame_uniforms.extend_from_slice(&entry.staging);
        self.frame_uniforms
            .resize(uniform_offset + UNIFORM_SLOT_SIZE as usize, 0);

        let texture = self.bound_texture.unwrap_or(self.white_texture);
        self.open_pass().commands.push(PassCommand::Draw {
            program,
            uniform_offset: uniform_offset as u32,
            texture,
            vertex_buffer: vertex_buffer.0,
            index_buffer: index_buffer.0,
            index_count,
        });
    }
}
