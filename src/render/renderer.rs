use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use pollster::block_on;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::assets::ImageData;
use crate::mesh::{MeshData, VertexLayout};
use crate::shader::{LinkedProgram, ShaderError};
use crate::uniforms::UniformBlock;

use super::frame::Frame;
use super::resources::{
    vertex_format, DepthBuffer, GpuMesh, GpuProgram, GpuTexture, MeshHandle, MsaaTarget,
    ProgramHandle, TextureHandle,
};

/// GPU renderer backed by wgpu that owns every uploaded resource.
///
/// Resources live as long as the renderer and are referenced by the handles
/// returned from the `create_*` methods.
pub struct Renderer {
    window: Arc<Window>,
    pub(crate) surface: wgpu::Surface<'static>,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    sample_count: u32,
    pub(crate) depth: DepthBuffer,
    pub(crate) msaa: Option<MsaaTarget>,
    pub(crate) meshes: Vec<GpuMesh>,
    pub(crate) textures: Vec<GpuTexture>,
    pub(crate) programs: Vec<GpuProgram>,
    pub(crate) fallback_texture: GpuTexture,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window.
    ///
    /// `requested_samples` is used for MSAA when the adapter supports it for
    /// the surface format; otherwise rendering falls back to one sample.
    pub async fn new(window: Arc<Window>, requested_samples: u32) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {}", adapter.get_info().name);

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("renderer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| *mode == wgpu::PresentMode::Mailbox)
                .unwrap_or(wgpu::PresentMode::Fifo),
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let supports = |format: wgpu::TextureFormat| {
            adapter
                .get_texture_format_features(format)
                .flags
                .sample_count_supported(requested_samples)
        };
        let sample_count =
            if requested_samples > 1 && supports(surface_format) && supports(DepthBuffer::FORMAT) {
                requested_samples
            } else {
                1
            };
        info!("rendering {}x{} with {sample_count}x MSAA", size.width, size.height);

        let depth = DepthBuffer::create(&device, config.width, config.height, sample_count);
        let msaa = MsaaTarget::create(
            &device,
            surface_format,
            config.width,
            config.height,
            sample_count,
        );
        let fallback_texture =
            GpuTexture::upload(&device, &queue, &ImageData::solid([255; 4]), "fallback-texture");

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            sample_count,
            depth,
            msaa,
            meshes: Vec::new(),
            textures: Vec::new(),
            programs: Vec::new(),
            fallback_texture,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Width over height of the drawable area.
    pub fn aspect(&self) -> f32 {
        if self.size.height == 0 {
            1.0
        } else {
            self.size.width as f32 / self.size.height as f32
        }
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(
            &self.device,
            new_size.width,
            new_size.height,
            self.sample_count,
        );
        self.msaa = MsaaTarget::create(
            &self.device,
            self.config.format,
            new_size.width,
            new_size.height,
            self.sample_count,
        );
    }

    /// Reconfigures the surface at its current size after it was lost.
    pub fn reconfigure(&mut self) {
        let size = self.window.inner_size();
        self.resize(size);
    }

    pub fn create_mesh(&mut self, mesh: &MeshData) -> MeshHandle {
        let label = format!("mesh-{}", self.meshes.len());
        self.meshes.push(GpuMesh::upload(&self.device, mesh, &label));
        MeshHandle(self.meshes.len() - 1)
    }

    pub fn create_texture(&mut self, image: &ImageData, label: &str) -> TextureHandle {
        self.textures
            .push(GpuTexture::upload(&self.device, &self.queue, image, label));
        TextureHandle(self.textures.len() - 1)
    }

    /// Builds a render pipeline drawing meshes with `layout` through `program`.
    pub fn create_program(
        &mut self,
        program: &LinkedProgram,
        layout: &VertexLayout,
    ) -> Result<ProgramHandle, ShaderError> {
        program.check_layout(layout)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let gpu = self.build_program(program, layout);
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(ShaderError::Link {
                program: program.name().to_string(),
                reason: err.to_string(),
            });
        }

        self.programs.push(gpu);
        Ok(ProgramHandle(self.programs.len() - 1))
    }

    /// Starts recording a frame that clears to `clear`.
    pub fn begin_frame(&mut self, clear: wgpu::Color) -> Frame<'_> {
        Frame::new(self, clear)
    }

    fn build_program(&self, program: &LinkedProgram, layout: &VertexLayout) -> GpuProgram {
        let name = program.name();
        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{name}-vertex")),
            source: wgpu::ShaderSource::Wgsl(program.vertex().source.as_str().into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{name}-fragment")),
            source: wgpu::ShaderSource::Wgsl(program.fragment().source.as_str().into()),
        });

        let uniforms = program.uniforms().cloned().unwrap_or_default();
        let uniform_entries: Vec<_> = std::num::NonZeroU64::new(u64::from(uniforms.size()))
            .map(|size| wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(size),
                },
                count: None,
            })
            .into_iter()
            .collect();
        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{name}-uniform-layout")),
                entries: &uniform_entries,
            });

        let texture_units = program.texture_units();
        let texture_entries: Vec<_> = (0..texture_units)
            .flat_map(|unit| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: unit * 2,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: unit * 2 + 1,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let texture_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{name}-texture-layout")),
                entries: &texture_entries,
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{name}-pipeline-layout")),
                bind_group_layouts: &[&uniform_layout, &texture_layout],
                push_constant_ranges: &[],
            });

        // Only the attributes the vertex stage reads; the stride still spans
        // the whole interleaved vertex.
        let attributes: Vec<_> = program
            .vertex_inputs()
            .iter()
            .filter_map(|input| layout.attribute_at(input.location))
            .map(|attribute| wgpu::VertexAttribute {
                format: vertex_format(attribute.components),
                offset: u64::from(attribute.offset),
                shader_location: attribute.location,
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("{name}-pipeline")),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(program.vertex().entry_point.as_str()),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: u64::from(layout.stride()),
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthBuffer::FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: self.sample_count,
                    ..Default::default()
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some(program.fragment().entry_point.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });

        if uniforms.is_empty() && program.uniforms().is_some() {
            warn!("program {name} declares a uniform block with no addressable members");
        }

        GpuProgram {
            name: name.to_string(),
            pipeline,
            uniform_layout,
            texture_layout,
            texture_units,
            layout: layout.clone(),
            uniforms: UniformBlock::new(uniforms),
            rejected_meshes: HashSet::new(),
        }
    }
}

