use std::collections::HashSet;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use log::warn;
use wgpu::util::DeviceExt;

use crate::mesh::{DrawMode, VertexLayout};
use crate::uniforms::UniformSink;

use super::resources::{MeshHandle, ProgramHandle, TextureHandle};
use super::Renderer;

/// One recorded draw with the uniform values it was issued with.
struct DrawCall {
    program: usize,
    mesh: usize,
    uniforms: Vec<u8>,
    textures: Vec<Option<usize>>,
}

/// Draws recorded for a single frame, submitted by [`Frame::finish`].
pub struct Frame<'r> {
    renderer: &'r mut Renderer,
    clear: wgpu::Color,
    draws: Vec<DrawCall>,
}

impl<'r> Frame<'r> {
    pub(crate) fn new(renderer: &'r mut Renderer, clear: wgpu::Color) -> Self {
        Self {
            renderer,
            clear,
            draws: Vec::new(),
        }
    }

    /// Makes `program` current. Uniform values written through the returned
    /// handle persist on the program between draws and frames.
    pub fn use_program(&mut self, program: ProgramHandle) -> ActiveProgram<'_> {
        let units = self
            .renderer
            .programs
            .get(program.0)
            .map_or(0, |p| p.texture_units as usize);
        ActiveProgram {
            renderer: &mut *self.renderer,
            draws: &mut self.draws,
            program: program.0,
            textures: vec![None; units],
        }
    }

    /// Clears the targets, replays every recorded draw and presents the image.
    pub fn finish(self) -> Result<(), wgpu::SurfaceError> {
        let Frame {
            renderer,
            clear,
            draws,
        } = self;

        let output = renderer.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut bind_groups = Vec::with_capacity(draws.len());
        for draw in &draws {
            let program = &renderer.programs[draw.program];
            let uniform_buffer = (!draw.uniforms.is_empty()).then(|| {
                renderer
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("draw-uniforms"),
                        contents: &draw.uniforms,
                        usage: wgpu::BufferUsages::UNIFORM,
                    })
            });
            let uniform_entries: Vec<_> = uniform_buffer
                .iter()
                .map(|buffer| wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            let uniform_group = renderer.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("draw-uniform-group"),
                layout: &program.uniform_layout,
                entries: &uniform_entries,
            });

            let mut texture_entries = Vec::with_capacity(draw.textures.len() * 2);
            for (unit, handle) in draw.textures.iter().copied().enumerate() {
                let texture = handle
                    .and_then(|index| renderer.textures.get(index))
                    .unwrap_or(&renderer.fallback_texture);
                let unit = unit as u32;
                texture_entries.push(wgpu::BindGroupEntry {
                    binding: unit * 2,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
                texture_entries.push(wgpu::BindGroupEntry {
                    binding: unit * 2 + 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                });
            }
            let texture_group = renderer.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("draw-texture-group"),
                layout: &program.texture_layout,
                entries: &texture_entries,
            });

            bind_groups.push((uniform_group, texture_group));
        }

        let mut encoder = renderer
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        let (target, resolve_target) = match &renderer.msaa {
            Some(msaa) => (&msaa.view, Some(&view)),
            None => (&view, None),
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &renderer.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for (draw, (uniform_group, texture_group)) in draws.iter().zip(bind_groups.iter()) {
            let program = &renderer.programs[draw.program];
            let mesh = &renderer.meshes[draw.mesh];

            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, uniform_group, &[]);
            pass.set_bind_group(1, texture_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            match (&mesh.index, mesh.draw) {
                (Some(index), DrawMode::Indexed { count }) => {
                    pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..count, 0, 0..1);
                }
                (_, DrawMode::Indexed { count })
                | (_, DrawMode::Arrays { count }) => pass.draw(0..count, 0..1),
            }
        }

        drop(pass);
        renderer.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// The program currently in use inside a [`Frame`].
pub struct ActiveProgram<'f> {
    renderer: &'f mut Renderer,
    draws: &'f mut Vec<DrawCall>,
    program: usize,
    textures: Vec<Option<usize>>,
}

impl ActiveProgram<'_> {
    /// Binds `texture` to sampler unit `unit`. Units the program does not
    /// declare are ignored.
    pub fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        match self.textures.get_mut(unit as usize) {
            Some(slot) => *slot = Some(texture.0),
            None => warn!("texture unit {unit} is not used by the current program"),
        }
    }

    /// Records a draw of `mesh` with the uniforms set so far.
    pub fn draw(&mut self, mesh: MeshHandle) {
        let Some(program) = self.renderer.programs.get_mut(self.program) else {
            warn!("draw with unknown program {}", self.program);
            return;
        };
        let Some(gpu_mesh) = self.renderer.meshes.get(mesh.0) else {
            warn!("draw with unknown mesh {}", mesh.0);
            return;
        };
        if !layout_accepted(
            &mut program.rejected_meshes,
            &program.name,
            &program.layout,
            mesh.0,
            &gpu_mesh.layout,
        ) {
            return;
        }
        self.draws.push(DrawCall {
            program: self.program,
            mesh: mesh.0,
            uniforms: program.uniforms.bytes().to_vec(),
            textures: self.textures.clone(),
        });
    }

    fn with_uniforms(&mut self, write: impl FnOnce(&mut dyn UniformSink)) {
        if let Some(program) = self.renderer.programs.get_mut(self.program) {
            write(&mut program.uniforms);
        }
    }
}

/// Whether a mesh laid out as `actual` can be drawn by a program expecting
/// `expected`. Each rejected mesh is logged once per program.
fn layout_accepted(
    rejected: &mut HashSet<usize>,
    program: &str,
    expected: &VertexLayout,
    mesh: usize,
    actual: &VertexLayout,
) -> bool {
    if actual == expected {
        return true;
    }
    if rejected.insert(mesh) {
        warn!("mesh {mesh} does not match the vertex layout of program {program}; skipping its draws");
    }
    false
}

impl UniformSink for ActiveProgram<'_> {
    fn set_mat4(&mut self, name: &str, value: Mat4) {
        self.with_uniforms(|u| u.set_mat4(name, value));
    }

    fn set_mat3(&mut self, name: &str, value: Mat3) {
        self.with_uniforms(|u| u.set_mat3(name, value));
    }

    fn set_vec4(&mut self, name: &str, value: Vec4) {
        self.with_uniforms(|u| u.set_vec4(name, value));
    }

    fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.with_uniforms(|u| u.set_vec3(name, value));
    }

    fn set_vec2(&mut self, name: &str, value: Vec2) {
        self.with_uniforms(|u| u.set_vec2(name, value));
    }

    fn set_f32(&mut self, name: &str, value: f32) {
        self.with_uniforms(|u| u.set_f32(name, value));
    }

    fn set_i32(&mut self, name: &str, value: i32) {
        self.with_uniforms(|u| u.set_i32(name, value));
    }
}
