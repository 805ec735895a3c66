//! wgpu backend: GPU resources, pipelines and per-frame draw recording.

mod frame;
mod renderer;
mod resources;

pub use frame::{ActiveProgram, Frame};
pub use renderer::Renderer;
pub use resources::{MeshHandle, ProgramHandle, TextureHandle};
