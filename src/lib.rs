//! Building blocks of a small lesson-driven 3D renderer.
//!
//! Shader programs are compiled and linked on the CPU with naga before any
//! GPU work happens, so everything except the window and the wgpu backend can
//! be exercised headlessly. The binary wires these pieces into a first-person
//! render loop.

pub mod app;
pub mod assets;
pub mod camera;
pub mod input;
pub mod lighting;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod shader;
pub mod time;
pub mod uniforms;

pub use assets::{AssetError, AssetRoot, ImageData};
pub use camera::{Camera, CameraMode, Movement};
pub use input::{InputEvent, InputQueue, InputState, KeyCode, NamedKey, VirtualCursor};
pub use lighting::{Attenuation, FrameUniforms, Light, LightColors, LightRig, Material};
pub use mesh::{AttributeKind, DrawMode, MeshData, MeshError, VertexAttribute, VertexLayout};
pub use render::{ActiveProgram, Frame, MeshHandle, ProgramHandle, Renderer, TextureHandle};
pub use scene::{DrawGroup, Lesson, LessonAssets, SceneDesc, SceneObject, Wiring};
pub use shader::{compile_stage, link, load_program, LinkedProgram, ShaderError, ShaderStage};
pub use time::{FrameClock, FrameTime};
pub use uniforms::{UniformBlock, UniformLayout, UniformSink};
