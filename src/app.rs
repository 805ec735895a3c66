//! Window, event loop and the per-frame render loop.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{DeviceEvent, DeviceId, ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{CursorGrabMode, Window, WindowId};

use crate::assets::AssetRoot;
use crate::camera::{Camera, CameraMode};
use crate::input::{InputEvent, InputQueue, InputState, KeyCode, NamedKey, VirtualCursor};
use crate::lighting::FrameUniforms;
use crate::render::{MeshHandle, ProgramHandle, Renderer, TextureHandle};
use crate::scene::{Lesson, LessonAssets, SceneDesc, SceneObject, Wiring};
use crate::time::FrameClock;
use crate::uniforms::UniformSink;

/// Scroll distance of one wheel notch on touchpads reporting pixels.
const PIXELS_PER_LINE: f64 = 40.0;

/// Window and renderer settings, built from defaults and CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub clear_color: wgpu::Color,
    pub sample_count: u32,
    pub near: f32,
    pub far: f32,
    pub assets: AssetRoot,
    pub lesson: Lesson,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title: "heat rendering engine".to_string(),
            width: 685,
            height: 500,
            clear_color: wgpu::Color {
                r: 0.04,
                g: 0.12,
                b: 0.19,
                a: 1.0,
            },
            sample_count: 4,
            near: 0.1,
            far: 100.0,
            assets: AssetRoot::default(),
            lesson: Lesson::default(),
        }
    }
}

/// Builds the scene for the configured lesson and loads everything it needs.
///
/// Random placements are drawn once here and stay fixed for the run.
pub fn load_lesson(config: &RenderConfig) -> Result<(SceneDesc, LessonAssets)> {
    let scene = SceneDesc::build(config.lesson, &mut rand::thread_rng());
    let assets = LessonAssets::load(&scene, &config.assets)
        .with_context(|| format!("failed to load lesson {}", config.lesson))?;
    Ok((scene, assets))
}

/// Opens the window and renders the configured lesson until it is closed.
///
/// Returns a [`WindowInitError`] when no display is available so callers can
/// fall back to headless behaviour.
pub fn run(config: RenderConfig) -> Result<()> {
    let (scene, assets) = load_lesson(&config)?;

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, scene, assets);
    event_loop
        .run_app(&mut app)
        .context("event loop terminated with error")?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[derive(Debug)]
pub struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

/// A draw group with its resources resident on the GPU.
struct GpuGroup {
    program: ProgramHandle,
    mesh: MeshHandle,
    textures: Vec<TextureHandle>,
    wiring: Wiring,
    instances: Vec<SceneObject>,
}

struct Gpu {
    renderer: Renderer,
    groups: Vec<GpuGroup>,
}

struct App {
    config: RenderConfig,
    scene: SceneDesc,
    assets: Option<LessonAssets>,
    gpu: Option<Gpu>,
    camera: Camera,
    input: InputState,
    events: InputQueue,
    cursor: VirtualCursor,
    clock: FrameClock,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: RenderConfig, scene: SceneDesc, assets: LessonAssets) -> Self {
        Self {
            config,
            scene,
            assets: Some(assets),
            gpu: None,
            camera: Camera::new(),
            input: InputState::new(),
            events: InputQueue::new(),
            cursor: VirtualCursor::default(),
            clock: FrameClock::new(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.error = Some(err);
        event_loop.exit();
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
        let window = event_loop
            .create_window(attributes)
            .map_err(|err| WindowInitError::from_error("window", err))?;

        if self.scene.camera_mode == CameraMode::FirstPerson {
            let grabbed = window
                .set_cursor_grab(CursorGrabMode::Confined)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked));
            if let Err(err) = grabbed {
                warn!("unable to grab the cursor: {err}");
            }
            window.set_cursor_visible(false);
        }
        Ok(Arc::new(window))
    }

    fn upload(&mut self, window: Arc<Window>) -> Result<Gpu> {
        let assets = self
            .assets
            .take()
            .ok_or_else(|| anyhow!("lesson assets were already uploaded"))?;
        let mut renderer = block_on(Renderer::new(window, self.config.sample_count))?;

        let mut textures = std::collections::BTreeMap::new();
        for (path, image) in &assets.textures {
            textures.insert(path.clone(), renderer.create_texture(image, path));
        }

        let mut groups = Vec::with_capacity(assets.groups.len());
        for (desc, loaded) in self.scene.groups.iter().zip(&assets.groups) {
            let program = renderer
                .create_program(&loaded.program, loaded.mesh.layout())
                .with_context(|| format!("failed to create pipeline for {}", loaded.program.name()))?;
            let mesh = renderer.create_mesh(&loaded.mesh);
            let units = loaded.program.texture_units() as usize;
            let group_textures = desc
                .textures
                .iter()
                .take(units)
                .filter_map(|path| textures.get(path).copied())
                .collect();
            groups.push(GpuGroup {
                program,
                mesh,
                textures: group_textures,
                wiring: desc.wiring,
                instances: desc.instances.clone(),
            });
        }
        let size = renderer.size();
        info!(
            "uploaded lesson {}: {} pipeline(s), {} instance(s), {}x{} surface, {}x MSAA",
            self.scene.lesson,
            groups.len(),
            self.scene.instance_count(),
            size.width,
            size.height,
            renderer.sample_count()
        );

        Ok(Gpu { renderer, groups })
    }

    fn handle_key(&mut self, key: PhysicalKey, state: ElementState) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        let Some(key) = map_keycode(code) else {
            return;
        };
        match state {
            ElementState::Pressed => self.input.set_key_down(key),
            ElementState::Released => self.input.set_key_up(key),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        let time = self.clock.tick();

        let events: Vec<InputEvent> = self.events.drain().collect();
        for event in &events {
            if let InputEvent::Resized { width, height } = *event {
                gpu.renderer.resize(PhysicalSize::new(width, height));
            }
        }
        if self.input.is_key_down(KeyCode::Named(NamedKey::Escape)) {
            event_loop.exit();
            return Ok(());
        }
        self.camera
            .update(self.scene.camera_mode, &events, &self.input, time.dt);
        self.scene.lights.follow_camera(&self.camera);

        let frame_uniforms = FrameUniforms::from_camera(
            &self.camera,
            gpu.renderer.aspect(),
            self.config.near,
            self.config.far,
        );

        let mut frame = gpu.renderer.begin_frame(self.config.clear_color);
        for group in &gpu.groups {
            let mut program = frame.use_program(group.program);
            frame_uniforms.wire(&mut program);
            match group.wiring {
                Wiring::Transforms => {}
                Wiring::Lit => {
                    self.scene.material.wire(&mut program);
                    self.scene.lights.wire(&mut program);
                }
                Wiring::Lamp { color } => program.set_vec3("lightColor", color),
            }
            for (unit, texture) in group.textures.iter().enumerate() {
                program.bind_texture(unit as u32, *texture);
            }
            for instance in &group.instances {
                program.set_mat4("model", instance.model_matrix());
                program.draw(group.mesh);
            }
        }

        match frame.finish() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.renderer.reconfigure();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow!("GPU is out of memory"));
            }
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
            }
            Err(err) => warn!("skipping frame {}: {err}", time.frame_index),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        let result = self
            .create_window(event_loop)
            .and_then(|window| self.upload(window));
        match result {
            Ok(gpu) => {
                gpu.renderer.window().request_redraw();
                self.gpu = Some(gpu);
                self.clock = FrameClock::new();
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(gpu) = self.gpu.as_ref() else {
            return;
        };
        if window_id != gpu.renderer.window_id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => self.events.push(InputEvent::Resized {
                width: size.width,
                height: size.height,
            }),
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_key(event.physical_key, event.state);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_LINE) as f32,
                };
                self.events.push(InputEvent::Scroll { delta });
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw(event_loop) {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            let moved = self.cursor.advance(dx, dy);
            self.events.push(moved);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = self.gpu.as_ref() {
            gpu.renderer.window().request_redraw();
        }
    }
}

fn map_keycode(code: winit::keyboard::KeyCode) -> Option<KeyCode> {
    use winit::keyboard::KeyCode as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        Key::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        Key::KeyW => KeyCode::character('W'),
        Key::KeyA => KeyCode::character('A'),
        Key::KeyS => KeyCode::character('S'),
        Key::KeyD => KeyCode::character('D'),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_window() {
        let config = RenderConfig::default();
        assert_eq!(config.title, "heat rendering engine");
        assert_eq!((config.width, config.height), (685, 500));
        assert_eq!(config.sample_count, 4);
        assert_eq!(config.lesson, Lesson::MultiLight);
        assert!((config.clear_color.b - 0.19).abs() < 1e-9);
    }

    #[test]
    fn maps_movement_keys() {
        use winit::keyboard::KeyCode as Key;
        assert_eq!(map_keycode(Key::KeyW), Some(KeyCode::character('w')));
        assert_eq!(
            map_keycode(Key::ShiftRight),
            Some(KeyCode::Named(NamedKey::RightShift))
        );
        assert_eq!(map_keycode(Key::F1), None);
    }

    #[test]
    fn panic_messages_are_recovered() {
        let panic: Box<dyn Any + Send> = Box::new("no display");
        assert_eq!(panic_message(panic), "no display");
        let err = WindowInitError::from_panic("event loop", Box::new(String::from("boom")));
        assert_eq!(err.to_string(), "failed to initialize event loop: boom");
    }
}
