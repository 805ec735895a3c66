//! First-person camera driven by mouse look, scroll zoom and WASD movement.
//!
//! Angles are stored in degrees. The view direction is never set directly;
//! it is always derived from yaw and pitch so it stays unit length.

use glam::{Mat4, Vec2, Vec3};

use crate::input::{InputEvent, InputState, KeyCode, NamedKey};

pub const MOUSE_SENSITIVITY: f32 = 0.1;
/// Units per second.
pub const MOVE_SPEED: f32 = 2.5;
pub const PITCH_LIMIT: f32 = 89.0;
pub const MIN_FOV: f32 = 1.0;
pub const MAX_FOV: f32 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Whether a lesson lets the player move the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    Static,
    #[default]
    FirstPerson,
}

#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    direction: Vec3,
    up: Vec3,
    fov: f32,
    yaw: f32,
    pitch: f32,
    speed: f32,
    first_cursor: bool,
    last_cursor: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::Y,
            fov: MAX_FOV,
            yaw: -90.0,
            pitch: 0.0,
            speed: 0.0,
            first_cursor: true,
            last_cursor: Vec2::new(400.0, 300.0),
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Vertical field of view in degrees.
    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Distance covered by one movement step this frame.
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn target(&self) -> Vec3 {
        self.position + self.direction
    }

    /// Applies an absolute cursor position.
    ///
    /// The first call only records the position so the view does not jump
    /// when the cursor is first captured.
    pub fn handle_cursor(&mut self, x: f32, y: f32) {
        let cursor = Vec2::new(x, y);
        if self.first_cursor {
            self.last_cursor = cursor;
            self.first_cursor = false;
            return;
        }

        // Screen y grows downwards, pitch grows upwards.
        let offset = Vec2::new(cursor.x - self.last_cursor.x, self.last_cursor.y - cursor.y)
            * MOUSE_SENSITIVITY;
        self.last_cursor = cursor;

        self.yaw += offset.x;
        self.pitch = (self.pitch + offset.y).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.direction = direction_from_angles(self.yaw, self.pitch);
    }

    /// Narrows the field of view for positive scroll, widens it for negative.
    pub fn zoom(&mut self, delta: f32) {
        self.fov = (self.fov - delta).clamp(MIN_FOV, MAX_FOV);
    }

    /// Sets the step length for the frame about to be simulated.
    pub fn begin_frame(&mut self, dt: f32) {
        self.speed = MOVE_SPEED * dt;
    }

    pub fn translate(&mut self, movement: Movement) {
        let step = match movement {
            Movement::Forward => self.direction,
            Movement::Backward => -self.direction,
            Movement::Right => self.right(),
            Movement::Left => -self.right(),
            Movement::Up => self.up,
            Movement::Down => -self.up,
        };
        self.position += step * self.speed;
    }

    /// Polls the held keys and moves accordingly for a frame of `dt` seconds.
    pub fn apply_keys(&mut self, input: &InputState, dt: f32) {
        self.begin_frame(dt);
        let bindings = [
            (KeyCode::character('W'), Movement::Forward),
            (KeyCode::character('S'), Movement::Backward),
            (KeyCode::character('A'), Movement::Left),
            (KeyCode::character('D'), Movement::Right),
            (KeyCode::Named(NamedKey::Space), Movement::Up),
        ];
        for (key, movement) in bindings {
            if input.is_key_down(key) {
                self.translate(movement);
            }
        }
        if input.is_shift_down() {
            self.translate(Movement::Down);
        }
    }

    /// Feeds a queued pointer event; window events are ignored.
    pub fn handle_event(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::CursorMoved { x, y } => self.handle_cursor(x, y),
            InputEvent::Scroll { delta } => self.zoom(delta),
            InputEvent::Resized { .. } => {}
        }
    }

    /// Advances the camera by one frame. A static camera ignores pointer
    /// events and held keys.
    pub fn update<'a>(
        &mut self,
        mode: CameraMode,
        events: impl IntoIterator<Item = &'a InputEvent>,
        input: &InputState,
        dt: f32,
    ) {
        if mode == CameraMode::Static {
            return;
        }
        for event in events {
            self.handle_event(event);
        }
        self.apply_keys(input, dt);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target(), self.up)
    }

    /// Perspective projection with a 0..1 depth range.
    pub fn projection(&self, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect.max(0.01), near, far)
    }

    fn right(&self) -> Vec3 {
        self.direction.cross(self.up).normalize()
    }
}

/// Spherical to Cartesian conversion of yaw/pitch given in degrees.
pub fn direction_from_angles(yaw: f32, pitch: f32) -> Vec3 {
    let (yaw, pitch) = (yaw.to_radians(), pitch.to_radians());
    Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn seeded() -> Camera {
        let mut camera = Camera::new();
        camera.handle_cursor(0.0, 0.0);
        camera
    }

    #[test]
    fn direction_is_unit_for_any_yaw() {
        for yaw in [-1000.0, -90.0, 0.0, 33.3, 720.5, 1.0e4] {
            for pitch in [-89.0, -45.0, 0.0, 12.5, 89.0] {
                let length = direction_from_angles(yaw, pitch).length();
                assert!((length - 1.0).abs() < EPS, "yaw {yaw} pitch {pitch}");
            }
        }
    }

    #[test]
    fn first_cursor_event_only_seeds() {
        let mut camera = Camera::new();
        camera.handle_cursor(1234.0, -987.0);
        assert_eq!(camera.yaw(), -90.0);
        assert_eq!(camera.pitch(), 0.0);
        assert_eq!(camera.direction(), Vec3::new(0.0, 0.0, -1.0));

        camera.handle_cursor(1244.0, -987.0);
        assert!((camera.yaw() - -89.0).abs() < EPS);
    }

    #[test]
    fn moving_cursor_up_raises_pitch() {
        let mut camera = seeded();
        camera.handle_cursor(0.0, -50.0);
        assert!((camera.pitch() - 5.0).abs() < EPS);
        assert!(camera.direction().y > 0.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = seeded();
        camera.handle_cursor(0.0, -1.0e6);
        assert_eq!(camera.pitch(), PITCH_LIMIT);
        camera.handle_cursor(0.0, 1.0e6);
        assert_eq!(camera.pitch(), -PITCH_LIMIT);
        for step in 0..100 {
            camera.handle_cursor(step as f32 * 3.0, step as f32 * -777.0);
            assert!(camera.pitch() <= PITCH_LIMIT && camera.pitch() >= -PITCH_LIMIT);
            assert!((camera.direction().length() - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn zoom_stays_within_bounds() {
        let mut camera = Camera::new();
        camera.zoom(-5.0);
        assert_eq!(camera.fov(), MAX_FOV);
        camera.zoom(50.0);
        assert_eq!(camera.fov(), MIN_FOV);
        camera.zoom(-10.0);
        assert_eq!(camera.fov(), 11.0);
        for delta in [3.0, -100.0, 7.5, 1.0e3, -0.25] {
            camera.zoom(delta);
            assert!((MIN_FOV..=MAX_FOV).contains(&camera.fov()));
        }
    }

    #[test]
    fn forward_for_one_second_moves_two_and_a_half_units() {
        let mut camera = Camera::new();
        camera.begin_frame(1.0);
        camera.translate(Movement::Forward);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 0.5), EPS));
    }

    #[test]
    fn displacement_scales_with_delta_time() {
        let mut held = InputState::new();
        held.set_key_down(KeyCode::character('d'));

        let mut short = Camera::new();
        short.apply_keys(&held, 0.1);
        let mut long = Camera::new();
        long.apply_keys(&held, 0.2);

        let start = Camera::new().position();
        let short_step = (short.position() - start).length();
        let long_step = (long.position() - start).length();
        assert!((short_step - MOVE_SPEED * 0.1).abs() < EPS);
        assert!((long_step - 2.0 * short_step).abs() < EPS);
        assert!(short.position().x > start.x);
    }

    #[test]
    fn space_and_shift_move_vertically() {
        let mut input = InputState::new();
        input.set_key_down(KeyCode::Named(NamedKey::Space));
        let mut camera = Camera::new();
        camera.apply_keys(&input, 0.4);
        assert!((camera.position().y - 1.0).abs() < EPS);

        input.set_key_up(KeyCode::Named(NamedKey::Space));
        input.set_key_down(KeyCode::Named(NamedKey::LeftShift));
        camera.apply_keys(&input, 0.4);
        assert!(camera.position().y.abs() < EPS);
    }

    #[test]
    fn events_route_to_cursor_and_zoom() {
        let mut camera = Camera::new();
        camera.handle_event(&InputEvent::Scroll { delta: 5.0 });
        assert_eq!(camera.fov(), 40.0);
        camera.handle_event(&InputEvent::Resized {
            width: 10,
            height: 10,
        });
        assert_eq!(camera.fov(), 40.0);
    }

    fn pointer_events() -> Vec<InputEvent> {
        vec![
            InputEvent::CursorMoved { x: 0.0, y: 0.0 },
            InputEvent::CursorMoved { x: 40.0, y: -30.0 },
            InputEvent::Scroll { delta: 10.0 },
        ]
    }

    #[test]
    fn static_camera_ignores_pointer_and_keys() {
        let mut input = InputState::new();
        input.set_key_down(KeyCode::character('w'));
        let mut camera = Camera::new();
        camera.update(CameraMode::Static, &pointer_events(), &input, 1.0);

        let untouched = Camera::new();
        assert_eq!(camera.position(), untouched.position());
        assert_eq!(camera.direction(), untouched.direction());
        assert_eq!(camera.fov(), untouched.fov());
        assert_eq!(camera.view_matrix(), untouched.view_matrix());
    }

    #[test]
    fn first_person_camera_follows_pointer_and_keys() {
        let mut input = InputState::new();
        input.set_key_down(KeyCode::character('w'));
        let mut camera = Camera::new();
        camera.update(CameraMode::FirstPerson, &pointer_events(), &input, 1.0);

        assert!((camera.yaw() - -86.0).abs() < EPS);
        assert!((camera.pitch() - 3.0).abs() < EPS);
        assert_eq!(camera.fov(), 35.0);
        let travelled = camera.position() - Camera::new().position();
        assert!((travelled.length() - MOVE_SPEED).abs() < EPS);
        assert!(travelled.dot(camera.direction()) > 0.0);
    }

    #[test]
    fn view_matrix_looks_down_negative_z() {
        let camera = Camera::new();
        let origin_in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!(origin_in_view.abs_diff_eq(Vec3::new(0.0, 0.0, -3.0), EPS));
    }
}
