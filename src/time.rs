use std::time::Instant;

/// Timing of one rendered frame.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick.
    pub dt: f32,
    pub frame_index: u64,
}

/// Wall-clock frame timer.
///
/// The first tick measures from construction; delta time is the plain
/// difference between consecutive ticks.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            last: start,
            frame_index: 0,
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now.saturating_duration_since(self.last);
        self.last = now;

        let time = FrameTime {
            dt: dt.as_secs_f32(),
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        time
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::camera::{Camera, Movement};

    #[test]
    fn delta_is_difference_between_ticks() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);

        let first = clock.tick_at(start + Duration::from_millis(16));
        let second = clock.tick_at(start + Duration::from_millis(48));

        assert!((first.dt - 0.016).abs() < 1e-6);
        assert!((second.dt - 0.032).abs() < 1e-6);
        assert_eq!(first.frame_index, 0);
        assert_eq!(second.frame_index, 1);
    }

    #[test]
    fn long_frames_keep_their_full_delta() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        let time = clock.tick_at(start + Duration::from_secs(5));
        assert!((time.dt - 5.0).abs() < 1e-6);
    }

    #[test]
    fn one_second_frame_moves_camera_full_step() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        let time = clock.tick_at(start + Duration::from_secs(1));

        let mut camera = Camera::new();
        camera.begin_frame(time.dt);
        camera.translate(Movement::Forward);
        assert!(camera.position().abs_diff_eq(glam::Vec3::new(0.0, 0.0, 0.5), 1e-5));
    }

    #[test]
    fn clock_never_runs_backwards() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start + Duration::from_secs(1));
        assert_eq!(clock.tick_at(start).dt, 0.0);
    }
}
