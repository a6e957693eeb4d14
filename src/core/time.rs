//! Frame timing utilities

use std::time::{Duration, Instant};

/// Tracks frame timing and a once-per-second FPS sample
pub struct FrameTimer {
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
    fps_timer: Instant,
    fps: f32,
    fps_frame_count: u32,
}

impl FrameTimer {
    /// Create a new frame timer
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a timer whose first frame begins at `now`
    pub fn starting_at(now: Instant) -> Self {
        Self {
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
            fps_timer: now,
            fps: 0.0,
            fps_frame_count: 0,
        }
    }

    /// Call once per frame with the frame's timestamp
    pub fn tick_at(&mut self, now: Instant) {
        self.delta = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;
        self.fps_frame_count += 1;

        let fps_elapsed = now.saturating_duration_since(self.fps_timer);
        if fps_elapsed >= Duration::from_secs(1) {
            self.fps = self.fps_frame_count as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = 0;
            self.fps_timer = now;
        }
    }

    /// Call once per frame to update timing
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Timestamp of the most recent frame
    pub fn frame_start(&self) -> Instant {
        self.last_frame
    }

    /// Get delta time in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Get current FPS (updated every second)
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Get total frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
