//! Free-flying canvas camera controller
//!
//! Pointer drag, touch pan/pinch, wheel zoom and keyboard input are merged
//! into one damped velocity model. Input handlers only stage intent (target
//! velocity nudges, scroll accumulation); [`CameraController::update`]
//! consumes it once per frame.

use crate::core::config::MotionConfig;
use crate::core::input::{InputEvent, MovementKeys};
use crate::core::types::{Vec2, Vec3};
use crate::streaming::chunk::ChunkCoord;

/// Cursor affordance the window should show
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorStyle {
    Grab,
    Grabbing,
}

/// Mutable simulation state, owned by exactly one controller
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerState {
    pub velocity: Vec3,
    pub target_velocity: Vec3,
    /// Camera position without drift
    pub base_position: Vec3,
    /// Parallax offset toward the pointer (X/Y only)
    pub drift: Vec2,
    /// Pointer position normalized to [-1, 1]
    pub pointer: Vec2,
    /// Last pointer pixel position seen while dragging
    pub last_pointer: Vec2,
    /// Decaying wheel/pinch accumulator folded into Z velocity
    pub scroll_accum: f32,
    pub dragging: bool,
    pub last_touches: Vec<Vec2>,
    pub last_touch_distance: f32,
}

impl ControllerState {
    fn new(base_position: Vec3) -> Self {
        Self {
            velocity: Vec3::ZERO,
            target_velocity: Vec3::ZERO,
            base_position,
            drift: Vec2::ZERO,
            pointer: Vec2::ZERO,
            last_pointer: Vec2::ZERO,
            scroll_accum: 0.0,
            dragging: false,
            last_touches: Vec::new(),
            last_touch_distance: 0.0,
        }
    }
}

/// The camera's chunk and raw depth for one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraGridState {
    pub chunk: ChunkCoord,
    pub cam_z: f32,
}

impl CameraGridState {
    pub fn at(position: Vec3) -> Self {
        Self {
            chunk: ChunkCoord::from_world(position),
            cam_z: position.z,
        }
    }
}

/// Result of one frame of integration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMotion {
    /// Rendered camera position (base position plus drift)
    pub camera_position: Vec3,
    /// Chunk and depth derived from this frame's base position
    pub grid: CameraGridState,
    pub velocity: Vec3,
    pub is_zooming: bool,
}

/// Damped-velocity camera controller
pub struct CameraController {
    state: ControllerState,
    config: MotionConfig,
    touch_primary: bool,
    cursor: CursorStyle,
}

impl CameraController {
    /// Create a controller whose camera starts at `initial_position`
    pub fn new(config: MotionConfig, initial_position: Vec3) -> Self {
        Self {
            state: ControllerState::new(initial_position),
            config,
            touch_primary: false,
            cursor: CursorStyle::Grab,
        }
    }

    /// Stage an input intent for the next [`update`](Self::update)
    pub fn handle_event(&mut self, event: &InputEvent) {
        let s = &mut self.state;
        let cfg = &self.config;

        match event {
            InputEvent::PointerDown { position } => {
                // Drift stays frozen at its current value while dragging
                s.dragging = true;
                s.last_pointer = *position;
                self.cursor = CursorStyle::Grabbing;
            }
            InputEvent::PointerUp => {
                s.dragging = false;
                self.cursor = CursorStyle::Grab;
            }
            InputEvent::PointerLeave => {
                s.pointer = Vec2::ZERO;
                s.dragging = false;
                self.cursor = CursorStyle::Grab;
            }
            InputEvent::PointerMove { position, normalized } => {
                s.pointer = *normalized;
                if s.dragging {
                    let delta = *position - s.last_pointer;
                    s.target_velocity.x -= delta.x * cfg.drag_factor;
                    s.target_velocity.y += delta.y * cfg.drag_factor;
                    s.last_pointer = *position;
                }
            }
            InputEvent::Wheel { delta_y } => {
                s.scroll_accum += delta_y * cfg.wheel_factor;
            }
            InputEvent::Pinch { distance_delta } => {
                s.scroll_accum -= distance_delta * cfg.pinch_factor;
            }
            InputEvent::TouchStart { touches } => {
                s.last_touches = touches.clone();
                s.last_touch_distance = touch_distance(touches);
                self.cursor = CursorStyle::Grabbing;
            }
            InputEvent::TouchMove { touches } => {
                if touches.len() == 1 && !s.last_touches.is_empty() {
                    let delta = touches[0] - s.last_touches[0];
                    s.target_velocity.x -= delta.x * cfg.touch_pan_factor;
                    s.target_velocity.y += delta.y * cfg.touch_pan_factor;
                } else if touches.len() == 2 && s.last_touch_distance > 0.0 {
                    let distance = touch_distance(touches);
                    s.scroll_accum += (s.last_touch_distance - distance) * cfg.pinch_factor;
                    s.last_touch_distance = distance;
                }
                s.last_touches = touches.clone();
            }
            InputEvent::TouchEnd { touches } => {
                s.last_touches = touches.clone();
                s.last_touch_distance = touch_distance(touches);
                self.cursor = CursorStyle::Grab;
            }
        }
    }

    /// Integrate one frame of motion
    pub fn update(&mut self, keys: MovementKeys) -> FrameMotion {
        let s = &mut self.state;
        let cfg = &self.config;

        let step = cfg.keyboard_speed;
        if keys.forward {
            s.target_velocity.z -= step;
        }
        if keys.backward {
            s.target_velocity.z += step;
        }
        if keys.left {
            s.target_velocity.x -= step;
        }
        if keys.right {
            s.target_velocity.x += step;
        }
        if keys.down {
            s.target_velocity.y -= step;
        }
        if keys.up {
            s.target_velocity.y += step;
        }

        let is_zooming = s.velocity.z.abs() > cfg.zoom_threshold;
        let zoom_factor = (s.base_position.z / cfg.drift_zoom_reference)
            .max(cfg.drift_zoom_min)
            .min(cfg.drift_zoom_max);
        let drift_amount = cfg.drift_amount * zoom_factor;
        let drift_lerp = if is_zooming { cfg.drift_lerp_zooming } else { cfg.drift_lerp };

        if !s.dragging {
            let drift_target = if self.touch_primary {
                Vec2::ZERO
            } else {
                s.pointer * drift_amount
            };
            s.drift = s.drift.lerp(drift_target, drift_lerp);
        }

        s.target_velocity.z += s.scroll_accum;
        s.scroll_accum *= cfg.scroll_decay;

        let max = Vec3::splat(cfg.max_velocity);
        s.target_velocity = s.target_velocity.clamp(-max, max);

        s.velocity = s.velocity.lerp(s.target_velocity, cfg.velocity_lerp);
        s.base_position += s.velocity;

        let camera_position = Vec3::new(
            s.base_position.x + s.drift.x,
            s.base_position.y + s.drift.y,
            s.base_position.z,
        );

        s.target_velocity *= cfg.velocity_decay;

        let grid = CameraGridState::at(s.base_position);
        log::trace!(
            "camera at ({:.2}, {:.2}, {:.2}) chunk {} v=({:.3}, {:.3}, {:.3})",
            camera_position.x, camera_position.y, camera_position.z,
            grid.chunk, s.velocity.x, s.velocity.y, s.velocity.z
        );

        FrameMotion {
            camera_position,
            grid,
            velocity: s.velocity,
            is_zooming,
        }
    }

    /// Disable pointer drift on touch-primary devices
    pub fn set_touch_primary(&mut self, touch_primary: bool) {
        self.touch_primary = touch_primary;
    }

    /// Cursor affordance for the current drag state
    pub fn cursor(&self) -> CursorStyle {
        self.cursor
    }

    /// Read-only view of the simulation state
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Chunk and depth of the current base position
    pub fn grid(&self) -> CameraGridState {
        CameraGridState::at(self.state.base_position)
    }
}

/// Distance between the first two touches; zero with fewer than two
fn touch_distance(touches: &[Vec2]) -> f32 {
    match touches {
        [a, b, ..] => a.distance(*b),
        _ => 0.0,
    }
}
