//! Input state tracking
//!
//! Translates winit window events into device-agnostic [`InputEvent`]s for the
//! camera controller, and tracks the fixed keyboard map.

use std::collections::HashSet;

use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::core::types::Vec2;

/// Pixels per wheel "line", matching what browsers report for one notch.
const WHEEL_LINE_PX: f32 = 100.0;

/// Trackpad magnification delta to equivalent pinch distance in pixels.
const PINCH_GESTURE_PX: f32 = 400.0;

/// A staged input intent, consumed by the controller on the next frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    /// Primary button pressed at a pixel position
    PointerDown { position: Vec2 },
    /// Pointer moved; `normalized` is in [-1, 1] with +Y up
    PointerMove { position: Vec2, normalized: Vec2 },
    /// Primary button released
    PointerUp,
    /// Pointer left the canvas
    PointerLeave,
    /// Wheel scroll; positive scrolls "down" (zoom out)
    Wheel { delta_y: f32 },
    /// Trackpad pinch; positive means fingers moved apart (zoom in)
    Pinch { distance_delta: f32 },
    /// Touches present after a finger went down
    TouchStart { touches: Vec<Vec2> },
    /// Touches present after movement
    TouchMove { touches: Vec<Vec2> },
    /// Touches still present after a finger lifted
    TouchEnd { touches: Vec<Vec2> },
}

/// Held movement keys for one frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MovementKeys {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

/// Action bound to a key in the fixed key map
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// The fixed keyboard contract: WASD and arrows move in the plane, E/Q move vertically.
pub const KEYBOARD_MAP: [(KeyAction, &[KeyCode]); 6] = [
    (KeyAction::Forward, &[KeyCode::KeyW, KeyCode::ArrowUp]),
    (KeyAction::Backward, &[KeyCode::KeyS, KeyCode::ArrowDown]),
    (KeyAction::Left, &[KeyCode::KeyA, KeyCode::ArrowLeft]),
    (KeyAction::Right, &[KeyCode::KeyD, KeyCode::ArrowRight]),
    (KeyAction::Up, &[KeyCode::KeyE]),
    (KeyAction::Down, &[KeyCode::KeyQ]),
];

/// Tracks keyboard, pointer and touch state
pub struct InputState {
    /// Currently pressed keys
    keys_pressed: HashSet<KeyCode>,
    /// Last cursor position in physical pixels
    mouse_position: Vec2,
    /// Whether the primary button is held over the canvas
    primary_down: bool,
    /// Active touches in the order they started
    touches: Vec<(u64, Vec2)>,
    /// Surface size in physical pixels
    viewport: Vec2,
    /// Set once any touch input has been seen
    touch_primary: bool,
    /// Events staged since the last drain
    pending: Vec<InputEvent>,
}

impl InputState {
    /// Create new input state for a surface of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            keys_pressed: HashSet::new(),
            mouse_position: Vec2::ZERO,
            primary_down: false,
            touches: Vec::new(),
            viewport: Vec2::new(width.max(1) as f32, height.max(1) as f32),
            touch_primary: false,
            pending: Vec::new(),
        }
    }

    /// Process a window event
    pub fn process_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    physical_key: PhysicalKey::Code(key_code),
                    state,
                    ..
                },
                ..
            } => self.on_key(*key_code, *state),
            WindowEvent::CursorMoved { position, .. } => {
                self.on_cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => self.on_cursor_left(),
            WindowEvent::MouseInput { state, button, .. } => self.on_mouse_button(*button, *state),
            WindowEvent::MouseWheel { delta, .. } => {
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * WHEEL_LINE_PX,
                    MouseScrollDelta::PixelDelta(p) => -p.y as f32,
                };
                self.on_wheel(delta_y);
            }
            WindowEvent::PinchGesture { delta, .. } => {
                self.pending.push(InputEvent::Pinch {
                    distance_delta: *delta as f32 * PINCH_GESTURE_PX,
                });
            }
            WindowEvent::Touch(touch) => {
                let location = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                self.on_touch(touch.id, touch.phase, location);
            }
            WindowEvent::Resized(size) => self.set_viewport(size.width, size.height),
            WindowEvent::Focused(false) => {
                // Key releases are not delivered while unfocused
                self.keys_pressed.clear();
                if self.primary_down {
                    self.primary_down = false;
                    self.pending.push(InputEvent::PointerUp);
                }
            }
            _ => {}
        }
    }

    fn on_key(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.keys_pressed.insert(key);
            }
            ElementState::Released => {
                self.keys_pressed.remove(&key);
            }
        }
    }

    fn on_cursor_moved(&mut self, position: Vec2) {
        self.mouse_position = position;
        let normalized = Vec2::new(
            (position.x / self.viewport.x) * 2.0 - 1.0,
            -(position.y / self.viewport.y) * 2.0 + 1.0,
        );
        self.pending.push(InputEvent::PointerMove { position, normalized });
    }

    fn on_cursor_left(&mut self) {
        self.primary_down = false;
        self.pending.push(InputEvent::PointerLeave);
    }

    fn on_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button != MouseButton::Left {
            return;
        }
        match state {
            ElementState::Pressed => {
                self.primary_down = true;
                self.pending.push(InputEvent::PointerDown { position: self.mouse_position });
            }
            ElementState::Released => {
                self.primary_down = false;
                self.pending.push(InputEvent::PointerUp);
            }
        }
    }

    fn on_wheel(&mut self, delta_y: f32) {
        self.pending.push(InputEvent::Wheel { delta_y });
    }

    fn on_touch(&mut self, id: u64, phase: TouchPhase, location: Vec2) {
        self.touch_primary = true;
        match phase {
            TouchPhase::Started => {
                self.touches.retain(|(tid, _)| *tid != id);
                self.touches.push((id, location));
                self.pending.push(InputEvent::TouchStart { touches: self.touch_points() });
            }
            TouchPhase::Moved => {
                if let Some(entry) = self.touches.iter_mut().find(|(tid, _)| *tid == id) {
                    entry.1 = location;
                    self.pending.push(InputEvent::TouchMove { touches: self.touch_points() });
                }
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.touches.retain(|(tid, _)| *tid != id);
                self.pending.push(InputEvent::TouchEnd { touches: self.touch_points() });
            }
        }
    }

    fn touch_points(&self) -> Vec<Vec2> {
        self.touches.iter().map(|(_, p)| *p).collect()
    }

    /// Update the surface size used to normalize pointer positions
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Vec2::new(width.max(1) as f32, height.max(1) as f32);
    }

    /// Take all events staged since the last call
    pub fn drain_events(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Check if key is currently pressed
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Resolve held keys through the fixed key map
    pub fn movement_keys(&self) -> MovementKeys {
        let mut keys = MovementKeys::default();
        for (action, codes) in KEYBOARD_MAP.iter() {
            if !codes.iter().any(|code| self.keys_pressed.contains(code)) {
                continue;
            }
            match action {
                KeyAction::Forward => keys.forward = true,
                KeyAction::Backward => keys.backward = true,
                KeyAction::Left => keys.left = true,
                KeyAction::Right => keys.right = true,
                KeyAction::Up => keys.up = true,
                KeyAction::Down => keys.down = true,
            }
        }
        keys
    }

    /// Whether touch input has been seen (drift is disabled for touch devices)
    pub fn is_touch_primary(&self) -> bool {
        self.touch_primary
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_map() {
        let mut input = InputState::new(800, 600);
        assert_eq!(input.movement_keys(), MovementKeys::default());

        input.on_key(KeyCode::KeyW, ElementState::Pressed);
        input.on_key(KeyCode::ArrowLeft, ElementState::Pressed);
        input.on_key(KeyCode::KeyE, ElementState::Pressed);
        let keys = input.movement_keys();
        assert!(keys.forward && keys.left && keys.up);
        assert!(!keys.backward && !keys.right && !keys.down);

        input.on_key(KeyCode::KeyW, ElementState::Released);
        assert!(!input.movement_keys().forward);
        assert!(input.is_key_pressed(KeyCode::ArrowLeft));
    }

    #[test]
    fn test_unmapped_key_ignored() {
        let mut input = InputState::new(800, 600);
        input.on_key(KeyCode::Space, ElementState::Pressed);
        assert_eq!(input.movement_keys(), MovementKeys::default());
    }

    #[test]
    fn test_pointer_normalization() {
        let mut input = InputState::new(800, 600);
        input.on_cursor_moved(Vec2::new(800.0, 0.0));
        input.on_cursor_moved(Vec2::new(400.0, 300.0));
        let events = input.drain_events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            InputEvent::PointerMove { normalized, .. } => {
                assert!((normalized.x - 1.0).abs() < 1e-6);
                assert!((normalized.y - 1.0).abs() < 1e-6);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match &events[1] {
            InputEvent::PointerMove { normalized, .. } => assert!(normalized.length() < 1e-6),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(input.drain_events().is_empty());
    }

    #[test]
    fn test_drag_uses_last_cursor_position() {
        let mut input = InputState::new(800, 600);
        input.on_cursor_moved(Vec2::new(10.0, 20.0));
        input.on_mouse_button(MouseButton::Right, ElementState::Pressed);
        input.on_mouse_button(MouseButton::Left, ElementState::Pressed);
        input.on_cursor_left();
        let events = input.drain_events();
        assert_eq!(events[1], InputEvent::PointerDown { position: Vec2::new(10.0, 20.0) });
        assert_eq!(events[2], InputEvent::PointerLeave);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_touch_tracking() {
        let mut input = InputState::new(800, 600);
        assert!(!input.is_touch_primary());

        input.on_touch(1, TouchPhase::Started, Vec2::new(0.0, 0.0));
        input.on_touch(2, TouchPhase::Started, Vec2::new(100.0, 0.0));
        input.on_touch(2, TouchPhase::Moved, Vec2::new(150.0, 0.0));
        input.on_touch(1, TouchPhase::Ended, Vec2::new(0.0, 0.0));
        // Moves for unknown touches are dropped
        input.on_touch(9, TouchPhase::Moved, Vec2::new(5.0, 5.0));

        let events = input.drain_events();
        assert!(input.is_touch_primary());
        assert_eq!(events.len(), 4);
        assert_eq!(events[2], InputEvent::TouchMove {
            touches: vec![Vec2::new(0.0, 0.0), Vec2::new(150.0, 0.0)],
        });
        assert_eq!(events[3], InputEvent::TouchEnd { touches: vec![Vec2::new(150.0, 0.0)] });
    }
}
