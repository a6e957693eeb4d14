//! Canvas configuration
//!
//! All values are optional when loaded from JSON; anything missing falls back
//! to the defaults below, which reproduce the tuned look of the original scene.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Construction parameters for a [`crate::canvas::Canvas`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanvasConfig {
    /// Camera projection and starting depth.
    pub camera: CameraConfig,
    /// Linear fog parameters.
    pub fog: FogConfig,
    /// Clear color behind all tiles.
    pub background_color: HexColor,
    /// Show the FPS counter in the window title.
    pub show_fps: bool,
    /// Show the control hints in the window title.
    pub show_controls: bool,
    /// Input integration tuning.
    pub motion: MotionConfig,
    /// Distance/depth fade tuning.
    pub fade: FadeConfig,
    /// Chunk layout and streaming tuning.
    pub chunks: ChunkConfig,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            fog: FogConfig::default(),
            background_color: HexColor::WHITE,
            show_fps: false,
            show_controls: false,
            motion: MotionConfig::default(),
            fade: FadeConfig::default(),
            chunks: ChunkConfig::default(),
        }
    }
}

impl CanvasConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: CanvasConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded canvas config from {}", path.display());
        Ok(config)
    }

    /// Reject values that would make the scene degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.camera.near <= 0.0 || self.camera.far <= self.camera.near {
            return Err(Error::Config(format!(
                "camera clip planes must satisfy 0 < near < far (near={}, far={})",
                self.camera.near, self.camera.far
            )));
        }
        if self.fade.depth_fade_end < self.fade.depth_fade_start {
            return Err(Error::Config(format!(
                "depth_fade_end ({}) is before depth_fade_start ({})",
                self.fade.depth_fade_end, self.fade.depth_fade_start
            )));
        }
        if self.chunks.tile_size_min <= 0.0 || self.chunks.tile_size_max < self.chunks.tile_size_min {
            return Err(Error::Config(format!(
                "invalid tile size range [{}, {}]",
                self.chunks.tile_size_min, self.chunks.tile_size_max
            )));
        }
        if self.motion.max_velocity <= 0.0 {
            return Err(Error::Config("max_velocity must be positive".to_string()));
        }
        let (zoom_min, zoom_max) = (self.motion.drift_zoom_min, self.motion.drift_zoom_max);
        if !zoom_min.is_finite() || !zoom_max.is_finite() || zoom_min > zoom_max {
            return Err(Error::Config(format!(
                "drift zoom range must satisfy min <= max (min={}, max={})",
                zoom_min, zoom_max
            )));
        }
        if self.motion.drift_zoom_reference <= 0.0 {
            return Err(Error::Config("drift_zoom_reference must be positive".to_string()));
        }
        let per_speed = self.chunks.throttle_per_speed_ms;
        if !per_speed.is_finite() || per_speed < 0.0 {
            return Err(Error::Config(format!(
                "throttle_per_speed_ms must be a non-negative number (got {})",
                per_speed
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Starting depth of the camera.
    pub initial_z: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            near: 1.0,
            far: 500.0,
            initial_z: 50.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FogConfig {
    pub near: f32,
    pub far: f32,
    pub color: HexColor,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            near: 120.0,
            far: 320.0,
            color: HexColor::WHITE,
        }
    }
}

/// Tuning for the damped velocity model. Velocities are in world units per frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionConfig {
    /// Per-axis clamp applied to target velocity.
    pub max_velocity: f32,
    /// Fraction of the gap to target velocity closed each frame.
    pub velocity_lerp: f32,
    /// Multiplier applied to target velocity after each frame.
    pub velocity_decay: f32,
    /// Target velocity nudge per held key per frame.
    pub keyboard_speed: f32,
    /// Pixels of mouse drag to velocity.
    pub drag_factor: f32,
    /// Pixels of one-finger pan to velocity.
    pub touch_pan_factor: f32,
    /// Wheel delta (pixels) to scroll accumulator.
    pub wheel_factor: f32,
    /// Pinch distance change (pixels) to scroll accumulator.
    pub pinch_factor: f32,
    /// Multiplier applied to the scroll accumulator each frame.
    pub scroll_decay: f32,
    /// |vz| above which the camera counts as zooming.
    pub zoom_threshold: f32,
    /// Drift offset at the screen edge for the reference depth.
    pub drift_amount: f32,
    pub drift_lerp: f32,
    pub drift_lerp_zooming: f32,
    /// Depth at which drift uses exactly `drift_amount`.
    pub drift_zoom_reference: f32,
    pub drift_zoom_min: f32,
    pub drift_zoom_max: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            max_velocity: 3.2,
            velocity_lerp: 0.16,
            velocity_decay: 0.9,
            keyboard_speed: 0.18,
            drag_factor: 0.025,
            touch_pan_factor: 0.02,
            wheel_factor: 0.006,
            pinch_factor: 0.006,
            scroll_decay: 0.8,
            zoom_threshold: 0.05,
            drift_amount: 8.0,
            drift_lerp: 0.12,
            drift_lerp_zooming: 0.2,
            drift_zoom_reference: 50.0,
            drift_zoom_min: 0.3,
            drift_zoom_max: 2.0,
        }
    }
}

/// Tuning for per-tile opacity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FadeConfig {
    /// Chebyshev chunk radius rendered at full opacity.
    pub render_distance: u32,
    /// Chunks beyond `render_distance` over which grid fade reaches zero.
    pub chunk_fade_margin: f32,
    pub depth_fade_start: f32,
    pub depth_fade_end: f32,
    /// Extra depth past `depth_fade_end` before a tile is hard-culled.
    pub depth_cull_margin: f32,
    pub invisible_threshold: f32,
    pub opacity_lerp: f32,
    /// Opacity above which a tile is drawn solid with depth writes.
    pub opaque_threshold: f32,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            render_distance: 2,
            chunk_fade_margin: 1.0,
            depth_fade_start: 140.0,
            depth_fade_end: 260.0,
            depth_cull_margin: 50.0,
            invisible_threshold: 0.01,
            opacity_lerp: 0.18,
            opaque_threshold: 0.99,
        }
    }
}

/// Chunk layout, streaming and scheduling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkConfig {
    pub planes_per_chunk: usize,
    pub tile_size_min: f32,
    pub tile_size_max: f32,
    /// Seed mixed with every chunk coordinate.
    pub layout_seed: u32,
    /// Generated layouts kept in memory.
    pub layout_cache_capacity: usize,
    pub throttle_base_ms: u64,
    /// Added throttle per unit of camera speed (units/frame).
    pub throttle_per_speed_ms: f32,
    pub throttle_max_ms: u64,
    /// Time budget for deferred chunk generation per idle slice.
    pub idle_budget_ms: u64,
    /// Deferred work older than this runs even without idle time.
    pub idle_timeout_ms: u64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            planes_per_chunk: 5,
            tile_size_min: 14.0,
            tile_size_max: 26.0,
            layout_seed: 0x5EED_CA57,
            layout_cache_capacity: 4096,
            throttle_base_ms: 100,
            throttle_per_speed_ms: 60.0,
            throttle_max_ms: 400,
            idle_budget_ms: 4,
            idle_timeout_ms: 100,
        }
    }
}

impl ChunkConfig {
    pub fn idle_budget(&self) -> Duration {
        Duration::from_millis(self.idle_budget_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// An sRGB color written as `#rrggbb` in config files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HexColor {
    pub const WHITE: HexColor = HexColor { r: 255, g: 255, b: 255 };

    /// Parse `#rrggbb`, `rrggbb` or the short `#rgb` form.
    pub fn parse(text: &str) -> Result<Self> {
        let hex = text.trim().trim_start_matches('#');
        let bad = || Error::Config(format!("invalid color '{}'", text));
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| bad());
        if !hex.is_ascii() {
            return Err(bad());
        }

        match hex.len() {
            6 => Ok(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            3 => {
                let expand = |s: &str| channel(s).map(|v| v * 17);
                Ok(Self {
                    r: expand(&hex[0..1])?,
                    g: expand(&hex[1..2])?,
                    b: expand(&hex[2..3])?,
                })
            }
            _ => Err(bad()),
        }
    }

    /// Linear-space RGB, for blending and fog in the shader.
    pub fn to_linear(self) -> [f32; 3] {
        fn decode(c: u8) -> f32 {
            let c = c as f32 / 255.0;
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        [decode(self.r), decode(self.g), decode(self.b)]
    }
}

impl TryFrom<String> for HexColor {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        HexColor::parse(&value)
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
    }
}
