//! Distance and depth fade
//!
//! Tile opacity combines two falloffs: a grid fade on the Chebyshev chunk
//! distance to the camera's chunk, and a depth fade on the Z distance to
//! the camera. The depth term is squared so far planes start fading sooner.

use crate::core::config::FadeConfig;

/// Smallest span used as a divisor, so zero-width fades stay finite
const MIN_SPAN: f32 = 1e-4;

/// 1.0 within `render_distance` chunks, falling linearly to 0.0 over
/// `margin` chunks beyond it.
///
/// ```
/// use tessera::render::fade::grid_fade;
///
/// assert_eq!(grid_fade(2.0, 2, 1.0), 1.0);
/// assert_eq!(grid_fade(2.5, 2, 1.0), 0.5);
/// assert_eq!(grid_fade(3.0, 2, 1.0), 0.0);
/// ```
pub fn grid_fade(grid_distance: f32, render_distance: u32, margin: f32) -> f32 {
    let beyond = grid_distance - render_distance as f32;
    if beyond <= 0.0 {
        return 1.0;
    }
    (1.0 - beyond / margin.max(MIN_SPAN)).max(0.0)
}

/// 1.0 up to `start`, falling linearly to 0.0 at `end`.
///
/// ```
/// use tessera::render::fade::depth_fade;
///
/// assert_eq!(depth_fade(100.0, 140.0, 260.0), 1.0);
/// assert_eq!(depth_fade(200.0, 140.0, 260.0), 0.5);
/// assert_eq!(depth_fade(300.0, 140.0, 260.0), 0.0);
/// ```
pub fn depth_fade(abs_depth: f32, start: f32, end: f32) -> f32 {
    if abs_depth <= start {
        return 1.0;
    }
    (1.0 - (abs_depth - start) / (end - start).max(MIN_SPAN)).max(0.0)
}

/// Opacity a tile eases toward: `min(grid, depth²)`
pub fn target_opacity(grid: f32, depth: f32) -> f32 {
    grid.min(depth * depth)
}

/// Whether a tile is so far away in depth that it is dropped outright
pub fn is_depth_culled(abs_depth: f32, config: &FadeConfig) -> bool {
    abs_depth > config.depth_fade_end + config.depth_cull_margin
}

/// One easing step from `current` toward `target`.
///
/// Once both sit below the invisible threshold the result snaps to zero.
///
/// ```
/// use tessera::render::fade::smooth_opacity;
///
/// assert!((smooth_opacity(0.0, 1.0, 0.18, 0.01) - 0.18).abs() < 1e-6);
/// assert_eq!(smooth_opacity(0.005, 0.0, 0.18, 0.01), 0.0);
/// ```
pub fn smooth_opacity(current: f32, target: f32, lerp: f32, invisible: f32) -> f32 {
    if target < invisible && current < invisible {
        0.0
    } else {
        current + (target - current) * lerp
    }
}

/// Target opacity for a tile at the given grid and depth distance
pub fn fade_target(grid_distance: u32, abs_depth: f32, config: &FadeConfig) -> f32 {
    let grid = grid_fade(grid_distance as f32, config.render_distance, config.chunk_fade_margin);
    let depth = depth_fade(abs_depth, config.depth_fade_start, config.depth_fade_end);
    target_opacity(grid, depth)
}
