//! Perspective camera for the canvas
//!
//! The canvas camera never rotates: it always looks down -Z, and navigation
//! only translates it. Moving "forward" therefore decreases Z.

use crate::core::config::CameraConfig;
use crate::core::types::{Mat4, Vec3};

/// Camera with position and projection parameters
#[derive(Clone, Debug)]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Camera {
    /// Create a new camera
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            position,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 1.0,
            far: 500.0,
        }
    }

    /// Create the starting camera described by a config
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, config.initial_z),
            fov_y: config.fov_degrees.to_radians(),
            aspect,
            near: config.near,
            far: config.far,
        }
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_translation(-self.position)
    }

    /// Get projection matrix (camera to clip space)
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Update aspect ratio (call on window resize)
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default(), 16.0 / 9.0)
    }
}
