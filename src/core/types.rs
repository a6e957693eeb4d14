//! Core type aliases and re-exports

pub use glam::{
    Vec2, Vec3, Vec4,
    Mat4,
    IVec3,
};

/// Standard Result type for the canvas
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
