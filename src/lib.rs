//! Tessera - an infinite, camera-driven canvas of streamed media tiles

pub mod core;
pub mod media;
pub mod streaming;
pub mod texture;
pub mod render;
pub mod canvas;

pub use canvas::{Canvas, DrawItem, FrameStats};
