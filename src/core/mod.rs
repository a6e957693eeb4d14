//! Core canvas types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod config;
pub mod time;
pub mod camera;
pub mod input;
pub mod camera_controller;

pub use types::*;
pub use error::Error;
pub use config::CanvasConfig;
