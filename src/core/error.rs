//! Error types for the canvas

use thiserror::Error;

/// Main error type for the canvas
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Load callback failed: {0}")]
    Callback(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::Fetch(format!("HTTP {}: {}", status.as_u16(), err)),
            None => Error::Fetch(err.to_string()),
        }
    }
}

impl From<mp4::Error> for Error {
    fn from(err: mp4::Error) -> Self {
        Error::Decode(format!("mp4: {}", err))
    }
}

impl From<openh264::Error> for Error {
    fn from(err: openh264::Error) -> Self {
        Error::Decode(format!("h264: {}", err))
    }
}
