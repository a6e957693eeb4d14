//! Media descriptors supplied to the canvas
//!
//! The media list is read once at startup, typically from a JSON manifest:
//!
//! ```json
//! [
//!   { "url": "https://example.com/a.jpg", "width": 1600, "height": 900, "kind": "image" },
//!   { "url": "clips/loop.gif", "width": 480, "height": 480, "kind": "video", "autoplay": false }
//! ]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::Result;

/// Aspect ratio used when a descriptor's dimensions are unusable
pub const DEFAULT_ASPECT: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// One entry of the media list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Cache key and load location (`http(s)://`, `file://` or a path)
    pub url: String,
    pub width: f32,
    pub height: f32,
    pub kind: MediaKind,
    /// Clips start playing on load unless this is `Some(false)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
}

impl MediaItem {
    pub fn image(url: impl Into<String>, width: f32, height: f32) -> Self {
        Self { url: url.into(), width, height, kind: MediaKind::Image, autoplay: None }
    }

    pub fn video(url: impl Into<String>, width: f32, height: f32, autoplay: Option<bool>) -> Self {
        Self { url: url.into(), width, height, kind: MediaKind::Video, autoplay }
    }

    /// Width over height from the declared size, or [`DEFAULT_ASPECT`]
    /// when either dimension is zero, negative or not finite.
    pub fn aspect(&self) -> f32 {
        aspect_or_default(self.width, self.height)
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay.unwrap_or(true)
    }
}

/// `width / height`, falling back to a square for degenerate sizes
pub fn aspect_or_default(width: f32, height: f32) -> f32 {
    if width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite() {
        width / height
    } else {
        DEFAULT_ASPECT
    }
}

/// Parse a media list from JSON text
pub fn parse_manifest(text: &str) -> Result<Vec<MediaItem>> {
    let items: Vec<MediaItem> = serde_json::from_str(text)?;
    let degenerate = items.iter().filter(|m| !(m.width > 0.0 && m.height > 0.0)).count();
    if degenerate > 0 {
        log::warn!("{} media items have degenerate dimensions; using square tiles", degenerate);
    }
    Ok(items)
}

/// Load a media list from a JSON manifest file
pub fn load_manifest(path: &Path) -> Result<Vec<MediaItem>> {
    let text = std::fs::read_to_string(path)?;
    let items = parse_manifest(&text)?;
    log::info!("Loaded {} media items from {}", items.len(), path.display());
    Ok(items)
}
