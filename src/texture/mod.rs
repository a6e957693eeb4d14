//! Texture loading, caching and clip playback

pub mod cache;
pub mod decode;
pub mod loader;
pub mod progress;
pub mod video;

pub use cache::{CacheStats, LoadCallback, Texture, TextureCache, TextureHandle, TextureState};
pub use decode::{ClipFrame, Decoded, DecodedImage};
pub use loader::{AsyncTextureLoader, LoadRequest, LoadResult, TextureLoader};
pub use progress::{ProgressCallback, ProgressTracker};
pub use video::VideoPlayback;
