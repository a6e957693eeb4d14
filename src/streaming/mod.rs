//! Chunk streaming: coordinates, deterministic layout, and the active window

pub mod chunk;
pub mod cache;
pub mod layout;
pub mod scheduler;
pub mod manager;

pub use chunk::{chunk_offsets, ChunkCoord, CHUNK_SIZE};
pub use cache::LayoutCache;
pub use layout::{ChunkLayout, LayoutParams, PlaneData, PlaneId};
pub use scheduler::{DeferredScheduler, IdleScheduler, ImmediateScheduler};
pub use manager::{ChunkManager, ChunkSetDiff, Throttle};
