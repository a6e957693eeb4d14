//! Tile fades, GPU pipeline and frame rendering

pub mod fade;
pub mod tile;
pub mod context;
pub mod pipeline;
pub mod gpu_textures;
pub mod renderer;

pub use tile::{DrawState, Tile, TileLoad};
pub use context::GpuContext;
pub use pipeline::{TileGlobals, TileInstance, TilePipeline};
pub use gpu_textures::GpuTextures;
pub use renderer::Renderer;
