//! Per-tile load state and fade
//!
//! A tile moves `Unloaded -> Loading -> Ready` as its texture arrives.
//! Ready tiles ease their opacity toward the fade target every frame; a
//! tile that received the placeholder settles in `Failed` and never draws.

use std::cell::Cell;
use std::rc::Rc;

use glam::Vec3;

use crate::core::camera_controller::CameraGridState;
use crate::core::config::FadeConfig;
use crate::media::MediaItem;
use crate::render::fade;
use crate::streaming::layout::{PlaneData, PlaneId};
use crate::texture::cache::{TextureCache, TextureHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileLoad {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

/// GPU draw state derived from a tile's fade
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawState {
    pub visible: bool,
    /// Opacity fed to blending; 1.0 once effectively opaque
    pub opacity: f32,
    pub depth_write: bool,
}

impl DrawState {
    pub const HIDDEN: DrawState = DrawState { visible: false, opacity: 0.0, depth_write: false };
}

pub struct Tile {
    plane: PlaneData,
    declared_aspect: f32,
    texture: Option<TextureHandle>,
    load: Rc<Cell<TileLoad>>,
    opacity: f32,
    /// Toggles every frame; idle tiles only re-evaluate on odd frames
    odd_frame: bool,
    draw: DrawState,
}

impl Tile {
    pub fn new(plane: PlaneData, media: &MediaItem) -> Self {
        Self {
            plane,
            declared_aspect: media.aspect(),
            texture: None,
            load: Rc::new(Cell::new(TileLoad::Unloaded)),
            opacity: 0.0,
            odd_frame: false,
            draw: DrawState::HIDDEN,
        }
    }

    /// Ask the cache for this tile's texture. Only the first call loads.
    pub fn request_texture(&mut self, cache: &mut TextureCache, media: &MediaItem) {
        if self.load.get() != TileLoad::Unloaded {
            return;
        }
        self.load.set(TileLoad::Loading);
        let load = Rc::clone(&self.load);
        let handle = cache.get_texture(
            media,
            Some(Box::new(move |texture: &TextureHandle| {
                load.set(if texture.is_placeholder() { TileLoad::Failed } else { TileLoad::Ready });
                Ok(())
            })),
        );
        self.texture = Some(handle);
    }

    /// Advance one frame against the camera's grid state
    pub fn update(&mut self, grid: &CameraGridState, config: &FadeConfig) -> DrawState {
        self.odd_frame = !self.odd_frame;

        if self.load.get() != TileLoad::Ready {
            self.opacity = 0.0;
            self.draw = DrawState::HIDDEN;
            return self.draw;
        }

        if self.opacity < config.invisible_threshold && !self.draw.visible && !self.odd_frame {
            return self.draw;
        }

        let abs_depth = (self.plane.position.z - grid.cam_z).abs();
        if fade::is_depth_culled(abs_depth, config) {
            self.opacity = 0.0;
            self.draw = DrawState::HIDDEN;
            return self.draw;
        }

        let grid_distance = self.plane.id.chunk.grid_distance(grid.chunk);
        let target = fade::fade_target(grid_distance, abs_depth, config);
        self.opacity = fade::smooth_opacity(self.opacity, target, config.opacity_lerp, config.invisible_threshold);

        let opaque = self.opacity > config.opaque_threshold;
        self.draw = DrawState {
            visible: self.opacity > config.invisible_threshold,
            opacity: if opaque { 1.0 } else { self.opacity },
            depth_write: opaque,
        };
        self.draw
    }

    /// Rendered size: base height with width from the media's aspect.
    ///
    /// Uses the loaded texture's pixel size when known, else the declared
    /// media size, else a square.
    pub fn display_scale(&self) -> Vec3 {
        let aspect = self
            .texture
            .as_ref()
            .filter(|t| t.is_ready())
            .and_then(|t| t.aspect())
            .unwrap_or(self.declared_aspect);
        let height = self.plane.scale.y;
        Vec3::new(height * aspect, height, 1.0)
    }

    pub fn id(&self) -> PlaneId {
        self.plane.id
    }

    pub fn plane(&self) -> &PlaneData {
        &self.plane
    }

    pub fn load_state(&self) -> TileLoad {
        self.load.get()
    }

    pub fn texture(&self) -> Option<&TextureHandle> {
        self.texture.as_ref()
    }

    pub fn draw_state(&self) -> DrawState {
        self.draw
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::streaming::chunk::ChunkCoord;
    use crate::texture::cache::testing::ManualLoader;
    use crate::texture::decode::{Decoded, DecodedImage};
    use std::time::Instant;

    fn plane_at(chunk: ChunkCoord, z: f32) -> PlaneData {
        PlaneData {
            id: PlaneId { chunk, index: 0 },
            position: Vec3::new(chunk.world_origin().x + 10.0, chunk.world_origin().y + 10.0, z),
            scale: Vec3::new(20.0, 20.0, 1.0),
            media_index: 0,
        }
    }

    fn grid(chunk: ChunkCoord, cam_z: f32) -> CameraGridState {
        CameraGridState { chunk, cam_z }
    }

    fn ready_tile(plane: PlaneData, media: &MediaItem) -> (Tile, TextureCache) {
        let loader = ManualLoader::default();
        let mut cache = TextureCache::new(Box::new(loader.clone()));
        let mut tile = Tile::new(plane, media);
        tile.request_texture(&mut cache, media);
        loader.complete_all(400, 200);
        cache.pump(Instant::now());
        assert_eq!(tile.load_state(), TileLoad::Ready);
        (tile, cache)
    }

    #[test]
    fn test_unloaded_tile_never_draws() {
        let origin = ChunkCoord::new(0, 0, 0);
        let media = MediaItem::image("a", 1.0, 1.0);
        let mut tile = Tile::new(plane_at(origin, 10.0), &media);
        for _ in 0..10 {
            assert_eq!(tile.update(&grid(origin, 20.0), &FadeConfig::default()), DrawState::HIDDEN);
        }
        assert_eq!(tile.load_state(), TileLoad::Unloaded);
    }

    #[test]
    fn test_ready_tile_fades_in_to_opaque() {
        let origin = ChunkCoord::new(0, 0, 0);
        let media = MediaItem::image("a", 1.0, 1.0);
        let (mut tile, _cache) = ready_tile(plane_at(origin, 10.0), &media);
        let config = FadeConfig::default();

        let first = tile.update(&grid(origin, 20.0), &config);
        assert!(first.visible);
        assert!((first.opacity - 0.18).abs() < 1e-5);
        assert!(!first.depth_write);

        let mut state = first;
        for _ in 0..60 {
            state = tile.update(&grid(origin, 20.0), &config);
        }
        assert!(state.visible && state.depth_write);
        assert_eq!(state.opacity, 1.0);
    }

    #[test]
    fn test_far_depth_hard_culls_immediately() {
        let origin = ChunkCoord::new(0, 0, 0);
        let media = MediaItem::image("a", 1.0, 1.0);
        let (mut tile, _cache) = ready_tile(plane_at(origin, 0.0), &media);
        let config = FadeConfig::default();
        for _ in 0..60 {
            tile.update(&grid(origin, 10.0), &config);
        }
        assert!(tile.draw_state().depth_write);

        let culled = tile.update(&grid(origin, 400.0), &config);
        assert_eq!(culled, DrawState::HIDDEN);
        assert_eq!(tile.opacity(), 0.0);
    }

    #[test]
    fn test_invisible_tile_evaluates_every_other_frame() {
        let origin = ChunkCoord::new(0, 0, 0);
        let media = MediaItem::image("a", 1.0, 1.0);
        let (mut tile, _cache) = ready_tile(plane_at(origin, 0.0), &media);
        let config = FadeConfig::default();

        // Frame 1 (odd) evaluates, frame 2 (even) idles
        let a = tile.update(&grid(origin, 5.0), &config);
        assert!(a.visible);
        let mut far = ready_tile(plane_at(origin, 0.0), &media).0;
        let grid_far = grid(ChunkCoord::new(9, 0, 0), 5.0);
        assert!(!far.update(&grid_far, &config).visible);
        // Now in view again; even frame skips, odd frame picks it up
        assert!(!far.update(&grid(origin, 5.0), &config).visible);
        assert!(far.update(&grid(origin, 5.0), &config).visible);
    }

    #[test]
    fn test_failed_tile_stays_hidden() {
        let origin = ChunkCoord::new(0, 0, 0);
        let media = MediaItem::image("broken", 1.0, 1.0);
        let loader = ManualLoader::default();
        let mut cache = TextureCache::new(Box::new(loader.clone()));
        let mut tile = Tile::new(plane_at(origin, 0.0), &media);
        tile.request_texture(&mut cache, &media);
        assert_eq!(tile.load_state(), TileLoad::Loading);

        let id = tile.texture().map(|t| t.id()).unwrap();
        loader.complete(id, "broken", Err(Error::Fetch("HTTP 500".into())));
        cache.pump(Instant::now());

        assert_eq!(tile.load_state(), TileLoad::Failed);
        for _ in 0..10 {
            assert_eq!(tile.update(&grid(origin, 1.0), &FadeConfig::default()), DrawState::HIDDEN);
        }
    }

    #[test]
    fn test_display_scale_prefers_loaded_aspect() {
        let origin = ChunkCoord::new(0, 0, 0);
        let media = MediaItem::image("wide", 100.0, 100.0);
        let loader = ManualLoader::default();
        let mut cache = TextureCache::new(Box::new(loader.clone()));
        let mut tile = Tile::new(plane_at(origin, 0.0), &media);

        // Declared 1:1 before load
        assert_eq!(tile.display_scale(), Vec3::new(20.0, 20.0, 1.0));
        tile.request_texture(&mut cache, &media);
        assert_eq!(tile.display_scale(), Vec3::new(20.0, 20.0, 1.0));

        let id = tile.texture().map(|t| t.id()).unwrap();
        loader.complete(id, "wide", Ok(Decoded::still(DecodedImage::solid(300, 100, [0; 4]))));
        cache.pump(Instant::now());
        assert_eq!(tile.display_scale(), Vec3::new(60.0, 20.0, 1.0));
    }

    #[test]
    fn test_degenerate_media_renders_square() {
        let media = MediaItem::image("zero", 0.0, 0.0);
        let tile = Tile::new(plane_at(ChunkCoord::new(0, 0, 0), 0.0), &media);
        assert_eq!(tile.display_scale(), Vec3::new(20.0, 20.0, 1.0));
    }
}
