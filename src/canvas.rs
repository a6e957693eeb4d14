//! Canvas engine
//!
//! Owns every subsystem of the infinite canvas and runs them in frame order:
//! camera integration, chunk window tracking, deferred layout generation,
//! texture delivery and tile fades. Rendering reads the result through
//! [`Canvas::draw_list`].

use std::collections::HashMap;
use std::time::Instant;

use crate::core::camera::Camera;
use crate::core::camera_controller::{CameraController, CameraGridState, CursorStyle, FrameMotion};
use crate::core::config::CanvasConfig;
use crate::core::input::{InputEvent, MovementKeys};
use crate::core::time::FrameTimer;
use crate::core::types::{Vec2, Vec3};
use crate::media::MediaItem;
use crate::render::tile::Tile;
use crate::streaming::chunk::ChunkCoord;
use crate::streaming::layout::ChunkLayout;
use crate::streaming::manager::{ChunkManager, ChunkSetDiff, Throttle};
use crate::streaming::scheduler::DeferredScheduler;
use crate::texture::cache::TextureCache;
use crate::texture::loader::TextureLoader;
use crate::texture::progress::ProgressCallback;

const DESKTOP_HINT: &str = "WASD Move · QE Up/Down · Scroll Zoom";
const TOUCH_HINT: &str = "Drag Pan · Pinch Zoom";

/// What happened during one [`Canvas::frame`]
#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    /// Chunk window move applied this frame, if any
    pub chunk_update: Option<ChunkSetDiff>,
    /// Texture loads delivered
    pub textures_settled: usize,
    /// Playing clips whose visible frame changed this frame
    pub video_frames: usize,
    pub visible_tiles: usize,
}

/// One tile ready for the GPU
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub texture_id: u64,
    pub center: Vec3,
    pub size: Vec2,
    pub opacity: f32,
    pub opaque: bool,
}

pub struct Canvas {
    config: CanvasConfig,
    media: Vec<MediaItem>,
    controller: CameraController,
    manager: ChunkManager,
    layout: ChunkLayout,
    scheduler: Box<dyn DeferredScheduler>,
    textures: TextureCache,
    tiles: HashMap<ChunkCoord, Vec<Tile>>,
    camera: Camera,
    grid: CameraGridState,
    timer: FrameTimer,
    touch_primary: bool,
}

impl Canvas {
    /// Build a canvas over `media`. The starting chunk window is queued on
    /// `scheduler` right away; nothing is generated until
    /// [`run_deferred`](Self::run_deferred).
    pub fn new(
        config: CanvasConfig,
        media: Vec<MediaItem>,
        scheduler: Box<dyn DeferredScheduler>,
        loader: Box<dyn TextureLoader>,
        aspect: f32,
        now: Instant,
    ) -> Self {
        let camera = Camera::from_config(&config.camera, aspect);
        let controller = CameraController::new(config.motion.clone(), camera.position);
        let grid = controller.grid();
        let (manager, initial) = ChunkManager::new(
            config.fade.render_distance,
            Throttle::from_config(&config.chunks),
            grid.chunk,
            now,
        );
        let layout = ChunkLayout::new(&config.chunks, media.len());

        if media.is_empty() {
            log::warn!("No media supplied, canvas will stay empty");
        } else {
            log::info!("Canvas created with {} media items", media.len());
        }

        let mut canvas = Self {
            controller,
            manager,
            layout,
            scheduler,
            textures: TextureCache::new(loader),
            tiles: HashMap::new(),
            camera,
            grid,
            timer: FrameTimer::starting_at(now),
            touch_primary: false,
            media,
            config,
        };
        canvas.apply_diff(&initial, now);
        canvas
    }

    /// Stage an input intent for the next frame
    pub fn handle_input(&mut self, event: &InputEvent) {
        self.controller.handle_event(event);
    }

    /// Advance one frame.
    ///
    /// The chunk used for tile fades is always the one derived from this
    /// frame's camera integration.
    pub fn frame(&mut self, keys: MovementKeys, now: Instant) -> FrameStats {
        self.timer.tick_at(now);

        let motion: FrameMotion = self.controller.update(keys);
        self.camera.position = motion.camera_position;
        self.grid = motion.grid;

        let speed = motion.velocity.length();
        let chunk_update = self.manager.observe(motion.grid.chunk, speed, now);
        if let Some(diff) = &chunk_update {
            self.apply_diff(diff, now);
        }

        let textures_settled = self.textures.pump(now);
        let video_frames = self.textures.maintain_videos(now);

        let mut visible_tiles = 0;
        for tile in self.tiles.values_mut().flatten() {
            if tile.update(&self.grid, &self.config.fade).visible {
                visible_tiles += 1;
            }
        }

        log::trace!(
            "frame {}: {} tiles visible, {} chunks queued",
            self.timer.frame_count(), visible_tiles, self.scheduler.pending()
        );

        FrameStats {
            chunk_update,
            textures_settled,
            video_frames,
            visible_tiles,
        }
    }

    /// Drain deferred chunk generation for the slice that began at
    /// `slice_start`. Returns the number of chunks generated.
    pub fn run_deferred(&mut self, slice_start: Instant) -> usize {
        self.run_deferred_with(slice_start, Instant::now)
    }

    /// [`run_deferred`](Self::run_deferred) with an explicit clock
    pub fn run_deferred_with(&mut self, slice_start: Instant, mut clock: impl FnMut() -> Instant) -> usize {
        let mut generated = 0;
        while let Some(coord) = self.scheduler.next_ready(slice_start, clock()) {
            if self.generate_chunk(coord) {
                generated += 1;
            }
        }
        generated
    }

    fn apply_diff(&mut self, diff: &ChunkSetDiff, now: Instant) {
        for coord in &diff.removed {
            self.scheduler.cancel(*coord);
            self.tiles.remove(coord);
        }
        if self.media.is_empty() {
            return;
        }
        for coord in &diff.added {
            self.scheduler.schedule(*coord, now);
        }
    }

    fn generate_chunk(&mut self, coord: ChunkCoord) -> bool {
        if !self.manager.is_active(coord) || self.tiles.contains_key(&coord) {
            return false;
        }

        let planes = self.layout.planes(coord);
        let mut tiles = Vec::with_capacity(planes.len());
        for plane in planes.iter() {
            let Some(media) = self.media.get(plane.media_index) else {
                continue;
            };
            let mut tile = Tile::new(*plane, media);
            tile.request_texture(&mut self.textures, media);
            tiles.push(tile);
        }
        log::debug!("Chunk {} generated ({} tiles)", coord, tiles.len());
        self.tiles.insert(coord, tiles);
        true
    }

    /// Visible tiles in draw order: opaque tiles grouped by texture, then
    /// translucent tiles back to front.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut opaque = Vec::new();
        let mut translucent = Vec::new();

        for tile in self.tiles.values().flatten() {
            let draw = tile.draw_state();
            if !draw.visible {
                continue;
            }
            let Some(texture) = tile.texture() else {
                continue;
            };
            let scale = tile.display_scale();
            let item = DrawItem {
                texture_id: texture.id(),
                center: tile.plane().position,
                size: Vec2::new(scale.x, scale.y),
                opacity: draw.opacity,
                opaque: draw.depth_write,
            };
            if item.opaque {
                opaque.push(item);
            } else {
                translucent.push(item);
            }
        }

        opaque.sort_by_key(|item| item.texture_id);
        let cam_z = self.camera.position.z;
        translucent.sort_by(|a, b| {
            let da = (cam_z - a.center.z).abs();
            let db = (cam_z - b.center.z).abs();
            db.total_cmp(&da)
        });
        opaque.extend(translucent);
        opaque
    }

    /// Window title with the optional FPS counter and control hints
    pub fn window_title(&self) -> String {
        let mut title = String::from("Tessera");
        if self.config.show_fps {
            title.push_str(&format!(" · {:.0} FPS", self.timer.fps()));
        }
        if self.config.show_controls {
            title.push_str(" · ");
            title.push_str(if self.touch_primary { TOUCH_HINT } else { DESKTOP_HINT });
        }
        title
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.textures.set_progress_callback(callback);
    }

    pub fn set_touch_primary(&mut self, touch_primary: bool) {
        self.touch_primary = touch_primary;
        self.controller.set_touch_primary(touch_primary);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_aspect(width as f32, height as f32);
    }

    pub fn cursor(&self) -> CursorStyle {
        self.controller.cursor()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn grid(&self) -> CameraGridState {
        self.grid
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    pub fn manager(&self) -> &ChunkManager {
        &self.manager
    }

    pub fn pending_chunks(&self) -> usize {
        self.scheduler.pending()
    }

    /// Tiles of every generated chunk
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values().flatten()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.values().map(Vec::len).sum()
    }

    pub fn generated_chunks(&self) -> usize {
        self.tiles.len()
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;
    use std::time::Duration;

    use crate::render::tile::TileLoad;
    use crate::streaming::chunk::chunk_offsets;
    use crate::streaming::scheduler::{IdleScheduler, ImmediateScheduler};
    use crate::texture::cache::testing::ManualLoader;

    fn media(count: usize) -> Vec<MediaItem> {
        (0..count).map(|i| MediaItem::image(format!("media/{}.png", i), 400.0, 300.0)).collect()
    }

    fn canvas(media: Vec<MediaItem>, now: Instant) -> (Canvas, ManualLoader) {
        let loader = ManualLoader::default();
        let canvas = Canvas::new(
            CanvasConfig::default(),
            media,
            Box::new(ImmediateScheduler::new()),
            Box::new(loader.clone()),
            16.0 / 9.0,
            now,
        );
        (canvas, loader)
    }

    #[test]
    fn test_origin_neighbourhood_scenario() {
        let now = Instant::now();
        let (mut canvas, _loader) = canvas(media(4), now);
        let origin = canvas.grid().chunk;
        assert_eq!(origin, ChunkCoord::new(0, 0, 0));

        // Nothing is generated until the deferred slice runs
        assert_eq!(canvas.tile_count(), 0);
        canvas.frame(MovementKeys::default(), now);
        let generated = canvas.run_deferred(now);

        let expected: HashSet<ChunkCoord> = chunk_offsets(CanvasConfig::default().fade.render_distance)
            .into_iter()
            .map(|o| origin.offset(o))
            .collect();
        assert_eq!(generated, expected.len());
        assert_eq!(canvas.generated_chunks(), expected.len());

        let per_chunk = CanvasConfig::default().chunks.planes_per_chunk;
        assert_eq!(canvas.tile_count(), expected.len() * per_chunk);
        for tile in canvas.tiles() {
            assert!(expected.contains(&tile.id().chunk));
            assert!(tile.plane().media_index < 4);
        }
    }

    #[test]
    fn test_empty_media_generates_nothing() {
        let now = Instant::now();
        let (mut canvas, loader) = canvas(Vec::new(), now);
        assert_eq!(canvas.pending_chunks(), 0);

        for i in 0..5u32 {
            let stats = canvas.frame(MovementKeys { forward: true, ..Default::default() }, now + i * Duration::from_millis(16));
            assert_eq!(stats.visible_tiles, 0);
        }
        assert_eq!(canvas.run_deferred(now), 0);
        assert_eq!(canvas.tile_count(), 0);
        assert_eq!(loader.request_count(), 0);
        assert!(canvas.draw_list().is_empty());
    }

    #[test]
    fn test_texture_requests_deduplicated_across_tiles() {
        let now = Instant::now();
        let (mut canvas, loader) = canvas(media(2), now);
        canvas.run_deferred(now);

        assert!(canvas.tile_count() > 2);
        assert_eq!(loader.request_count(), 2);
        assert_eq!(canvas.textures().len(), 2);
    }

    #[test]
    fn test_tiles_fade_in_after_load() {
        let now = Instant::now();
        let (mut canvas, loader) = canvas(media(3), now);
        canvas.run_deferred(now);

        let stats = canvas.frame(MovementKeys::default(), now);
        assert_eq!(stats.visible_tiles, 0);
        assert!(canvas.draw_list().is_empty());

        loader.complete_all(400, 300);
        let mut last = FrameStats::default();
        for i in 1..=60u32 {
            last = canvas.frame(MovementKeys::default(), now + i * Duration::from_millis(16));
        }
        assert!(last.visible_tiles > 0);
        assert!(canvas.tiles().all(|t| t.load_state() == TileLoad::Ready));

        let draws = canvas.draw_list();
        assert_eq!(draws.len(), last.visible_tiles);
        assert!(draws.iter().any(|d| d.opaque));
        for draw in &draws {
            assert!((draw.size.x / draw.size.y - 4.0 / 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_draw_list_orders_opaque_then_back_to_front() {
        let now = Instant::now();
        let (mut canvas, loader) = canvas(media(4), now);
        canvas.run_deferred(now);
        loader.complete_all(64, 64);
        for i in 0..4u32 {
            canvas.frame(MovementKeys::default(), now + i * Duration::from_millis(16));
        }

        let draws = canvas.draw_list();
        let first_translucent = draws.iter().position(|d| !d.opaque).unwrap_or(draws.len());
        assert!(draws[first_translucent..].iter().all(|d| !d.opaque));
        assert!(draws[..first_translucent].windows(2).all(|w| w[0].texture_id <= w[1].texture_id));

        let cam_z = canvas.camera().position.z;
        let depths: Vec<f32> = draws[first_translucent..].iter().map(|d| (cam_z - d.center.z).abs()).collect();
        assert!(depths.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_chunk_churn_updates_window_once_per_interval() {
        let now = Instant::now();
        let (mut canvas, _loader) = canvas(media(4), now);
        canvas.run_deferred(now);

        // Fly forward fast; the window lags behind but catches up
        let keys = MovementKeys { forward: true, ..Default::default() };
        let mut updates = Vec::new();
        for i in 1..=400u32 {
            let stats = canvas.frame(keys, now + i * Duration::from_millis(16));
            if let Some(diff) = stats.chunk_update {
                updates.push((i, diff));
            }
            canvas.run_deferred(now);
        }
        assert!(!updates.is_empty());

        let min_interval = Throttle::from_config(&CanvasConfig::default().chunks).base;
        for pair in updates.windows(2) {
            let elapsed = Duration::from_millis(16) * (pair[1].0 - pair[0].0);
            assert!(elapsed >= min_interval);
        }

        // Evicted chunks drop their tiles; only active chunks keep tiles
        for tile in canvas.tiles() {
            assert!(canvas.manager().is_active(tile.id().chunk));
        }
    }

    #[test]
    fn test_removed_chunk_cancels_queued_generation() {
        let now = Instant::now();
        let loader = ManualLoader::default();
        // Zero budget and a long timeout: nothing runs on its own
        let scheduler = IdleScheduler::new(Duration::ZERO, Duration::from_secs(3600));
        let mut config = CanvasConfig::default();
        config.chunks.throttle_base_ms = 0;
        config.chunks.throttle_max_ms = 0;
        let mut canvas = Canvas::new(config, media(2), Box::new(scheduler), Box::new(loader), 1.0, now);
        let initial = canvas.pending_chunks();
        assert_eq!(initial, chunk_offsets(2).len());

        // Zoom back until the window moves one chunk along Z
        let keys = MovementKeys { backward: true, ..Default::default() };
        let mut moved = None;
        for i in 1..=600u32 {
            if let Some(diff) = canvas.frame(keys, now + i * Duration::from_millis(16)).chunk_update {
                moved = Some(diff);
                break;
            }
        }
        let diff = moved.expect("camera should cross a chunk boundary");
        assert!(!diff.removed.is_empty());
        // Removed chunks were cancelled, added ones queued
        assert_eq!(canvas.pending_chunks(), initial - diff.removed.len() + diff.added.len());
        assert_eq!(canvas.run_deferred_with(now, || now + Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_progress_reported_through_canvas() {
        let now = Instant::now();
        let (mut canvas, loader) = canvas(media(2), now);
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reports);
        canvas.set_progress_callback(Box::new(move |p| sink.borrow_mut().push(p)));

        canvas.run_deferred(now);
        loader.complete_all(8, 8);
        canvas.frame(MovementKeys::default(), now + Duration::from_millis(16));

        let reports = reports.borrow();
        assert_eq!(reports.last(), Some(&100));
        assert!(reports.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_window_title() {
        let now = Instant::now();
        let loader = ManualLoader::default();
        let mut config = CanvasConfig::default();
        assert_eq!(canvas(media(1), now).0.window_title(), "Tessera");

        config.show_controls = true;
        let mut canvas = Canvas::new(config, media(1), Box::new(ImmediateScheduler::new()), Box::new(loader), 1.0, now);
        assert_eq!(canvas.window_title(), format!("Tessera · {}", DESKTOP_HINT));
        canvas.set_touch_primary(true);
        assert_eq!(canvas.window_title(), format!("Tessera · {}", TOUCH_HINT));
    }
}
