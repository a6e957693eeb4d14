//! Deterministic per-chunk tile layout
//!
//! A chunk's planes are a pure function of its coordinate and the layout
//! seed, so chunks that leave and re-enter the active window come back
//! bit-identical. Results are memoized in a [`LayoutCache`].

use std::fmt;
use std::rc::Rc;

use glam::Vec3;

use crate::core::config::ChunkConfig;
use crate::streaming::cache::LayoutCache;
use crate::streaming::chunk::{ChunkCoord, CHUNK_SIZE};

/// Stable identity of a plane: its chunk and index within the chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneId {
    pub chunk: ChunkCoord,
    pub index: u16,
}

impl fmt::Display for PlaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.chunk, self.index)
    }
}

/// One generated media tile
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneData {
    pub id: PlaneId,
    /// World-space centre
    pub position: Vec3,
    /// Base scale; `y` is the tile height before aspect correction
    pub scale: Vec3,
    /// Index into the media list, already reduced modulo its length
    pub media_index: usize,
}

/// Layout parameters that affect the generated planes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutParams {
    pub planes_per_chunk: usize,
    pub tile_size_min: f32,
    pub tile_size_max: f32,
    pub seed: u32,
}

impl From<&ChunkConfig> for LayoutParams {
    fn from(config: &ChunkConfig) -> Self {
        Self {
            planes_per_chunk: config.planes_per_chunk,
            tile_size_min: config.tile_size_min,
            tile_size_max: config.tile_size_max,
            seed: config.layout_seed,
        }
    }
}

/// Memoizing generator of chunk layouts
pub struct ChunkLayout {
    params: LayoutParams,
    media_count: usize,
    cache: LayoutCache,
    generated: u64,
}

impl ChunkLayout {
    /// Create a generator for a media list of `media_count` items
    pub fn new(config: &ChunkConfig, media_count: usize) -> Self {
        Self {
            params: LayoutParams::from(config),
            media_count,
            cache: LayoutCache::new(config.layout_cache_capacity.max(1)),
            generated: 0,
        }
    }

    /// Planes for a chunk, generated on first request and memoized
    pub fn planes(&mut self, coord: ChunkCoord) -> Rc<[PlaneData]> {
        if let Some(planes) = self.cache.get(coord) {
            return planes.clone();
        }

        let planes: Rc<[PlaneData]> = self.generate(coord).into();
        self.generated += 1;
        log::debug!("Generated layout for chunk {} ({} planes)", coord, planes.len());
        self.cache.insert(coord, planes.clone());
        planes
    }

    /// Generate a chunk's planes without touching the memo
    pub fn generate(&self, coord: ChunkCoord) -> Vec<PlaneData> {
        let p = &self.params;
        if self.media_count == 0 || p.planes_per_chunk == 0 {
            return Vec::new();
        }

        let mut rng = LayoutRng::for_chunk(p.seed, coord);
        let origin = coord.world_origin();
        let slab = CHUNK_SIZE / p.planes_per_chunk as f32;

        (0..p.planes_per_chunk)
            .map(|i| {
                let size = rng.range(p.tile_size_min, p.tile_size_max);
                let margin = (size * 0.5).min(CHUNK_SIZE * 0.5);
                // One plane per depth slab keeps siblings from z-fighting
                let local = Vec3::new(
                    rng.range(margin, CHUNK_SIZE - margin),
                    rng.range(margin, CHUNK_SIZE - margin),
                    (i as f32 + rng.next_float()) * slab,
                );
                let media_index = rng.next_u32() as usize % self.media_count;

                PlaneData {
                    id: PlaneId { chunk: coord, index: i as u16 },
                    position: origin + local,
                    scale: Vec3::new(size, size, 1.0),
                    media_index,
                }
            })
            .collect()
    }

    /// Number of layouts computed (cache misses) so far
    pub fn generated_count(&self) -> u64 {
        self.generated
    }

    /// Drop a memoized layout; the next request regenerates it
    pub fn forget(&mut self, coord: ChunkCoord) -> bool {
        self.cache.remove(coord).is_some()
    }

    pub fn media_count(&self) -> usize {
        self.media_count
    }
}

/// Mix a seed and chunk coordinate into a 32-bit hash
fn hash_chunk(seed: u32, coord: ChunkCoord) -> u32 {
    let a = (coord.x as u32).wrapping_mul(0x9e37_79b1);
    let b = (coord.y as u32).wrapping_mul(0x85eb_ca6b);
    let c = (coord.z as u32).wrapping_mul(0xc2b2_ae35);
    let mut v = seed ^ a ^ b ^ c;
    v ^= v >> 16;
    v = v.wrapping_mul(0x7feb_352d);
    v ^= v >> 15;
    v = v.wrapping_mul(0x846c_a68b);
    v ^= v >> 16;
    v
}

/// Small deterministic PCG-style generator
struct LayoutRng {
    state: u64,
}

impl LayoutRng {
    fn for_chunk(seed: u32, coord: ChunkCoord) -> Self {
        let h = hash_chunk(seed, coord) as u64;
        Self { state: (h << 32 | h).wrapping_add(1) }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut h = (self.state >> 32) as u32;
        h = h.wrapping_mul(0x45d9f3b);
        h ^= h >> 16;
        h = h.wrapping_mul(0x45d9f3b);
        h ^= h >> 16;
        h
    }

    /// Uniform in [0, 1)
    fn next_float(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    fn range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_float() * (max - min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(media_count: usize) -> ChunkLayout {
        ChunkLayout::new(&ChunkConfig::default(), media_count)
    }

    fn bits(planes: &[PlaneData]) -> Vec<(PlaneId, [u32; 3], [u32; 3], usize)> {
        planes
            .iter()
            .map(|p| (
                p.id,
                p.position.to_array().map(f32::to_bits),
                p.scale.to_array().map(f32::to_bits),
                p.media_index,
            ))
            .collect()
    }

    #[test]
    fn test_deterministic_across_instances() {
        let coord = ChunkCoord::new(3, -2, 7);
        let a = layout(4).generate(coord);
        let b = layout(4).generate(coord);
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(a.len(), ChunkConfig::default().planes_per_chunk);
    }

    #[test]
    fn test_regenerated_after_forget_is_identical() {
        let mut l = layout(7);
        let coord = ChunkCoord::new(-1, 0, -4);
        let first = l.planes(coord);
        assert!(l.forget(coord));
        let second = l.planes(coord);
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(bits(&first), bits(&second));
        assert_eq!(l.generated_count(), 2);
    }

    #[test]
    fn test_memoized() {
        let mut l = layout(3);
        let coord = ChunkCoord::new(0, 0, 0);
        let first = l.planes(coord);
        let second = l.planes(coord);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(l.generated_count(), 1);
    }

    #[test]
    fn test_planes_within_chunk_bounds() {
        let l = layout(5);
        for coord in [ChunkCoord::new(0, 0, 0), ChunkCoord::new(-5, 9, -2), ChunkCoord::new(100, -100, 3)] {
            let origin = coord.world_origin();
            for plane in l.generate(coord) {
                let local = plane.position - origin;
                assert!(local.min_element() >= 0.0, "{:?} outside {}", plane.position, coord);
                assert!(local.max_element() < CHUNK_SIZE, "{:?} outside {}", plane.position, coord);
                assert_eq!(ChunkCoord::from_world(plane.position), coord);
                assert!(plane.media_index < 5);
                assert!(plane.scale.y >= 14.0 && plane.scale.y <= 26.0);
            }
        }
    }

    #[test]
    fn test_neighbouring_chunks_differ() {
        let l = layout(100);
        let a = l.generate(ChunkCoord::new(0, 0, 0));
        let b = l.generate(ChunkCoord::new(1, 0, 0));
        let a_local: Vec<_> = a.iter().map(|p| p.position - ChunkCoord::new(0, 0, 0).world_origin()).collect();
        let b_local: Vec<_> = b.iter().map(|p| p.position - ChunkCoord::new(1, 0, 0).world_origin()).collect();
        assert_ne!(a_local, b_local);
    }

    #[test]
    fn test_empty_media_yields_no_planes() {
        let mut l = layout(0);
        assert!(l.generate(ChunkCoord::new(0, 0, 0)).is_empty());
        assert!(l.planes(ChunkCoord::new(1, 1, 1)).is_empty());
    }

    #[test]
    fn test_rng_float_range() {
        let mut rng = LayoutRng::for_chunk(1, ChunkCoord::new(0, 0, 0));
        for _ in 0..10_000 {
            let f = rng.next_float();
            assert!((0.0..1.0).contains(&f));
        }
    }
}
