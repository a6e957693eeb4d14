//! Chunk coordinates and the neighbourhood around the camera

use std::fmt;

use glam::{IVec3, Vec3};

/// Edge length of a chunk cube in world units
pub const CHUNK_SIZE: f32 = 110.0;

/// Integer coordinate identifying a chunk in the world grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    /// Create a new chunk coordinate
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Convert world position to chunk coordinate (`floor(p / CHUNK_SIZE)` per axis)
    pub fn from_world(pos: Vec3) -> Self {
        Self {
            x: (pos.x / CHUNK_SIZE).floor() as i32,
            y: (pos.y / CHUNK_SIZE).floor() as i32,
            z: (pos.z / CHUNK_SIZE).floor() as i32,
        }
    }

    /// Get the world-space origin (minimum corner) of this chunk
    pub fn world_origin(&self) -> Vec3 {
        Vec3::new(
            self.x as f32 * CHUNK_SIZE,
            self.y as f32 * CHUNK_SIZE,
            self.z as f32 * CHUNK_SIZE,
        )
    }

    /// Chebyshev distance in chunks
    pub fn grid_distance(&self, other: ChunkCoord) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let dz = self.z.abs_diff(other.z);
        dx.max(dy).max(dz)
    }

    /// Offset this coordinate by a neighbourhood offset
    pub fn offset(&self, delta: IVec3) -> Self {
        Self {
            x: self.x + delta.x,
            y: self.y + delta.y,
            z: self.z + delta.z,
        }
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// Every offset in the cube of the given Chebyshev radius, nearest first.
///
/// This is the fixed shape of the active chunk window.
pub fn chunk_offsets(radius: u32) -> Vec<IVec3> {
    let r = radius as i32;
    let mut offsets = Vec::with_capacity(((2 * r + 1) as usize).pow(3));
    for dz in -r..=r {
        for dy in -r..=r {
            for dx in -r..=r {
                offsets.push(IVec3::new(dx, dy, dz));
            }
        }
    }
    offsets.sort_by_key(|o| (o.abs().max_element(), o.length_squared(), o.z, o.y, o.x));
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_world_floors_negative() {
        assert_eq!(ChunkCoord::from_world(Vec3::new(0.0, 0.0, 0.0)), ChunkCoord::new(0, 0, 0));
        assert_eq!(ChunkCoord::from_world(Vec3::new(109.9, 0.0, 50.0)), ChunkCoord::new(0, 0, 0));
        assert_eq!(ChunkCoord::from_world(Vec3::new(110.0, -0.1, -110.0)), ChunkCoord::new(1, -1, -1));
        assert_eq!(ChunkCoord::from_world(Vec3::new(-110.1, 0.0, 0.0)), ChunkCoord::new(-2, 0, 0));
    }

    #[test]
    fn test_world_origin_roundtrip() {
        let coord = ChunkCoord::new(-3, 2, 7);
        assert_eq!(ChunkCoord::from_world(coord.world_origin()), coord);
    }

    #[test]
    fn test_grid_distance_is_chebyshev() {
        let a = ChunkCoord::new(0, 0, 0);
        assert_eq!(a.grid_distance(a), 0);
        assert_eq!(a.grid_distance(ChunkCoord::new(1, 1, 1)), 1);
        assert_eq!(a.grid_distance(ChunkCoord::new(-3, 1, 2)), 3);
        assert_eq!(ChunkCoord::new(i32::MIN, 0, 0).grid_distance(ChunkCoord::new(i32::MAX, 0, 0)), u32::MAX);
    }

    #[test]
    fn test_offsets_cube_nearest_first() {
        let offsets = chunk_offsets(2);
        assert_eq!(offsets.len(), 125);
        assert_eq!(offsets[0], IVec3::ZERO);
        assert!(offsets[1..27].iter().all(|o| o.abs().max_element() == 1));
        assert!(offsets.iter().all(|o| o.abs().max_element() <= 2));

        let unique: std::collections::HashSet<_> = offsets.iter().map(|o| (o.x, o.y, o.z)).collect();
        assert_eq!(unique.len(), 125);
    }

    #[test]
    fn test_offsets_radius_zero() {
        assert_eq!(chunk_offsets(0), vec![IVec3::ZERO]);
    }
}
