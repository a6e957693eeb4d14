//! LRU memo for generated chunk layouts
//!
//! Layouts are cheap to regenerate but stable, so the memo only bounds how
//! many stay resident. When it is full the least recently requested layout
//! is dropped.

use std::collections::HashMap;
use std::rc::Rc;

use crate::streaming::chunk::ChunkCoord;
use crate::streaming::layout::PlaneData;

/// LRU cache of plane lists keyed by chunk
pub struct LayoutCache {
    layouts: HashMap<ChunkCoord, Rc<[PlaneData]>>,
    /// Oldest first, most recently used last
    access_order: Vec<ChunkCoord>,
    capacity: usize,
}

impl LayoutCache {
    /// Create a cache holding at most `capacity` layouts
    pub fn new(capacity: usize) -> Self {
        Self {
            layouts: HashMap::with_capacity(capacity.min(1024)),
            access_order: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Look up a layout and mark it as recently used
    pub fn get(&mut self, coord: ChunkCoord) -> Option<&Rc<[PlaneData]>> {
        if self.layouts.contains_key(&coord) {
            self.touch(coord);
            self.layouts.get(&coord)
        } else {
            None
        }
    }

    /// Insert a layout, evicting the least recently used one if full.
    ///
    /// Returns the evicted coordinate, if any.
    pub fn insert(&mut self, coord: ChunkCoord, planes: Rc<[PlaneData]>) -> Option<ChunkCoord> {
        let evicted = if !self.layouts.contains_key(&coord) && self.layouts.len() >= self.capacity {
            self.evict_oldest()
        } else {
            self.forget_access(coord);
            None
        };

        self.layouts.insert(coord, planes);
        self.access_order.push(coord);
        evicted
    }

    pub fn remove(&mut self, coord: ChunkCoord) -> Option<Rc<[PlaneData]>> {
        self.forget_access(coord);
        self.layouts.remove(&coord)
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.layouts.contains_key(&coord)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Drop the least recently used layout
    pub fn evict_oldest(&mut self) -> Option<ChunkCoord> {
        let coord = self.access_order.first().copied()?;
        self.remove(coord);
        log::trace!("Evicted layout for chunk {}", coord);
        Some(coord)
    }

    fn touch(&mut self, coord: ChunkCoord) {
        self.forget_access(coord);
        self.access_order.push(coord);
    }

    fn forget_access(&mut self, coord: ChunkCoord) {
        if let Some(pos) = self.access_order.iter().position(|&c| c == coord) {
            self.access_order.remove(pos);
        }
    }
}
