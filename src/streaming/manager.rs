//! Active chunk window around the camera
//!
//! The window is a cube of chunks centred on the camera's chunk. It moves
//! only when the camera's chunk changes, and then no more often than the
//! throttle interval allows. The interval grows with camera speed so fast
//! travel does not churn chunks faster than their textures can stream in.
//! A pending move is never dropped; it waits until the interval has passed.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use glam::IVec3;

use crate::core::config::ChunkConfig;
use crate::streaming::chunk::{chunk_offsets, ChunkCoord};

/// Speed-dependent minimum interval between window moves
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Throttle {
    pub base: Duration,
    /// Milliseconds added per unit/frame of camera speed
    pub per_speed_ms: f32,
    pub max: Duration,
}

impl Throttle {
    pub fn from_config(config: &ChunkConfig) -> Self {
        Self {
            base: Duration::from_millis(config.throttle_base_ms),
            per_speed_ms: config.throttle_per_speed_ms,
            max: Duration::from_millis(config.throttle_max_ms.max(config.throttle_base_ms)),
        }
    }

    /// Interval for a camera moving at `speed` world units per frame
    pub fn interval(&self, speed: f32) -> Duration {
        let extra_ms = (speed.max(0.0) * self.per_speed_ms).max(0.0);
        let extra = Duration::try_from_secs_f32(extra_ms / 1000.0).unwrap_or(self.max);
        self.base.saturating_add(extra).min(self.max).max(self.base)
    }
}

/// Change to the active window produced by one applied move
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSetDiff {
    pub center: ChunkCoord,
    /// Newly active chunks, nearest to the centre first
    pub added: Vec<ChunkCoord>,
    pub removed: Vec<ChunkCoord>,
}

/// Tracks the active chunk window and throttles its movement
pub struct ChunkManager {
    offsets: Vec<IVec3>,
    center: ChunkCoord,
    active: HashSet<ChunkCoord>,
    pending: Option<ChunkCoord>,
    last_update: Instant,
    throttle: Throttle,
    update_count: u64,
}

impl ChunkManager {
    /// Create a manager whose window is already centred on `center`.
    ///
    /// The returned diff lists the initial window so the caller can schedule
    /// its generation.
    pub fn new(radius: u32, throttle: Throttle, center: ChunkCoord, now: Instant) -> (Self, ChunkSetDiff) {
        let offsets = chunk_offsets(radius);
        let added: Vec<ChunkCoord> = offsets.iter().map(|o| center.offset(*o)).collect();
        let manager = Self {
            active: added.iter().copied().collect(),
            offsets,
            center,
            pending: None,
            last_update: now,
            throttle,
            update_count: 0,
        };
        log::info!("Chunk window initialised at {} ({} chunks)", center, added.len());
        (manager, ChunkSetDiff { center, added, removed: Vec::new() })
    }

    /// Feed this frame's camera chunk and speed.
    ///
    /// Returns a diff when a pending move was applied this frame.
    pub fn observe(&mut self, coord: ChunkCoord, speed: f32, now: Instant) -> Option<ChunkSetDiff> {
        if coord != self.center {
            self.pending = Some(coord);
        } else if self.pending.take().is_some() {
            log::trace!("Camera returned to chunk {}, pending move dropped", coord);
        }

        let target = self.pending?;
        let interval = self.throttle.interval(speed);
        if now.saturating_duration_since(self.last_update) < interval {
            return None;
        }

        self.pending = None;
        self.last_update = now;
        Some(self.recenter(target))
    }

    fn recenter(&mut self, center: ChunkCoord) -> ChunkSetDiff {
        let next: Vec<ChunkCoord> = self.offsets.iter().map(|o| center.offset(*o)).collect();
        let next_set: HashSet<ChunkCoord> = next.iter().copied().collect();

        let added: Vec<ChunkCoord> = next.into_iter().filter(|c| !self.active.contains(c)).collect();
        let mut removed: Vec<ChunkCoord> = self.active.iter().copied().filter(|c| !next_set.contains(c)).collect();
        removed.sort();

        log::debug!(
            "Chunk window {} -> {} (+{} / -{})",
            self.center, center, added.len(), removed.len()
        );
        self.active = next_set;
        self.center = center;
        self.update_count += 1;
        ChunkSetDiff { center, added, removed }
    }

    pub fn center(&self) -> ChunkCoord {
        self.center
    }

    pub fn pending(&self) -> Option<ChunkCoord> {
        self.pending
    }

    pub fn is_active(&self, coord: ChunkCoord) -> bool {
        self.active.contains(&coord)
    }

    /// Active chunks, nearest to the centre first
    pub fn active(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.offsets.iter().map(move |o| self.center.offset(*o))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of applied window moves since construction
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn throttle() -> Throttle {
        Throttle::from_config(&ChunkConfig::default())
    }

    fn manager(now: Instant) -> ChunkManager {
        ChunkManager::new(2, throttle(), ChunkCoord::new(0, 0, 0), now).0
    }

    #[test]
    fn test_initial_window() {
        let t0 = Instant::now();
        let (mgr, diff) = ChunkManager::new(1, throttle(), ChunkCoord::new(5, 0, 0), t0);
        assert_eq!(diff.added.len(), 27);
        assert_eq!(diff.added[0], ChunkCoord::new(5, 0, 0));
        assert!(diff.removed.is_empty());
        assert_eq!(mgr.active_count(), 27);
        assert!(mgr.is_active(ChunkCoord::new(6, 1, -1)));
        assert!(!mgr.is_active(ChunkCoord::new(7, 0, 0)));
    }

    #[test]
    fn test_throttle_interval_scales_with_speed() {
        let t = throttle();
        assert_eq!(t.interval(0.0), 100 * MS);
        assert!(t.interval(1.0) > t.interval(0.5));
        assert_eq!(t.interval(100.0), 400 * MS);
        assert_eq!(t.interval(f32::INFINITY), 400 * MS);
        assert_eq!(t.interval(-3.0), 100 * MS);
    }

    #[test]
    fn test_throttle_interval_saturates_on_huge_speed_term() {
        let config = ChunkConfig { throttle_per_speed_ms: f32::MAX, ..Default::default() };
        let t = Throttle::from_config(&config);
        assert_eq!(t.interval(0.0), 100 * MS);
        assert_eq!(t.interval(1.0), 400 * MS);
        assert_eq!(t.interval(1e30), 400 * MS);

        let inverted = Throttle { base: 300 * MS, per_speed_ms: 1.0, max: 100 * MS };
        assert_eq!(inverted.interval(5.0), 300 * MS);
    }

    #[test]
    fn test_no_update_without_chunk_change() {
        let t0 = Instant::now();
        let mut mgr = manager(t0);
        for i in 1..20u32 {
            assert!(mgr.observe(ChunkCoord::new(0, 0, 0), 0.0, t0 + i * 50 * MS).is_none());
        }
        assert_eq!(mgr.update_count(), 0);
    }

    #[test]
    fn test_churn_throttled_to_last_chunk() {
        let t0 = Instant::now();
        let mut mgr = manager(t0);

        // Cross five boundaries inside one throttle interval
        for step in 1..=5 {
            let diff = mgr.observe(ChunkCoord::new(0, 0, -step), 0.0, t0 + (step as u32) * 10 * MS);
            assert!(diff.is_none());
        }
        assert_eq!(mgr.pending(), Some(ChunkCoord::new(0, 0, -5)));
        assert_eq!(mgr.center(), ChunkCoord::new(0, 0, 0));

        let diff = mgr.observe(ChunkCoord::new(0, 0, -5), 0.0, t0 + 100 * MS).expect("move applied");
        assert_eq!(diff.center, ChunkCoord::new(0, 0, -5));
        assert_eq!(mgr.update_count(), 1);
        assert!(mgr.pending().is_none());

        // The window moved by five along z with radius two: no overlap remains
        assert_eq!(diff.added.len(), 125);
        assert_eq!(diff.removed.len(), 125);
    }

    #[test]
    fn test_fast_camera_waits_longer() {
        let t0 = Instant::now();
        let mut mgr = manager(t0);
        let target = ChunkCoord::new(1, 0, 0);

        assert!(mgr.observe(target, 3.0, t0 + 150 * MS).is_none());
        assert!(mgr.observe(target, 3.0, t0 + 250 * MS).is_none());
        let diff = mgr.observe(target, 3.0, t0 + 280 * MS).expect("move applied");
        assert_eq!(diff.added.len(), 25);
        assert_eq!(diff.removed.len(), 25);
        assert!(diff.removed.iter().all(|c| c.x == -2));
        assert!(diff.added.iter().all(|c| c.x == 3));
    }

    #[test]
    fn test_pending_not_dropped_while_throttled() {
        let t0 = Instant::now();
        let mut mgr = manager(t0);
        let first = mgr.observe(ChunkCoord::new(0, 1, 0), 0.0, t0 + 100 * MS);
        assert!(first.is_some());

        // Next crossing lands inside the new interval and must wait
        assert!(mgr.observe(ChunkCoord::new(0, 2, 0), 0.0, t0 + 120 * MS).is_none());
        assert_eq!(mgr.pending(), Some(ChunkCoord::new(0, 2, 0)));
        let second = mgr.observe(ChunkCoord::new(0, 2, 0), 0.0, t0 + 200 * MS);
        assert_eq!(second.map(|d| d.center), Some(ChunkCoord::new(0, 2, 0)));
    }

    #[test]
    fn test_return_to_center_clears_pending() {
        let t0 = Instant::now();
        let mut mgr = manager(t0);
        assert!(mgr.observe(ChunkCoord::new(1, 0, 0), 0.0, t0 + 10 * MS).is_none());
        assert!(mgr.observe(ChunkCoord::new(0, 0, 0), 0.0, t0 + 20 * MS).is_none());
        assert!(mgr.pending().is_none());
        assert!(mgr.observe(ChunkCoord::new(0, 0, 0), 0.0, t0 + 500 * MS).is_none());
    }

    #[test]
    fn test_active_iterates_nearest_first() {
        let mgr = manager(Instant::now());
        let active: Vec<_> = mgr.active().collect();
        assert_eq!(active.len(), 125);
        assert_eq!(active[0], mgr.center());
    }
}
