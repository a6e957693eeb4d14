//! Deferred chunk-generation scheduling
//!
//! Chunk layouts are generated off the hot part of the frame. Work is queued
//! per chunk and drained by the frame loop once rendering has been
//! submitted; the scheduler decides how much of the queue a slice may run.
//! Cancelling a chunk that left the active window drops its queued work
//! instead of letting it run late.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::streaming::chunk::ChunkCoord;

/// Pluggable policy for deferred per-chunk work
pub trait DeferredScheduler {
    /// Queue work for a chunk. Already-queued chunks keep their place.
    fn schedule(&mut self, coord: ChunkCoord, now: Instant);

    /// Drop queued work for a chunk. Returns whether anything was queued.
    fn cancel(&mut self, coord: ChunkCoord) -> bool;

    /// Next chunk to process in the slice that began at `slice_start`, or
    /// `None` when the slice should yield.
    fn next_ready(&mut self, slice_start: Instant, now: Instant) -> Option<ChunkCoord>;

    /// Number of queued tasks
    fn pending(&self) -> usize;

    /// Drop all queued work
    fn clear(&mut self);
}

#[derive(Clone, Copy, Debug)]
struct Task {
    coord: ChunkCoord,
    queued_at: Instant,
}

fn remove_task(queue: &mut VecDeque<Task>, coord: ChunkCoord) -> bool {
    match queue.iter().position(|t| t.coord == coord) {
        Some(pos) => {
            queue.remove(pos);
            true
        }
        None => false,
    }
}

/// Runs queued work while the slice has idle time left.
///
/// A task that has waited longer than `timeout` runs even when the slice
/// budget is spent, so a busy frame loop cannot starve generation.
pub struct IdleScheduler {
    queue: VecDeque<Task>,
    budget: Duration,
    timeout: Duration,
}

impl IdleScheduler {
    pub fn new(budget: Duration, timeout: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            budget,
            timeout,
        }
    }
}

impl DeferredScheduler for IdleScheduler {
    fn schedule(&mut self, coord: ChunkCoord, now: Instant) {
        if self.queue.iter().any(|t| t.coord == coord) {
            return;
        }
        self.queue.push_back(Task { coord, queued_at: now });
    }

    fn cancel(&mut self, coord: ChunkCoord) -> bool {
        remove_task(&mut self.queue, coord)
    }

    fn next_ready(&mut self, slice_start: Instant, now: Instant) -> Option<ChunkCoord> {
        let head = self.queue.front()?;
        let has_idle_time = now.saturating_duration_since(slice_start) < self.budget;
        let overdue = now.saturating_duration_since(head.queued_at) >= self.timeout;
        if has_idle_time || overdue {
            self.queue.pop_front().map(|t| t.coord)
        } else {
            None
        }
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Runs every queued task on the next drain. Used where deterministic,
/// same-frame generation is wanted.
#[derive(Default)]
pub struct ImmediateScheduler {
    queue: VecDeque<Task>,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeferredScheduler for ImmediateScheduler {
    fn schedule(&mut self, coord: ChunkCoord, now: Instant) {
        if !self.queue.iter().any(|t| t.coord == coord) {
            self.queue.push_back(Task { coord, queued_at: now });
        }
    }

    fn cancel(&mut self, coord: ChunkCoord) -> bool {
        remove_task(&mut self.queue, coord)
    }

    fn next_ready(&mut self, _slice_start: Instant, _now: Instant) -> Option<ChunkCoord> {
        self.queue.pop_front().map(|t| t.coord)
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}
