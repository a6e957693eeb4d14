//! Frame clock for looping clips
//!
//! Clips always loop and never produce sound. Playback starts only through
//! [`VideoPlayback::play`]; the texture cache calls it on load when the
//! media item allows autoplay.

use std::time::{Duration, Instant};

use crate::texture::decode::MIN_FRAME_DELAY;

#[derive(Clone, Debug)]
pub struct VideoPlayback {
    delays: Vec<Duration>,
    current: usize,
    /// Time already spent on the current frame
    into_frame: Duration,
    last_tick: Option<Instant>,
    playing: bool,
    play_calls: u32,
}

impl VideoPlayback {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            delays,
            current: 0,
            into_frame: Duration::ZERO,
            last_tick: None,
            playing: false,
            play_calls: 0,
        }
    }

    pub fn play(&mut self, now: Instant) {
        self.play_calls += 1;
        if !self.playing {
            self.playing = true;
            self.last_tick = Some(now);
        }
    }

    pub fn pause(&mut self) {
        self.playing = false;
        self.last_tick = None;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Clips are always muted
    pub fn is_muted(&self) -> bool {
        true
    }

    pub fn is_looping(&self) -> bool {
        true
    }

    /// How many times playback was requested
    pub fn play_calls(&self) -> u32 {
        self.play_calls
    }

    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn frame_count(&self) -> usize {
        self.delays.len()
    }

    /// Advance the clock to `now`, wrapping at the end of the clip.
    ///
    /// Returns true if the visible frame changed.
    pub fn advance(&mut self, now: Instant) -> bool {
        if !self.playing || self.delays.len() < 2 {
            return false;
        }
        let Some(last) = self.last_tick.replace(now) else {
            return false;
        };

        let total: Duration = self.delays.iter().map(|d| (*d).max(MIN_FRAME_DELAY)).sum();
        let mut elapsed = self.into_frame + now.saturating_duration_since(last);
        // Whole loops are skipped without walking every frame
        if elapsed >= total {
            elapsed = Duration::from_nanos((elapsed.as_nanos() % total.as_nanos()) as u64);
        }

        let start = self.current;
        loop {
            let delay = self.delays[self.current].max(MIN_FRAME_DELAY);
            if elapsed < delay {
                break;
            }
            elapsed -= delay;
            self.current = (self.current + 1) % self.delays.len();
        }
        self.into_frame = elapsed;
        self.current != start
    }
}
