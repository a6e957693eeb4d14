//! Load progress reporting
//!
//! Progress is the share of requested textures that have settled (loaded or
//! failed), as a whole percentage. Newly requested textures can lower the
//! raw share, so only values above the best one reported so far are passed
//! on; listeners see a non-decreasing sequence without repeats.

use std::collections::HashSet;

pub type ProgressCallback = Box<dyn FnMut(u8)>;

#[derive(Default)]
pub struct ProgressTracker {
    requested: HashSet<String>,
    settled: HashSet<String>,
    reported: Option<u8>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_callback(&mut self, callback: ProgressCallback) {
        self.callback = Some(callback);
    }

    /// Record a texture request. Repeat requests for a url count once.
    pub fn requested(&mut self, url: &str) {
        if !self.requested.contains(url) {
            self.requested.insert(url.to_string());
        }
    }

    /// Record that a texture finished loading or failed
    pub fn settled(&mut self, url: &str) {
        if self.requested.contains(url) && !self.settled.contains(url) {
            self.settled.insert(url.to_string());
        }
        self.report();
    }

    /// Current rounded percentage, which may be below what was reported
    pub fn percent(&self) -> u8 {
        if self.requested.is_empty() {
            return 0;
        }
        let ratio = self.settled.len() as f64 / self.requested.len() as f64;
        (ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Highest percentage passed to the callback so far
    pub fn reported(&self) -> Option<u8> {
        self.reported
    }

    fn report(&mut self) {
        let percent = self.percent();
        if self.reported.is_some_and(|r| percent <= r) {
            return;
        }
        self.reported = Some(percent);
        log::trace!("Texture progress {}%", percent);
        if let Some(callback) = self.callback.as_mut() {
            callback(percent);
        }
    }
}
