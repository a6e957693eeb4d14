//! Texture cache keyed by media url
//!
//! Every url is loaded at most once at a time. All requests for a url share
//! one [`TextureHandle`]; callbacks queued while it loads fire together when
//! it settles. A failed load removes the entry so the next request retries,
//! and waiting callbacks receive the inert placeholder instead of an error.
//! Entries are never evicted: the media list bounds the number of urls.
//!
//! Completion is delivered by [`TextureCache::pump`], which the frame loop
//! calls once per frame; callbacks never run inside `get_texture`.

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use crate::core::types::Result;
use crate::media::{MediaItem, MediaKind};
use crate::texture::decode::{ClipFrame, Decoded, DecodedImage};
use crate::texture::loader::{LoadRequest, LoadResult, TextureLoader};
use crate::texture::progress::{ProgressCallback, ProgressTracker};
use crate::texture::video::VideoPlayback;

pub type TextureHandle = Rc<Texture>;

/// Called once when a texture settles, with the texture or the placeholder
pub type LoadCallback = Box<dyn FnOnce(&TextureHandle) -> Result<()>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureState {
    Loading,
    Ready,
    Failed,
}

/// A cached texture shared by every tile showing the same url
#[derive(Debug)]
pub struct Texture {
    id: u64,
    url: String,
    kind: MediaKind,
    placeholder: bool,
    state: Cell<TextureState>,
    size: Cell<Option<(u32, u32)>>,
    /// Mip levels for images, every frame for clips
    frames: RefCell<Vec<DecodedImage>>,
    video: RefCell<Option<VideoPlayback>>,
    needs_upload: Cell<bool>,
}

impl Texture {
    fn loading(id: u64, item: &MediaItem) -> Self {
        Self {
            id,
            url: item.url.clone(),
            kind: item.kind,
            placeholder: false,
            state: Cell::new(TextureState::Loading),
            size: Cell::new(None),
            frames: RefCell::new(Vec::new()),
            video: RefCell::new(None),
            needs_upload: Cell::new(false),
        }
    }

    /// 1x1 neutral texture handed out in place of failed loads
    pub fn placeholder(id: u64) -> Self {
        Self {
            id,
            url: String::new(),
            kind: MediaKind::Image,
            placeholder: true,
            state: Cell::new(TextureState::Ready),
            size: Cell::new(Some((1, 1))),
            frames: RefCell::new(vec![DecodedImage::solid(1, 1, [128, 128, 128, 255])]),
            video: RefCell::new(None),
            needs_upload: Cell::new(true),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn state(&self) -> TextureState {
        self.state.get()
    }

    pub fn is_ready(&self) -> bool {
        self.state.get() == TextureState::Ready
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Pixel size once loaded
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size.get()
    }

    /// Pixel aspect ratio of the loaded media
    pub fn aspect(&self) -> Option<f32> {
        match self.size.get() {
            Some((w, h)) if w > 0 && h > 0 && !self.placeholder => Some(w as f32 / h as f32),
            _ => None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video && !self.placeholder
    }

    pub fn is_playing(&self) -> bool {
        self.video.borrow().as_ref().is_some_and(|v| v.is_playing())
    }

    /// Number of times playback was requested for this clip
    pub fn play_calls(&self) -> u32 {
        self.video.borrow().as_ref().map_or(0, |v| v.play_calls())
    }

    pub fn play(&self, now: Instant) {
        if let Some(video) = self.video.borrow_mut().as_mut() {
            video.play(now);
        }
    }

    pub fn pause(&self) {
        if let Some(video) = self.video.borrow_mut().as_mut() {
            video.pause();
        }
    }

    /// Pixels must be (re)uploaded to the GPU
    pub fn needs_upload(&self) -> bool {
        self.needs_upload.get()
    }

    /// Pixels of the frame to show now, if still held on the CPU
    pub fn current_frame(&self) -> Option<Ref<'_, DecodedImage>> {
        let index = self.video.borrow().as_ref().map_or(0, |v| v.current_frame());
        Ref::filter_map(self.frames.borrow(), |frames| frames.get(index)).ok()
    }

    /// Every mip level of a still image, full size first, while still held
    /// on the CPU. Clips have no mips.
    pub fn mip_levels(&self) -> Option<Ref<'_, [DecodedImage]>> {
        if self.is_video() {
            return None;
        }
        Ref::filter_map(self.frames.borrow(), |levels| {
            if levels.is_empty() { None } else { Some(levels.as_slice()) }
        })
        .ok()
    }

    /// Record a finished upload. Still images drop their CPU pixels.
    pub fn mark_uploaded(&self) {
        self.needs_upload.set(false);
        if !self.is_video() && !self.placeholder {
            self.frames.borrow_mut().clear();
        }
    }

    fn mark_dirty(&self) {
        self.needs_upload.set(true);
    }

    fn finish(&self, decoded: Decoded) {
        let (width, height) = decoded.dimensions();
        match decoded {
            Decoded::Image(levels) => {
                *self.frames.borrow_mut() = levels;
            }
            Decoded::Clip(frames) => {
                let delays = frames.iter().map(|f| f.delay).collect();
                *self.frames.borrow_mut() = frames.into_iter().map(|ClipFrame { image, .. }| image).collect();
                *self.video.borrow_mut() = Some(VideoPlayback::new(delays));
            }
        }
        self.size.set(Some((width, height)));
        self.state.set(TextureState::Ready);
        self.needs_upload.set(true);
    }

    fn fail(&self) {
        self.state.set(TextureState::Failed);
        self.frames.borrow_mut().clear();
    }
}

struct Entry {
    handle: TextureHandle,
    autoplay: bool,
    callbacks: Vec<LoadCallback>,
}

/// Counters for diagnostics and tests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub loads_started: u64,
    pub loads_completed: u64,
    pub loads_failed: u64,
    pub callback_errors: u64,
}

pub struct TextureCache {
    loader: Box<dyn TextureLoader>,
    entries: HashMap<String, Entry>,
    /// Callbacks for textures that were already settled when requested
    deferred: Vec<(TextureHandle, LoadCallback)>,
    placeholder: TextureHandle,
    progress: ProgressTracker,
    next_id: u64,
    stats: CacheStats,
}

impl TextureCache {
    pub fn new(loader: Box<dyn TextureLoader>) -> Self {
        Self {
            loader,
            entries: HashMap::new(),
            deferred: Vec::new(),
            placeholder: Rc::new(Texture::placeholder(0)),
            progress: ProgressTracker::new(),
            next_id: 1,
            stats: CacheStats::default(),
        }
    }

    /// Receive rounded load percentages as textures settle
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress.set_callback(callback);
    }

    /// Shared handle for `item.url`, starting a load on first request.
    ///
    /// `on_load` runs from a later [`pump`](Self::pump): with the texture
    /// once it is ready, or with the placeholder if the load fails.
    pub fn get_texture(&mut self, item: &MediaItem, on_load: Option<LoadCallback>) -> TextureHandle {
        if let Some(entry) = self.entries.get_mut(&item.url) {
            let handle = entry.handle.clone();
            if let Some(callback) = on_load {
                if handle.is_ready() {
                    self.deferred.push((handle.clone(), callback));
                } else {
                    entry.callbacks.push(callback);
                }
            }
            return handle;
        }

        let id = self.next_id;
        self.next_id += 1;
        let handle = Rc::new(Texture::loading(id, item));
        self.progress.requested(&item.url);

        let request = LoadRequest { id, url: item.url.clone(), kind: item.kind };
        if let Err(e) = self.loader.request(request) {
            log::warn!("Could not start load of {}: {}", item.url, e);
            handle.fail();
            self.stats.loads_failed += 1;
            self.progress.settled(&item.url);
            if let Some(callback) = on_load {
                self.deferred.push((self.placeholder.clone(), callback));
            }
            return handle;
        }
        self.stats.loads_started += 1;
        log::debug!("Loading texture {} ({:?})", item.url, item.kind);

        self.entries.insert(
            item.url.clone(),
            Entry {
                handle: handle.clone(),
                autoplay: item.autoplay(),
                callbacks: on_load.into_iter().collect(),
            },
        );
        handle
    }

    /// Deliver finished loads and deferred callbacks. Returns the number of
    /// loads that settled.
    pub fn pump(&mut self, now: Instant) -> usize {
        for (handle, callback) in std::mem::take(&mut self.deferred) {
            self.run_callback(&handle, callback);
        }

        let results = self.loader.poll_results();
        let settled = results.len();
        for result in results {
            self.settle(result, now);
        }
        settled
    }

    fn settle(&mut self, result: LoadResult, now: Instant) {
        let LoadResult { id, url, outcome } = result;
        let current = self.entries.get(&url).is_some_and(|e| e.handle.id() == id);
        if !current {
            log::trace!("Ignoring stale load result for {}", url);
            return;
        }

        match outcome {
            Ok(decoded) => {
                let Some(entry) = self.entries.get_mut(&url) else { return };
                let handle = entry.handle.clone();
                handle.finish(decoded);
                if handle.is_video() && entry.autoplay {
                    handle.play(now);
                }
                let callbacks = std::mem::take(&mut entry.callbacks);
                self.stats.loads_completed += 1;
                log::debug!("Texture ready: {} {:?}", url, handle.size());
                self.progress.settled(&url);
                for callback in callbacks {
                    self.run_callback(&handle, callback);
                }
            }
            Err(e) => {
                log::warn!("Texture load failed for {}: {}", url, e);
                let Some(entry) = self.entries.remove(&url) else { return };
                entry.handle.fail();
                self.stats.loads_failed += 1;
                self.progress.settled(&url);
                let placeholder = self.placeholder.clone();
                for callback in entry.callbacks {
                    self.run_callback(&placeholder, callback);
                }
            }
        }
    }

    fn run_callback(&mut self, handle: &TextureHandle, callback: LoadCallback) {
        if let Err(e) = callback(handle) {
            self.stats.callback_errors += 1;
            log::error!("Texture load callback failed for {}: {}", handle.url(), e);
        }
    }

    /// Advance every playing clip. Call once per rendered frame. Clips whose
    /// visible frame changed are flagged for upload; returns how many were.
    pub fn maintain_videos(&mut self, now: Instant) -> usize {
        let mut changed = 0;
        for entry in self.entries.values() {
            let texture = &entry.handle;
            if !texture.is_video() || !texture.is_ready() || !texture.is_playing() {
                continue;
            }
            let advanced = texture.video.borrow_mut().as_mut().is_some_and(|video| video.advance(now));
            if advanced {
                texture.mark_dirty();
                changed += 1;
            }
        }
        changed
    }

    /// Every live texture, including ones still loading
    pub fn textures(&self) -> impl Iterator<Item = &TextureHandle> {
        self.entries.values().map(|e| &e.handle)
    }

    pub fn placeholder(&self) -> &TextureHandle {
        &self.placeholder
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.loader.in_flight()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Pause every playing clip
    pub fn pause_all(&mut self) {
        for entry in self.entries.values() {
            entry.handle.pause();
        }
    }

    /// Resume clips that are allowed to autoplay
    pub fn resume_autoplay(&mut self, now: Instant) {
        for entry in self.entries.values() {
            if entry.autoplay && entry.handle.is_video() && entry.handle.is_ready() {
                entry.handle.play(now);
            }
        }
    }
}

/// Loader whose requests complete only when a test says so
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Clone, Default)]
    pub struct ManualLoader {
        pub requests: Rc<RefCell<Vec<LoadRequest>>>,
        pub results: Rc<RefCell<VecDeque<LoadResult>>>,
    }

    impl ManualLoader {
        pub fn complete(&self, id: u64, url: &str, outcome: Result<Decoded>) {
            self.results.borrow_mut().push_back(LoadResult { id, url: url.to_string(), outcome });
        }

        pub fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }

        pub fn last_request(&self) -> Option<LoadRequest> {
            self.requests.borrow().last().cloned()
        }

        /// Complete every outstanding request with a small image or clip
        pub fn complete_all(&self, width: u32, height: u32) {
            let requests: Vec<_> = self.requests.borrow().clone();
            let done: Vec<u64> = self.results.borrow().iter().map(|r| r.id).collect();
            for request in requests.into_iter().filter(|r| !done.contains(&r.id)) {
                let decoded = match request.kind {
                    MediaKind::Image => Decoded::still(DecodedImage::solid(width, height, [255; 4])),
                    MediaKind::Video => Decoded::Clip(vec![ClipFrame {
                        image: DecodedImage::solid(width, height, [0, 0, 0, 255]),
                        delay: Duration::from_millis(40),
                    }]),
                };
                self.complete(request.id, &request.url, Ok(decoded));
            }
        }
    }

    impl TextureLoader for ManualLoader {
        fn request(&mut self, request: LoadRequest) -> Result<()> {
            self.requests.borrow_mut().push(request);
            Ok(())
        }

        fn poll_results(&mut self) -> Vec<LoadResult> {
            self.results.borrow_mut().drain(..).collect()
        }

        fn in_flight(&self) -> usize {
            self.requests.borrow().len().saturating_sub(self.results.borrow().len())
        }
    }
}
