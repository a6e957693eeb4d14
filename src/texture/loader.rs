//! Asynchronous texture fetching and decoding
//!
//! The render thread never blocks on I/O. Requests go to a tokio runtime
//! over a channel; workers fetch bytes (reqwest for `http(s)://`, tokio fs
//! for `file://` and plain paths), decode them on the blocking pool and send
//! results back. The cache drains finished results once per frame with
//! [`TextureLoader::poll_results`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::media::MediaKind;
use crate::texture::decode::{self, Decoded};

/// Request to fetch and decode one texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Texture id assigned by the cache
    pub id: u64,
    pub url: String,
    pub kind: MediaKind,
}

/// Outcome of a load, matched back to its request by `id`
#[derive(Debug)]
pub struct LoadResult {
    pub id: u64,
    pub url: String,
    pub outcome: Result<Decoded>,
}

/// Source of decoded textures for the cache
pub trait TextureLoader {
    /// Start loading. Fails only if the loader can no longer accept work.
    fn request(&mut self, request: LoadRequest) -> Result<()>;

    /// Completed loads since the last poll (non-blocking)
    fn poll_results(&mut self) -> Vec<LoadResult>;

    /// Loads started but not yet returned by `poll_results`
    fn in_flight(&self) -> usize;
}

/// tokio-backed loader with bounded concurrency
pub struct AsyncTextureLoader {
    request_tx: mpsc::UnboundedSender<LoadRequest>,
    result_rx: mpsc::UnboundedReceiver<LoadResult>,
    pending: HashSet<u64>,
    /// Keeps the worker tasks alive for the loader's lifetime
    _runtime: Runtime,
}

impl AsyncTextureLoader {
    /// Start a loader running at most `max_concurrent` fetches at once
    pub fn new(max_concurrent: usize) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<LoadRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<LoadResult>();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tessera-loader")
            .enable_all()
            .build()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")))
            .build()?;

        runtime.spawn(worker_loop(max_concurrent.max(1), request_rx, result_tx, move |request| {
            load_task(client.clone(), request)
        }));
        log::info!("Texture loader started ({} concurrent loads)", max_concurrent.max(1));

        Ok(Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
            _runtime: runtime,
        })
    }
}

/// Run queued requests through `load`, at most `max_concurrent` at a time.
/// A task that dies without a result is reported as a failed load for its
/// request.
async fn worker_loop<F, Fut>(
    max_concurrent: usize,
    mut request_rx: mpsc::UnboundedReceiver<LoadRequest>,
    result_tx: mpsc::UnboundedSender<LoadResult>,
    load: F,
) where
    F: Fn(LoadRequest) -> Fut + Send + 'static,
    Fut: Future<Output = LoadResult> + Send + 'static,
{
    let mut active = JoinSet::new();
    let mut running: HashMap<tokio::task::Id, (u64, String)> = HashMap::new();
    let mut queued: Vec<LoadRequest> = Vec::new();
    let mut accepting = true;

    loop {
        tokio::select! {
            request = request_rx.recv(), if accepting => {
                match request {
                    Some(request) => queued.push(request),
                    None => accepting = false,
                }
            }

            Some(joined) = active.join_next_with_id(), if !active.is_empty() => {
                let result = match joined {
                    Ok((task_id, result)) => {
                        running.remove(&task_id);
                        Some(result)
                    }
                    Err(e) => {
                        log::error!("Texture load task failed: {}", e);
                        running.remove(&e.id()).map(|(id, url)| lost_result(id, url, &e))
                    }
                };
                if let Some(result) = result {
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            }

            else => break,
        }

        // Oldest requests first
        while active.len() < max_concurrent && !queued.is_empty() {
            let request = queued.remove(0);
            let key = (request.id, request.url.clone());
            let handle = active.spawn(load(request));
            running.insert(handle.id(), key);
        }

        if !accepting && queued.is_empty() && active.is_empty() {
            break;
        }
    }
}

/// Failure reported for a request whose task panicked or was cancelled
fn lost_result(id: u64, url: String, error: &tokio::task::JoinError) -> LoadResult {
    LoadResult {
        id,
        outcome: Err(Error::Decode(format!("load task for {} failed: {}", url, error))),
        url,
    }
}

async fn load_task(client: reqwest::Client, request: LoadRequest) -> LoadResult {
    let LoadRequest { id, url, kind } = request;
    let outcome = match fetch_bytes(&client, &url).await {
        Ok(bytes) => tokio::task::spawn_blocking(move || decode::decode(kind, &bytes))
            .await
            .unwrap_or_else(|e| Err(Error::Decode(format!("decode task failed: {}", e)))),
        Err(e) => Err(e),
    };
    LoadResult { id, url, outcome }
}

impl TextureLoader for AsyncTextureLoader {
    fn request(&mut self, request: LoadRequest) -> Result<()> {
        let id = request.id;
        self.request_tx
            .send(request)
            .map_err(|e| Error::Fetch(format!("loader stopped, dropped {}", e.0.url)))?;
        self.pending.insert(id);
        Ok(())
    }

    fn poll_results(&mut self) -> Vec<LoadResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            self.pending.remove(&result.id);
            results.push(result);
        }
        results
    }

    fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

/// Where a media url points
#[derive(Debug, PartialEq, Eq)]
pub enum Source {
    Http(String),
    File(PathBuf),
}

impl Source {
    pub fn parse(url: &str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") {
            Source::Http(url.to_string())
        } else if let Some(path) = url.strip_prefix("file://") {
            Source::File(PathBuf::from(path))
        } else {
            Source::File(PathBuf::from(url))
        }
    }
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    match Source::parse(url) {
        Source::Http(url) => {
            let response = client.get(&url).send().await?.error_for_status()?;
            Ok(response.bytes().await?.to_vec())
        }
        Source::File(path) => Ok(tokio::fs::read(&path).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::time::{Duration, Instant};

    fn wait_for_results(loader: &mut AsyncTextureLoader, count: usize) -> Vec<LoadResult> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut results = Vec::new();
        while results.len() < count && Instant::now() < deadline {
            results.extend(loader.poll_results());
            std::thread::sleep(Duration::from_millis(5));
        }
        results
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(Source::parse("https://a.b/c.png"), Source::Http("https://a.b/c.png".into()));
        assert_eq!(Source::parse("file:///tmp/x.png"), Source::File(PathBuf::from("/tmp/x.png")));
        assert_eq!(Source::parse("media/x.png"), Source::File(PathBuf::from("media/x.png")));
    }

    #[test]
    fn test_loads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        RgbaImage::from_pixel(6, 3, Rgba([1, 2, 3, 255]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let mut loader = AsyncTextureLoader::new(2).unwrap();
        let url = format!("file://{}", path.display());
        loader.request(LoadRequest { id: 7, url: url.clone(), kind: MediaKind::Image }).unwrap();
        assert_eq!(loader.in_flight(), 1);

        let results = wait_for_results(&mut loader, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 7);
        assert_eq!(results[0].url, url);
        let decoded = results[0].outcome.as_ref().unwrap();
        assert_eq!(decoded.dimensions(), (6, 3));
        assert_eq!(loader.in_flight(), 0);
    }

    #[test]
    fn test_panicked_task_settles_its_request() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let worker = runtime.spawn(worker_loop(2, request_rx, result_tx, |request: LoadRequest| async move {
            if request.id == 2 {
                panic!("decoder blew up");
            }
            LoadResult {
                id: request.id,
                url: request.url,
                outcome: Ok(Decoded::still(decode::DecodedImage::solid(1, 1, [0; 4]))),
            }
        }));

        for id in 1..=3 {
            let url = format!("tile-{}.png", id);
            request_tx.send(LoadRequest { id, url, kind: MediaKind::Image }).unwrap();
        }
        drop(request_tx);
        runtime.block_on(worker).unwrap();

        let mut results = Vec::new();
        while let Ok(result) = result_rx.try_recv() {
            results.push(result);
        }
        results.sort_by_key(|r| r.id);
        assert_eq!(results.len(), 3);
        assert!(results[0].outcome.is_ok());
        assert_eq!(results[1].url, "tile-2.png");
        assert!(matches!(results[1].outcome, Err(Error::Decode(_))));
        assert!(results[2].outcome.is_ok());
    }

    #[test]
    fn test_missing_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = AsyncTextureLoader::new(1).unwrap();
        let url = dir.path().join("missing.png").display().to_string();
        loader.request(LoadRequest { id: 1, url, kind: MediaKind::Image }).unwrap();

        let results = wait_for_results(&mut loader, 1);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].outcome, Err(Error::Io(_))));
    }
}
