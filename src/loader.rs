use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use base64::Engine;
use image::RgbaImage;
use rayon::prelude::*;
use thiserror::Error;

/// Upper bound on a single image download.
const MAX_IMAGE_BYTES: u64 = 64 * 1024 * 1024;

/// Per-request timeout used when a loader is not given one.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A decoded image ready to be drawn.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub url: String,
    pub image: Arc<RgbaImage>,
    /// Set when the pixels came from a response that did not grant
    /// cross-origin read access. Such images may be shown but not exported.
    pub tainted: bool,
}

impl PartialEq for LoadedImage {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.tainted == other.tainted
            && Arc::ptr_eq(&self.image, &other.image)
    }
}

impl LoadedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("failed to decode {url}: {message}")]
    Decode { url: String, message: String },
    #[error("malformed data URI")]
    InvalidDataUri,
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("network error while loading {url}: {message}")]
    Network { url: String, message: String },
    #[error("CORS required for canvas export: {url} does not allow cross-origin reads")]
    CorsRequired { url: String },
    #[error("load timed out: {url}")]
    TimedOut { url: String },
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Sends an `Origin` header and requires the response to grant read access.
    Cors,
    /// Plain request; the body is opaque as far as canvas export goes.
    NoCors,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("blocked by cross-origin policy")]
    Blocked,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("timed out")]
    TimedOut,
    #[error("{0}")]
    Network(String),
}

/// Transport used for remote images. A request that takes longer than
/// `timeout` fails with [`FetchError::TimedOut`].
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, mode: FetchMode, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// [`Fetcher`] backed by a `ureq` agent.
pub struct UreqFetcher {
    agent: ureq::Agent,
    origin: String,
}

impl UreqFetcher {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            origin: origin.into(),
        }
    }

    fn grants_access(&self, allow_origin: Option<&str>) -> bool {
        match allow_origin.map(str::trim) {
            Some("*") => true,
            Some(origin) => origin.eq_ignore_ascii_case(&self.origin),
            None => false,
        }
    }
}

fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);

    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        current = err.source();
    }

    false
}

impl Fetcher for UreqFetcher {
    fn fetch(&self, url: &str, mode: FetchMode, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let mut request = self.agent.get(url).timeout(timeout);

        if mode == FetchMode::Cors {
            request = request.set("Origin", &self.origin);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => return Err(FetchError::Status(status)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(if is_timeout(&transport) {
                    FetchError::TimedOut
                } else {
                    FetchError::Network(transport.to_string())
                });
            }
        };

        if mode == FetchMode::Cors
            && !self.grants_access(response.header("Access-Control-Allow-Origin"))
        {
            return Err(FetchError::Blocked);
        }

        let mut body = Vec::new();

        response
            .into_reader()
            .take(MAX_IMAGE_BYTES)
            .read_to_end(&mut body)
            .map_err(|err| {
                if is_timeout(&err) {
                    FetchError::TimedOut
                } else {
                    FetchError::Network(err.to_string())
                }
            })?;

        Ok(FetchResponse { body })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

type SlotCell = Arc<OnceLock<Result<LoadedImage, LoadError>>>;

struct Slot {
    cell: SlotCell,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<String, Slot>,
    clock: u64,
    stats: CacheStats,
}

/// Bounded, least-recently-used image cache keyed by URL.
///
/// Concurrent requests for the same URL share one load. Failed loads are
/// dropped so a later request can retry.
pub struct ImageCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ImageCache {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn clear(&self) {
        self.lock().slots.clear();
    }

    /// Returns a finished, successful entry without loading anything.
    pub fn peek(&self, url: &str) -> Option<LoadedImage> {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.clock += 1;
        let slot = state.slots.get_mut(url)?;
        slot.last_used = state.clock;

        match slot.cell.get() {
            Some(Ok(image)) => Some(image.clone()),
            _ => None,
        }
    }

    pub fn get_or_insert_with<F>(&self, url: &str, load: F) -> Result<LoadedImage, LoadError>
    where
        F: FnOnce() -> Result<LoadedImage, LoadError>,
    {
        let cell = {
            let mut guard = self.lock();
            let state = &mut *guard;

            state.clock += 1;
            let now = state.clock;

            match state.slots.get_mut(url) {
                Some(slot) => {
                    slot.last_used = now;
                    state.stats.hits += 1;
                    Arc::clone(&slot.cell)
                }
                None => {
                    state.stats.misses += 1;

                    let cell = SlotCell::default();
                    state.slots.insert(
                        url.to_owned(),
                        Slot {
                            cell: Arc::clone(&cell),
                            last_used: now,
                        },
                    );
                    self.evict(state, url);
                    cell
                }
            }
        };

        let result = cell.get_or_init(load).clone();

        if result.is_err() {
            let mut state = self.lock();

            if state
                .slots
                .get(url)
                .is_some_and(|slot| Arc::ptr_eq(&slot.cell, &cell))
            {
                state.slots.remove(url);
            }
        }

        result
    }

    fn evict(&self, state: &mut CacheState, keep: &str) {
        while state.slots.len() > self.capacity {
            let victim = state
                .slots
                .iter()
                .filter(|(url, slot)| url.as_str() != keep && slot.cell.get().is_some())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(url, _)| url.clone());

            let Some(victim) = victim else {
                break;
            };

            log::debug!("Evicting {victim} from image cache");
            state.slots.remove(&victim);
            state.stats.evictions += 1;
        }
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Remote images must grant cross-origin read access.
    #[default]
    Strict,
    /// Images without a cross-origin grant are still decoded, but marked
    /// tainted. Only suitable for on-screen previews.
    Permissive,
}

/// Resolves image URLs to decoded images through an [`ImageCache`].
pub struct ImageLoader {
    fetcher: Arc<dyn Fetcher>,
    cache: ImageCache,
    policy: LoadPolicy,
    timeout: Duration,
}

impl ImageLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: ImageCache, policy: LoadPolicy) -> Self {
        Self {
            fetcher,
            cache,
            policy,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Bound on each remote request this loader makes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn get_or_load_image(&self, url: &str) -> Result<LoadedImage, LoadError> {
        self.cache.get_or_insert_with(url, || self.load_uncached(url))
    }

    /// Loads every URL, concurrently for the ones not cached yet. Fails with
    /// the first error encountered.
    pub fn get_or_load_images<S: AsRef<str>>(
        &self,
        urls: &[S],
    ) -> Result<HashMap<String, LoadedImage>, LoadError> {
        let unique: HashSet<&str> = urls.iter().map(AsRef::as_ref).collect();

        let mut loaded = HashMap::with_capacity(unique.len());
        let mut missing = Vec::new();

        for url in unique {
            match self.cache.peek(url) {
                Some(image) => {
                    loaded.insert(url.to_owned(), image);
                }
                None => missing.push(url),
            }
        }

        log::debug!(
            "{} images cached, {} to load",
            loaded.len(),
            missing.len()
        );

        let fetched: Vec<_> = missing
            .par_iter()
            .map(|url| {
                self.get_or_load_image(url)
                    .map(|image| (url.to_string(), image))
            })
            .collect::<Result<_, _>>()?;

        loaded.extend(fetched);
        Ok(loaded)
    }

    fn load_uncached(&self, url: &str) -> Result<LoadedImage, LoadError> {
        if let Some(rest) = url.strip_prefix("data:") {
            let bytes = decode_data_uri(rest)?;
            return decode(url, &bytes, false);
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return self.load_remote(url);
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        let bytes = std::fs::read(path).map_err(|err| LoadError::Io {
            path: path.to_owned(),
            message: err.to_string(),
        })?;

        decode(url, &bytes, false)
    }

    fn load_remote(&self, url: &str) -> Result<LoadedImage, LoadError> {
        log::debug!("Fetching {url}");

        let failure = match self.fetcher.fetch(url, FetchMode::Cors, self.timeout) {
            Ok(response) => return decode(url, &response.body, false),
            Err(FetchError::Status(status)) => {
                return Err(LoadError::Status {
                    url: url.to_owned(),
                    status,
                })
            }
            Err(FetchError::TimedOut) => return Err(LoadError::TimedOut { url: url.to_owned() }),
            Err(err) => err,
        };

        // A blocked CORS request and a dead host look alike from here. A
        // request without CORS tells them apart; its body is never exported.
        log::debug!("CORS fetch of {url} failed ({failure}); probing without CORS");

        match self.fetcher.fetch(url, FetchMode::NoCors, self.timeout) {
            Ok(response) if self.policy == LoadPolicy::Permissive => {
                log::warn!("{url} does not allow cross-origin reads; preview only");
                decode(url, &response.body, true)
            }
            Ok(_) => Err(LoadError::CorsRequired { url: url.to_owned() }),
            Err(FetchError::TimedOut) => Err(LoadError::TimedOut { url: url.to_owned() }),
            Err(FetchError::Status(status)) => Err(LoadError::Status {
                url: url.to_owned(),
                status,
            }),
            Err(_) => Err(LoadError::Network {
                url: url.to_owned(),
                message: failure.to_string(),
            }),
        }
    }
}

/// Decodes the part of a data URI after `data:`.
fn decode_data_uri(rest: &str) -> Result<Vec<u8>, LoadError> {
    let (header, payload) = rest.split_once(',').ok_or(LoadError::InvalidDataUri)?;

    if header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| LoadError::InvalidDataUri)
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

fn decode(url: &str, bytes: &[u8], tainted: bool) -> Result<LoadedImage, LoadError> {
    let decode_error = |message: String| LoadError::Decode {
        url: url.to_owned(),
        message,
    };

    let image = image::load_from_memory(bytes)
        .map_err(|err| decode_error(err.to_string()))?
        .to_rgba8();

    if image.width() == 0 || image.height() == 0 {
        return Err(decode_error("image has no pixels".into()));
    }

    Ok(LoadedImage {
        url: url.to_owned(),
        image: Arc::new(image),
        tainted,
    })
}
