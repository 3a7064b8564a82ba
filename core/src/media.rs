//! Memory-cached, deduplicating photo fetcher.
//!
//! # Design
//! `CachedMediaService::get_photo` hands out a `PhotoStream`:
//! - no locator: a stream that never yields;
//! - cache hit: a stream that is ready immediately (`peek` returns the image);
//! - cache miss: a stream over a shared fetch future. The future is stored in
//!   an in-flight table keyed by locator, so every request for the same
//!   locator made before the fetch finishes attaches to it. Nothing touches
//!   the network until some stream is awaited.
//!
//! The first poll spawns the fetch as its own tokio task. It runs to the end
//! even if every stream is dropped, and the in-flight table only ever holds
//! the task's `JoinHandle` behind a `Shared`, never the service itself.
//!
//! When a fetch completes the image is inserted into the cache *before* the
//! in-flight entry is removed, so a concurrent request sees one or the other.
//! A failed fetch resolves to `None`; its streams never yield and the next
//! request for that locator starts a fresh fetch.

use std::collections::HashMap;
use std::fmt;
use std::future;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use image::{DynamicImage, RgbaImage};
use parking_lot::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;
use crate::http::{Endpoint, HttpMethod};
use crate::transport::NetworkService;

/// A decoded image. Clones share the pixel data.
#[derive(Clone)]
pub struct Image(Arc<DynamicImage>);

impl Image {
    pub fn decode(bytes: &[u8]) -> Result<Self, ApiError> {
        image::load_from_memory(bytes)
            .map(|decoded| Image(Arc::new(decoded)))
            .map_err(|e| ApiError::ImageDecode(e.to_string()))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.0
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        self.0.to_rgba8()
    }

    /// Whether both handles refer to the same decoded image.
    pub fn ptr_eq(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Keyed image storage. Writes are upserts; there is no eviction.
pub trait ImageCache: Send + Sync {
    fn get(&self, key: &Url) -> Option<Image>;
    fn insert(&self, key: Url, image: Image);
}

#[derive(Debug, Default)]
pub struct MemoryImageCache {
    entries: DashMap<Url, Image>,
}

impl MemoryImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ImageCache for MemoryImageCache {
    fn get(&self, key: &Url) -> Option<Image> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn insert(&self, key: Url, image: Image) {
        self.entries.insert(key, image);
    }
}

type SharedFetch = Shared<BoxFuture<'static, Option<Image>>>;

#[derive(Clone)]
enum Source {
    Never,
    Ready(Image),
    Pending(SharedFetch),
}

/// Zero-or-one image, shared by every clone of the stream.
#[derive(Clone)]
pub struct PhotoStream {
    source: Source,
}

impl PhotoStream {
    pub fn never() -> Self {
        Self {
            source: Source::Never,
        }
    }

    pub fn ready(image: Image) -> Self {
        Self {
            source: Source::Ready(image),
        }
    }

    fn pending(fetch: SharedFetch) -> Self {
        Self {
            source: Source::Pending(fetch),
        }
    }

    /// The image, if it is already available without waiting.
    pub fn peek(&self) -> Option<Image> {
        match &self.source {
            Source::Never => None,
            Source::Ready(image) => Some(image.clone()),
            Source::Pending(fetch) => fetch.peek().cloned().flatten(),
        }
    }

    /// Wait for the image. Never returns if there is no locator or the
    /// fetch failed; bound it with a timeout or drop it.
    pub async fn recv(&self) -> Image {
        match &self.source {
            Source::Never => future::pending().await,
            Source::Ready(image) => image.clone(),
            Source::Pending(fetch) => match fetch.clone().await {
                Some(image) => image,
                None => future::pending().await,
            },
        }
    }
}

impl fmt::Debug for PhotoStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.source {
            Source::Never => "never",
            Source::Ready(_) => "ready",
            Source::Pending(_) => "pending",
        };
        f.debug_tuple("PhotoStream").field(&state).finish()
    }
}

/// Source of per-item photo streams.
pub trait MediaService: Send + Sync {
    fn get_photo(&self, locator: Option<&Url>) -> PhotoStream;
}

/// `MediaService` backed by an `ImageCache` and the network.
#[derive(Clone)]
pub struct CachedMediaService {
    inner: Arc<Inner>,
}

struct Inner {
    network: NetworkService,
    cache: Arc<dyn ImageCache>,
    in_flight: Mutex<HashMap<Url, SharedFetch>>,
}

impl CachedMediaService {
    pub fn new(network: NetworkService, cache: Arc<dyn ImageCache>) -> Self {
        Self {
            inner: Arc::new(Inner {
                network,
                cache,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }
}

impl fmt::Debug for CachedMediaService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedMediaService")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl MediaService for CachedMediaService {
    fn get_photo(&self, locator: Option<&Url>) -> PhotoStream {
        let Some(url) = locator else {
            return PhotoStream::never();
        };

        if let Some(image) = self.inner.cache.get(url) {
            debug!(%url, "photo cache hit");
            return PhotoStream::ready(image);
        }

        let mut in_flight = self.inner.in_flight.lock();
        // The fetch may have landed between the cache check and the lock.
        if let Some(image) = self.inner.cache.get(url) {
            return PhotoStream::ready(image);
        }
        if let Some(fetch) = in_flight.get(url) {
            debug!(%url, "joining in-flight photo fetch");
            return PhotoStream::pending(fetch.clone());
        }

        debug!(%url, "photo cache miss");
        let task = fetch_photo(Arc::downgrade(&self.inner), url.clone());
        let fetch = async move {
            match tokio::spawn(task).await {
                Ok(image) => image,
                Err(err) => {
                    warn!(error = %err, "photo fetch task failed");
                    None
                }
            }
        }
        .boxed()
        .shared();
        in_flight.insert(url.clone(), fetch.clone());
        PhotoStream::pending(fetch)
    }
}

async fn fetch_photo(inner: Weak<Inner>, url: Url) -> Option<Image> {
    let inner = inner.upgrade()?;
    let result = async {
        let bytes = inner
            .network
            .perform_data_request::<()>(&Endpoint::Photo(url.clone()), HttpMethod::Get, &[], None)
            .await?;
        Image::decode(&bytes)
    }
    .await;

    match result {
        Ok(image) => {
            inner.cache.insert(url.clone(), image.clone());
            inner.in_flight.lock().remove(&url);
            Some(image)
        }
        Err(err) => {
            warn!(%url, error = %err, "photo fetch failed");
            inner.in_flight.lock().remove(&url);
            None
        }
    }
}
