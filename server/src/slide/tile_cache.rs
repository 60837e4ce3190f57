//! Persistent disk cache for encoded tiles and macro crops
//!
//! Entries are content-addressed by request parameters (see [`CacheKey`])
//! and never expire. A miss runs the extractor on the blocking pool and
//! writes the result back best-effort:
//! - a present file is returned as is, without validation
//! - "no result" from the extractor is never cached
//! - write failures are logged and the computed bytes are still returned
//!
//! Concurrent misses on one key are serialized through a transient per-key
//! lock so that usually only one decode runs. The lock entry is released
//! even when the waiting request is cancelled. Correctness does not depend on
//! it: identical keys always produce identical bytes, so two writers racing
//! on the same path write the same content.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::cache_key::CacheKey;
use super::macro_image::{CropParams, MacroExtractor};
use super::region::{RegionExtractor, RegionParams};
use super::types::{MacroRequest, RegionRequest};

/// Best-effort file cache shared by tiles and macro crops
pub struct DiskCache {
    root: PathBuf,
    /// Metrics label: "tile" or "macro"
    kind: &'static str,
    in_flight: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>, kind: &'static str) -> Self {
        Self {
            root: root.into(),
            kind,
            in_flight: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the cached entry for `key`, or run `create` and persist its
    /// result.
    ///
    /// `create` and the cache write run together on the blocking thread
    /// pool, so an entry is still written if the caller stops waiting. `None`
    /// from `create` (or a panic inside it) yields `None` and leaves no file
    /// behind.
    pub async fn get_or_create_with<F>(&self, key: &CacheKey, create: F) -> Option<Bytes>
    where
        F: FnOnce() -> Option<Vec<u8>> + Send + 'static,
    {
        let path = key.path(&self.root);

        if let Some(bytes) = read_entry(&path).await {
            counter!("wsi_cache_hits_total", "cache" => self.kind).increment(1);
            debug!("Cache hit: {:?}", path);
            return Some(bytes);
        }
        counter!("wsi_cache_misses_total", "cache" => self.kind).increment(1);

        let in_flight = InFlight::acquire(&self.in_flight, &path);
        let _guard = in_flight.lock.lock().await;

        // Another request may have populated the entry while we waited
        if let Some(bytes) = read_entry(&path).await {
            debug!("Cache filled while waiting: {:?}", path);
            return Some(bytes);
        }

        let kind = self.kind;
        let target = path.clone();
        let task = tokio::task::spawn_blocking(move || {
            let bytes = create()?;
            persist(kind, &target, &bytes);
            Some(bytes)
        });

        match task.await {
            Ok(bytes) => bytes.map(Bytes::from),
            Err(e) => {
                error!("Extraction task failed for {:?}: {}", path, e);
                None
            }
        }
    }
}

/// Registration in the in-flight map, removed when the request finishes or
/// is dropped
struct InFlight<'a> {
    map: &'a DashMap<PathBuf, Arc<Mutex<()>>>,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn acquire(map: &'a DashMap<PathBuf, Arc<Mutex<()>>>, path: &Path) -> Self {
        let lock = Arc::clone(&map.entry(path.to_path_buf()).or_default());
        Self {
            map,
            path: path.to_path_buf(),
            lock,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // Map + ours; anyone else still waiting keeps the entry alive
        self.map
            .remove_if(&self.path, |_, entry| Arc::strong_count(entry) <= 2);
    }
}

/// Best-effort write of a new entry; failures are counted and logged
fn persist(kind: &'static str, path: &Path, bytes: &[u8]) {
    let write = || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)
    };

    match write() {
        Ok(()) => info!("Saved {} bytes to {:?}", bytes.len(), path),
        Err(e) => {
            counter!("wsi_cache_write_failures_total", "cache" => kind).increment(1);
            warn!("Failed to write cache entry {:?}: {}", path, e);
        }
    }
}

async fn read_entry(path: &Path) -> Option<Bytes> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to read cache entry {:?}: {}", path, e);
            None
        }
    }
}

/// Tile cache: slide decode on miss
pub struct TileCache {
    cache: DiskCache,
    slides_dir: PathBuf,
    extractor: RegionExtractor,
}

impl TileCache {
    pub fn new(
        cache_root: impl Into<PathBuf>,
        slides_dir: impl Into<PathBuf>,
        extractor: RegionExtractor,
    ) -> Self {
        Self {
            cache: DiskCache::new(cache_root, "tile"),
            slides_dir: slides_dir.into(),
            extractor,
        }
    }

    /// Slide file for a request: `<slides_dir>/<caseId>/<imageName>`
    pub fn slide_path(&self, request: &RegionRequest) -> PathBuf {
        self.slides_dir
            .join(&request.case_id)
            .join(&request.image_name)
    }

    /// Where the tile for `request` is (or would be) cached
    pub fn entry_path(&self, request: &RegionRequest) -> PathBuf {
        CacheKey::tile(request).path(self.cache.root())
    }

    /// Cached tile bytes, decoding and persisting them on a miss.
    ///
    /// `None` means the slide or region does not exist.
    pub async fn get_or_create(&self, request: &RegionRequest) -> Option<Bytes> {
        counter!("wsi_tile_requests_total").increment(1);

        let key = CacheKey::tile(request);
        let slide_path = self.slide_path(request);
        let params = RegionParams {
            level: request.level,
            x: request.x,
            y: request.y,
            w: request.w,
            h: request.h,
            format: request.format,
            mirror: request.mirror,
        };
        let extractor = self.extractor.clone();

        self.cache
            .get_or_create_with(&key, move || extractor.extract(&slide_path, &params))
            .await
    }
}

/// Macro cache: crop of a pre-rendered overview on miss
pub struct MacroCache {
    cache: DiskCache,
    macro_dir: PathBuf,
    extractor: MacroExtractor,
}

impl MacroCache {
    pub fn new(
        cache_root: impl Into<PathBuf>,
        macro_dir: impl Into<PathBuf>,
        extractor: MacroExtractor,
    ) -> Self {
        Self {
            cache: DiskCache::new(cache_root, "macro"),
            macro_dir: macro_dir.into(),
            extractor,
        }
    }

    /// Overview raster for a request: `<macro_dir>/<caseId>/<level>/<imageName>`
    pub fn source_path(&self, request: &MacroRequest) -> PathBuf {
        self.macro_dir
            .join(&request.case_id)
            .join(request.level.to_string())
            .join(&request.image_name)
    }

    pub fn entry_path(&self, request: &MacroRequest) -> PathBuf {
        CacheKey::macro_crop(request).path(self.cache.root())
    }

    pub async fn get_or_create(&self, request: &MacroRequest) -> Option<Bytes> {
        counter!("wsi_macro_requests_total").increment(1);

        let key = CacheKey::macro_crop(request);
        let source = self.source_path(request);
        let params = CropParams {
            x: request.x,
            y: request.y,
            w: request.w,
            h: request.h,
            format: request.format,
        };
        let extractor = self.extractor;

        self.cache
            .get_or_create_with(&key, move || extractor.extract(&source, &params))
            .await
    }
}
