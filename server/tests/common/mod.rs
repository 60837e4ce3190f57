//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use axum::{Json, Router, routing::get};
use image::{Rgba, RgbaImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower_http::cors::{Any, CorsLayer};
use wsi_tile_server::config::StorageConfig;
use wsi_tile_server::{
    MirrorDefaults, SlideAppState, SlideError, SlideHandle, SlideReader, command_routes,
    slide_routes,
};

/// Level 0 size of every stub slide
pub const LEVEL0_WIDTH: u64 = 4096;
pub const LEVEL0_HEIGHT: u64 = 2048;
/// Downsample between consecutive stub levels
pub const LEVEL_FACTOR: u64 = 4;
pub const LEVEL_COUNT: u32 = 3;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// One `read_region` call seen by the stub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedRead {
    pub x: i64,
    pub y: i64,
    pub level: u32,
    pub w: u32,
    pub h: u32,
}

/// Counters shared between the stub reader and its handles
#[derive(Default)]
pub struct StubStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: Mutex<Vec<RecordedRead>>,
}

impl StubStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> Vec<RecordedRead> {
        self.reads.lock().unwrap().clone()
    }
}

/// Slide reader standing in for OpenSlide.
///
/// Any existing file opens as a three-level pyramid, except files whose name
/// starts with `corrupt`, which open but fail every region read.
pub struct StubSlideReader {
    pub stats: Arc<StubStats>,
}

struct StubHandle {
    stats: Arc<StubStats>,
    corrupt: bool,
}

impl Drop for StubHandle {
    fn drop(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl SlideReader for StubSlideReader {
    fn open(&self, path: &Path) -> Result<Box<dyn SlideHandle>, SlideError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if !path.is_file() {
            return Err(SlideError::NotFound(format!("{:?}", path)));
        }
        let corrupt = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("corrupt"));
        Ok(Box::new(StubHandle {
            stats: Arc::clone(&self.stats),
            corrupt,
        }))
    }
}

impl SlideHandle for StubHandle {
    fn level_count(&self) -> Result<u32, SlideError> {
        Ok(LEVEL_COUNT)
    }

    fn level_dimensions(&self, level: u32) -> Result<(u64, u64), SlideError> {
        if level >= LEVEL_COUNT {
            return Err(SlideError::DecodeError(format!("no level {}", level)));
        }
        let scale = LEVEL_FACTOR.pow(level);
        Ok((LEVEL0_WIDTH / scale, LEVEL0_HEIGHT / scale))
    }

    fn level_downsample(&self, level: u32) -> Result<f64, SlideError> {
        Ok(LEVEL_FACTOR.pow(level) as f64)
    }

    fn read_region(
        &self,
        x: i64,
        y: i64,
        level: u32,
        w: u32,
        h: u32,
    ) -> Result<RgbaImage, SlideError> {
        self.stats.reads.lock().unwrap().push(RecordedRead { x, y, level, w, h });
        if self.corrupt || level >= LEVEL_COUNT {
            return Err(SlideError::DecodeError("corrupt".to_string()));
        }
        Ok(stub_pixels(w, h))
    }

    fn property_value(&self, name: &str) -> Option<String> {
        match name {
            "openslide.vendor" => Some("stub".to_string()),
            "openslide.mpp-x" => Some("0.25".to_string()),
            "openslide.mpp-y" => Some("0.5".to_string()),
            _ => None,
        }
    }
}

/// Pixels returned by the stub for any region: red encodes the column
pub fn stub_pixels(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |px, py| Rgba([px as u8, py as u8, 200, 255]))
}

/// Temporary slide/macro/cache tree plus a router wired to the stub reader
pub struct TestServer {
    pub dir: TempDir,
    pub storage: StorageConfig,
    pub stats: Arc<StubStats>,
    pub state: SlideAppState,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_mirror_defaults(MirrorDefaults::default())
    }

    pub fn with_mirror_defaults(mirror: MirrorDefaults) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            slides_dir: dir.path().join("slides"),
            macro_dir: dir.path().join("macro"),
            cache_dir: dir.path().join("cache"),
            macro_cache_dir: dir.path().join("macro_cache"),
            dicom_dir: dir.path().join("dicom"),
        };
        std::fs::create_dir_all(&storage.slides_dir).unwrap();
        std::fs::create_dir_all(&storage.macro_dir).unwrap();

        let stats = Arc::new(StubStats::default());
        let reader = StubSlideReader {
            stats: Arc::clone(&stats),
        };
        let state = SlideAppState::new(&storage, Arc::new(reader), mirror, 90);

        Self {
            dir,
            storage,
            stats,
            state,
        }
    }

    /// Create an (empty) slide file the stub will accept
    pub fn add_slide(&self, case_id: &str, name: &str) -> PathBuf {
        let case_dir = self.storage.slides_dir.join(case_id);
        std::fs::create_dir_all(&case_dir).unwrap();
        let path = case_dir.join(name);
        std::fs::write(&path, b"stub slide").unwrap();
        path
    }

    /// Write a macro raster at `<macro>/<case>/<level>/<name>`
    pub fn add_macro(&self, case_id: &str, level: u32, name: &str, image: &RgbaImage) -> PathBuf {
        let dir = self
            .storage
            .macro_dir
            .join(case_id)
            .join(level.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        image.save(&path).unwrap();
        path
    }

    /// Write an exported study: `images/<name>.jpg` and `json/<name>.json`
    pub fn add_dicom_study(&self, name: &str, jpeg: &[u8], json: &str) {
        let images = self.storage.dicom_dir.join("images");
        let docs = self.storage.dicom_dir.join("json");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(images.join(format!("{}.jpg", name)), jpeg).unwrap();
        std::fs::write(docs.join(format!("{}.json", name)), json).unwrap();
    }

    /// Router with the same layout as the binary
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health))
            .nest("/api", slide_routes(self.state.clone()))
            .merge(command_routes(self.state.clone()))
            .layer(cors)
    }

    /// Files currently stored in the tile cache
    pub fn cached_files(&self) -> Vec<PathBuf> {
        fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, out);
                } else {
                    out.push(path);
                }
            }
        }

        let mut files = Vec::new();
        walk(&self.storage.cache_dir, &mut files);
        files.sort();
        files
    }
}
