//! Server configuration
//!
//! Configuration is loaded from environment variables. Mirror defaults are
//! loaded once from a JSON metadata file before the server starts accepting
//! requests and are read-only afterwards.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// Slide and cache locations
    pub storage: StorageConfig,

    /// Path of the mirror defaults metadata file
    pub metadata_path: PathBuf,

    /// JPEG quality for JPG tiles (1-100)
    pub jpeg_quality: u8,
}

/// Filesystem layout
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Whole-slide images: `<slides_dir>/<caseId>/<imageName>`
    pub slides_dir: PathBuf,
    /// Pre-rendered overviews: `<macro_dir>/<caseId>/<level>/<imageName>`
    pub macro_dir: PathBuf,
    /// Tile cache root
    pub cache_dir: PathBuf,
    /// Macro crop cache root
    pub macro_cache_dir: PathBuf,
    /// Exported DICOM studies: `<dicom_dir>/images`, `<dicom_dir>/json`
    pub dicom_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            storage: StorageConfig::default(),
            metadata_path: PathBuf::from("metadata.json"),
            jpeg_quality: 90,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            slides_dir: PathBuf::from("./data/slides"),
            macro_dir: PathBuf::from("./data/macro"),
            cache_dir: PathBuf::from("./data/cache"),
            macro_cache_dir: PathBuf::from("./data/cache/macro"),
            dicom_dir: PathBuf::from("./data/dicom"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // Storage config
        if let Ok(path) = env::var("SLIDES_DIR") {
            config.storage.slides_dir = PathBuf::from(path);
        }
        if let Ok(path) = env::var("MACRO_DIR") {
            config.storage.macro_dir = PathBuf::from(path);
        }
        if let Ok(path) = env::var("CACHE_DIR") {
            config.storage.cache_dir = PathBuf::from(path);
            config.storage.macro_cache_dir = config.storage.cache_dir.join("macro");
        }
        if let Ok(path) = env::var("MACRO_CACHE_DIR") {
            config.storage.macro_cache_dir = PathBuf::from(path);
        }
        if let Ok(path) = env::var("DICOM_DIR") {
            config.storage.dicom_dir = PathBuf::from(path);
        }

        if let Ok(path) = env::var("METADATA_PATH")
            && !path.is_empty()
        {
            config.metadata_path = PathBuf::from(path);
        }
        if let Ok(val) = env::var("JPEG_QUALITY")
            && let Ok(q) = val.parse::<u8>()
        {
            config.jpeg_quality = q.clamp(1, 100);
        }

        config
    }
}

/// On-disk format of the metadata file
#[derive(Debug, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    images: Vec<ImageMetadata>,
}

#[derive(Debug, Deserialize)]
struct ImageMetadata {
    name: String,
    #[serde(default)]
    mirror: bool,
}

/// Images that are served mirrored unless the request says otherwise.
///
/// Any image listed in the metadata file is mirrored by default, whatever
/// its `mirror` value. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct MirrorDefaults {
    images: HashMap<String, bool>,
}

impl MirrorDefaults {
    /// Parse a metadata document: `{ "images": [ { "name", "mirror" } ] }`
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: MetadataFile = serde_json::from_str(json)?;
        let images = file
            .images
            .into_iter()
            .map(|image| (image.name, image.mirror))
            .collect();
        Ok(Self { images })
    }

    /// Load from `path`; a missing or malformed file yields no defaults
    pub fn load(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) => {
                warn!("No mirror metadata at {:?} ({}), mirroring only on request", path, e);
                return Self::default();
            }
        };

        match Self::from_json(&json) {
            Ok(defaults) => {
                info!("Loaded {} mirror defaults from {:?}", defaults.len(), path);
                defaults
            }
            Err(e) => {
                warn!("Ignoring malformed mirror metadata {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Resolved mirror state: the request flag, or membership in the defaults
    pub fn resolve(&self, image_name: &str, requested: bool) -> bool {
        requested || self.images.contains_key(image_name)
    }
}
