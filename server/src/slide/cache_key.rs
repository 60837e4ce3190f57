//! Deterministic cache paths for tiles and macro crops
//!
//! Layout (kept compatible with existing cache directories):
//!
//! ```text
//! <root>/<caseId>/<imageName>/<level>/<imageName>&x=..&y=..&w=..&h=..&level=..&mirror=...<ext>
//! ```
//!
//! The file name is lower-cased; macro keys omit the `&mirror=` token and
//! live under their own root.

use std::path::{Path, PathBuf};

use super::types::{ImageFormat, MacroRequest, RegionRequest};

/// Cache location of one encoded tile or macro crop
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    case_id: String,
    image_name: String,
    level: u32,
    file_name: String,
}

impl CacheKey {
    /// Key for a slide tile. `request.mirror` must already be resolved.
    pub fn tile(request: &RegionRequest) -> Self {
        let stem = format!(
            "{}&x={}&y={}&w={}&h={}&level={}&mirror={}",
            request.image_name,
            request.x,
            request.y,
            request.w,
            request.h,
            request.level,
            request.mirror
        );
        Self::from_stem(
            &request.case_id,
            &request.image_name,
            request.level,
            &stem,
            request.format,
        )
    }

    /// Key for a macro crop; `x`/`y` are the level-scaled origin.
    pub fn macro_crop(request: &MacroRequest) -> Self {
        let stem = format!(
            "{}&x={}&y={}&w={}&h={}&level={}",
            request.image_name, request.x, request.y, request.w, request.h, request.level
        );
        Self::from_stem(
            &request.case_id,
            &request.image_name,
            request.level,
            &stem,
            request.format,
        )
    }

    fn from_stem(
        case_id: &str,
        image_name: &str,
        level: u32,
        stem: &str,
        format: ImageFormat,
    ) -> Self {
        Self {
            case_id: case_id.to_string(),
            image_name: image_name.to_string(),
            level,
            file_name: format!("{}.{}", stem, format.extension()).to_lowercase(),
        }
    }

    /// File name of the entry, e.g. `slide.svs&x=0&...&mirror=false.png`
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Directory holding the entry under `root`
    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(&self.case_id)
            .join(&self.image_name)
            .join(self.level.to_string())
    }

    /// Full path of the entry under `root`
    pub fn path(&self, root: &Path) -> PathBuf {
        self.dir(root).join(&self.file_name)
    }
}
