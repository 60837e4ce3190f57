//! Slide reader abstraction and the OpenSlide-backed implementation
//!
//! A [`SlideHandle`] owns one open slide. Dropping the handle closes it, so
//! every exit path of a caller releases the native resources.

use std::path::Path;

use image::RgbaImage;
use openslide_rs::{Address, OpenSlide, Region, Size};
use tracing::debug;

use super::types::SlideError;

/// OpenSlide property holding the scanner vendor
pub const PROPERTY_VENDOR: &str = "openslide.vendor";
/// OpenSlide property holding microns per pixel along X
pub const PROPERTY_MPP_X: &str = "openslide.mpp-x";
/// OpenSlide property holding microns per pixel along Y
pub const PROPERTY_MPP_Y: &str = "openslide.mpp-y";

/// Opens whole-slide images
pub trait SlideReader: Send + Sync {
    /// Open a slide. An unrecognized or unreadable file is an error.
    fn open(&self, path: &Path) -> Result<Box<dyn SlideHandle>, SlideError>;
}

/// An open whole-slide image; closed on drop
pub trait SlideHandle: Send {
    fn level_count(&self) -> Result<u32, SlideError>;

    /// `(width, height)` of a pyramid level
    fn level_dimensions(&self, level: u32) -> Result<(u64, u64), SlideError>;

    fn level_downsample(&self, level: u32) -> Result<f64, SlideError>;

    /// Read a `w` x `h` region at `level` whose top-left corner is `(x, y)`
    /// in the level 0 frame. Pixels come back straight (not premultiplied)
    /// RGBA.
    fn read_region(&self, x: i64, y: i64, level: u32, w: u32, h: u32)
    -> Result<RgbaImage, SlideError>;

    fn property_value(&self, name: &str) -> Option<String>;

    fn vendor(&self) -> Option<String> {
        self.property_value(PROPERTY_VENDOR)
    }
}

/// [`SlideReader`] backed by the native OpenSlide library
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSlideReader;

impl SlideReader for OpenSlideReader {
    fn open(&self, path: &Path) -> Result<Box<dyn SlideHandle>, SlideError> {
        if !path.is_file() {
            return Err(SlideError::NotFound(format!("{:?}", path)));
        }

        debug!("Opening slide at {:?}", path);
        let slide = OpenSlide::new(path)
            .map_err(|e| SlideError::OpenError(format!("Failed to open {:?}: {}", path, e)))?;
        Ok(Box::new(OpenSlideHandle { slide }))
    }
}

/// Owning wrapper; `OpenSlide`'s own drop calls `openslide_close`
struct OpenSlideHandle {
    slide: OpenSlide,
}

impl SlideHandle for OpenSlideHandle {
    fn level_count(&self) -> Result<u32, SlideError> {
        self.slide
            .get_level_count()
            .map_err(|e| SlideError::DecodeError(format!("level count: {}", e)))
    }

    fn level_dimensions(&self, level: u32) -> Result<(u64, u64), SlideError> {
        self.slide
            .get_level_dimensions(level)
            .map(|d| (d.w as u64, d.h as u64))
            .map_err(|e| SlideError::DecodeError(format!("dimensions of level {}: {}", level, e)))
    }

    fn level_downsample(&self, level: u32) -> Result<f64, SlideError> {
        self.slide
            .get_level_downsample(level)
            .map_err(|e| SlideError::DecodeError(format!("downsample of level {}: {}", level, e)))
    }

    fn read_region(
        &self,
        x: i64,
        y: i64,
        level: u32,
        w: u32,
        h: u32,
    ) -> Result<RgbaImage, SlideError> {
        let (ax, ay) = match (u32::try_from(x), u32::try_from(y)) {
            (Ok(ax), Ok(ay)) => (ax, ay),
            _ => {
                return Err(SlideError::DecodeError(format!(
                    "origin ({}, {}) is outside the addressable range",
                    x, y
                )));
            }
        };

        let region = Region {
            address: Address { x: ax, y: ay },
            level,
            size: Size { w, h },
        };

        self.slide.read_image_rgba(&region).map_err(|e| {
            SlideError::DecodeError(format!(
                "Failed to read region at level {} ({},{}): {}",
                level, x, y, e
            ))
        })
    }

    fn property_value(&self, name: &str) -> Option<String> {
        self.slide.get_property_value(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_not_found() {
        let result = OpenSlideReader.open(Path::new("/nonexistent/slide.svs"));
        assert!(matches!(result, Err(SlideError::NotFound(_))));
    }

    #[test]
    fn test_non_slide_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.svs");
        std::fs::write(&path, b"not a slide").unwrap();

        let err = OpenSlideReader.open(&path).err().unwrap();
        assert!(err.is_not_found());
    }
}
