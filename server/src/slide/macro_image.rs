//! Crops of pre-rendered macro overview images
//!
//! Macro images are ordinary rasters stored per case and level; serving one
//! is a crop, never a slide decode.

use std::path::Path;

use image::{RgbaImage, imageops};
use tracing::debug;

use super::encode::TileEncoder;
use super::types::{ImageFormat, MacroDetails, SlideError};

/// Crop window in the macro image's own pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropParams {
    pub x: i64,
    pub y: i64,
    pub w: u32,
    pub h: u32,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct MacroExtractor {
    encoder: TileEncoder,
}

impl MacroExtractor {
    pub fn new(encoder: TileEncoder) -> Self {
        Self { encoder }
    }

    /// Crop and encode, or `None` if the source is missing, the window is
    /// empty or out of bounds, or the format is RAW (not offered for macros).
    pub fn extract(&self, source: &Path, params: &CropParams) -> Option<Vec<u8>> {
        match self.try_extract(source, params) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("No macro crop for {:?} {:?}: {}", source, params, e);
                None
            }
        }
    }

    fn try_extract(&self, source: &Path, params: &CropParams) -> Result<Vec<u8>, SlideError> {
        if params.format == ImageFormat::Raw {
            return Err(SlideError::NotFound("RAW macro crops".to_string()));
        }
        if params.w == 0 || params.h == 0 {
            return Err(SlideError::NotFound(format!(
                "empty {}x{} crop",
                params.w, params.h
            )));
        }
        if !source.is_file() {
            return Err(SlideError::NotFound(format!("{:?}", source)));
        }

        let image = image::open(source)
            .map_err(|e| SlideError::DecodeError(format!("{:?}: {}", source, e)))?
            .into_rgba8();

        let target = crop(&image, params.x, params.y, params.w, params.h)?;
        self.encoder.encode(&target, params.format)
    }
}

/// Copy the `w` x `h` window at `(x, y)` into a `w` x `h` canvas.
///
/// An empty window, or one not fully inside the image, is not found.
///
/// The source window and the canvas always have the same size, so this is
/// a straight sub-block copy with no resampling.
pub fn crop(image: &RgbaImage, x: i64, y: i64, w: u32, h: u32) -> Result<RgbaImage, SlideError> {
    let (width, height) = image.dimensions();
    let fits = |origin: i64, extent: u32, limit: u32| {
        origin >= 0
            && extent > 0
            && origin
                .checked_add(i64::from(extent))
                .is_some_and(|end| end <= i64::from(limit))
    };

    if !fits(x, w, width) || !fits(y, h, height) {
        return Err(SlideError::NotFound(format!(
            "crop {}x{} at ({}, {}) outside {}x{} image",
            w, h, x, y, width, height
        )));
    }

    Ok(imageops::crop_imm(image, x as u32, y as u32, w, h).to_image())
}

/// Report the name and pixel size of a macro image
pub fn macro_details(source: &Path) -> Result<MacroDetails, SlideError> {
    if !source.is_file() {
        return Err(SlideError::NotFound(format!("{:?}", source)));
    }

    let (width, height) = image::image_dimensions(source)
        .map_err(|e| SlideError::DecodeError(format!("{:?}: {}", source, e)))?;

    let name = source
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_default();

    Ok(MacroDetails {
        name,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checkerboard(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, ((x + y) % 2 * 255) as u8, 255])
        })
    }

    #[test]
    fn test_crop_is_exact_sub_block() {
        let img = checkerboard(64, 48);
        let cropped = crop(&img, 10, 20, 16, 8).unwrap();

        assert_eq!(cropped.dimensions(), (16, 8));
        for y in 0..8 {
            for x in 0..16 {
                assert_eq!(cropped.get_pixel(x, y), img.get_pixel(x + 10, y + 20));
            }
        }
    }

    #[test]
    fn test_crop_out_of_bounds_is_not_found() {
        let img = checkerboard(32, 32);
        assert!(crop(&img, 20, 0, 16, 16).is_err());
        assert!(crop(&img, -1, 0, 4, 4).is_err());
        assert!(crop(&img, 0, 30, 4, 4).is_err());
        assert!(crop(&img, 0, 0, 32, 32).is_ok());
    }

    #[test]
    fn test_crop_extreme_origins_are_not_found() {
        let img = checkerboard(32, 32);
        for (x, y) in [
            (i64::MAX - 5, 0),
            (0, i64::MAX - 5),
            (i64::MAX, i64::MAX),
            (i64::MIN, 0),
            (0, i64::MIN),
        ] {
            assert!(
                matches!(crop(&img, x, y, 10, 10), Err(SlideError::NotFound(_))),
                "({}, {})",
                x,
                y
            );
        }
    }

    #[test]
    fn test_empty_crop_is_not_found() {
        let img = checkerboard(32, 32);
        assert!(crop(&img, 0, 0, 0, 8).is_err());
        assert!(crop(&img, 0, 0, 8, 0).is_err());
        assert!(crop(&img, 32, 32, 0, 0).is_err());
    }

    #[test]
    fn test_extract_rejects_overflowing_and_empty_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macro.png");
        checkerboard(32, 32).save(&path).unwrap();

        let extractor = MacroExtractor::new(TileEncoder::new(90));
        let overflowing = CropParams {
            x: i64::MAX - 5,
            y: 0,
            w: 10,
            h: 10,
            format: ImageFormat::Bmp,
        };
        assert!(extractor.extract(&path, &overflowing).is_none());

        for (w, h) in [(0, 10), (10, 0)] {
            let empty = CropParams {
                x: 0,
                w,
                h,
                ..overflowing
            };
            assert!(extractor.extract(&path, &empty).is_none());
        }
    }

    #[test]
    fn test_extract_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macro.png");
        let img = checkerboard(40, 30);
        img.save(&path).unwrap();

        let extractor = MacroExtractor::new(TileEncoder::new(90));
        let params = CropParams {
            x: 5,
            y: 5,
            w: 10,
            h: 10,
            format: ImageFormat::Png,
        };
        let bytes = extractor.extract(&path, &params).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, crop(&img, 5, 5, 10, 10).unwrap());
    }

    #[test]
    fn test_missing_source_and_raw_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = MacroExtractor::new(TileEncoder::new(90));
        let params = CropParams {
            x: 0,
            y: 0,
            w: 4,
            h: 4,
            format: ImageFormat::Png,
        };
        assert!(extractor.extract(&dir.path().join("nope.png"), &params).is_none());

        let path = dir.path().join("macro.png");
        checkerboard(8, 8).save(&path).unwrap();
        let raw = CropParams {
            format: ImageFormat::Raw,
            ..params
        };
        assert!(extractor.extract(&path, &raw).is_none());
    }

    #[test]
    fn test_macro_details() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overview.png");
        checkerboard(12, 7).save(&path).unwrap();

        let details = macro_details(&path).unwrap();
        assert_eq!(details.name, "overview.png");
        assert_eq!((details.width, details.height), (12, 7));

        assert!(macro_details(&dir.path().join("missing.png")).is_err());
    }
}
