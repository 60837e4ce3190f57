//! Region extraction: open, decode, mirror, encode

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, warn};

use super::encode::{TileEncoder, flip_horizontal};
use super::reader::{SlideHandle, SlideReader};
use super::transform::mirrored_origin_x;
use super::types::{ImageFormat, SlideError};

/// Parameters of one decode, independent of where the slide lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionParams {
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub w: u32,
    pub h: u32,
    pub format: ImageFormat,
    pub mirror: bool,
}

/// Decodes and encodes slide regions on cache misses
#[derive(Clone)]
pub struct RegionExtractor {
    reader: Arc<dyn SlideReader>,
    encoder: TileEncoder,
}

impl RegionExtractor {
    pub fn new(reader: Arc<dyn SlideReader>, encoder: TileEncoder) -> Self {
        Self { reader, encoder }
    }

    /// Produce encoded bytes for a region, or `None` if the slide is
    /// missing, unreadable or fails to decode. A zero-area region is `None`
    /// for every format and never opens the slide.
    ///
    /// Blocking; the slide is opened and closed within this call.
    pub fn extract(&self, slide_path: &Path, params: &RegionParams) -> Option<Vec<u8>> {
        match self.try_extract(slide_path, params) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.is_not_found() => {
                debug!("No region for {:?} {:?}: {}", slide_path, params, e);
                None
            }
            Err(e) => {
                warn!("Region extraction failed for {:?} {:?}: {}", slide_path, params, e);
                None
            }
        }
    }

    fn try_extract(&self, slide_path: &Path, params: &RegionParams) -> Result<Vec<u8>, SlideError> {
        if params.w == 0 || params.h == 0 {
            return Err(SlideError::NotFound(format!(
                "empty {}x{} region",
                params.w, params.h
            )));
        }

        let slide = self.reader.open(slide_path)?;

        let x = if params.mirror {
            native_origin_x(slide.as_ref(), params)?
        } else {
            params.x
        };

        let read_start = Instant::now();
        let region = slide.read_region(x, params.y, params.level, params.w, params.h)?;
        histogram!("wsi_region_decode_duration_seconds").record(read_start.elapsed());

        // Release the native handle before the CPU-only encode
        drop(slide);

        let region = if params.mirror {
            flip_horizontal(&region)
        } else {
            region
        };

        self.encoder.encode(&region, params.format)
    }
}

fn native_origin_x(slide: &dyn SlideHandle, params: &RegionParams) -> Result<i64, SlideError> {
    let (level0_width, _) = slide.level_dimensions(0)?;
    let (level_width, _) = slide.level_dimensions(params.level)?;
    let x = mirrored_origin_x(level0_width as i64, level_width as i64, params.x, params.w)
        .ok_or_else(|| {
            SlideError::DecodeError(format!(
                "mirrored origin for x={} w={} at level {} is out of range",
                params.x, params.w, params.level
            ))
        })?;
    debug!(
        "Mirrored origin: x={} -> {} (level0 width {}, level {} width {})",
        params.x, x, level0_width, params.level, level_width
    );
    Ok(x)
}
