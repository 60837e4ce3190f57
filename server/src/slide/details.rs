//! Slide metadata reports

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::reader::{PROPERTY_MPP_X, PROPERTY_MPP_Y, SlideReader};
use super::types::{SlideDetails, SlideError};

/// Offset reported when a slide has no calibration sidecar
pub const DEFAULT_OFFSET: &str = "0,0";

#[derive(Clone)]
pub struct DetailsReporter {
    reader: Arc<dyn SlideReader>,
}

impl DetailsReporter {
    pub fn new(reader: Arc<dyn SlideReader>) -> Self {
        Self { reader }
    }

    /// Build the metadata report for a slide.
    ///
    /// Any failure to open or query the slide is reported as not found;
    /// a partial report is never returned. Blocking.
    pub fn details(&self, slide_path: &Path) -> Result<SlideDetails, SlideError> {
        let slide = self
            .reader
            .open(slide_path)
            .map_err(|e| SlideError::NotFound(format!("{:?}: {}", slide_path, e)))?;

        let levels = slide.level_count()?;
        if levels == 0 {
            return Err(SlideError::NotFound(format!("{:?} has no levels", slide_path)));
        }

        let mut sizes = Vec::with_capacity(levels as usize);
        for level in 0..levels {
            sizes.push(slide.level_dimensions(level)?);
        }

        let vendor = slide.vendor().unwrap_or_default();
        let mpp_x = slide.property_value(PROPERTY_MPP_X).unwrap_or_default();
        let mpp_y = slide.property_value(PROPERTY_MPP_Y).unwrap_or_default();
        drop(slide);

        let (width, height) = sizes[0];
        let dimensions = sizes
            .iter()
            .enumerate()
            .map(|(level, (w, h))| format!("{},{},{}", level, w, h))
            .collect();

        let name = slide_path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_default();

        Ok(SlideDetails {
            name,
            vendor,
            mpp_x,
            mpp_y,
            levels,
            width,
            height,
            dimensions,
            offset: load_offset(slide_path),
        })
    }
}

/// Sidecar path holding the calibration offset: `<slide path>.txt`
pub fn offset_path(slide_path: &Path) -> PathBuf {
    let mut path = slide_path.as_os_str().to_owned();
    path.push(".txt");
    PathBuf::from(path)
}

/// Read the calibration offset, falling back to [`DEFAULT_OFFSET`].
///
/// The sidecar may hold either bare text (`12,-4`) or a JSON string
/// literal (`"12,-4"`); both yield the same value.
fn load_offset(slide_path: &Path) -> String {
    let path = offset_path(slide_path);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let text = text.trim();
            serde_json::from_str::<String>(text).unwrap_or_else(|_| text.to_string())
        }
        Err(e) => {
            debug!("No offset sidecar at {:?}: {}", path, e);
            DEFAULT_OFFSET.to_string()
        }
    }
}
