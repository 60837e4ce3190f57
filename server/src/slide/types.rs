//! Slide-related types and error definitions

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Largest accepted tile width or height, in pixels
pub const MAX_REGION_DIMENSION: i32 = 10_000;

/// Errors that can occur when working with slides
#[derive(Debug, Error)]
pub enum SlideError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Failed to open slide: {0}")]
    OpenError(String),

    #[error("Failed to decode region: {0}")]
    DecodeError(String),

    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SlideError {
    /// Whether this error means "no such resource" to a client.
    ///
    /// A slide that cannot be opened and a slide that fails to decode are
    /// indistinguishable from the outside.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SlideError::NotFound(_) | SlideError::OpenError(_) | SlideError::DecodeError(_)
        )
    }
}

/// Output encoding of a tile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
    Bmp,
    /// Premultiplied RGBA8, row-major, top row first, no header
    Raw,
}

impl ImageFormat {
    /// Lower-case file extension used in the cache layout
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Raw => "raw",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpg => "image/jpeg",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Raw => "application/octet-stream",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = SlideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PNG" => Ok(ImageFormat::Png),
            "JPG" | "JPEG" => Ok(ImageFormat::Jpg),
            "BMP" => Ok(ImageFormat::Bmp),
            "RAW" => Ok(ImageFormat::Raw),
            other => Err(SlideError::InvalidParameter(format!(
                "unsupported format: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A validated request for one tile of a whole-slide image.
///
/// `x` and `y` are in the level 0 reference frame; `w` and `h` are the size
/// of the output at `level`. `mirror` is the resolved mirror state (request
/// flag or mirror default), not just the raw query flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionRequest {
    pub case_id: String,
    pub image_name: String,
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub w: u32,
    pub h: u32,
    pub format: ImageFormat,
    pub mirror: bool,
}

impl RegionRequest {
    /// Validate raw request parameters.
    ///
    /// Rejects dimensions outside `[0, 10000]`, negative levels and names
    /// that would escape the configured roots. Performs no I/O.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        case_id: &str,
        image_name: &str,
        level: i32,
        x: i64,
        y: i64,
        w: i32,
        h: i32,
        format: ImageFormat,
        mirror: bool,
    ) -> Result<Self, SlideError> {
        validate_path_component("caseID", case_id)?;
        validate_path_component("name", image_name)?;
        let level = validate_level(level)?;
        let w = validate_dimension("w", w)?;
        let h = validate_dimension("h", h)?;

        Ok(Self {
            case_id: case_id.to_string(),
            image_name: image_name.to_string(),
            level,
            x,
            y,
            w,
            h,
            format,
            mirror,
        })
    }
}

/// A validated request for a crop of a pre-rendered macro image.
///
/// `x` and `y` are already divided by `2^level`; callers building this from
/// level 0 coordinates use [`MacroRequest::from_level0`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacroRequest {
    pub case_id: String,
    pub image_name: String,
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub w: u32,
    pub h: u32,
    pub format: ImageFormat,
}

impl MacroRequest {
    /// Validate raw parameters and scale the level 0 origin down to `level`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_level0(
        case_id: &str,
        image_name: &str,
        level: i32,
        x: i64,
        y: i64,
        w: i32,
        h: i32,
        format: ImageFormat,
    ) -> Result<Self, SlideError> {
        validate_path_component("caseID", case_id)?;
        validate_path_component("name", image_name)?;
        let level = validate_level(level)?;
        let w = validate_dimension("w", w)?;
        let h = validate_dimension("h", h)?;

        let scale = 2i64.checked_pow(level).ok_or_else(|| {
            SlideError::InvalidParameter(format!("level {} is too large", level))
        })?;

        Ok(Self {
            case_id: case_id.to_string(),
            image_name: image_name.to_string(),
            level,
            x: x / scale,
            y: y / scale,
            w,
            h,
            format,
        })
    }
}

/// Metadata report for a whole-slide image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideDetails {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Vendor")]
    pub vendor: String,
    #[serde(rename = "Microns per pixel X")]
    pub mpp_x: String,
    #[serde(rename = "Microns per pixel Y")]
    pub mpp_y: String,
    #[serde(rename = "Levels")]
    pub levels: u32,
    #[serde(rename = "Width")]
    pub width: u64,
    #[serde(rename = "Height")]
    pub height: u64,
    /// One `"level,width,height"` entry per pyramid level
    #[serde(rename = "Dimensions")]
    pub dimensions: Vec<String>,
    /// Calibration offset from the `<slide>.txt` sidecar, `"0,0"` if absent
    #[serde(rename = "Offset")]
    pub offset: String,
}

/// Size report for a pre-rendered macro image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroDetails {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Width")]
    pub width: u32,
    #[serde(rename = "Height")]
    pub height: u32,
}

/// Case directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseList {
    #[serde(rename = "Cases")]
    pub cases: Vec<String>,
}

/// Image listing for one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageList {
    #[serde(rename = "Images")]
    pub images: Vec<String>,
}

/// Reject identifiers that are empty or could walk out of a root directory
pub fn validate_path_component(field: &str, value: &str) -> Result<(), SlideError> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
    {
        return Err(SlideError::InvalidParameter(format!(
            "invalid {}: {:?}",
            field, value
        )));
    }
    Ok(())
}

fn validate_level(level: i32) -> Result<u32, SlideError> {
    u32::try_from(level)
        .map_err(|_| SlideError::InvalidParameter(format!("level must be >= 0, got {}", level)))
}

fn validate_dimension(field: &str, value: i32) -> Result<u32, SlideError> {
    if !(0..=MAX_REGION_DIMENSION).contains(&value) {
        return Err(SlideError::InvalidParameter(format!(
            "{} must be within [0, {}], got {}",
            field, MAX_REGION_DIMENSION, value
        )));
    }
    Ok(value as u32)
}
