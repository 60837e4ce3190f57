//! Tile serving for whole-slide images
//!
//! This module provides:
//! - `SlideReader` trait abstracting the native slide decoder, with an
//!   OpenSlide-backed implementation
//! - `TileCache` / `MacroCache`: persistent, request-addressed disk caches
//!   that decode (or crop) on a miss
//! - `DetailsReporter` for slide metadata
//! - read-only passthrough of exported DICOM studies
//! - HTTP routes for tiles, macro crops, metadata and listings

mod cache_key;
pub mod catalog;
mod details;
pub mod dicom;
mod encode;
mod macro_image;
mod reader;
mod region;
pub mod routes;
mod tile_cache;
mod transform;
mod types;

pub use cache_key::CacheKey;
pub use details::{DEFAULT_OFFSET, DetailsReporter, offset_path};
pub use encode::{TileEncoder, flip_horizontal, to_premultiplied_rgba};
pub use macro_image::{CropParams, MacroExtractor, crop, macro_details};
pub use reader::{OpenSlideReader, SlideHandle, SlideReader};
pub use region::{RegionExtractor, RegionParams};
pub use routes::{SlideAppState, command_routes, slide_routes};
pub use tile_cache::{DiskCache, MacroCache, TileCache};
pub use transform::mirrored_origin_x;
pub use types::{
    CaseList, ImageFormat, ImageList, MAX_REGION_DIMENSION, MacroDetails, MacroRequest,
    RegionRequest, SlideDetails, SlideError,
};
