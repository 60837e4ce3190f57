//! WSI Tile Server Library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod config;
pub mod slide;

// Re-export commonly used types
pub use config::{Config, MirrorDefaults};
pub use slide::{
    ImageFormat, RegionRequest, SlideAppState, SlideError, SlideHandle, SlideReader, TileCache,
    command_routes, slide_routes,
};
