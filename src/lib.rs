// SPDX-License-Identifier: MPL-2.0

//! snapreel - filtered playback and export of stills and videos
//!
//! Frames flow from a source (still image or GStreamer video) through a
//! [`render::Renderer`], which owns one filter unit and hands filtered frames
//! to a display surface and to any recording consumer.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`filters`]: filter units, the filter type catalogue and the factory
//! - [`render`]: the renderer state machine and fill geometry
//! - [`playback`]: the playback controller for stills and videos
//! - [`pipelines`]: the video compositor, export session and exporter
//! - [`media`]: pixel buffers, transforms, decoding and encoding
//! - [`gpu`] / [`shaders`]: the wgpu compute backend
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```ignore
//! let mut exporter = MediaExporter::new(Config::load().filter_factory());
//! exporter.set_filter_type(FilterType::Manga);
//! let filtered = exporter.export_image(&image, 0.0)?;
//! ```

pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod playback;
pub mod render;
pub mod shaders;

// Re-export commonly used types
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{AppError, AppResult, CompositorError, ExportError, RenderError};
pub use filters::{FilterBackend, FilterFactory, FilterType, FilterUnit};
pub use media::{Dimensions, Frame, PixelBuffer};
pub use pipelines::{ExportFrame, MediaExporter, VideoCompositor};
pub use playback::{MediaContent, MediaPlayer, PlaybackMode};
pub use render::{Renderer, RendererDelegate};
