// SPDX-License-Identifier: MPL-2.0

//! Video encoding for exports
//!
//! - Presets: the encoders GStreamer can instantiate here, best first
//! - Writers: sinks that take composed frames in presentation order
//!
//! The export session only talks to [`WriterFactory`] and [`FrameWriter`], so
//! tests can collect frames in memory instead of encoding them.

pub mod video;
mod writer;

pub use video::{ExportPreset, VideoCodec, available_presets};
pub use writer::{GstFrameWriter, GstWriterFactory};

use crate::constants::BitratePreset;
use crate::errors::ExportError;
use crate::media::{Dimensions, Frame};
use std::path::PathBuf;

/// Output parameters for one export
#[derive(Debug, Clone, PartialEq)]
pub struct WriterSettings {
    pub output: PathBuf,
    /// Size of every frame passed to the writer
    pub dimensions: Dimensions,
    pub frame_rate: f64,
    pub bitrate: BitratePreset,
}

/// Consumes composed frames
pub trait FrameWriter: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ExportError>;

    /// Flush and close the output, returning its path
    fn finish(self: Box<Self>) -> Result<PathBuf, ExportError>;
}

/// Lists presets and creates writers for them
pub trait WriterFactory: Send + Sync {
    /// Usable presets, highest priority first
    fn presets(&self) -> Vec<ExportPreset>;

    fn create_writer(
        &self,
        preset: &ExportPreset,
        settings: &WriterSettings,
    ) -> Result<Box<dyn FrameWriter>, ExportError>;
}
