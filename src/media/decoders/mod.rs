// SPDX-License-Identifier: GPL-3.0-only

//! Media sources
//!
//! Stills are decoded with the `image` crate and returned upright. Videos are
//! read through GStreamer as a [`VideoSource`]: a sequential stream of RGBA
//! frames with presentation times, described by a [`VideoTrackInfo`].
//!
//! The playback controller and the export session only see the traits, so
//! tests drive them with in-memory assets.

mod still;
mod video;

pub use self::still::{load_image, overlay_from_image};
pub use self::video::{GstVideoAsset, GstVideoSource};

use super::{Dimensions, Frame, MediaTransform};
use crate::constants::playback::DEFAULT_VIDEO_FPS;
use crate::errors::ExportError;
use std::time::Duration;

/// Description of an asset's video track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoTrackInfo {
    pub track_id: u32,
    /// Stored (pre-rotation) frame size
    pub natural_size: Dimensions,
    /// Nominal frames per second, if the container reports one
    pub frame_rate: Option<f64>,
    pub duration: Option<Duration>,
    /// Orientation needed to show the track upright
    pub transform: MediaTransform,
}

impl VideoTrackInfo {
    /// Frame rate to drive clocks with; unknown or invalid rates use the default
    pub fn effective_frame_rate(&self) -> f64 {
        self.frame_rate
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(DEFAULT_VIDEO_FPS)
    }

    /// Upright display size
    pub fn display_size(&self) -> Dimensions {
        if self.transform.switches_dimensions() {
            self.natural_size.swapped()
        } else {
            self.natural_size
        }
    }
}

/// Sequential reader of decoded video frames
pub trait VideoSource: Send {
    fn track(&self) -> VideoTrackInfo;

    /// Next frame in presentation order; `None` at end of stream
    fn next_frame(&mut self) -> Option<Frame>;

    /// Seek back to the first frame
    fn rewind(&mut self) -> Result<(), ExportError>;
}

/// A video asset that can be opened any number of times
pub trait MediaAsset: Send + Sync {
    /// The asset's video track, `None` if it has none
    fn video_track(&self) -> Option<VideoTrackInfo>;

    /// Open a fresh reader positioned at the first frame
    fn open_video(&self) -> Result<Box<dyn VideoSource>, ExportError>;
}
