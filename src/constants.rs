// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Video encoder bitrate presets
///
/// The target bitrate scales with the export resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Low bitrate - smaller files, reduced quality
    Low,
    /// Medium bitrate - balanced quality and file size (default)
    #[default]
    Medium,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    /// All presets from lowest to highest quality
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Bitrate in kbps for an export of the given size
    ///
    /// The tier is chosen from the longer edge so portrait exports get the
    /// same budget as their landscape counterparts.
    pub fn bitrate_kbps(&self, width: u32, height: u32) -> u32 {
        let tier = ResolutionTier::for_long_edge(width.max(height));
        let (low, medium, high) = match tier {
            ResolutionTier::SD => (1_000, 2_000, 4_000),
            ResolutionTier::HD => (2_500, 5_000, 10_000),
            ResolutionTier::FullHD => (4_000, 8_000, 16_000),
            ResolutionTier::FourK => (15_000, 30_000, 50_000),
        };
        match self {
            BitratePreset::Low => low,
            BitratePreset::Medium => medium,
            BitratePreset::High => high,
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// 640 pixels and below
    SD,
    /// up to 1280
    HD,
    /// up to 1920
    FullHD,
    /// 3840 and above
    FourK,
}

impl ResolutionTier {
    pub fn for_long_edge(edge: u32) -> Self {
        match edge {
            e if e >= 3840 => ResolutionTier::FourK,
            e if e >= 1920 => ResolutionTier::FullHD,
            e if e >= 1280 => ResolutionTier::HD,
            _ => ResolutionTier::SD,
        }
    }
}

/// Still and video playback timing
pub mod playback {
    use std::time::Duration;

    /// Timescale used to express stop-motion frame durations
    pub const STOP_MOTION_TIMESCALE: u64 = 600;

    /// Per-still duration (in timescale units) when the set also contains video
    pub const MIXED_MEDIA_FRAME_DURATION: u64 = 120;

    /// Per-still duration (in timescale units) when the set holds only stills
    pub const ONLY_STILLS_FRAME_DURATION: u64 = 300;

    /// Display time for one still when the set contains video (0.2 s)
    pub const MIXED_MEDIA_STILL_INTERVAL: Duration = Duration::from_millis(
        MIXED_MEDIA_FRAME_DURATION * 1000 / STOP_MOTION_TIMESCALE,
    );

    /// Display time for one still when the set holds only stills (0.5 s)
    pub const ONLY_STILLS_INTERVAL: Duration =
        Duration::from_millis(ONLY_STILLS_FRAME_DURATION * 1000 / STOP_MOTION_TIMESCALE);

    /// Frame clock rate used when a video reports no usable frame rate
    pub const DEFAULT_VIDEO_FPS: f64 = 10.0;

    /// Smallest playback rate accepted; guards the interval division
    pub const MIN_RATE: f64 = 0.01;
}

/// Export timing and naming
pub mod export {
    use std::time::Duration;

    /// How often video export progress is polled
    pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// How long the session waits for one composed frame before failing
    pub const COMPOSITION_TIMEOUT: Duration = Duration::from_secs(10);

    /// Frame interval used by frames export when an item has none
    pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(200);

    /// Prefix of generated export file names
    pub const FILE_PREFIX: &str = "export";
}

/// Filter and buffer pool sizing
pub mod render {
    /// Number of output buffers a filter unit keeps in its pool
    pub const RETAINED_BUFFER_COUNT: usize = 6;

    /// Compute workgroup edge length (16x16 threads)
    pub const WORKGROUP_SIZE: u32 = 16;

    /// Log every Nth processed frame at debug level
    pub const FRAME_LOG_INTERVAL: u64 = 30;
}

/// GStreamer pipeline timeouts
pub mod gst_timing {
    /// Preroll timeout when opening a video file
    pub const PREROLL_TIMEOUT_SECS: u64 = 5;

    /// Timeout for pulling a decoded sample
    pub const SAMPLE_TIMEOUT_SECS: u64 = 3;

    /// Timeout waiting for the encoder to flush after end-of-stream
    pub const EOS_TIMEOUT_SECS: u64 = 10;
}

/// Supported file formats for CLI and player inputs
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Supported video file extensions
    pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov"];

    /// Check if an extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }

    /// Check if an extension is a supported video format
    pub fn is_video_extension(ext: &str) -> bool {
        VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Upper bound for a single frame clock wait; keeps stop requests responsive
pub const MAX_CLOCK_WAIT: Duration = Duration::from_millis(250);
