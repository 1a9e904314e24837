// SPDX-License-Identifier: MPL-2.0

//! Export presets
//!
//! A preset is one GStreamer video encoder that can be instantiated on this
//! machine. Hardware encoders rank ahead of software ones and HEVC ahead of
//! H.264; every preset muxes into MP4.

use crate::constants::BitratePreset;
use gstreamer as gst;
use tracing::{debug, info};

/// Video codecs an export can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// HEVC/H.265 codec (good compression)
    HEVC,
    /// H.264 codec (best compatibility)
    H264,
}

impl VideoCodec {
    /// Parser placed between encoder and muxer
    pub fn parser_name(&self) -> &'static str {
        match self {
            VideoCodec::HEVC => "h265parse",
            VideoCodec::H264 => "h264parse",
        }
    }
}

/// Muxer for every export
pub const MUXER_NAME: &str = "mp4mux";

/// Extension of exported video files
pub const FILE_EXTENSION: &str = "mp4";

/// An available encoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPreset {
    /// GStreamer element name
    pub element_name: String,
    pub display_name: String,
    pub codec: VideoCodec,
    pub is_hardware: bool,
    /// Lower is preferred
    pub priority: u32,
}

impl ExportPreset {
    pub fn new(
        element_name: &str,
        display_name: &str,
        codec: VideoCodec,
        is_hardware: bool,
        priority: u32,
    ) -> Self {
        Self {
            element_name: element_name.to_string(),
            display_name: display_name.to_string(),
            codec,
            is_hardware,
            priority,
        }
    }
}

const ENCODER_SPECS: &[(&str, &str, VideoCodec, bool, u32)] = &[
    // Hardware HEVC/H.265
    ("vah265enc", "VA-API H.265 (HW)", VideoCodec::HEVC, true, 20),
    ("vaapih265enc", "VA-API H.265 (HW)", VideoCodec::HEVC, true, 21),
    ("nvh265enc", "NVIDIA H.265 (HW)", VideoCodec::HEVC, true, 22),
    ("qsvh265enc", "Intel QSV H.265 (HW)", VideoCodec::HEVC, true, 23),
    ("amfh265enc", "AMD AMF H.265 (HW)", VideoCodec::HEVC, true, 24),
    // Software HEVC/H.265
    ("x265enc", "x265 H.265 (SW)", VideoCodec::HEVC, false, 30),
    // Hardware H.264
    ("vah264enc", "VA-API H.264 (HW)", VideoCodec::H264, true, 40),
    ("vaapih264enc", "VA-API H.264 (HW)", VideoCodec::H264, true, 41),
    ("nvh264enc", "NVIDIA H.264 (HW)", VideoCodec::H264, true, 42),
    ("qsvh264enc", "Intel QSV H.264 (HW)", VideoCodec::H264, true, 43),
    ("amfh264enc", "AMD AMF H.264 (HW)", VideoCodec::H264, true, 44),
    // Software H.264
    ("x264enc", "x264 H.264 (SW)", VideoCodec::H264, false, 50),
    ("openh264enc", "OpenH264 H.264 (SW)", VideoCodec::H264, false, 51),
];

/// Presets whose encoder, parser and muxer can all be created, best first
pub fn available_presets() -> Vec<ExportPreset> {
    if gst::init().is_err() {
        return Vec::new();
    }
    if gst::ElementFactory::make(MUXER_NAME).build().is_err() {
        info!(muxer = MUXER_NAME, "Muxer unavailable, no export presets");
        return Vec::new();
    }

    let mut presets: Vec<ExportPreset> = ENCODER_SPECS
        .iter()
        .filter(|(element_name, _, codec, _, _)| {
            gst::ElementFactory::make(element_name).build().is_ok()
                && gst::ElementFactory::make(codec.parser_name())
                    .build()
                    .is_ok()
        })
        .map(|(element_name, display_name, codec, is_hardware, priority)| {
            ExportPreset::new(element_name, display_name, *codec, *is_hardware, *priority)
        })
        .collect();

    presets.sort_by_key(|p| p.priority);
    debug!(
        presets = ?presets.iter().map(|p| p.element_name.as_str()).collect::<Vec<_>>(),
        "Available export presets"
    );
    presets
}

fn speed_preset(quality: BitratePreset) -> &'static str {
    match quality {
        BitratePreset::Low => "veryfast",
        BitratePreset::Medium => "fast",
        BitratePreset::High => "medium",
    }
}

/// Apply rate control for `quality` at the export size
///
/// Unknown properties are ignored; not every encoder version exposes all of them.
pub(crate) fn configure_video_encoder(
    encoder: &gst::Element,
    encoder_name: &str,
    quality: BitratePreset,
    width: u32,
    height: u32,
) {
    use gstreamer::prelude::*;

    let bitrate = quality.bitrate_kbps(width, height);

    match encoder_name {
        "x264enc" | "x265enc" => {
            let _ = encoder.set_property_from_str("speed-preset", speed_preset(quality));
            let _ = encoder.set_property("bitrate", bitrate);
            debug!(
                encoder = encoder_name,
                preset = speed_preset(quality),
                bitrate,
                "Configured software encoder"
            );
        }

        // VA-API encoders (old plugin style - uses integer)
        "vaapih264enc" | "vaapih265enc" => {
            let _ = encoder.set_property("rate-control", 2); // CBR
            let _ = encoder.set_property("bitrate", bitrate);
            debug!(bitrate, "Configured VA-API encoder");
        }

        "vah264enc" | "vah265enc" | "amfh264enc" | "amfh265enc" => {
            let _ = encoder.set_property_from_str("rate-control", "cbr");
            let _ = encoder.set_property("bitrate", bitrate);
            debug!(encoder = encoder_name, bitrate, "Configured CBR encoder");
        }

        "nvh264enc" | "nvh265enc" => {
            let _ = encoder.set_property("bitrate", bitrate);
            let _ = encoder.set_property_from_str("rc-mode", "vbr");
            let preset = match quality {
                BitratePreset::Low | BitratePreset::Medium => "fast",
                BitratePreset::High => "hq",
            };
            let _ = encoder.set_property_from_str("preset", preset);
            debug!(preset, bitrate, "Configured NVIDIA encoder");
        }

        "qsvh264enc" | "qsvh265enc" => {
            let _ = encoder.set_property("bitrate", bitrate);
            debug!(bitrate, "Configured Intel QSV encoder");
        }

        "openh264enc" => {
            let _ = encoder.set_property_from_str("rate-control", "bitrate");
            // bits per second
            let _ = encoder.set_property("bitrate", bitrate * 1000);
            debug!(bitrate_bps = bitrate * 1000, "Configured openh264enc");
        }

        _ => {
            debug!(encoder = encoder_name, "Using default encoder configuration");
        }
    }
}
