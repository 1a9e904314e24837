// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer video sources
//!
//! `filesrc ! decodebin`, with the first video pad linked to
//! `videoconvert ! appsink(RGBA)` and every other pad (audio, subtitles)
//! drained into a `fakesink`.

use super::{MediaAsset, VideoSource, VideoTrackInfo};
use crate::constants::gst_timing;
use crate::errors::ExportError;
use crate::media::{Dimensions, Frame, MediaTransform, PixelBuffer};
use gstreamer as gst;
use gstreamer_video as gst_video;
use gstreamer::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

fn gst_err(context: &str, e: impl std::fmt::Display) -> ExportError {
    ExportError::Export(format!("{}: {}", context, e))
}

/// Sequential RGBA frame reader for one video file
pub struct GstVideoSource {
    pipeline: gst::Pipeline,
    appsink: gstreamer_app::AppSink,
    track: VideoTrackInfo,
    started: bool,
    eos: bool,
}

impl GstVideoSource {
    /// Open `path` and preroll it to learn the track format
    ///
    /// Fails with `NoVideoTrack` when the container has no video stream.
    pub fn open(path: &Path) -> Result<Self, ExportError> {
        info!(path = %path.display(), "Opening video source");

        gst::init().map_err(|e| gst_err("GStreamer init failed", e))?;

        let pipeline = gst::Pipeline::new();
        let filesrc = gst::ElementFactory::make("filesrc")
            .property("location", path.to_string_lossy().as_ref())
            .build()
            .map_err(|e| gst_err("Failed to create filesrc", e))?;
        let decodebin = gst::ElementFactory::make("decodebin")
            .build()
            .map_err(|e| gst_err("Failed to create decodebin", e))?;
        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| gst_err("Failed to create videoconvert", e))?;
        let appsink = gstreamer_app::AppSink::builder()
            .caps(
                &gst_video::VideoCapsBuilder::new()
                    .format(gst_video::VideoFormat::Rgba)
                    .build(),
            )
            .sync(false)
            .max_buffers(4)
            .build();

        pipeline
            .add_many([&filesrc, &decodebin, &convert, appsink.upcast_ref()])
            .map_err(|e| gst_err("Failed to add elements", e))?;
        filesrc
            .link(&decodebin)
            .map_err(|e| gst_err("Failed to link filesrc", e))?;
        convert
            .link(&appsink)
            .map_err(|e| gst_err("Failed to link videoconvert", e))?;

        let has_video = Arc::new(AtomicBool::new(false));
        let no_more_pads = Arc::new(AtomicBool::new(false));

        let pipeline_weak = pipeline.downgrade();
        let convert_weak = convert.downgrade();
        let has_video_pad = Arc::clone(&has_video);
        decodebin.connect_pad_added(move |_, pad| {
            let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
            let is_video = caps
                .structure(0)
                .is_some_and(|s| s.name().starts_with("video/"));

            if is_video && !has_video_pad.load(Ordering::SeqCst) {
                let Some(convert) = convert_weak.upgrade() else {
                    return;
                };
                if let Some(sink) = convert.static_pad("sink") {
                    match pad.link(&sink) {
                        Ok(_) => has_video_pad.store(true, Ordering::SeqCst),
                        Err(e) => warn!(?e, "Failed to link video pad"),
                    }
                }
                return;
            }

            // Drain everything else so the pipeline can preroll
            let Some(pipeline) = pipeline_weak.upgrade() else {
                return;
            };
            let Ok(fakesink) = gst::ElementFactory::make("fakesink")
                .property("sync", false)
                .build()
            else {
                return;
            };
            if pipeline.add(&fakesink).is_ok() {
                let _ = fakesink.sync_state_with_parent();
                if let Some(sink) = fakesink.static_pad("sink") {
                    let _ = pad.link(&sink);
                }
            }
        });
        let no_more = Arc::clone(&no_more_pads);
        decodebin.connect_no_more_pads(move |_| {
            no_more.store(true, Ordering::SeqCst);
        });

        pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| gst_err("Failed to pause pipeline", format!("{:?}", e)))?;

        let transform = match wait_for_preroll(&pipeline, &has_video, &no_more_pads) {
            Ok(transform) => transform,
            Err(e) => {
                let _ = pipeline.set_state(gst::State::Null);
                return Err(e);
            }
        };

        if !has_video.load(Ordering::SeqCst) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(ExportError::NoVideoTrack);
        }

        let (natural_size, frame_rate) = appsink
            .static_pad("sink")
            .and_then(|pad| pad.current_caps())
            .and_then(|caps| {
                let s = caps.structure(0)?;
                let width = s.get::<i32>("width").ok()? as u32;
                let height = s.get::<i32>("height").ok()? as u32;
                let fps = s
                    .get::<gst::Fraction>("framerate")
                    .ok()
                    .filter(|f| f.denom() != 0 && f.numer() > 0)
                    .map(|f| f.numer() as f64 / f.denom() as f64);
                Some((Dimensions::new(width, height), fps))
            })
            .unwrap_or((Dimensions::ZERO, None));

        if natural_size.is_zero() {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(ExportError::Export(
                "Failed to determine video dimensions".to_string(),
            ));
        }

        let duration = pipeline
            .query_duration::<gst::ClockTime>()
            .map(|d| Duration::from_nanos(d.nseconds()));

        let track = VideoTrackInfo {
            track_id: 1,
            natural_size,
            frame_rate,
            duration,
            transform,
        };
        info!(
            width = natural_size.width,
            height = natural_size.height,
            ?frame_rate,
            rotation = %transform.rotation,
            mirrored = transform.mirrored,
            "Video source ready"
        );

        Ok(Self {
            pipeline,
            appsink,
            track,
            started: false,
            eos: false,
        })
    }

    fn sample_to_frame(sample: &gst::Sample) -> Option<Frame> {
        let info = gst_video::VideoInfo::from_caps(sample.caps()?).ok()?;
        let (width, height) = (info.width(), info.height());
        let stride = usize::try_from(*info.stride().first()?).ok()?;
        let row_bytes = width as usize * 4;

        let buffer = sample.buffer()?;
        let pts = buffer
            .pts()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or_default();
        let map = buffer.map_readable().ok()?;
        let data = map.as_slice();
        let packed = if stride == row_bytes {
            data.get(..row_bytes * height as usize)?.to_vec()
        } else {
            let mut packed = Vec::with_capacity(row_bytes * height as usize);
            for row in data.chunks(stride).take(height as usize) {
                packed.extend_from_slice(row.get(..row_bytes)?);
            }
            packed
        };
        let pixels = PixelBuffer::from_rgba(width, height, packed).ok()?;

        Some(Frame::new(pixels, pts))
    }
}

/// Wait for the pipeline to preroll, collecting the orientation tag on the way
fn wait_for_preroll(
    pipeline: &gst::Pipeline,
    has_video: &AtomicBool,
    no_more_pads: &AtomicBool,
) -> Result<MediaTransform, ExportError> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| ExportError::Export("No bus on pipeline".to_string()))?;
    let deadline = Instant::now() + Duration::from_secs(gst_timing::PREROLL_TIMEOUT_SECS);
    let mut transform = MediaTransform::default();

    while Instant::now() < deadline {
        if let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(100)) {
            use gst::MessageView;
            match msg.view() {
                MessageView::Error(err) => {
                    return Err(ExportError::Export(format!(
                        "Pipeline error: {}",
                        err.error()
                    )));
                }
                MessageView::Tag(tag) => {
                    if let Some(value) = tag.tags().get::<gst::tags::ImageOrientation>() {
                        transform = MediaTransform::from_orientation_tag(value.get());
                        debug!(orientation = value.get(), "Video orientation tag");
                    }
                }
                MessageView::AsyncDone(_) => return Ok(transform),
                _ => {}
            }
        }

        if no_more_pads.load(Ordering::SeqCst) && !has_video.load(Ordering::SeqCst) {
            return Ok(transform);
        }
    }
    // Timeout is not necessarily an error
    Ok(transform)
}

impl VideoSource for GstVideoSource {
    fn track(&self) -> VideoTrackInfo {
        self.track
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.eos {
            return None;
        }
        if !self.started {
            if let Err(e) = self.pipeline.set_state(gst::State::Playing) {
                warn!(?e, "Failed to start video pipeline");
                return None;
            }
            self.started = true;
        }

        let sample = self.appsink.try_pull_sample(gst::ClockTime::from_seconds(
            gst_timing::SAMPLE_TIMEOUT_SECS,
        ));
        match sample {
            Some(sample) => Self::sample_to_frame(&sample),
            None => {
                if !self.appsink.is_eos() {
                    warn!("Timed out waiting for a video frame");
                }
                self.eos = true;
                None
            }
        }
    }

    fn rewind(&mut self) -> Result<(), ExportError> {
        debug!("Rewinding video source");
        self.pipeline
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                gst::ClockTime::ZERO,
            )
            .map_err(|e| gst_err("Seek failed", e))?;
        self.eos = false;
        Ok(())
    }
}

impl Drop for GstVideoSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// A video file probed once, reopened for every reader
pub struct GstVideoAsset {
    path: PathBuf,
    track: Option<VideoTrackInfo>,
}

impl GstVideoAsset {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let path = path.into();
        let track = match GstVideoSource::open(&path) {
            Ok(source) => Some(source.track()),
            Err(ExportError::NoVideoTrack) => None,
            Err(e) => return Err(e),
        };
        Ok(Self { path, track })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MediaAsset for GstVideoAsset {
    fn video_track(&self) -> Option<VideoTrackInfo> {
        self.track
    }

    fn open_video(&self) -> Result<Box<dyn VideoSource>, ExportError> {
        if self.track.is_none() {
            return Err(ExportError::NoVideoTrack);
        }
        Ok(Box::new(GstVideoSource::open(&self.path)?))
    }
}
