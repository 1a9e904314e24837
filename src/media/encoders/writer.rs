// SPDX-License-Identifier: MPL-2.0

//! GStreamer frame writer
//!
//! `appsrc(RGBA) ! videoconvert ! <encoder> ! <parser> ! mp4mux ! filesink`.
//! Frames are pushed with their own presentation times; `finish` sends
//! end-of-stream and waits for the muxer to finalize the file.

use super::video::{ExportPreset, MUXER_NAME, available_presets, configure_video_encoder};
use super::{FrameWriter, WriterFactory, WriterSettings};
use crate::constants::gst_timing;
use crate::constants::render::FRAME_LOG_INTERVAL;
use crate::errors::ExportError;
use crate::media::Frame;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use gstreamer_video as gst_video;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

fn writer_err(context: &str, e: impl std::fmt::Display) -> ExportError {
    ExportError::Export(format!("{}: {}", context, e))
}

/// Encodes frames into an MP4 file
pub struct GstFrameWriter {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    settings: WriterSettings,
    frame_duration: gst::ClockTime,
    frames_written: u64,
}

impl GstFrameWriter {
    pub fn new(preset: &ExportPreset, settings: &WriterSettings) -> Result<Self, ExportError> {
        gst::init().map_err(|e| writer_err("GStreamer init failed", e))?;

        let width = settings.dimensions.width;
        let height = settings.dimensions.height;
        info!(
            encoder = %preset.element_name,
            width,
            height,
            fps = settings.frame_rate,
            output = %settings.output.display(),
            "Creating export writer"
        );

        let pipeline = gst::Pipeline::new();

        let appsrc = gst::ElementFactory::make("appsrc")
            .name("export_src")
            .build()
            .map_err(|e| writer_err("Failed to create appsrc", e))?
            .downcast::<AppSrc>()
            .map_err(|_| ExportError::Export("Failed to downcast to AppSrc".to_string()))?;

        // Millihertz precision keeps 29.97 and friends exact enough
        let fps_millis = (settings.frame_rate * 1000.0).round().max(1.0) as i32;
        let caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Rgba)
            .width(width as i32)
            .height(height as i32)
            .framerate(gst::Fraction::new(fps_millis, 1000))
            .build();
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(false);
        appsrc.set_block(true);

        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| writer_err("Failed to create videoconvert", e))?;
        let encoder = gst::ElementFactory::make(&preset.element_name)
            .build()
            .map_err(|e| writer_err(&format!("Failed to create {}", preset.element_name), e))?;
        configure_video_encoder(
            &encoder,
            &preset.element_name,
            settings.bitrate,
            width,
            height,
        );
        let parser = gst::ElementFactory::make(preset.codec.parser_name())
            .build()
            .map_err(|e| writer_err("Failed to create parser", e))?;
        let muxer = gst::ElementFactory::make(MUXER_NAME)
            .build()
            .map_err(|e| writer_err("Failed to create muxer", e))?;
        let filesink = gst::ElementFactory::make("filesink")
            .property("location", settings.output.to_string_lossy().as_ref())
            .build()
            .map_err(|e| writer_err("Failed to create filesink", e))?;

        let elements = [
            appsrc.upcast_ref(),
            &convert,
            &encoder,
            &parser,
            &muxer,
            &filesink,
        ];
        pipeline
            .add_many(elements)
            .map_err(|e| writer_err("Failed to add elements", e))?;
        gst::Element::link_many(elements).map_err(|e| writer_err("Failed to link elements", e))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| writer_err("Failed to start writer", e))?;

        let frame_duration = gst::ClockTime::from_nseconds(
            (1_000_000_000.0 / settings.frame_rate.max(f64::EPSILON)) as u64,
        );

        Ok(Self {
            pipeline,
            appsrc,
            settings: settings.clone(),
            frame_duration,
            frames_written: 0,
        })
    }

    fn check_bus_for_error(&self) -> Result<(), ExportError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    "GStreamer error while exporting"
                );
                return Err(ExportError::Export(err.error().to_string()));
            }
        }
        Ok(())
    }
}

impl FrameWriter for GstFrameWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ExportError> {
        if frame.dimensions() != self.settings.dimensions {
            return Err(ExportError::Export(format!(
                "Frame size {} doesn't match export size {}",
                frame.dimensions(),
                self.settings.dimensions
            )));
        }
        self.check_bus_for_error()?;

        let data = frame.buffer.data();
        let mut buffer =
            gst::Buffer::with_size(data.len()).map_err(|e| writer_err("Failed to create buffer", e))?;
        {
            let buffer_ref = buffer.get_mut().ok_or_else(|| {
                ExportError::Export("Failed to get mutable buffer reference".to_string())
            })?;
            let pts = frame.presentation_time.as_nanos() as u64;
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts));
            buffer_ref.set_duration(self.frame_duration);

            let mut map = buffer_ref
                .map_writable()
                .map_err(|e| writer_err("Failed to map buffer", e))?;
            map.copy_from_slice(data);
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| writer_err("Failed to push frame", format!("{:?}", e)))?;

        self.frames_written += 1;
        if self.frames_written % FRAME_LOG_INTERVAL == 0 {
            debug!(frames = self.frames_written, "Export frames written");
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, ExportError> {
        info!(frames = self.frames_written, "Finalizing export");

        self.appsrc
            .end_of_stream()
            .map_err(|e| writer_err("Failed to send EOS", format!("{:?}", e)))?;

        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| ExportError::Export("No bus on writer pipeline".to_string()))?;
        let timeout = gst::ClockTime::from_seconds(gst_timing::EOS_TIMEOUT_SECS);
        let result = match bus.timed_pop_filtered(
            timeout,
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(_) => Ok(()),
                gst::MessageView::Error(err) => {
                    Err(ExportError::Export(err.error().to_string()))
                }
                _ => Ok(()),
            },
            None => {
                warn!(
                    timeout = ?Duration::from_secs(gst_timing::EOS_TIMEOUT_SECS),
                    "Timed out waiting for end of stream"
                );
                Err(ExportError::Export(
                    "Encoder did not finish in time".to_string(),
                ))
            }
        };

        let _ = self.pipeline.set_state(gst::State::Null);
        result?;

        info!(path = %self.settings.output.display(), "Export saved");
        Ok(self.settings.output.clone())
    }
}

impl Drop for GstFrameWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Writer factory backed by the encoders installed on this machine
#[derive(Debug, Clone, Copy, Default)]
pub struct GstWriterFactory;

impl WriterFactory for GstWriterFactory {
    fn presets(&self) -> Vec<ExportPreset> {
        available_presets()
    }

    fn create_writer(
        &self,
        preset: &ExportPreset,
        settings: &WriterSettings,
    ) -> Result<Box<dyn FrameWriter>, ExportError> {
        Ok(Box::new(GstFrameWriter::new(preset, settings)?))
    }
}
