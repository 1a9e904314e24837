// SPDX-License-Identifier: GPL-3.0-only

//! Export session
//!
//! Reads the source video frame by frame, sends each frame through the
//! attached [`VideoCompositor`] and writes the composed frames with their
//! original presentation times. The session runs on the calling thread;
//! progress and cancellation are shared through handles.

use super::compositor::{CompositionRequest, VideoCompositor};
use crate::constants::BitratePreset;
use crate::constants::export::COMPOSITION_TIMEOUT;
use crate::errors::{CompositorError, ExportError};
use crate::media::{
    ExportPreset, Frame, FrameWriter, MediaAsset, PixelBuffer, WriterFactory, WriterSettings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    Completed(PathBuf),
    Failed(ExportError),
    Cancelled,
}

/// Shared export progress in `0.0..=1.0`
#[derive(Debug, Clone, Default)]
pub struct ExportProgress(Arc<AtomicU32>);

impl ExportProgress {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, value: f32) {
        self.0
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

type Reply = Result<PixelBuffer, CompositorError>;

/// A single decoded frame waiting for composition
struct SourceFrameRequest {
    track_id: u32,
    buffer: PixelBuffer,
    time: Duration,
    reply: mpsc::Sender<Reply>,
}

impl CompositionRequest for SourceFrameRequest {
    fn source_track_ids(&self) -> Vec<u32> {
        vec![self.track_id]
    }

    fn source_frame(&self, track_id: u32) -> Option<PixelBuffer> {
        (track_id == self.track_id).then(|| self.buffer.clone())
    }

    fn composition_time(&self) -> Duration {
        self.time
    }

    fn finish_with_composed_frame(self: Box<Self>, frame: PixelBuffer) {
        let _ = self.reply.send(Ok(frame));
    }

    fn finish_with_error(self: Box<Self>, error: CompositorError) {
        let _ = self.reply.send(Err(error));
    }

    fn finish_cancelled(self: Box<Self>) {
        let _ = self.reply.send(Err(CompositorError::Cancelled));
    }
}

/// Re-encodes one asset through a compositor
pub struct ExportSession {
    asset: Arc<dyn MediaAsset>,
    preset: ExportPreset,
    writers: Arc<dyn WriterFactory>,
    output: PathBuf,
    bitrate: BitratePreset,
    compositor: Option<Arc<VideoCompositor>>,
    progress: ExportProgress,
    cancelled: Arc<AtomicBool>,
}

impl ExportSession {
    pub fn new(
        asset: Arc<dyn MediaAsset>,
        preset: ExportPreset,
        writers: Arc<dyn WriterFactory>,
        output: PathBuf,
        bitrate: BitratePreset,
    ) -> Self {
        Self {
            asset,
            preset,
            writers,
            output,
            bitrate,
            compositor: None,
            progress: ExportProgress::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_custom_compositor(&mut self, compositor: Arc<VideoCompositor>) {
        self.compositor = Some(compositor);
    }

    pub fn custom_compositor(&self) -> Option<&Arc<VideoCompositor>> {
        self.compositor.as_ref()
    }

    pub fn progress(&self) -> ExportProgress {
        self.progress.clone()
    }

    /// Flag that cancels the session when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn output(&self) -> &PathBuf {
        &self.output
    }

    /// Run to completion on the current thread
    pub fn run(self) -> ExportStatus {
        let status = match self.export() {
            Ok(Some(path)) => {
                self.progress.set(1.0);
                ExportStatus::Completed(path)
            }
            Ok(None) => ExportStatus::Cancelled,
            Err(e) => ExportStatus::Failed(e),
        };

        if !matches!(status, ExportStatus::Completed(_)) && self.output.exists() {
            debug!(output = %self.output.display(), "Removing partial export");
            let _ = std::fs::remove_file(&self.output);
        }
        status
    }

    /// `Ok(None)` when cancelled
    fn export(&self) -> Result<Option<PathBuf>, ExportError> {
        let compositor = self.compositor.as_ref().ok_or(ExportError::NoCompositor)?;
        let track = self.asset.video_track().ok_or(ExportError::NoVideoTrack)?;
        let mut source = self.asset.open_video()?;

        info!(
            encoder = %self.preset.element_name,
            size = %track.natural_size,
            output = %self.output.display(),
            "Export session started"
        );

        let mut writer: Option<Box<dyn FrameWriter>> = None;
        let mut frames: u64 = 0;

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                compositor.cancel_all_pending_requests();
                info!(frames, "Export cancelled");
                return Ok(None);
            }

            let Some(frame) = source.next_frame() else {
                break;
            };

            let (reply, response) = mpsc::channel();
            compositor.start_request(Box::new(SourceFrameRequest {
                track_id: track.track_id,
                buffer: frame.buffer,
                time: frame.presentation_time,
                reply,
            }));

            let composed = match response.recv_timeout(COMPOSITION_TIMEOUT) {
                Ok(Ok(buffer)) => buffer,
                Ok(Err(CompositorError::Cancelled)) => {
                    info!(frames, "Export cancelled");
                    return Ok(None);
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    warn!(frames, "Timed out waiting for a composed frame");
                    return Err(ExportError::Export(
                        "Timed out waiting for a composed frame".to_string(),
                    ));
                }
            };

            let writer = match writer.as_mut() {
                Some(writer) => writer,
                None => {
                    let settings = WriterSettings {
                        output: self.output.clone(),
                        dimensions: composed.dimensions(),
                        frame_rate: track.effective_frame_rate(),
                        bitrate: self.bitrate,
                    };
                    writer.insert(self.writers.create_writer(&self.preset, &settings)?)
                }
            };
            writer.write_frame(&Frame::new(composed, frame.presentation_time))?;
            frames += 1;

            if let Some(duration) = track.duration.filter(|d| !d.is_zero()) {
                let fraction = frame.presentation_time.as_secs_f64() / duration.as_secs_f64();
                // 1.0 is reserved for a finished file
                self.progress.set(fraction.min(0.99) as f32);
            }
        }

        let writer = writer.ok_or_else(|| {
            ExportError::Export("Source produced no frames".to_string())
        })?;
        let path = writer.finish()?;
        info!(frames, path = %path.display(), "Export session completed");
        Ok(Some(path))
    }
}
