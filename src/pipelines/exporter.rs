// SPDX-License-Identifier: GPL-3.0-only

//! Image, video and frame-batch export
//!
//! Every job renders through its own [`Renderer`] (or the compositor's), so an
//! export never shares filter state with a live preview.

use super::compositor::VideoCompositor;
use super::session::{ExportSession, ExportStatus};
use crate::constants::BitratePreset;
use crate::constants::export::{FILE_PREFIX, PROGRESS_POLL_INTERVAL};
use crate::errors::ExportError;
use crate::filters::{FilterFactory, FilterType};
use crate::media::encoders::GstWriterFactory;
use crate::media::encoders::video::FILE_EXTENSION;
use crate::media::{Dimensions, Frame, MediaAsset, PixelBuffer, WriterFactory};
use crate::render::Renderer;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One still in a frame-batch export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFrame {
    pub image: RgbaImage,
    /// How long the frame is shown
    pub interval: Duration,
}

/// Runs export jobs with one filter configuration
#[derive(Clone)]
pub struct MediaExporter {
    factory: FilterFactory,
    writers: Arc<dyn WriterFactory>,
    filter_type: FilterType,
    overlays: Vec<PixelBuffer>,
    render_size: Option<Dimensions>,
    output_dir: Option<PathBuf>,
    bitrate: BitratePreset,
    /// Cancel flag of the job in progress
    active_job: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl MediaExporter {
    pub fn new(factory: FilterFactory) -> Self {
        Self {
            factory,
            writers: Arc::new(GstWriterFactory),
            filter_type: FilterType::default(),
            overlays: Vec::new(),
            render_size: None,
            output_dir: None,
            bitrate: BitratePreset::default(),
            active_job: Arc::default(),
        }
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn set_filter_type(&mut self, filter_type: FilterType) {
        self.filter_type = filter_type;
    }

    pub fn set_overlays(&mut self, overlays: Vec<PixelBuffer>) {
        self.overlays = overlays;
    }

    /// Size exported frames are cropped to fill; `None` keeps source size
    pub fn set_render_size(&mut self, size: Option<Dimensions>) {
        self.render_size = size;
    }

    /// Directory for exported files; the system temp dir when unset
    pub fn set_output_dir(&mut self, dir: Option<PathBuf>) {
        self.output_dir = dir;
    }

    pub fn set_bitrate(&mut self, bitrate: BitratePreset) {
        self.bitrate = bitrate;
    }

    /// Replace the encoder backend
    pub fn set_writer_factory(&mut self, writers: Arc<dyn WriterFactory>) {
        self.writers = writers;
    }

    /// Whether image jobs change pixels at all
    ///
    /// Video export always re-encodes, so this only short-circuits image and
    /// frame-batch jobs.
    pub fn needs_processing(&self) -> bool {
        self.filter_type.filter_applied() || !self.overlays.is_empty() || self.render_size.is_some()
    }

    /// Filter one still at effect time `time` (seconds)
    pub fn export_image(&self, image: &RgbaImage, time: f64) -> Result<RgbaImage, ExportError> {
        if !self.needs_processing() {
            return Ok(image.clone());
        }

        let buffer = PixelBuffer::from_image(image).ok_or(ExportError::NoPixelBuffer)?;
        let frame = Frame::at_seconds(buffer, time).ok_or(ExportError::NoSampleBuffer)?;

        let renderer = Renderer::with_filter(self.factory.clone(), self.filter_type);
        if !self.overlays.is_empty() {
            renderer.set_overlays(self.overlays.clone());
        }
        renderer.set_scale_to_fill(self.render_size);
        if renderer.prepare(&frame).is_none() {
            return Err(ExportError::NoProcessedImage);
        }

        let output = renderer
            .render(&frame, time)
            .ok_or(ExportError::NoProcessedImage)?;
        debug!(
            filter = %self.filter_type,
            width = output.width(),
            height = output.height(),
            "Image exported"
        );
        output.to_image().ok_or(ExportError::NoProcessedImage)
    }

    /// Re-encode `asset` through the filter, reporting progress in `0.0..=1.0`
    pub async fn export_video<F>(
        &self,
        asset: Arc<dyn MediaAsset>,
        mut on_progress: F,
    ) -> Result<PathBuf, ExportError>
    where
        F: FnMut(f32) + Send,
    {
        let writers = Arc::clone(&self.writers);
        let presets = tokio::task::spawn_blocking(move || writers.presets())
            .await
            .map_err(|e| ExportError::Export(format!("Preset probe task error: {}", e)))?;
        let Some(preset) = presets.into_iter().next() else {
            warn!("No export presets available");
            return Err(ExportError::NoPresets);
        };
        let Some(track) = asset.video_track() else {
            return Err(ExportError::NoVideoTrack);
        };

        let output = self.output_path()?;
        let mut session = ExportSession::new(
            asset,
            preset,
            Arc::clone(&self.writers),
            output,
            self.bitrate,
        );

        match VideoCompositor::new(self.factory.clone()) {
            Ok(compositor) => {
                compositor.set_switch_input_dimensions(track.transform.switches_dimensions());
                compositor.set_media_transform(track.transform);
                compositor.set_render_size(self.render_size);
                compositor.set_overlays(self.overlays.clone());
                compositor.set_filter_type(self.filter_type);
                session.set_custom_compositor(Arc::new(compositor));
            }
            Err(e) => warn!(error = %e, "Video compositor unavailable"),
        }

        let progress = session.progress();
        let cancel = session.cancel_handle();
        self.begin_job(Arc::clone(&cancel));

        info!(
            filter = %self.filter_type,
            output = %session.output().display(),
            "Video export started"
        );

        let mut task = tokio::task::spawn_blocking(move || session.run());
        let mut ticker = tokio::time::interval(PROGRESS_POLL_INTERVAL);
        let joined = loop {
            tokio::select! {
                result = &mut task => break result,
                _ = ticker.tick() => on_progress(progress.get()),
            }
        };
        self.end_job(&cancel);

        let status =
            joined.map_err(|e| ExportError::Export(format!("Export task error: {}", e)))?;
        match status {
            ExportStatus::Completed(path) => {
                on_progress(1.0);
                info!(path = %path.display(), "Video export completed");
                Ok(path)
            }
            ExportStatus::Failed(e) => {
                warn!(error = %e, "Video export failed");
                Err(e)
            }
            ExportStatus::Cancelled => Err(ExportError::Incomplete),
        }
    }

    /// Filter each frame in order on a background task
    ///
    /// Effect time accumulates frame intervals. Frames that fail to render
    /// are left out; a cancelled batch returns the frames finished so far.
    pub async fn export_frames(&self, frames: Vec<ExportFrame>) -> Vec<ExportFrame> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.begin_job(Arc::clone(&cancel));

        let exporter = self.clone();
        let flag = Arc::clone(&cancel);
        let total = frames.len();
        let result = tokio::task::spawn_blocking(move || {
            let mut exported = Vec::with_capacity(frames.len());
            let mut time = 0.0;
            for (index, frame) in frames.into_iter().enumerate() {
                if flag.load(Ordering::SeqCst) {
                    info!(done = exported.len(), "Frame export cancelled");
                    break;
                }
                match exporter.export_image(&frame.image, time) {
                    Ok(image) => {
                        time += frame.interval.as_secs_f64();
                        exported.push(ExportFrame {
                            image,
                            interval: frame.interval,
                        });
                    }
                    Err(e) => warn!(index, error = %e, "Skipping frame"),
                }
            }
            exported
        })
        .await;
        self.end_job(&cancel);

        match result {
            Ok(exported) => {
                info!(exported = exported.len(), total, "Frame export finished");
                exported
            }
            Err(e) => {
                warn!(error = %e, "Frame export task failed");
                Vec::new()
            }
        }
    }

    /// Cancel the job in progress, if any
    pub fn cancel(&self) {
        let active = self.active_job.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(flag) = active.as_ref() {
            info!("Cancelling export");
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn begin_job(&self, flag: Arc<AtomicBool>) {
        *self.active_job.lock().unwrap_or_else(|e| e.into_inner()) = Some(flag);
    }

    fn end_job(&self, flag: &Arc<AtomicBool>) {
        let mut active = self.active_job.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|f| Arc::ptr_eq(f, flag)) {
            *active = None;
        }
    }

    /// Unique `export_<uuid>.mp4` path in the output directory
    fn output_path(&self) -> Result<PathBuf, ExportError> {
        let dir = self.output_dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!(
            "{}_{}.{}",
            FILE_PREFIX,
            uuid::Uuid::new_v4(),
            FILE_EXTENSION
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterBackend;

    fn exporter() -> MediaExporter {
        MediaExporter::new(FilterFactory::new(FilterBackend::Cpu))
    }

    #[test]
    fn test_neutral_settings_need_no_processing() {
        let mut exporter = exporter();
        assert!(!exporter.needs_processing());
        exporter.set_filter_type(FilterType::Off);
        assert!(!exporter.needs_processing());
        exporter.set_filter_type(FilterType::Manga);
        assert!(exporter.needs_processing());
    }

    #[test]
    fn test_render_size_forces_processing() {
        let mut exporter = exporter();
        exporter.set_render_size(Some(Dimensions::new(4, 4)));
        assert!(exporter.needs_processing());
    }

    #[test]
    fn test_output_path_is_unique_and_named() {
        let mut exporter = exporter();
        let dir = std::env::temp_dir().join(format!("snapreel-test-{}", uuid::Uuid::new_v4()));
        exporter.set_output_dir(Some(dir.clone()));

        let first = exporter.output_path().unwrap();
        let second = exporter.output_path().unwrap();
        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(dir.as_path()));
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("export_"));
        assert!(name.ends_with(".mp4"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
