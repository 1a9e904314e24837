// SPDX-License-Identifier: GPL-3.0-only

//! Streaming renderer
//!
//! Owns one filter unit and feeds it frames. The unit is set up lazily from
//! the first frame (or explicitly through [`Renderer::prepare`]) and every
//! later frame is filtered under one lock, so two frames are never in the
//! unit at once.
//!
//! Results leave through two channels on the [`RendererDelegate`]:
//!
//! - `filtered_frame_ready` fires on the processing thread for every frame,
//!   with the frame's original presentation time
//! - `ready_for_display` fires on a dispatcher thread with the newest pending
//!   frame only; frames that complete while the consumer is busy are dropped

use super::geometry::render_geometry;
use crate::constants::render::FRAME_LOG_INTERVAL;
use crate::filters::{FilterFactory, FilterType, FilterUnit, OutputFormat};
use crate::media::{Dimensions, Frame, MediaTransform, PixelBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Observer of a renderer's output
///
/// `filtered_frame_ready` runs while the renderer is locked and must not call
/// back into the same renderer.
pub trait RendererDelegate: Send + Sync {
    /// Newest filtered frame, delivered off the processing path
    fn ready_for_display(&self, buffer: PixelBuffer);

    /// Every filtered frame, in processing order
    fn filtered_frame_ready(&self, buffer: &PixelBuffer, presentation_time: Duration);

    /// The unit had no free output buffer for a frame
    fn ran_out_of_buffers(&self);
}

struct RendererState {
    factory: FilterFactory,
    unit: Box<dyn FilterUnit>,
    filter_type: FilterType,
    overlays: Vec<PixelBuffer>,
    media_transform: MediaTransform,
    scale_to_fill: Option<Dimensions>,
    pending_display: Option<PixelBuffer>,
    delegate: Option<Weak<dyn RendererDelegate>>,
    frames_processed: u64,
}

impl RendererState {
    fn delegate(&self) -> Option<Arc<dyn RendererDelegate>> {
        self.delegate.as_ref().and_then(Weak::upgrade)
    }

    /// Set the unit up for `input` unless it already is
    fn ensure_setup(&mut self, input: Dimensions) -> Option<OutputFormat> {
        if let Some(format) = self.unit.output_format() {
            if format.input_dimensions == input {
                return Some(format);
            }
            debug!(
                old = %format.input_dimensions,
                new = %input,
                "Input size changed, setting filter up again"
            );
            self.unit.cleanup();
        }

        let geometry = render_geometry(
            input,
            self.media_transform,
            self.unit.switch_input_dimensions(),
            self.scale_to_fill,
        );
        self.unit
            .setup_format_description(input, geometry.transform, geometry.output);

        let format = self.unit.output_format();
        if let Some(format) = format {
            info!(
                filter = %self.filter_type,
                input = %input,
                output = %format.dimensions,
                "Renderer set up"
            );
        }
        format
    }

    /// Drop the unit's setup so the next frame sets it up with new geometry
    fn invalidate_setup(&mut self) {
        self.unit.cleanup();
        self.pending_display = None;
    }
}

struct Shared {
    state: Mutex<RendererState>,
    /// Set while `process_single_image` runs
    processing_image: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RendererState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliver_pending_display(&self) {
        let (pending, delegate) = {
            let mut state = self.lock();
            (state.pending_display.take(), state.delegate())
        };
        if let (Some(buffer), Some(delegate)) = (pending, delegate) {
            delegate.ready_for_display(buffer);
        }
    }
}

/// Clears the single-image flag when dropped
struct ProcessingImageGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingImageGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Filters a stream of frames through one unit
pub struct Renderer {
    shared: Arc<Shared>,
    display_tx: Option<mpsc::Sender<()>>,
}

impl Renderer {
    pub fn new(factory: FilterFactory) -> Self {
        Self::with_filter(factory, FilterType::default())
    }

    pub fn with_filter(factory: FilterFactory, filter_type: FilterType) -> Self {
        let unit = factory.create(filter_type);
        let shared = Arc::new(Shared {
            state: Mutex::new(RendererState {
                factory,
                unit,
                filter_type,
                overlays: Vec::new(),
                media_transform: MediaTransform::default(),
                scale_to_fill: None,
                pending_display: None,
                delegate: None,
                frames_processed: 0,
            }),
            processing_image: AtomicBool::new(false),
        });
        let display_tx = spawn_display_dispatcher(Arc::downgrade(&shared));
        Self { shared, display_tx }
    }

    /// Register the observer; the renderer never keeps it alive
    pub fn set_delegate(&self, delegate: Weak<dyn RendererDelegate>) {
        self.shared.lock().delegate = Some(delegate);
    }

    pub fn filter_type(&self) -> FilterType {
        self.shared.lock().filter_type
    }

    /// Switch effect; rebuilds the unit
    pub fn set_filter_type(&self, filter_type: FilterType) {
        {
            let mut state = self.shared.lock();
            if state.filter_type == filter_type {
                return;
            }
            state.filter_type = filter_type;
        }
        self.refresh_filter();
    }

    pub fn overlays(&self) -> Vec<PixelBuffer> {
        self.shared.lock().overlays.clone()
    }

    /// Replace the overlay stack; rebuilds the unit
    pub fn set_overlays(&self, overlays: Vec<PixelBuffer>) {
        self.shared.lock().overlays = overlays;
        self.refresh_filter();
    }

    pub fn media_transform(&self) -> MediaTransform {
        self.shared.lock().media_transform
    }

    /// Orientation of the frames that will follow
    pub fn set_media_transform(&self, transform: MediaTransform) {
        let mut state = self.shared.lock();
        if state.media_transform != transform {
            state.media_transform = transform;
            state.invalidate_setup();
        }
    }

    pub fn switch_input_dimensions(&self) -> bool {
        self.shared.lock().unit.switch_input_dimensions()
    }

    pub fn set_switch_input_dimensions(&self, switch: bool) {
        let mut state = self.shared.lock();
        if state.unit.switch_input_dimensions() != switch {
            state.unit.set_switch_input_dimensions(switch);
            state.invalidate_setup();
        }
    }

    pub fn scale_to_fill(&self) -> Option<Dimensions> {
        self.shared.lock().scale_to_fill
    }

    /// Crop streamed frames to fill this aspect ratio; `None` keeps the full frame
    pub fn set_scale_to_fill(&self, size: Option<Dimensions>) {
        let mut state = self.shared.lock();
        if state.scale_to_fill != size {
            state.scale_to_fill = size;
            state.invalidate_setup();
        }
    }

    /// Set the unit up for `frame` without rendering it
    pub fn prepare(&self, frame: &Frame) -> Option<OutputFormat> {
        self.shared.lock().ensure_setup(frame.dimensions())
    }

    /// Whether the unit has been set up
    pub fn is_prepared(&self) -> bool {
        self.shared.lock().unit.output_format().is_some()
    }

    /// Output size of the current unit once set up
    pub fn output_dimensions(&self) -> Option<Dimensions> {
        self.shared
            .lock()
            .unit
            .output_format()
            .map(|format| format.dimensions)
    }

    /// Filter `frame` at its own presentation time
    pub fn process_frame(&self, frame: &Frame) {
        self.process(frame, frame.presentation_time.as_secs_f64());
    }

    /// Filter `frame` with effect time `time` and notify the delegate
    pub fn process(&self, frame: &Frame, time: f64) {
        let _ = self.render(frame, time);
    }

    /// Like [`Renderer::process`], also returning the filtered buffer
    pub fn render(&self, frame: &Frame, time: f64) -> Option<PixelBuffer> {
        if self.shared.processing_image.load(Ordering::SeqCst) {
            debug!("Single image in progress, dropping streamed frame");
            return None;
        }

        let mut state = self.shared.lock();
        state.ensure_setup(frame.dimensions())?;

        let Some(output) = state.unit.process(&frame.buffer, time) else {
            let delegate = state.delegate();
            drop(state);
            debug!("Filter ran out of buffers");
            if let Some(delegate) = delegate {
                delegate.ran_out_of_buffers();
            }
            return None;
        };

        state.pending_display = Some(output.clone());
        state.frames_processed += 1;
        if state.frames_processed % FRAME_LOG_INTERVAL == 0 {
            debug!(
                frames = state.frames_processed,
                filter = %state.filter_type,
                "Renderer progress"
            );
        }
        if let Some(delegate) = state.delegate() {
            delegate.filtered_frame_ready(&output, frame.presentation_time);
        }
        drop(state);

        self.notify_display();
        Some(output)
    }

    fn notify_display(&self) {
        let sent = self
            .display_tx
            .as_ref()
            .is_some_and(|tx| tx.send(()).is_ok());
        if !sent {
            self.shared.deliver_pending_display();
        }
    }

    /// Filter one buffer outside the stream
    ///
    /// Uses a throwaway unit with the current filter and overlays; no delegate
    /// callbacks fire. Streamed frames arriving meanwhile are dropped.
    pub fn process_single_image(
        &self,
        buffer: &PixelBuffer,
        time: f64,
        scale_to_fill: Option<Dimensions>,
    ) -> Option<PixelBuffer> {
        if self.shared.processing_image.swap(true, Ordering::SeqCst) {
            warn!("Single image already in progress");
            return None;
        }
        let _guard = ProcessingImageGuard(&self.shared.processing_image);

        // Wait out any streamed frame already inside the lock
        let state = self.shared.lock();
        let mut unit = state
            .factory
            .create_with_overlays(state.filter_type, &state.overlays);
        let switch = state.unit.switch_input_dimensions();
        unit.set_switch_input_dimensions(switch);
        let geometry = render_geometry(
            buffer.dimensions(),
            state.media_transform,
            switch,
            scale_to_fill,
        );

        unit.setup_format_description(buffer.dimensions(), geometry.transform, geometry.output);
        let output = unit.process(buffer, time);
        unit.cleanup();
        drop(state);

        debug!(
            filter_time = time,
            rendered = output.is_some(),
            "Processed single image"
        );
        output
    }

    /// Rebuild the unit for the current filter type and overlays
    ///
    /// The switch-dimensions flag carries over to the new unit.
    pub fn refresh_filter(&self) {
        let mut state = self.shared.lock();
        let switch = state.unit.switch_input_dimensions();
        state.unit.cleanup();

        let mut unit = state
            .factory
            .create_with_overlays(state.filter_type, &state.overlays);
        unit.set_switch_input_dimensions(switch);
        state.unit = unit;
        state.pending_display = None;

        debug!(
            filter = %state.filter_type,
            overlays = state.overlays.len(),
            backend = state.factory.backend().name(),
            "Filter refreshed"
        );
    }

    /// Release the unit's resources; the next frame sets it up again
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        state.invalidate_setup();
        debug!("Renderer reset");
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shared.lock().unit.cleanup();
    }
}

fn spawn_display_dispatcher(shared: Weak<Shared>) -> Option<mpsc::Sender<()>> {
    let (tx, rx) = mpsc::channel::<()>();
    let spawned = thread::Builder::new()
        .name("renderer-display".to_string())
        .spawn(move || {
            while rx.recv().is_ok() {
                // Coalesce wake-ups; only the newest frame is pending anyway
                while rx.try_recv().is_ok() {}
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.deliver_pending_display();
            }
            debug!("Display dispatcher exiting");
        });

    match spawned {
        Ok(_) => Some(tx),
        Err(e) => {
            warn!(error = %e, "Failed to spawn display dispatcher, delivering inline");
            None
        }
    }
}
