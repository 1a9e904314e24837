// SPDX-License-Identifier: GPL-3.0-only

//! Export-time video compositor
//!
//! Composition requests arrive from the export session, each carrying one
//! source frame. A serial worker thread extracts the frame, feeds it to the
//! renderer and queues the request; the renderer's filtered-frame callback
//! then finishes the oldest queued request. All queue access happens on the
//! worker, so requests complete strictly in submission order.
//!
//! ```text
//! start_request ─▶ [worker] ─▶ Renderer ─▶ filtered_frame_ready
//!                     ▲                           │
//!                     └────── Job::Finish ◀───────┘
//! ```

use crate::errors::{CompositorError, ExportError};
use crate::filters::{FilterFactory, FilterType};
use crate::media::{Dimensions, Frame, MediaTransform, PixelBuffer};
use crate::render::{Renderer, RendererDelegate};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One frame the export needs composed
///
/// Exactly one of the `finish_*` methods is called per request.
pub trait CompositionRequest: Send {
    /// Tracks the request draws from; the first one is composed
    fn source_track_ids(&self) -> Vec<u32>;

    fn source_frame(&self, track_id: u32) -> Option<PixelBuffer>;

    /// Output time of the composed frame
    fn composition_time(&self) -> Duration;

    fn finish_with_composed_frame(self: Box<Self>, frame: PixelBuffer);

    fn finish_with_error(self: Box<Self>, error: CompositorError);

    fn finish_cancelled(self: Box<Self>);
}

enum Job {
    Start(Box<dyn CompositionRequest>),
    Finish(PixelBuffer),
    Fail(CompositorError),
    CancelPending,
}

/// Forwards renderer callbacks onto the worker queue
struct RendererBridge {
    jobs: mpsc::Sender<Job>,
    signals: Arc<AtomicU64>,
}

impl RendererDelegate for RendererBridge {
    fn ready_for_display(&self, _buffer: PixelBuffer) {}

    fn filtered_frame_ready(&self, buffer: &PixelBuffer, _presentation_time: Duration) {
        self.signals.fetch_add(1, Ordering::SeqCst);
        let _ = self.jobs.send(Job::Finish(buffer.clone()));
    }

    fn ran_out_of_buffers(&self) {
        self.signals.fetch_add(1, Ordering::SeqCst);
        let _ = self.jobs.send(Job::Fail(CompositorError::RanOutOfBuffers));
    }
}

struct Worker {
    renderer: Arc<Renderer>,
    pending: VecDeque<Box<dyn CompositionRequest>>,
    first_time: Option<Duration>,
    cancelled: Arc<AtomicBool>,
    signals: Arc<AtomicU64>,
    composed: u64,
}

impl Worker {
    fn run(mut self, jobs: mpsc::Receiver<Job>) {
        while let Ok(job) = jobs.recv() {
            match job {
                Job::Start(request) => self.start(request),
                Job::Finish(buffer) => self.finish(Ok(buffer)),
                Job::Fail(error) => self.finish(Err(error)),
                Job::CancelPending => self.cancel_pending(),
            }
        }
        self.cancel_pending();
        debug!(composed = self.composed, "Compositor worker exiting");
    }

    fn start(&mut self, request: Box<dyn CompositionRequest>) {
        if self.cancelled.load(Ordering::SeqCst) {
            request.finish_cancelled();
            return;
        }

        let composition_time = request.composition_time();
        let time_secs = composition_time.as_secs_f64();

        let Some(track_id) = request.source_track_ids().first().copied() else {
            request.finish_with_error(CompositorError::MissingTrack);
            return;
        };
        let Some(buffer) = request.source_frame(track_id) else {
            request.finish_with_error(CompositorError::MissingSourceFrame {
                track_id,
                time_secs,
            });
            return;
        };
        let Some(frame) = Frame::at_seconds(buffer, time_secs) else {
            request.finish_with_error(CompositorError::MissingSampleBuffer { time_secs });
            return;
        };

        // Effects see time elapsed since the first request
        let first = *self.first_time.get_or_insert(composition_time);
        let elapsed = composition_time.saturating_sub(first).as_secs_f64();

        self.pending.push_back(request);
        let signals_before = self.signals.load(Ordering::SeqCst);
        let rendered = self.renderer.render(&frame, elapsed);

        if rendered.is_none() && self.signals.load(Ordering::SeqCst) == signals_before {
            if let Some(request) = self.pending.pop_back() {
                request.finish_with_error(CompositorError::NoRenderedFrame { time_secs });
            }
        }
    }

    fn finish(&mut self, result: Result<PixelBuffer, CompositorError>) {
        let Some(request) = self.pending.pop_front() else {
            debug!("Renderer result with no outstanding request");
            return;
        };
        if self.cancelled.load(Ordering::SeqCst) {
            request.finish_cancelled();
            return;
        }
        match result {
            Ok(buffer) => {
                self.composed += 1;
                request.finish_with_composed_frame(buffer);
            }
            Err(error) => {
                warn!(error = %error, "Composition request failed");
                request.finish_with_error(error);
            }
        }
    }

    fn cancel_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(pending = self.pending.len(), "Cancelling composition requests");
        }
        for request in self.pending.drain(..) {
            request.finish_cancelled();
        }
    }
}

/// Filters export frames through its own renderer
pub struct VideoCompositor {
    renderer: Arc<Renderer>,
    jobs: Option<mpsc::Sender<Job>>,
    _bridge: Option<Arc<RendererBridge>>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl VideoCompositor {
    pub fn new(factory: FilterFactory) -> Result<Self, ExportError> {
        let renderer = Arc::new(Renderer::new(factory));
        let (tx, rx) = mpsc::channel();
        let signals = Arc::new(AtomicU64::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));

        let bridge = Arc::new(RendererBridge {
            jobs: tx.clone(),
            signals: Arc::clone(&signals),
        });
        let delegate: Arc<dyn RendererDelegate> = bridge.clone();
        renderer.set_delegate(Arc::downgrade(&delegate));

        let worker = Worker {
            renderer: Arc::clone(&renderer),
            pending: VecDeque::new(),
            first_time: None,
            cancelled: Arc::clone(&cancelled),
            signals,
            composed: 0,
        };
        let handle = thread::Builder::new()
            .name("video-compositor".to_string())
            .spawn(move || worker.run(rx))
            .map_err(|e| ExportError::Export(format!("Spawn compositor thread: {}", e)))?;

        info!("Video compositor started");
        Ok(Self {
            renderer,
            jobs: Some(tx),
            _bridge: Some(bridge),
            cancelled,
            worker: Some(handle),
        })
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn set_filter_type(&self, filter_type: FilterType) {
        self.renderer.set_filter_type(filter_type);
    }

    pub fn set_overlays(&self, overlays: Vec<PixelBuffer>) {
        self.renderer.set_overlays(overlays);
    }

    /// Target size composed frames are cropped to fill
    pub fn set_render_size(&self, size: Option<Dimensions>) {
        self.renderer.set_scale_to_fill(size);
    }

    pub fn set_media_transform(&self, transform: MediaTransform) {
        self.renderer.set_media_transform(transform);
    }

    pub fn set_switch_input_dimensions(&self, switch: bool) {
        self.renderer.set_switch_input_dimensions(switch);
    }

    pub fn refresh_filter(&self) {
        self.renderer.refresh_filter();
    }

    /// Queue `request`; it is cancelled straight away once cancellation is set
    pub fn start_request(&self, request: Box<dyn CompositionRequest>) {
        if self.cancelled.load(Ordering::SeqCst) {
            request.finish_cancelled();
            return;
        }
        let Some(jobs) = &self.jobs else {
            request.finish_cancelled();
            return;
        };
        if let Err(mpsc::SendError(Job::Start(request))) = jobs.send(Job::Start(request)) {
            request.finish_cancelled();
        }
    }

    /// Cancel every outstanding and future request
    pub fn cancel_all_pending_requests(&self) {
        info!("Cancelling all composition requests");
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(jobs) = &self.jobs {
            let _ = jobs.send(Job::CancelPending);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for VideoCompositor {
    fn drop(&mut self) {
        // Closing both senders ends the worker loop
        self.jobs = None;
        self._bridge = None;
        if let Some(handle) = self.worker.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Compositor worker panicked");
            }
        }
    }
}
