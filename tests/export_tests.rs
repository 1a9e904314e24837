// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the compositor and exporter

use image::RgbaImage;
use snapreel::errors::{CompositorError, ExportError};
use snapreel::filters::{
    AlphaBlendFilter, FilterBackend, FilterFactory, FilterType, FilterUnit, OutputFormat,
    UnitBuilder,
};
use snapreel::media::encoders::VideoCodec;
use snapreel::media::{
    Dimensions, ExportPreset, Frame, FrameTransform, FrameWriter, MediaAsset, MediaTransform,
    PixelBuffer, Rotation, VideoSource, VideoTrackInfo, WriterFactory, WriterSettings,
};
use snapreel::pipelines::{CompositionRequest, ExportFrame, MediaExporter, VideoCompositor};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn cpu_exporter() -> MediaExporter {
    MediaExporter::new(FilterFactory::new(FilterBackend::Cpu))
}

fn test_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 20) as u8, (y * 20) as u8, 90, 255])
    })
}

// Image export

#[test]
fn test_passthrough_image_export_twice() {
    let exporter = cpu_exporter();
    let image = test_image(12, 7);

    let first = exporter.export_image(&image, 0.0).unwrap();
    let second = exporter.export_image(&image, 0.0).unwrap();
    assert_eq!(first.dimensions(), image.dimensions());
    assert_eq!(second.dimensions(), image.dimensions());
}

#[test]
fn test_filtered_image_export_keeps_dimensions() {
    let mut exporter = cpu_exporter();
    exporter.set_filter_type(FilterType::Manga);
    exporter.set_overlays(vec![PixelBuffer::solid(3, 3, [255, 255, 255, 64])]);
    assert!(exporter.needs_processing());

    let output = exporter.export_image(&test_image(9, 5), 0.25).unwrap();
    assert_eq!(output.dimensions(), (9, 5));
}

#[test]
fn test_image_export_fills_render_size() {
    let mut exporter = cpu_exporter();
    exporter.set_render_size(Some(Dimensions::new(4, 4)));
    let output = exporter.export_image(&test_image(8, 4), 0.0).unwrap();
    assert_eq!(output.dimensions(), (4, 4));
}

#[test]
fn test_image_export_errors() {
    let mut exporter = cpu_exporter();
    exporter.set_filter_type(FilterType::Toon);

    assert_eq!(
        exporter.export_image(&RgbaImage::new(0, 0), 0.0),
        Err(ExportError::NoPixelBuffer)
    );
    assert_eq!(
        exporter.export_image(&test_image(2, 2), -1.0),
        Err(ExportError::NoSampleBuffer)
    );
}

#[tokio::test]
async fn test_frames_export_keeps_order_and_skips_failures() {
    let mut exporter = cpu_exporter();
    exporter.set_filter_type(FilterType::Grayscale);

    let frames = vec![
        ExportFrame {
            image: test_image(4, 4),
            interval: Duration::from_millis(100),
        },
        ExportFrame {
            image: RgbaImage::new(0, 0),
            interval: Duration::from_millis(200),
        },
        ExportFrame {
            image: test_image(6, 2),
            interval: Duration::from_millis(300),
        },
    ];

    let exported = exporter.export_frames(frames).await;
    assert_eq!(exported.len(), 2);
    assert_eq!(exported[0].image.dimensions(), (4, 4));
    assert_eq!(exported[0].interval, Duration::from_millis(100));
    assert_eq!(exported[1].image.dimensions(), (6, 2));
    assert_eq!(exported[1].interval, Duration::from_millis(300));
}

// In-memory media

#[derive(Clone)]
struct SyntheticVideo {
    frames: usize,
    has_track: bool,
    transform: MediaTransform,
}

impl SyntheticVideo {
    fn new(frames: usize) -> Self {
        Self {
            frames,
            has_track: true,
            transform: MediaTransform::default(),
        }
    }

    fn track(&self) -> VideoTrackInfo {
        VideoTrackInfo {
            track_id: 1,
            natural_size: Dimensions::new(8, 4),
            frame_rate: Some(25.0),
            duration: Some(Duration::from_millis(40 * self.frames as u64)),
            transform: self.transform,
        }
    }
}

struct SyntheticSource {
    video: SyntheticVideo,
    next: usize,
}

impl VideoSource for SyntheticSource {
    fn track(&self) -> VideoTrackInfo {
        self.video.track()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.next >= self.video.frames {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(Frame::new(
            PixelBuffer::solid(8, 4, [index as u8, 0, 0, 255]),
            Duration::from_millis(40 * index as u64),
        ))
    }

    fn rewind(&mut self) -> Result<(), ExportError> {
        self.next = 0;
        Ok(())
    }
}

impl MediaAsset for SyntheticVideo {
    fn video_track(&self) -> Option<VideoTrackInfo> {
        self.has_track.then(|| self.track())
    }

    fn open_video(&self) -> Result<Box<dyn VideoSource>, ExportError> {
        if !self.has_track {
            return Err(ExportError::NoVideoTrack);
        }
        Ok(Box::new(SyntheticSource {
            video: self.clone(),
            next: 0,
        }))
    }
}

#[derive(Default)]
struct Written {
    settings: Option<WriterSettings>,
    frames: Vec<(Dimensions, Duration, [u8; 4])>,
    finished: bool,
}

struct MemoryWriter {
    written: Arc<Mutex<Written>>,
    output: PathBuf,
    delay: Duration,
}

impl FrameWriter for MemoryWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), ExportError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let pixel = frame.buffer.pixel(0, 0).unwrap_or_default();
        self.written
            .lock()
            .unwrap()
            .frames
            .push((frame.dimensions(), frame.presentation_time, pixel));
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, ExportError> {
        self.written.lock().unwrap().finished = true;
        Ok(self.output)
    }
}

struct MemoryWriters {
    presets: Vec<ExportPreset>,
    written: Arc<Mutex<Written>>,
    delay: Duration,
}

impl MemoryWriters {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            presets: vec![ExportPreset::new(
                "memenc",
                "In-memory",
                VideoCodec::H264,
                false,
                1,
            )],
            written: Arc::default(),
            delay,
        })
    }

    fn without_presets() -> Arc<Self> {
        Arc::new(Self {
            presets: Vec::new(),
            written: Arc::default(),
            delay: Duration::ZERO,
        })
    }
}

impl WriterFactory for MemoryWriters {
    fn presets(&self) -> Vec<ExportPreset> {
        self.presets.clone()
    }

    fn create_writer(
        &self,
        _preset: &ExportPreset,
        settings: &WriterSettings,
    ) -> Result<Box<dyn FrameWriter>, ExportError> {
        self.written.lock().unwrap().settings = Some(settings.clone());
        Ok(Box::new(MemoryWriter {
            written: Arc::clone(&self.written),
            output: settings.output.clone(),
            delay: self.delay,
        }))
    }
}

// Video export

#[tokio::test]
async fn test_video_export_writes_every_frame() {
    let writers = MemoryWriters::new(Duration::ZERO);
    let mut exporter = cpu_exporter();
    exporter.set_writer_factory(writers.clone());
    exporter.set_filter_type(FilterType::Rgb);

    let progress = Arc::new(Mutex::new(Vec::new()));
    let progress_sink = Arc::clone(&progress);
    let path = exporter
        .export_video(Arc::new(SyntheticVideo::new(5)), move |p| {
            progress_sink.lock().unwrap().push(p)
        })
        .await
        .unwrap();

    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("export_") && name.ends_with(".mp4"));

    let written = writers.written.lock().unwrap();
    assert!(written.finished);
    assert_eq!(written.frames.len(), 5);
    for (i, (dims, time, _)) in written.frames.iter().enumerate() {
        assert_eq!(*dims, Dimensions::new(8, 4));
        assert_eq!(*time, Duration::from_millis(40 * i as u64));
    }
    let settings = written.settings.as_ref().unwrap();
    assert_eq!(settings.frame_rate, 25.0);
    assert_eq!(settings.dimensions, Dimensions::new(8, 4));
    assert_eq!(progress.lock().unwrap().last(), Some(&1.0));
}

#[tokio::test]
async fn test_video_export_applies_track_rotation() {
    let writers = MemoryWriters::new(Duration::ZERO);
    let mut exporter = cpu_exporter();
    exporter.set_writer_factory(writers.clone());

    let mut video = SyntheticVideo::new(2);
    video.transform = MediaTransform::new(Rotation::Rotate90, false);
    exporter.export_video(Arc::new(video), |_| {}).await.unwrap();

    let written = writers.written.lock().unwrap();
    assert_eq!(written.frames.len(), 2);
    assert_eq!(written.frames[0].0, Dimensions::new(4, 8));
}

#[tokio::test]
async fn test_video_without_track_fails() {
    let mut exporter = cpu_exporter();
    exporter.set_writer_factory(MemoryWriters::new(Duration::ZERO));

    let mut video = SyntheticVideo::new(3);
    video.has_track = false;
    let result = exporter.export_video(Arc::new(video), |_| {}).await;
    assert_eq!(result, Err(ExportError::NoVideoTrack));
}

#[tokio::test]
async fn test_video_without_presets_fails() {
    let mut exporter = cpu_exporter();
    exporter.set_writer_factory(MemoryWriters::without_presets());
    let result = exporter
        .export_video(Arc::new(SyntheticVideo::new(3)), |_| {})
        .await;
    assert_eq!(result, Err(ExportError::NoPresets));
}

#[tokio::test]
async fn test_cancelled_video_export_is_incomplete() {
    let writers = MemoryWriters::new(Duration::from_millis(20));
    let mut exporter = cpu_exporter();
    exporter.set_writer_factory(writers.clone());

    let canceller = exporter.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        canceller.cancel();
    });

    let result = exporter
        .export_video(Arc::new(SyntheticVideo::new(500)), |_| {})
        .await;
    assert_eq!(result, Err(ExportError::Incomplete));

    let written = writers.written.lock().unwrap();
    assert!(!written.finished);
    assert!(written.frames.len() < 500);
}

// Compositor

type Outcome = Result<PixelBuffer, CompositorError>;

struct TestRequest {
    tracks: Vec<u32>,
    frame: Option<PixelBuffer>,
    time: Duration,
    reply: mpsc::Sender<(usize, Outcome)>,
    id: usize,
}

impl CompositionRequest for TestRequest {
    fn source_track_ids(&self) -> Vec<u32> {
        self.tracks.clone()
    }

    fn source_frame(&self, _track_id: u32) -> Option<PixelBuffer> {
        self.frame.clone()
    }

    fn composition_time(&self) -> Duration {
        self.time
    }

    fn finish_with_composed_frame(self: Box<Self>, frame: PixelBuffer) {
        let _ = self.reply.send((self.id, Ok(frame)));
    }

    fn finish_with_error(self: Box<Self>, error: CompositorError) {
        let _ = self.reply.send((self.id, Err(error)));
    }

    fn finish_cancelled(self: Box<Self>) {
        let _ = self.reply.send((self.id, Err(CompositorError::Cancelled)));
    }
}

fn request(id: usize, reply: &mpsc::Sender<(usize, Outcome)>) -> Box<TestRequest> {
    Box::new(TestRequest {
        tracks: vec![1],
        frame: Some(PixelBuffer::solid(4, 4, [id as u8 * 10, 0, 0, 255])),
        time: Duration::from_millis(1000 + 40 * id as u64),
        reply: reply.clone(),
        id,
    })
}

fn collect(rx: &mpsc::Receiver<(usize, Outcome)>, count: usize) -> Vec<(usize, Outcome)> {
    (0..count)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect()
}

#[test]
fn test_compositor_finishes_in_submission_order() {
    let compositor = VideoCompositor::new(FilterFactory::new(FilterBackend::Cpu)).unwrap();
    let (tx, rx) = mpsc::channel();
    for id in 0..5 {
        compositor.start_request(request(id, &tx));
    }

    let outcomes = collect(&rx, 5);
    for (expected, (id, outcome)) in outcomes.into_iter().enumerate() {
        assert_eq!(id, expected);
        let frame = outcome.unwrap();
        assert_eq!(frame.pixel(0, 0), Some([expected as u8 * 10, 0, 0, 255]));
    }
}

#[test]
fn test_compositor_reports_extraction_failures() {
    let compositor = VideoCompositor::new(FilterFactory::new(FilterBackend::Cpu)).unwrap();
    let (tx, rx) = mpsc::channel();

    let mut no_track = request(0, &tx);
    no_track.tracks.clear();
    compositor.start_request(no_track);

    let mut no_frame = request(1, &tx);
    no_frame.frame = None;
    compositor.start_request(no_frame);

    let outcomes = collect(&rx, 2);
    assert!(matches!(outcomes[0].1, Err(CompositorError::MissingTrack)));
    assert!(matches!(
        outcomes[1].1,
        Err(CompositorError::MissingSourceFrame { track_id: 1, .. })
    ));
}

/// Passthrough that takes a while per frame
struct SlowUnit {
    inner: Box<dyn FilterUnit>,
}

impl FilterUnit for SlowUnit {
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) {
        self.inner.setup_format_description(input, transform, output);
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.inner.output_format()
    }

    fn process(&mut self, input: &PixelBuffer, time: f64) -> Option<PixelBuffer> {
        thread::sleep(Duration::from_millis(100));
        self.inner.process(input, time)
    }

    fn cleanup(&mut self) {
        self.inner.cleanup();
    }

    fn switch_input_dimensions(&self) -> bool {
        self.inner.switch_input_dimensions()
    }

    fn set_switch_input_dimensions(&mut self, switch: bool) {
        self.inner.set_switch_input_dimensions(switch);
    }
}

struct SlowBuilder;

impl UnitBuilder for SlowBuilder {
    fn build_filter(&self, filter_type: FilterType) -> Box<dyn FilterUnit> {
        let inner = FilterFactory::new(FilterBackend::Cpu).create(filter_type);
        Box::new(SlowUnit { inner })
    }

    fn build_alpha_blend(&self, overlay: PixelBuffer) -> Box<dyn FilterUnit> {
        Box::new(SlowUnit {
            inner: Box::new(AlphaBlendFilter::new(overlay)),
        })
    }
}

#[test]
fn test_cancel_finishes_every_request_cancelled() {
    let factory = FilterFactory::with_builder(FilterBackend::Cpu, Arc::new(SlowBuilder));
    let compositor = VideoCompositor::new(factory).unwrap();
    let (tx, rx) = mpsc::channel();

    for id in 0..8 {
        compositor.start_request(request(id, &tx));
    }
    compositor.cancel_all_pending_requests();
    compositor.start_request(request(8, &tx));
    assert!(compositor.is_cancelled());

    let outcomes = collect(&rx, 9);
    assert!(outcomes
        .iter()
        .all(|(_, o)| matches!(o, Err(CompositorError::Cancelled))));
    let mut ids: Vec<usize> = outcomes.iter().map(|(id, _)| *id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..9).collect::<Vec<_>>());
}

/// Passthrough that records the effect time of every frame
struct TimeRecordingBuilder {
    times: Arc<Mutex<Vec<f64>>>,
}

struct TimeRecordingUnit {
    inner: Box<dyn FilterUnit>,
    times: Arc<Mutex<Vec<f64>>>,
}

impl FilterUnit for TimeRecordingUnit {
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) {
        self.inner.setup_format_description(input, transform, output);
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.inner.output_format()
    }

    fn process(&mut self, input: &PixelBuffer, time: f64) -> Option<PixelBuffer> {
        self.times.lock().unwrap().push(time);
        self.inner.process(input, time)
    }

    fn cleanup(&mut self) {
        self.inner.cleanup();
    }

    fn switch_input_dimensions(&self) -> bool {
        self.inner.switch_input_dimensions()
    }

    fn set_switch_input_dimensions(&mut self, switch: bool) {
        self.inner.set_switch_input_dimensions(switch);
    }
}

impl UnitBuilder for TimeRecordingBuilder {
    fn build_filter(&self, filter_type: FilterType) -> Box<dyn FilterUnit> {
        Box::new(TimeRecordingUnit {
            inner: FilterFactory::new(FilterBackend::Cpu).create(filter_type),
            times: Arc::clone(&self.times),
        })
    }

    fn build_alpha_blend(&self, overlay: PixelBuffer) -> Box<dyn FilterUnit> {
        Box::new(AlphaBlendFilter::new(overlay))
    }
}

#[test]
fn test_effect_time_is_relative_to_first_request() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let builder = Arc::new(TimeRecordingBuilder {
        times: Arc::clone(&times),
    });
    let factory = FilterFactory::with_builder(FilterBackend::Cpu, builder);
    let compositor = VideoCompositor::new(factory).unwrap();
    let (tx, rx) = mpsc::channel();

    for (id, ms) in [5000u64, 5040, 5080].into_iter().enumerate() {
        let mut req = request(id, &tx);
        req.time = Duration::from_millis(ms);
        compositor.start_request(req);
    }
    let outcomes = collect(&rx, 3);
    assert!(outcomes.iter().all(|(_, o)| o.is_ok()));

    let times = times.lock().unwrap().clone();
    assert_eq!(times.len(), 3);
    for (got, expected) in times.iter().zip([0.0, 0.04, 0.08]) {
        assert!((got - expected).abs() < 1e-9, "{} != {}", got, expected);
    }
}

#[test]
fn test_exhausted_buffers_fail_the_request() {
    let compositor =
        VideoCompositor::new(FilterFactory::with_retained_buffers(FilterBackend::Cpu, 1)).unwrap();
    let (tx, rx) = mpsc::channel();

    compositor.start_request(request(0, &tx));
    let (_, first) = collect(&rx, 1).remove(0);
    // Holding the only output buffer starves the next render
    let held = first.unwrap();

    compositor.start_request(request(1, &tx));
    let (id, second) = collect(&rx, 1).remove(0);
    assert_eq!(id, 1);
    assert!(matches!(second, Err(CompositorError::RanOutOfBuffers)));
    drop(held);
}
