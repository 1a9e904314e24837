// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the renderer and filter units

use snapreel::filters::{FilterBackend, FilterFactory, FilterType, FilterUnit, OutputFormat, UnitBuilder};
use snapreel::media::{Dimensions, Frame, FrameTransform, PixelBuffer};
use snapreel::render::{Renderer, RendererDelegate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Counters {
    built: AtomicUsize,
    setups: AtomicUsize,
    processed: AtomicUsize,
    cleanups: AtomicUsize,
}

/// Copies its input and counts every call
struct StubUnit {
    counters: Arc<Counters>,
    format: Option<OutputFormat>,
    switch: bool,
    delay: Duration,
}

impl FilterUnit for StubUnit {
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        _transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) {
        self.counters.setups.fetch_add(1, Ordering::SeqCst);
        self.format = Some(OutputFormat {
            dimensions: output.filter(|d| !d.is_zero()).unwrap_or(input),
            input_dimensions: input,
        });
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.format
    }

    fn process(&mut self, input: &PixelBuffer, _time: f64) -> Option<PixelBuffer> {
        self.format?;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.counters.processed.fetch_add(1, Ordering::SeqCst);
        Some(input.clone())
    }

    fn cleanup(&mut self) {
        self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
        self.format = None;
    }

    fn switch_input_dimensions(&self) -> bool {
        self.switch
    }

    fn set_switch_input_dimensions(&mut self, switch: bool) {
        self.switch = switch;
    }
}

struct StubBuilder {
    counters: Arc<Counters>,
    delay: Duration,
}

impl StubBuilder {
    fn unit(&self) -> Box<dyn FilterUnit> {
        self.counters.built.fetch_add(1, Ordering::SeqCst);
        Box::new(StubUnit {
            counters: Arc::clone(&self.counters),
            format: None,
            switch: false,
            delay: self.delay,
        })
    }
}

impl UnitBuilder for StubBuilder {
    fn build_filter(&self, _filter_type: FilterType) -> Box<dyn FilterUnit> {
        self.unit()
    }

    fn build_alpha_blend(&self, _overlay: PixelBuffer) -> Box<dyn FilterUnit> {
        self.unit()
    }
}

fn stub_factory(delay: Duration) -> (FilterFactory, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let builder = Arc::new(StubBuilder {
        counters: Arc::clone(&counters),
        delay,
    });
    (FilterFactory::with_builder(FilterBackend::Cpu, builder), counters)
}

/// Records both output channels
#[derive(Default)]
struct Recorder {
    filtered: Mutex<Vec<Duration>>,
    displayed: Mutex<Vec<[u8; 4]>>,
    display_delay: Duration,
}

impl RendererDelegate for Recorder {
    fn ready_for_display(&self, buffer: PixelBuffer) {
        if !self.display_delay.is_zero() {
            thread::sleep(self.display_delay);
        }
        if let Some(pixel) = buffer.pixel(0, 0) {
            self.displayed.lock().unwrap().push(pixel);
        }
    }

    fn filtered_frame_ready(&self, _buffer: &PixelBuffer, presentation_time: Duration) {
        self.filtered.lock().unwrap().push(presentation_time);
    }

    fn ran_out_of_buffers(&self) {}
}

fn frame(value: u8, ms: u64) -> Frame {
    Frame::new(
        PixelBuffer::solid(8, 4, [value, value, value, 255]),
        Duration::from_millis(ms),
    )
}

fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_lazy_setup_runs_once() {
    let (factory, counters) = stub_factory(Duration::ZERO);
    let renderer = Renderer::new(factory);

    for i in 0..6 {
        renderer.process(&frame(i, i as u64 * 33), 0.0);
    }

    assert_eq!(counters.setups.load(Ordering::SeqCst), 1);
    assert_eq!(counters.processed.load(Ordering::SeqCst), 6);
}

#[test]
fn test_prepare_sets_up_without_rendering() {
    let (factory, counters) = stub_factory(Duration::ZERO);
    let renderer = Renderer::new(factory);

    let format = renderer.prepare(&frame(1, 0)).unwrap();
    assert_eq!(format.dimensions, Dimensions::new(8, 4));
    assert_eq!(counters.processed.load(Ordering::SeqCst), 0);

    // The first real frame renders immediately
    assert!(renderer.render(&frame(1, 0), 0.0).is_some());
    assert_eq!(counters.setups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_display_is_lossy_and_filtered_is_lossless() {
    let (factory, _) = stub_factory(Duration::ZERO);
    let renderer = Renderer::new(factory);
    let recorder = Arc::new(Recorder {
        display_delay: Duration::from_millis(50),
        ..Default::default()
    });
    let delegate: Arc<dyn RendererDelegate> = recorder.clone();
    renderer.set_delegate(Arc::downgrade(&delegate));

    let times: Vec<u64> = vec![0, 33, 66, 100, 133];
    for (i, ms) in times.iter().enumerate() {
        renderer.process_frame(&frame(10 * (i as u8 + 1), *ms));
    }

    let filtered = recorder.filtered.lock().unwrap().clone();
    assert_eq!(
        filtered,
        times.iter().map(|ms| Duration::from_millis(*ms)).collect::<Vec<_>>()
    );

    assert!(wait_for(|| {
        recorder.displayed.lock().unwrap().last() == Some(&[50, 50, 50, 255])
    }));
    let displayed = recorder.displayed.lock().unwrap().clone();
    assert!(displayed.len() <= 5);
    assert!(displayed.len() < 5, "slow consumer should have missed frames");
}

#[test]
fn test_passthrough_keeps_dimensions() {
    let renderer = Renderer::with_filter(FilterFactory::new(FilterBackend::Cpu), FilterType::Passthrough);
    let input = Frame::new(PixelBuffer::solid(7, 3, [1, 2, 3, 255]), Duration::ZERO);
    let output = renderer.render(&input, 0.0).unwrap();
    assert_eq!(output.dimensions(), input.dimensions());
    assert_eq!(renderer.output_dimensions(), Some(Dimensions::new(7, 3)));
}

#[test]
fn test_cleanup_twice_is_harmless() {
    let factory = FilterFactory::new(FilterBackend::Cpu);
    let overlay = PixelBuffer::solid(2, 2, [255, 0, 0, 128]);
    for ty in FilterType::ALL {
        for overlays in [Vec::new(), vec![overlay.clone()]] {
            let mut unit = factory.create_with_overlays(ty, &overlays);
            unit.setup_format_description(Dimensions::new(4, 4), None, None);
            assert!(unit.process(&PixelBuffer::solid(4, 4, [9, 9, 9, 255]), 0.0).is_some());
            unit.cleanup();
            unit.cleanup();
            assert!(unit.output_format().is_none());
            assert!(unit.process(&PixelBuffer::solid(4, 4, [9, 9, 9, 255]), 0.0).is_none());
        }
    }
}

#[test]
fn test_filter_change_rebuilds_unit() {
    let (factory, counters) = stub_factory(Duration::ZERO);
    let renderer = Renderer::new(factory);
    assert_eq!(counters.built.load(Ordering::SeqCst), 1);

    renderer.set_filter_type(FilterType::Toon);
    assert_eq!(counters.built.load(Ordering::SeqCst), 2);

    // Same type again is a no-op
    renderer.set_filter_type(FilterType::Toon);
    assert_eq!(counters.built.load(Ordering::SeqCst), 2);

    // One primary unit plus one blend stage
    renderer.set_overlays(vec![PixelBuffer::solid(1, 1, [0, 0, 0, 0])]);
    assert_eq!(counters.built.load(Ordering::SeqCst), 4);
}

#[test]
fn test_reset_releases_unit() {
    let (factory, counters) = stub_factory(Duration::ZERO);
    let renderer = Renderer::new(factory);
    renderer.process(&frame(1, 0), 0.0);
    assert!(renderer.is_prepared());

    renderer.reset();
    assert!(!renderer.is_prepared());
    assert!(counters.cleanups.load(Ordering::SeqCst) >= 1);

    renderer.process(&frame(1, 0), 0.0);
    assert_eq!(counters.setups.load(Ordering::SeqCst), 2);
}

#[test]
fn test_streamed_frames_dropped_during_single_image() {
    let (factory, counters) = stub_factory(Duration::from_millis(300));
    let renderer = Arc::new(Renderer::new(factory));

    let worker = {
        let renderer = Arc::clone(&renderer);
        thread::spawn(move || {
            renderer.process_single_image(&PixelBuffer::solid(4, 4, [5, 5, 5, 255]), 0.0, None)
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(renderer.render(&frame(1, 0), 0.0).is_none());

    let single = worker.join().unwrap();
    assert!(single.is_some());
    // Only the single image went through a unit
    assert_eq!(counters.processed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_media_transform_swaps_output() {
    use snapreel::media::{MediaTransform, Rotation};

    let renderer = Renderer::new(FilterFactory::new(FilterBackend::Cpu));
    renderer.set_media_transform(MediaTransform::new(Rotation::Rotate90, false));
    let output = renderer.render(&frame(1, 0), 0.0).unwrap();
    assert_eq!(output.dimensions(), Dimensions::new(4, 8));
}

#[test]
fn test_input_size_change_sets_same_unit_up_again() {
    let (factory, counters) = stub_factory(Duration::ZERO);
    let renderer = Renderer::new(factory);

    renderer.process(&frame(1, 0), 0.0);
    renderer.process(&frame(2, 33), 0.0);
    assert_eq!(counters.setups.load(Ordering::SeqCst), 1);

    let tall = Frame::new(PixelBuffer::solid(4, 8, [3, 3, 3, 255]), Duration::ZERO);
    let output = renderer.render(&tall, 0.0).unwrap();
    assert_eq!(output.dimensions(), Dimensions::new(4, 8));
    assert_eq!(counters.setups.load(Ordering::SeqCst), 2);
    assert_eq!(counters.cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
}
