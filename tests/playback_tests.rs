// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the playback controller

use snapreel::errors::ExportError;
use snapreel::filters::{FilterBackend, FilterFactory, FilterType};
use snapreel::media::{
    Dimensions, Frame, MediaAsset, MediaTransform, PixelBuffer, VideoSource, VideoTrackInfo,
};
use snapreel::playback::{
    MediaContent, MediaPlayer, MediaPlayerDelegate, PixelBufferView, PlaybackMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

const STEP: Duration = Duration::from_millis(40);

/// Records the first pixel of every displayed frame
#[derive(Default)]
struct RecordingView {
    pixels: Mutex<Vec<[u8; 4]>>,
    flushes: AtomicUsize,
}

impl PixelBufferView for RecordingView {
    fn display_pixel_buffer(&self, buffer: PixelBuffer) {
        if let Some(pixel) = buffer.pixel(0, 0) {
            self.pixels.lock().unwrap().push(pixel);
        }
    }

    fn flush_pixel_buffer_cache(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FirstFrameCounter {
    count: AtomicUsize,
}

impl MediaPlayerDelegate for FirstFrameCounter {
    fn did_display_first_frame(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    player: Arc<MediaPlayer>,
    view: Arc<RecordingView>,
    _view_dyn: Arc<dyn PixelBufferView>,
}

fn harness() -> Harness {
    let player = MediaPlayer::new(FilterFactory::new(FilterBackend::Cpu));
    let view = Arc::new(RecordingView::default());
    let view_dyn: Arc<dyn PixelBufferView> = view.clone();
    player.set_view(Arc::downgrade(&view_dyn));
    Harness {
        player,
        view,
        _view_dyn: view_dyn,
    }
}

/// Still whose red channel encodes its index
fn still(index: u8, interval: Option<Duration>) -> MediaContent {
    MediaContent::Image {
        buffer: PixelBuffer::solid(4, 4, [index * 20, 0, 0, 255]),
        interval,
    }
}

fn stills(count: u8) -> Vec<MediaContent> {
    (0..count).map(|i| still(i, Some(STEP))).collect()
}

/// Indices of displayed stills with consecutive repeats collapsed
fn displayed_indices(view: &RecordingView) -> Vec<u8> {
    let mut indices: Vec<u8> = Vec::new();
    for pixel in view.pixels.lock().unwrap().iter() {
        let index = pixel[0] / 20;
        if indices.last() != Some(&index) {
            indices.push(index);
        }
    }
    indices
}

fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn play_and_collect(mode: PlaybackMode, len: usize) -> Vec<u8> {
    let h = harness();
    h.player.set_playback_mode(mode);
    h.player.play(stills(4));
    assert!(wait_for(|| displayed_indices(&h.view).len() >= len));
    h.player.stop();
    displayed_indices(&h.view)[..len].to_vec()
}

#[test]
fn test_loop_sequence() {
    assert_eq!(
        play_and_collect(PlaybackMode::Loop, 9),
        vec![0, 1, 2, 3, 0, 1, 2, 3, 0]
    );
}

#[test]
fn test_reverse_sequence() {
    assert_eq!(
        play_and_collect(PlaybackMode::Reverse, 6),
        vec![0, 3, 2, 1, 0, 3]
    );
}

#[test]
fn test_rebound_sequence() {
    assert_eq!(
        play_and_collect(PlaybackMode::Rebound, 10),
        vec![0, 1, 2, 3, 2, 1, 0, 1, 2, 3]
    );
}

#[test]
fn test_pause_and_resume_keep_index() {
    let h = harness();
    h.player.play(stills(4));
    assert!(wait_for(|| h.player.current_index() == Some(1)));

    h.player.pause();
    h.player.pause();
    assert!(h.player.is_paused());
    let index = h.player.current_index();
    thread::sleep(STEP * 4);
    assert_eq!(h.player.current_index(), index);

    h.player.resume();
    h.player.resume();
    assert!(!h.player.is_paused());
    assert!(wait_for(|| h.player.current_index() != index));
    h.player.stop();
}

#[test]
fn test_stop_resets_to_defaults() {
    let h = harness();
    h.player.set_playback_mode(PlaybackMode::Rebound);
    h.player.set_rate(2.0);
    h.player.play(stills(3));
    assert_eq!(h.player.current_index(), Some(0));

    h.player.stop();
    assert_eq!(h.player.current_index(), None);
    assert_eq!(h.player.playback_mode(), PlaybackMode::Loop);
    assert_eq!(h.player.rate(), 1.0);
    assert!(h.player.frame_at(0).is_none());
}

#[test]
fn test_empty_play_is_ignored() {
    let h = harness();
    h.player.play(Vec::new());
    assert_eq!(h.player.current_index(), None);
}

#[test]
fn test_single_frame_pins_index() {
    let h = harness();
    h.player.play(stills(4));
    h.player.play_single_frame(0.6);
    assert_eq!(h.player.current_index(), Some(2));

    thread::sleep(STEP * 4);
    assert_eq!(h.player.current_index(), Some(2));

    h.player.cancel_playing_single_frame();
    assert!(wait_for(|| h.player.current_index() == Some(3)));
    h.player.stop();
}

#[test]
fn test_filter_change_refilters_current_still() {
    let h = harness();
    let counter = Arc::new(FirstFrameCounter::default());
    let delegate: Arc<dyn MediaPlayerDelegate> = counter.clone();
    h.player.set_delegate(Arc::downgrade(&delegate));

    h.player.play(vec![MediaContent::Image {
        buffer: PixelBuffer::solid(4, 4, [200, 40, 40, 255]),
        interval: Some(Duration::from_secs(30)),
    }]);
    assert!(wait_for(|| !h.view.pixels.lock().unwrap().is_empty()));

    h.player.set_filter_type(FilterType::Grayscale);
    assert!(wait_for(|| {
        h.view
            .pixels
            .lock()
            .unwrap()
            .last()
            .is_some_and(|p| p[0] == p[1] && p[1] == p[2])
    }));
    assert_eq!(counter.count.load(Ordering::SeqCst), 1);
    h.player.stop();
}

#[test]
fn test_one_photo_and_frame_lookup() {
    let h = harness();
    h.player.play(vec![still(1, Some(Duration::from_secs(30)))]);
    assert!(h.player.is_media_one_photo());
    assert_eq!(
        h.player.frame_at(0).unwrap().pixel(0, 0),
        Some([20, 0, 0, 255])
    );
    assert!(h.player.frame_at(1).is_none());
    h.player.stop();

    h.player.play(stills(2));
    assert!(!h.player.is_media_one_photo());
    h.player.stop();
}

#[test]
fn test_color_at_follows_displayed_frame() {
    let h = harness();
    h.player.play(vec![still(2, Some(Duration::from_secs(30)))]);
    assert!(wait_for(|| {
        h.player
            .color_at((5.0, 5.0), Dimensions::new(10, 10))
            .is_some()
    }));
    assert_eq!(
        h.player.color_at((5.0, 5.0), Dimensions::new(10, 10)),
        Some([40, 0, 0, 255])
    );
    assert_eq!(h.player.color_at((5.0, 5.0), Dimensions::ZERO), None);
    h.player.stop();
}

#[test]
fn test_invalid_bounds_are_ignored() {
    let h = harness();
    h.player.play(stills(4));
    h.player.set_bounds(1, 2);
    assert_eq!(h.player.bounds(), (1, 2));
    h.player.set_bounds(3, 9);
    assert_eq!(h.player.bounds(), (1, 2));
    h.player.stop();
}

/// Video of `count` solid frames whose red channel is the frame number
struct CountingVideo {
    count: usize,
}

struct CountingSource {
    next: usize,
    count: usize,
}

fn counting_track() -> VideoTrackInfo {
    VideoTrackInfo {
        track_id: 1,
        natural_size: Dimensions::new(4, 4),
        frame_rate: Some(50.0),
        duration: None,
        transform: MediaTransform::default(),
    }
}

impl VideoSource for CountingSource {
    fn track(&self) -> VideoTrackInfo {
        counting_track()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.next >= self.count {
            return None;
        }
        let value = self.next as u8;
        self.next += 1;
        Some(Frame::new(
            PixelBuffer::solid(4, 4, [value, 0, 0, 255]),
            Duration::from_millis(value as u64 * 20),
        ))
    }

    fn rewind(&mut self) -> Result<(), ExportError> {
        self.next = 0;
        Ok(())
    }
}

impl MediaAsset for CountingVideo {
    fn video_track(&self) -> Option<VideoTrackInfo> {
        Some(counting_track())
    }

    fn open_video(&self) -> Result<Box<dyn VideoSource>, ExportError> {
        Ok(Box::new(CountingSource {
            next: 0,
            count: self.count,
        }))
    }
}

#[test]
fn test_video_item_loops_after_end() {
    let h = harness();
    h.player
        .play(vec![MediaContent::Video(Arc::new(CountingVideo { count: 3 }))]);

    // Frame 2 followed later by frame 0 again means the item restarted
    assert!(wait_for(|| {
        let pixels = h.view.pixels.lock().unwrap();
        let last_two = pixels.iter().position(|p| p[0] == 2);
        last_two.is_some_and(|i| pixels[i..].iter().any(|p| p[0] == 0))
    }));
    h.player.stop();
}

/// Keeps every displayed buffer until asked to flush, and reads the player
/// while flushing
struct HoardingView {
    player: Weak<MediaPlayer>,
    held: Mutex<Vec<PixelBuffer>>,
    displayed: AtomicUsize,
    flushes: AtomicUsize,
}

impl PixelBufferView for HoardingView {
    fn display_pixel_buffer(&self, buffer: PixelBuffer) {
        self.held.lock().unwrap().push(buffer);
        self.displayed.fetch_add(1, Ordering::SeqCst);
    }

    fn flush_pixel_buffer_cache(&self) {
        if let Some(player) = self.player.upgrade() {
            let _ = player.current_index();
        }
        self.held.lock().unwrap().clear();
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_video_flush_may_query_player() {
    let player = MediaPlayer::new(FilterFactory::with_retained_buffers(FilterBackend::Cpu, 2));
    let view = Arc::new(HoardingView {
        player: Arc::downgrade(&player),
        held: Mutex::new(Vec::new()),
        displayed: AtomicUsize::new(0),
        flushes: AtomicUsize::new(0),
    });
    let view_dyn: Arc<dyn PixelBufferView> = view.clone();
    player.set_view(Arc::downgrade(&view_dyn));

    player.play(vec![MediaContent::Video(Arc::new(CountingVideo { count: 200 }))]);

    assert!(wait_for(|| view.flushes.load(Ordering::SeqCst) >= 1));
    // Playback keeps going after the flush
    let displayed = view.displayed.load(Ordering::SeqCst);
    assert!(wait_for(|| view.displayed.load(Ordering::SeqCst) > displayed));
    assert_eq!(player.current_index(), Some(0));
    player.stop();
}
