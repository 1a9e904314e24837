// SPDX-License-Identifier: GPL-3.0-only

//! Playback controller
//!
//! Plays a list of stills and videos through one [`Renderer`] onto a
//! [`PixelBufferView`]. Stills stay up for an interval, videos are pulled
//! frame by frame by a [`FrameClock`], and the next item is chosen by the
//! active [`PlaybackMode`].
//!
//! Every clock carries the generation it was started under; stopping,
//! pausing or switching items bumps the generation, so a tick that races
//! with those calls finds itself stale and renders nothing.

use super::clock::{FrameClock, LoopAction};
use super::sequence::{PlaybackMode, Sequencer};
use crate::constants::playback::{
    DEFAULT_VIDEO_FPS, MIN_RATE, MIXED_MEDIA_STILL_INTERVAL, ONLY_STILLS_INTERVAL,
};
use crate::filters::{FilterFactory, FilterType};
use crate::media::{Dimensions, Frame, MediaAsset, MediaTransform, PixelBuffer, VideoSource};
use crate::render::{Renderer, RendererDelegate};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One playable item
#[derive(Clone)]
pub enum MediaContent {
    /// A still, optionally with its own display interval
    Image {
        buffer: PixelBuffer,
        interval: Option<Duration>,
    },
    Video(Arc<dyn MediaAsset>),
}

impl MediaContent {
    pub fn image(buffer: PixelBuffer) -> Self {
        MediaContent::Image {
            buffer,
            interval: None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, MediaContent::Image { .. })
    }
}

/// Player observer
pub trait MediaPlayerDelegate: Send + Sync {
    /// The first frame after `play` reached the view
    fn did_display_first_frame(&self) {}

    /// Override for the still display interval heuristic
    fn default_still_interval(&self, _has_video: bool) -> Option<Duration> {
        None
    }
}

/// Surface that shows filtered frames
pub trait PixelBufferView: Send + Sync {
    fn display_pixel_buffer(&self, buffer: PixelBuffer);

    /// Release any cached buffers so the filter can reuse them
    ///
    /// Runs on the rendering thread. During video playback it may query the
    /// player; while a still is being rendered it must not.
    fn flush_pixel_buffer_cache(&self);
}

struct PlayerState {
    items: Vec<MediaContent>,
    index: Option<usize>,
    sequencer: Sequencer,
    rate: f64,
    generation: u64,
    clock: Option<FrameClock>,
    source: Option<Box<dyn VideoSource>>,
    paused: bool,
    single_frame: bool,
    started_at: Instant,
    last_still_filter_time: f64,
    still_interval: Option<Duration>,
}

impl PlayerState {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            index: None,
            sequencer: Sequencer::new(PlaybackMode::default(), 0, 0),
            rate: 1.0,
            generation: 0,
            clock: None,
            source: None,
            paused: false,
            single_frame: false,
            started_at: Instant::now(),
            last_still_filter_time: 0.0,
            still_interval: None,
        }
    }

    fn has_video(&self) -> bool {
        self.items.iter().any(|item| !item.is_image())
    }

    /// Invalidate outstanding ticks and hand back the running clock
    fn invalidate_clock(&mut self) -> Option<FrameClock> {
        self.generation = self.generation.wrapping_add(1);
        self.clock.take()
    }
}

#[derive(Default)]
struct DisplayState {
    last_displayed: Option<PixelBuffer>,
    first_frame_pending: bool,
}

/// Plays media items through a renderer
pub struct MediaPlayer {
    renderer: Renderer,
    state: Mutex<PlayerState>,
    display: Mutex<DisplayState>,
    view: Mutex<Option<Weak<dyn PixelBufferView>>>,
    delegate: Mutex<Option<Weak<dyn MediaPlayerDelegate>>>,
    weak_self: Weak<MediaPlayer>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MediaPlayer {
    pub fn new(factory: FilterFactory) -> Arc<Self> {
        let player = Arc::new_cyclic(|weak: &Weak<MediaPlayer>| Self {
            renderer: Renderer::new(factory),
            state: Mutex::new(PlayerState::new()),
            display: Mutex::new(DisplayState::default()),
            view: Mutex::new(None),
            delegate: Mutex::new(None),
            weak_self: weak.clone(),
        });
        let renderer_delegate: Weak<dyn RendererDelegate> = player.weak_self.clone();
        player.renderer.set_delegate(renderer_delegate);
        player
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn set_view(&self, view: Weak<dyn PixelBufferView>) {
        *lock(&self.view) = Some(view);
    }

    pub fn set_delegate(&self, delegate: Weak<dyn MediaPlayerDelegate>) {
        *lock(&self.delegate) = Some(delegate);
    }

    fn view(&self) -> Option<Arc<dyn PixelBufferView>> {
        lock(&self.view).as_ref().and_then(Weak::upgrade)
    }

    fn delegate(&self) -> Option<Arc<dyn MediaPlayerDelegate>> {
        lock(&self.delegate).as_ref().and_then(Weak::upgrade)
    }

    /// Fixed still interval used instead of the heuristic
    pub fn set_still_interval(&self, interval: Option<Duration>) {
        lock(&self.state).still_interval = interval;
    }

    /// Start playing `items` from the first one
    ///
    /// An empty list is ignored.
    pub fn play(&self, items: Vec<MediaContent>) {
        if items.is_empty() {
            warn!("Nothing to play");
            return;
        }

        let previous = {
            let mut state = lock(&self.state);
            let previous = state.invalidate_clock();
            let mode = state.sequencer.mode();
            state.sequencer = Sequencer::new(mode, 0, items.len() - 1);
            state.items = items;
            state.source = None;
            state.paused = false;
            state.single_frame = false;
            state.started_at = Instant::now();
            previous
        };
        drop(previous);
        {
            let mut display = lock(&self.display);
            display.first_frame_pending = true;
            display.last_displayed = None;
        }

        let mut state = lock(&self.state);
        info!(items = state.items.len(), mode = %state.sequencer.mode(), "Starting playback");
        self.start_item(&mut state, 0);
    }

    /// Tear everything down and return to defaults
    pub fn stop(&self) {
        let clock = {
            let mut state = lock(&self.state);
            let clock = state.invalidate_clock();
            state.items.clear();
            state.source = None;
            state.index = None;
            state.rate = 1.0;
            state.sequencer = Sequencer::new(PlaybackMode::default(), 0, 0);
            state.paused = false;
            state.single_frame = false;
            clock
        };
        drop(clock);
        lock(&self.display).last_displayed = None;
        self.renderer.reset();
        debug!("Playback stopped");
    }

    /// Halt on the current item; safe to repeat
    pub fn pause(&self) {
        let clock = {
            let mut state = lock(&self.state);
            if state.paused || state.index.is_none() {
                return;
            }
            state.paused = true;
            state.invalidate_clock()
        };
        // The clock must be gone before the unit is torn down
        drop(clock);
        self.renderer.reset();
        debug!("Playback paused");
    }

    /// Continue the current item; safe to repeat
    pub fn resume(&self) {
        let mut state = lock(&self.state);
        if !state.paused {
            return;
        }
        state.paused = false;
        let Some(index) = state.index else {
            return;
        };
        debug!(index, "Playback resumed");
        if let Some(MediaContent::Image { buffer, .. }) = state.items.get(index).cloned() {
            let time = state.last_still_filter_time;
            self.render_still(&mut state, &buffer, time);
        }
        if !state.single_frame {
            self.schedule_clock(&mut state, index);
        }
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    /// Pin playback to the item at normalized `location` (0..1)
    pub fn play_single_frame(&self, location: f32) {
        let clock = {
            let mut state = lock(&self.state);
            let count = state.items.len();
            if count == 0 {
                return;
            }
            let index = ((count as f32 * location).floor() as i64).clamp(0, count as i64 - 1) as usize;
            let clock = state.invalidate_clock();
            state.single_frame = true;
            state.paused = false;
            self.start_item(&mut state, index);
            clock
        };
        drop(clock);
    }

    /// Leave single-frame mode and keep playing from the pinned item
    pub fn cancel_playing_single_frame(&self) {
        let clock = {
            let mut state = lock(&self.state);
            if !state.single_frame {
                return;
            }
            state.single_frame = false;
            let clock = state.invalidate_clock();
            if let Some(index) = state.index {
                self.start_item(&mut state, index);
            }
            clock
        };
        drop(clock);
    }

    /// Change the effect; a still on screen is filtered again right away
    pub fn set_filter_type(&self, filter_type: FilterType) {
        self.renderer.set_filter_type(filter_type);

        let mut state = lock(&self.state);
        let still = state
            .index
            .and_then(|index| state.items.get(index))
            .and_then(|item| match item {
                MediaContent::Image { buffer, .. } => Some(buffer.clone()),
                MediaContent::Video(_) => None,
            });
        if let Some(buffer) = still {
            let time = state.last_still_filter_time;
            self.render_still(&mut state, &buffer, time);
        }
    }

    pub fn set_overlays(&self, overlays: Vec<PixelBuffer>) {
        self.renderer.set_overlays(overlays);
    }

    pub fn playback_mode(&self) -> PlaybackMode {
        lock(&self.state).sequencer.mode()
    }

    pub fn set_playback_mode(&self, mode: PlaybackMode) {
        lock(&self.state).sequencer.set_mode(mode);
    }

    pub fn rate(&self) -> f64 {
        lock(&self.state).rate
    }

    /// Speed multiplier; takes effect from the next tick interval
    pub fn set_rate(&self, rate: f64) {
        let clock = {
            let mut state = lock(&self.state);
            let rate = if rate.is_finite() { rate.max(MIN_RATE) } else { 1.0 };
            if state.rate == rate {
                return;
            }
            state.rate = rate;
            match state.index {
                Some(index) if !state.paused && !state.single_frame && state.clock.is_some() => {
                    let clock = state.invalidate_clock();
                    self.schedule_clock(&mut state, index);
                    clock
                }
                _ => None,
            }
        };
        drop(clock);
    }

    /// Restrict playback to items `start..=end`
    pub fn set_bounds(&self, start: usize, end: usize) {
        let mut state = lock(&self.state);
        if start > end || end >= state.items.len() {
            warn!(start, end, items = state.items.len(), "Ignoring invalid bounds");
            return;
        }
        state.sequencer.set_bounds(start, end);
    }

    pub fn bounds(&self) -> (usize, usize) {
        lock(&self.state).sequencer.bounds()
    }

    /// Index of the item on screen, `None` when stopped
    pub fn current_index(&self) -> Option<usize> {
        lock(&self.state).index
    }

    /// The still at `index`, for thumbnails
    pub fn frame_at(&self, index: usize) -> Option<PixelBuffer> {
        match lock(&self.state).items.get(index) {
            Some(MediaContent::Image { buffer, .. }) => Some(buffer.clone()),
            _ => None,
        }
    }

    /// True when the loaded media is exactly one still
    pub fn is_media_one_photo(&self) -> bool {
        let state = lock(&self.state);
        state.items.len() == 1 && state.items[0].is_image()
    }

    /// Color under `point` of a view of `view_size` showing the current frame
    ///
    /// The frame is assumed to be drawn aspect-fill and centered.
    pub fn color_at(&self, point: (f32, f32), view_size: Dimensions) -> Option<[u8; 4]> {
        let buffer = lock(&self.display).last_displayed.clone()?;
        if view_size.is_zero() || buffer.dimensions().is_zero() {
            return None;
        }
        let bw = buffer.width() as f32;
        let bh = buffer.height() as f32;
        let scale = (view_size.width as f32 / bw).max(view_size.height as f32 / bh);
        let offset_x = (view_size.width as f32 - bw * scale) / 2.0;
        let offset_y = (view_size.height as f32 - bh * scale) / 2.0;

        let x = (point.0 - offset_x) / scale;
        let y = (point.1 - offset_y) / scale;
        if x < 0.0 || y < 0.0 || x >= bw || y >= bh {
            return None;
        }
        buffer.pixel(x as u32, y as u32)
    }

    fn still_interval(&self, state: &PlayerState, item_interval: Option<Duration>) -> Duration {
        let has_video = state.has_video();
        let base = item_interval
            .or(state.still_interval)
            .or_else(|| {
                self.delegate()
                    .and_then(|d| d.default_still_interval(has_video))
            })
            .unwrap_or(if has_video {
                MIXED_MEDIA_STILL_INTERVAL
            } else {
                ONLY_STILLS_INTERVAL
            });
        base.div_f64(state.rate)
    }

    fn render_still(&self, state: &mut PlayerState, buffer: &PixelBuffer, time: f64) {
        state.last_still_filter_time = time;
        let frame = Frame::at_seconds(buffer.clone(), time)
            .unwrap_or_else(|| Frame::new(buffer.clone(), Duration::ZERO));
        self.renderer.process(&frame, time);
    }

    /// Load and show the item at `index`, then schedule what follows it
    fn start_item(&self, state: &mut PlayerState, index: usize) {
        let Some(item) = state.items.get(index).cloned() else {
            return;
        };
        state.index = Some(index);
        state.source = None;
        debug!(index, still = item.is_image(), "Starting item");

        match item {
            MediaContent::Image { buffer, .. } => {
                self.renderer.set_media_transform(MediaTransform::default());
                let time = state.started_at.elapsed().as_secs_f64();
                self.render_still(state, &buffer, time);
            }
            MediaContent::Video(asset) => match asset.open_video() {
                Ok(mut source) => {
                    self.renderer.set_media_transform(source.track().transform);
                    if state.single_frame {
                        // Show the first frame and hold it
                        if let Some(frame) = source.next_frame() {
                            self.renderer.process_frame(&frame);
                        }
                    }
                    state.source = Some(source);
                }
                Err(e) => warn!(index, error = %e, "Failed to open video item"),
            },
        }

        if !state.single_frame && !state.paused {
            self.schedule_clock(state, index);
        }
    }

    fn schedule_clock(&self, state: &mut PlayerState, index: usize) {
        let Some(item) = state.items.get(index) else {
            return;
        };
        let generation = state.generation;
        let weak = self.weak_self.clone();

        let clock = match (item, &state.source) {
            (MediaContent::Video(_), Some(source)) => {
                let fps = source.track().effective_frame_rate().ceil().max(1.0);
                let interval = Duration::from_secs_f64(1.0 / fps).div_f64(state.rate);
                FrameClock::start("player-video", interval, move || match weak.upgrade() {
                    Some(player) => player.on_video_tick(generation),
                    None => LoopAction::Stop,
                })
            }
            (item, _) => {
                let item_interval = match item {
                    MediaContent::Image { interval, .. } => *interval,
                    // Unreadable video: move on after a default frame's time
                    MediaContent::Video(_) => {
                        Some(Duration::from_secs_f64(1.0 / DEFAULT_VIDEO_FPS))
                    }
                };
                let interval = self.still_interval(state, item_interval);
                FrameClock::start("player-still", interval, move || {
                    if let Some(player) = weak.upgrade() {
                        player.on_item_finished(generation);
                    }
                    LoopAction::Stop
                })
            }
        };
        state.clock = Some(clock);
    }

    fn on_video_tick(&self, generation: u64) -> LoopAction {
        let frame = {
            let mut state = lock(&self.state);
            if state.generation != generation {
                return LoopAction::Stop;
            }
            match state.source.as_mut().and_then(|source| source.next_frame()) {
                Some(frame) => frame,
                None => {
                    // Played to end
                    self.advance(&mut state);
                    return LoopAction::Stop;
                }
            }
        };
        // Rendered unlocked so view callbacks may query the player; stop and
        // pause join this clock before resetting the renderer
        self.renderer.process_frame(&frame);
        LoopAction::Continue
    }

    fn on_item_finished(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.generation != generation || state.paused || state.single_frame {
            return;
        }
        self.advance(&mut state);
    }

    fn advance(&self, state: &mut PlayerState) {
        let Some(current) = state.index else {
            return;
        };
        // Called from the finishing clock's own thread; dropping it only signals
        let finished = state.invalidate_clock();
        drop(finished);
        let next = state.sequencer.next(current);
        self.start_item(state, next);
    }
}

impl RendererDelegate for MediaPlayer {
    fn ready_for_display(&self, buffer: PixelBuffer) {
        let first = {
            let mut display = lock(&self.display);
            display.last_displayed = Some(buffer.clone());
            std::mem::take(&mut display.first_frame_pending)
        };
        if let Some(view) = self.view() {
            view.display_pixel_buffer(buffer);
        }
        if first {
            if let Some(delegate) = self.delegate() {
                delegate.did_display_first_frame();
            }
        }
    }

    fn filtered_frame_ready(&self, _buffer: &PixelBuffer, _presentation_time: Duration) {}

    fn ran_out_of_buffers(&self) {
        debug!("Renderer ran out of buffers, flushing view cache");
        if let Some(view) = self.view() {
            view.flush_pixel_buffer_cache();
        }
    }
}

impl Drop for MediaPlayer {
    fn drop(&mut self) {
        let clock = lock(&self.state).invalidate_clock();
        drop(clock);
    }
}
