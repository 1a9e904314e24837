// SPDX-License-Identifier: GPL-3.0-only

//! Playback of stills and videos through a renderer
//!
//! - [`sequence`]: loop, reverse and rebound index stepping
//! - [`clock`]: the tick threads that pace stills and video frames
//! - [`player`]: the controller tying items, clocks and the renderer together

pub mod clock;
pub mod player;
pub mod sequence;

pub use clock::{FrameClock, LoopAction};
pub use player::{MediaContent, MediaPlayer, MediaPlayerDelegate, PixelBufferView};
pub use sequence::{PlaybackMode, Sequencer};
