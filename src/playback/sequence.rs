// SPDX-License-Identifier: GPL-3.0-only

//! Item sequencing for the playback modes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order in which playback walks through its items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Forward, wrapping to the start bound
    #[default]
    Loop,
    /// Backward, wrapping to the end bound
    Reverse,
    /// Forward then backward, turning at each bound
    Rebound,
}

impl PlaybackMode {
    pub const ALL: [PlaybackMode; 3] = [
        PlaybackMode::Loop,
        PlaybackMode::Reverse,
        PlaybackMode::Rebound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackMode::Loop => "loop",
            PlaybackMode::Reverse => "reverse",
            PlaybackMode::Rebound => "rebound",
        }
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown playback mode '{}'", s))
    }
}

/// Index stepping within inclusive bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequencer {
    mode: PlaybackMode,
    start: usize,
    end: usize,
    forward: bool,
}

impl Sequencer {
    pub fn new(mode: PlaybackMode, start: usize, end: usize) -> Self {
        Self {
            mode,
            start: start.min(end),
            end: start.max(end),
            forward: true,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Change mode; rebound starts over heading forward
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        self.forward = true;
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    pub fn set_bounds(&mut self, start: usize, end: usize) {
        self.start = start.min(end);
        self.end = start.max(end);
    }

    /// Whether rebound is currently heading toward the end bound
    pub fn is_forward(&self) -> bool {
        self.forward
    }

    pub fn reset(&mut self) {
        self.forward = true;
    }

    /// Index that follows `current`
    ///
    /// An index outside the bounds re-enters at the bound the mode starts from.
    pub fn next(&mut self, current: usize) -> usize {
        if self.start == self.end {
            return self.start;
        }
        if current < self.start || current > self.end {
            return match self.mode {
                PlaybackMode::Reverse => self.end,
                PlaybackMode::Loop | PlaybackMode::Rebound => {
                    self.forward = true;
                    self.start
                }
            };
        }

        match self.mode {
            PlaybackMode::Loop => {
                if current >= self.end {
                    self.start
                } else {
                    current + 1
                }
            }
            PlaybackMode::Reverse => {
                if current <= self.start {
                    self.end
                } else {
                    current - 1
                }
            }
            PlaybackMode::Rebound => {
                if self.forward && current >= self.end {
                    self.forward = false;
                } else if !self.forward && current <= self.start {
                    self.forward = true;
                }
                if self.forward { current + 1 } else { current - 1 }
            }
        }
    }
}
