// SPDX-License-Identifier: GPL-3.0-only

//! Frame clock threads
//!
//! A [`FrameClock`] calls its tick closure on a dedicated thread once per
//! interval until the closure returns [`LoopAction::Stop`] or the clock is
//! stopped. Ticks are scheduled against fixed deadlines so a slow tick does
//! not accumulate drift.

use crate::constants::MAX_CLOCK_WAIT;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Returned by a tick to keep or end the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Periodic tick source running on its own thread
pub struct FrameClock {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    interval: Duration,
    name: String,
}

impl FrameClock {
    /// Start ticking after one full interval
    pub fn start<F>(name: &str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    if !wait_until(deadline, &stop_clone) {
                        debug!(name = %name_clone, "Clock stopped");
                        break;
                    }
                    if tick() == LoopAction::Stop {
                        break;
                    }
                    deadline += interval;
                    // Fell behind by more than a tick: resynchronize
                    let now = Instant::now();
                    if deadline + interval < now {
                        deadline = now;
                    }
                }
            });

        let thread_handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name, error = %e, "Failed to spawn clock thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            interval,
            name: name.to_string(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the thread without waiting for it
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop and wait for an in-progress tick to finish
    ///
    /// Called from the clock's own tick this only signals; the tick returns
    /// on its own.
    pub fn stop(&mut self) {
        self.request_stop();
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if let Err(e) = handle.join() {
            warn!(name = %self.name, "Clock thread panicked: {:?}", e);
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep until `deadline` in short slices; false if stopped first
fn wait_until(deadline: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(MAX_CLOCK_WAIT));
    }
}
