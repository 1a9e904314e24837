// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::BitratePreset;
use crate::constants::render::RETAINED_BUFFER_COUNT;
use crate::errors::AppError;
use crate::filters::{FilterBackend, FilterFactory, FilterType};
use crate::gpu::GpuContext;
use crate::playback::PlaybackMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Configuration file name inside the config directory
pub const CONFIG_FILE: &str = "config.json";

/// Filter backend preference
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Per-pixel kernels on the CPU
    Cpu,
    /// Compute kernels on the GPU, falling back to the CPU without an adapter
    #[default]
    Gpu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter backend (cpu or gpu)
    pub backend: BackendKind,
    /// Filter selected when nothing else is requested
    pub default_filter: FilterType,
    /// Display time of one still; the media heuristic applies when unset
    pub still_interval_ms: Option<u64>,
    /// Export directory; the system temp directory when unset
    pub output_dir: Option<PathBuf>,
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
    /// Output buffers each filter unit keeps
    pub retained_buffer_count: usize,
    pub playback_mode: PlaybackMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            default_filter: FilterType::default(),
            still_interval_ms: None,
            output_dir: None,
            bitrate_preset: BitratePreset::default(),
            retained_buffer_count: RETAINED_BUFFER_COUNT,
            playback_mode: PlaybackMode::default(),
        }
    }
}

impl Config {
    /// `<config dir>/snapreel/config.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")).join(CONFIG_FILE))
    }

    /// Load from the default location
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load `path`; a missing or unreadable file yields the defaults
    pub fn load_from(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&json) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("Create {}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Serialize config: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| AppError::Config(format!("Write {}: {}", path.display(), e)))
    }

    pub fn still_interval(&self) -> Option<Duration> {
        self.still_interval_ms.map(Duration::from_millis)
    }

    /// Filter factory for the configured backend
    ///
    /// A GPU preference without a usable adapter falls back to the CPU.
    pub fn filter_factory(&self) -> FilterFactory {
        let backend = match self.backend {
            BackendKind::Cpu => FilterBackend::Cpu,
            BackendKind::Gpu => match GpuContext::shared() {
                Ok(ctx) => {
                    info!(adapter = %ctx.info().adapter_name, "Using GPU filter backend");
                    FilterBackend::Gpu(ctx)
                }
                Err(e) => {
                    warn!(error = %e, "GPU unavailable, using CPU filters");
                    FilterBackend::Cpu
                }
            },
        };
        FilterFactory::with_retained_buffers(backend, self.retained_buffer_count)
    }
}
