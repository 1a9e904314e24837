// SPDX-License-Identifier: GPL-3.0-only

//! Filter units and the filter type catalogue
//!
//! A filter unit consumes one input buffer and produces one output buffer of
//! the dimensions fixed at setup. Every variant (passthrough, the effect
//! kernels, alpha-blend and group) implements [`FilterUnit`], so the renderer
//! never needs to know which backend or composition it is driving.
//!
//! Two backends exist behind the same interface:
//! - [`FilterBackend::Cpu`]: the fixed per-pixel pipeline in [`cpu`]
//! - [`FilterBackend::Gpu`]: wgpu compute kernels in [`gpu`]

pub mod alpha_blend;
pub mod cpu;
pub mod factory;
pub mod gpu;
pub mod group;
pub mod kernels;
pub mod passthrough;

use crate::gpu::GpuContext;
use crate::media::{Dimensions, FrameTransform, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use alpha_blend::AlphaBlendFilter;
pub use cpu::CpuFilter;
pub use factory::{FilterFactory, UnitBuilder};
pub use gpu::GpuFilter;
pub use group::GroupFilter;
pub use passthrough::PassthroughFilter;

/// Symbolic filter identifiers
///
/// `Off` (effects disabled) and `Passthrough` (explicitly neutral) render the
/// same way but are distinct selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    #[default]
    Passthrough,
    WavePool,
    Plasma,
    EmInterference,
    Rgb,
    Lego,
    Chroma,
    Rave,
    MirrorTwo,
    MirrorFour,
    LightLeaks,
    Film,
    Grayscale,
    Manga,
    Toon,
    Off,
}

impl FilterType {
    /// Every filter type, selectable effects first
    pub const ALL: [FilterType; 16] = [
        FilterType::Passthrough,
        FilterType::WavePool,
        FilterType::Plasma,
        FilterType::EmInterference,
        FilterType::Rgb,
        FilterType::Lego,
        FilterType::Chroma,
        FilterType::Rave,
        FilterType::MirrorTwo,
        FilterType::MirrorFour,
        FilterType::LightLeaks,
        FilterType::Film,
        FilterType::Grayscale,
        FilterType::Manga,
        FilterType::Toon,
        FilterType::Off,
    ];

    /// Stable key used by the CLI, config and logs; `None` for `Off`
    pub fn key(&self) -> Option<&'static str> {
        match self {
            FilterType::Passthrough => Some("normal"),
            FilterType::Plasma => Some("plasma"),
            FilterType::EmInterference => Some("em_interference"),
            FilterType::Film => Some("film"),
            FilterType::MirrorTwo => Some("mirror_2"),
            FilterType::Rave => Some("rave"),
            FilterType::Lego => Some("lego"),
            FilterType::Rgb => Some("rgb"),
            FilterType::Chroma => Some("chroma"),
            FilterType::MirrorFour => Some("mirror_4"),
            FilterType::Grayscale => Some("grayscale"),
            FilterType::LightLeaks => Some("light_leaks"),
            FilterType::WavePool => Some("wave_pool"),
            FilterType::Manga => Some("manga"),
            FilterType::Toon => Some("toon"),
            FilterType::Off => None,
        }
    }

    /// Look up a filter type by key; "off" selects `Off`
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        if key == "off" {
            return Some(FilterType::Off);
        }
        Self::ALL.into_iter().find(|ty| ty.key() == Some(key.as_str()))
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FilterType::Passthrough => "Normal",
            FilterType::WavePool => "Wave Pool",
            FilterType::Plasma => "Plasma",
            FilterType::EmInterference => "EM Interference",
            FilterType::Rgb => "RGB",
            FilterType::Lego => "Lego",
            FilterType::Chroma => "Chroma",
            FilterType::Rave => "Rave",
            FilterType::MirrorTwo => "Mirror 2",
            FilterType::MirrorFour => "Mirror 4",
            FilterType::LightLeaks => "Light Leaks",
            FilterType::Film => "Film",
            FilterType::Grayscale => "Grayscale",
            FilterType::Manga => "Manga",
            FilterType::Toon => "Toon",
            FilterType::Off => "Off",
        }
    }

    /// Whether a visible effect is applied
    pub fn filter_applied(&self) -> bool {
        !matches!(self, FilterType::Off | FilterType::Passthrough)
    }

    /// Whether the effect changes with elapsed time
    pub fn is_time_driven(&self) -> bool {
        matches!(
            self,
            FilterType::Plasma
                | FilterType::EmInterference
                | FilterType::Film
                | FilterType::Rave
                | FilterType::WavePool
                | FilterType::LightLeaks
                | FilterType::Chroma
        )
    }

    /// Kernel selector shared by the CPU kernels and the WGSL shader
    pub fn kernel_code(&self) -> u32 {
        match self {
            FilterType::Passthrough | FilterType::Off => kernels::KERNEL_IDENTITY,
            FilterType::WavePool => 1,
            FilterType::Plasma => 2,
            FilterType::EmInterference => 3,
            FilterType::Rgb => 4,
            FilterType::Lego => 5,
            FilterType::Chroma => 6,
            FilterType::Rave => 7,
            FilterType::MirrorTwo => 8,
            FilterType::MirrorFour => 9,
            FilterType::LightLeaks => 10,
            FilterType::Film => 11,
            FilterType::Grayscale => 12,
            FilterType::Manga => 13,
            FilterType::Toon => 14,
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key().unwrap_or("off"))
    }
}

impl FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| format!("Unknown filter '{}'", s))
    }
}

/// Which rendering backend the factory builds units for
#[derive(Clone)]
pub enum FilterBackend {
    /// Fixed per-pixel pipeline on the CPU
    Cpu,
    /// Compute kernels on a wgpu device
    Gpu(Arc<GpuContext>),
}

impl FilterBackend {
    pub fn name(&self) -> &'static str {
        match self {
            FilterBackend::Cpu => "cpu",
            FilterBackend::Gpu(_) => "gpu",
        }
    }
}

impl fmt::Debug for FilterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterBackend::Cpu => write!(f, "Cpu"),
            FilterBackend::Gpu(ctx) => write!(f, "Gpu({})", ctx.info().adapter_name),
        }
    }
}

/// Output format fixed by `setup_format_description`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    /// Dimensions of every buffer the unit produces
    pub dimensions: Dimensions,
    /// Input dimensions the unit was set up for
    pub input_dimensions: Dimensions,
}

/// Capability interface shared by every filter variant
pub trait FilterUnit: Send {
    /// One-time initialization for the first frame's dimensions
    ///
    /// `transform = None` samples the input unchanged and `output = None`
    /// (or zero) keeps the input's native size.
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    );

    /// The format fixed at setup, `None` before setup or after cleanup
    fn output_format(&self) -> Option<OutputFormat>;

    /// Filter one buffer
    ///
    /// `None` means no output buffer was available (or the unit is not set up).
    /// Callers treat it as transient.
    fn process(&mut self, input: &PixelBuffer, time: f64) -> Option<PixelBuffer>;

    /// Release buffers and backend resources; safe to call repeatedly
    fn cleanup(&mut self);

    fn switch_input_dimensions(&self) -> bool;

    fn set_switch_input_dimensions(&mut self, switch: bool);
}

/// Format bookkeeping shared by the single-stage units
#[derive(Debug, Clone, Default)]
pub(crate) struct UnitFormat {
    pub switch_input_dimensions: bool,
    pub format: Option<OutputFormat>,
    pub transform: FrameTransform,
}

impl UnitFormat {
    /// Resolve the output format; only a size derived from the input is swapped
    pub fn setup(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) -> OutputFormat {
        let dimensions = match output.filter(|dims| !dims.is_zero()) {
            Some(dims) => dims,
            None if self.switch_input_dimensions => input.swapped(),
            None => input,
        };
        self.transform = transform.unwrap_or_default();
        let format = OutputFormat {
            dimensions,
            input_dimensions: input,
        };
        self.format = Some(format);
        format
    }

    pub fn clear(&mut self) {
        self.format = None;
    }

    /// Dimensions the unit renders at, if set up
    pub fn output_dimensions(&self) -> Option<Dimensions> {
        self.format.map(|format| format.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_round_trip_through_lookup() {
        for ty in FilterType::ALL {
            let key = ty.key().unwrap_or("off");
            assert_eq!(FilterType::from_key(key), Some(ty), "key {}", key);
        }
        assert_eq!(FilterType::from_key("sepia"), None);
    }

    #[test]
    fn test_filter_applied() {
        assert!(!FilterType::Off.filter_applied());
        assert!(!FilterType::Passthrough.filter_applied());
        assert!(FilterType::Toon.filter_applied());
    }

    #[test]
    fn test_kernel_codes_are_unique_per_effect() {
        let mut codes: Vec<u32> = FilterType::ALL
            .iter()
            .filter(|ty| ty.filter_applied())
            .map(|ty| ty.kernel_code())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 14);
    }

    #[test]
    fn test_unit_format_swaps_only_derived_size() {
        let mut format = UnitFormat {
            switch_input_dimensions: true,
            ..Default::default()
        };
        let derived = format.setup(Dimensions::new(1920, 1080), None, None);
        assert_eq!(derived.dimensions, Dimensions::new(1080, 1920));

        let explicit = format.setup(
            Dimensions::new(1920, 1080),
            None,
            Some(Dimensions::new(640, 480)),
        );
        assert_eq!(explicit.dimensions, Dimensions::new(640, 480));
    }
}
