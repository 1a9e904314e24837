// SPDX-License-Identifier: GPL-3.0-only

//! Identity filter unit

use super::cpu::{render_pixels, transformed_sample};
use super::{FilterUnit, OutputFormat, UnitFormat};
use crate::constants::render::RETAINED_BUFFER_COUNT;
use crate::media::{BufferPool, Dimensions, FrameTransform, PixelBuffer};
use tracing::debug;

/// Copies its input, applying only the sampling transform and output size
///
/// Also serves as the fallback unit whenever a backend cannot build the
/// requested effect.
pub struct PassthroughFilter {
    format: UnitFormat,
    pool: Option<BufferPool>,
    retained_buffers: usize,
}

impl PassthroughFilter {
    pub fn new() -> Self {
        Self::with_retained_buffers(RETAINED_BUFFER_COUNT)
    }

    pub fn with_retained_buffers(retained_buffers: usize) -> Self {
        Self {
            format: UnitFormat::default(),
            pool: None,
            retained_buffers: retained_buffers.max(1),
        }
    }
}

impl Default for PassthroughFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterUnit for PassthroughFilter {
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) {
        let format = self.format.setup(input, transform, output);
        debug!(input = %input, output = %format.dimensions, "Passthrough set up");
        self.pool = Some(BufferPool::new(format.dimensions, self.retained_buffers));
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.format.format
    }

    fn process(&mut self, input: &PixelBuffer, _time: f64) -> Option<PixelBuffer> {
        let dims = self.format.output_dimensions()?;
        let pool = self.pool.as_mut()?;
        let transform = self.format.transform;

        if transform.is_identity() && input.dimensions() == dims {
            return pool.render(|data| data.copy_from_slice(input.data()));
        }
        pool.render(|data| {
            render_pixels(data, dims, |u, v| {
                transformed_sample(input, &transform, u, v)
            })
        })
    }

    fn cleanup(&mut self) {
        self.format.clear();
        self.pool = None;
    }

    fn switch_input_dimensions(&self) -> bool {
        self.format.switch_input_dimensions
    }

    fn set_switch_input_dimensions(&mut self, switch: bool) {
        self.format.switch_input_dimensions = switch;
    }
}
