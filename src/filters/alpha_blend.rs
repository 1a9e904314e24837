// SPDX-License-Identifier: GPL-3.0-only

//! Overlay compositing unit

use super::cpu::{render_pixels, transformed_sample};
use super::kernels::{alpha_blend, sample_bilinear};
use super::{FilterUnit, OutputFormat, UnitFormat};
use crate::constants::render::RETAINED_BUFFER_COUNT;
use crate::media::{BufferPool, Dimensions, FrameTransform, PixelBuffer};
use tracing::debug;

/// Composites a fixed overlay image over every input by the overlay's alpha
///
/// The overlay is sampled in normalized coordinates, so it stretches to the
/// output size whatever its own dimensions are.
pub struct AlphaBlendFilter {
    overlay: PixelBuffer,
    format: UnitFormat,
    pool: Option<BufferPool>,
    retained_buffers: usize,
}

impl AlphaBlendFilter {
    pub fn new(overlay: PixelBuffer) -> Self {
        Self::with_retained_buffers(overlay, RETAINED_BUFFER_COUNT)
    }

    pub fn with_retained_buffers(overlay: PixelBuffer, retained_buffers: usize) -> Self {
        Self {
            overlay,
            format: UnitFormat::default(),
            pool: None,
            retained_buffers: retained_buffers.max(1),
        }
    }

    pub fn overlay(&self) -> &PixelBuffer {
        &self.overlay
    }
}

impl FilterUnit for AlphaBlendFilter {
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) {
        let format = self.format.setup(input, transform, output);
        debug!(
            output = %format.dimensions,
            overlay = %self.overlay.dimensions(),
            "Alpha blend set up"
        );
        self.pool = Some(BufferPool::new(format.dimensions, self.retained_buffers));
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.format.format
    }

    fn process(&mut self, input: &PixelBuffer, _time: f64) -> Option<PixelBuffer> {
        let dims = self.format.output_dimensions()?;
        let pool = self.pool.as_mut()?;
        let transform = self.format.transform;
        let overlay = &self.overlay;

        pool.render(|data| {
            render_pixels(data, dims, |u, v| {
                alpha_blend(
                    transformed_sample(input, &transform, u, v),
                    sample_bilinear(overlay, u, v),
                )
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_overlay_replaces_input() {
        let overlay = PixelBuffer::solid(1, 1, [0, 255, 0, 255]);
        let mut filter = AlphaBlendFilter::new(overlay);
        filter.setup_format_description(Dimensions::new(3, 2), None, None);
        let out = filter
            .process(&PixelBuffer::solid(3, 2, [255, 0, 0, 255]), 0.0)
            .unwrap();
        assert_eq!(out.pixel(2, 1), Some([0, 255, 0, 255]));
    }

    #[test]
    fn test_transparent_overlay_keeps_input() {
        let overlay = PixelBuffer::solid(4, 4, [0, 0, 255, 0]);
        let mut filter = AlphaBlendFilter::new(overlay);
        filter.setup_format_description(Dimensions::new(2, 2), None, None);
        let out = filter
            .process(&PixelBuffer::solid(2, 2, [200, 100, 50, 255]), 0.0)
            .unwrap();
        assert_eq!(out.pixel(0, 0), Some([200, 100, 50, 255]));
    }
}
