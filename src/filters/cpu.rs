// SPDX-License-Identifier: GPL-3.0-only

//! CPU filter unit
//!
//! Renders the effect kernels from [`super::kernels`] pixel by pixel into a
//! pooled output buffer. Used when no GPU is available and by the tests.

use super::kernels::{self, sample_bilinear, to_rgba8};
use super::{FilterType, FilterUnit, OutputFormat, UnitFormat};
use crate::constants::render::{FRAME_LOG_INTERVAL, RETAINED_BUFFER_COUNT};
use crate::media::{BufferPool, Dimensions, FrameTransform, PixelBuffer};
use tracing::{debug, trace};

/// Fill `data` (RGBA8, `dims`) by evaluating `shade` at every pixel center
pub(crate) fn render_pixels<F>(data: &mut [u8], dims: Dimensions, shade: F)
where
    F: Fn(f32, f32) -> [f32; 4],
{
    let w = dims.width as usize;
    let h = dims.height as usize;
    for y in 0..h {
        let v = (y as f32 + 0.5) / h as f32;
        let row = &mut data[y * w * 4..(y + 1) * w * 4];
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let u = (x as f32 + 0.5) / w as f32;
            px.copy_from_slice(&to_rgba8(shade(u, v)));
        }
    }
}

/// Sample `input` through `transform` at normalized output coordinates
#[inline]
pub(crate) fn transformed_sample(
    input: &PixelBuffer,
    transform: &FrameTransform,
    u: f32,
    v: f32,
) -> [f32; 4] {
    let (su, sv) = transform.apply(u.clamp(0.0, 1.0), v.clamp(0.0, 1.0));
    sample_bilinear(input, su, sv)
}

/// Effect kernel unit on the CPU
pub struct CpuFilter {
    filter_type: FilterType,
    format: UnitFormat,
    pool: Option<BufferPool>,
    retained_buffers: usize,
    frames_processed: u64,
}

impl CpuFilter {
    pub fn new(filter_type: FilterType) -> Self {
        Self::with_retained_buffers(filter_type, RETAINED_BUFFER_COUNT)
    }

    pub fn with_retained_buffers(filter_type: FilterType, retained_buffers: usize) -> Self {
        Self {
            filter_type,
            format: UnitFormat::default(),
            pool: None,
            retained_buffers: retained_buffers.max(1),
            frames_processed: 0,
        }
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }
}

impl FilterUnit for CpuFilter {
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) {
        let format = self.format.setup(input, transform, output);
        debug!(
            filter = %self.filter_type,
            input = %input,
            output = %format.dimensions,
            "CPU filter set up"
        );
        self.pool = Some(BufferPool::new(format.dimensions, self.retained_buffers));
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.format.format
    }

    fn process(&mut self, input: &PixelBuffer, time: f64) -> Option<PixelBuffer> {
        let dims = self.format.output_dimensions()?;
        let pool = self.pool.as_mut()?;
        let code = self.filter_type.kernel_code();
        let transform = self.format.transform;
        let aspect = dims.aspect_ratio() as f32;
        let time = time as f32;

        let sample = |u: f32, v: f32| transformed_sample(input, &transform, u, v);
        let result = pool.render(|data| {
            render_pixels(data, dims, |u, v| {
                kernels::shade(code, &sample, u, v, time, aspect)
            })
        });

        self.frames_processed += 1;
        if self.frames_processed % FRAME_LOG_INTERVAL == 0 {
            trace!(
                filter = %self.filter_type,
                frames = self.frames_processed,
                "CPU filter progress"
            );
        }
        result
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
