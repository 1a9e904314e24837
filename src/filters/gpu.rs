// SPDX-License-Identifier: GPL-3.0-only
//! GPU filter unit
//!
//! Runs the effect kernels (or the alpha-blend composite) as a wgpu compute
//! pass. Textures and buffers are allocated at setup for the unit's fixed
//! output size; the input texture is reallocated only when a frame arrives
//! with different dimensions.

use super::kernels::KERNEL_ALPHA_BLEND;
use super::{FilterType, FilterUnit, OutputFormat, UnitFormat};
use crate::constants::render::{RETAINED_BUFFER_COUNT, WORKGROUP_SIZE};
use crate::errors::RenderError;
use crate::gpu::{GpuContext, wgpu};
use crate::media::{BufferPool, Dimensions, FrameTransform, PixelBuffer};
use crate::shaders::{
    CachedDimensions, FilterKernels, FilterParams, compute_dispatch_size, read_buffer_async,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-unit device resources sized for the output format
struct GpuResources {
    input_texture: Option<wgpu::Texture>,
    overlay_texture: wgpu::Texture,
    output_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
}

/// Effect or overlay unit backed by a compute kernel
pub struct GpuFilter {
    ctx: Arc<GpuContext>,
    kernels: Arc<FilterKernels>,
    label: &'static str,
    mode: u32,
    overlay: Option<PixelBuffer>,
    retained_buffers: usize,
    format: UnitFormat,
    pool: Option<BufferPool>,
    resources: Option<GpuResources>,
    input_dims: CachedDimensions,
}

impl GpuFilter {
    /// Unit running the kernel for `filter_type`
    pub fn new(ctx: Arc<GpuContext>, filter_type: FilterType) -> Result<Self, RenderError> {
        Self::with_retained_buffers(ctx, filter_type, RETAINED_BUFFER_COUNT)
    }

    /// Effect unit keeping at most `retained_buffers` outputs alive
    pub fn with_retained_buffers(
        ctx: Arc<GpuContext>,
        filter_type: FilterType,
        retained_buffers: usize,
    ) -> Result<Self, RenderError> {
        let kernels = ctx.kernels()?;
        Ok(Self::build(
            ctx,
            kernels,
            filter_type.key().unwrap_or("off"),
            filter_type.kernel_code(),
            None,
            retained_buffers,
        ))
    }

    /// Unit compositing `overlay` over its input
    pub fn alpha_blend(ctx: Arc<GpuContext>, overlay: PixelBuffer) -> Result<Self, RenderError> {
        Self::alpha_blend_with_retained_buffers(ctx, overlay, RETAINED_BUFFER_COUNT)
    }

    pub fn alpha_blend_with_retained_buffers(
        ctx: Arc<GpuContext>,
        overlay: PixelBuffer,
        retained_buffers: usize,
    ) -> Result<Self, RenderError> {
        let kernels = ctx.kernels()?;
        Ok(Self::build(
            ctx,
            kernels,
            "alpha_blend",
            KERNEL_ALPHA_BLEND,
            Some(overlay),
            retained_buffers,
        ))
    }

    fn build(
        ctx: Arc<GpuContext>,
        kernels: Arc<FilterKernels>,
        label: &'static str,
        mode: u32,
        overlay: Option<PixelBuffer>,
        retained_buffers: usize,
    ) -> Self {
        Self {
            ctx,
            kernels,
            label,
            mode,
            overlay,
            retained_buffers: retained_buffers.max(1),
            format: UnitFormat::default(),
            pool: None,
            resources: None,
            input_dims: CachedDimensions::default(),
        }
    }

    fn create_texture(&self, dims: Dimensions, label: &str) -> wgpu::Texture {
        self.ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: dims.width,
                height: dims.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    fn upload(&self, texture: &wgpu::Texture, buffer: &PixelBuffer) {
        self.ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            buffer.data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(buffer.width() * 4),
                rows_per_image: Some(buffer.height()),
            },
            wgpu::Extent3d {
                width: buffer.width(),
                height: buffer.height(),
                depth_or_array_layers: 1,
            },
        );
    }

    fn allocate(&mut self, output: Dimensions) {
        debug!(
            kernel = self.label,
            width = output.width,
            height = output.height,
            "Allocating GPU filter resources"
        );
        let device = self.ctx.device();
        let buffer_size = output.rgba_len() as u64;

        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("filter_output_buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("filter_staging_buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("filter_uniform_buffer"),
            size: std::mem::size_of::<FilterParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let overlay = self
            .overlay
            .clone()
            .unwrap_or_else(|| PixelBuffer::solid(1, 1, [0, 0, 0, 0]));
        let overlay_texture = self.create_texture(overlay.dimensions(), "filter_overlay_texture");
        self.upload(&overlay_texture, &overlay);

        self.resources = Some(GpuResources {
            input_texture: None,
            overlay_texture,
            output_buffer,
            staging_buffer,
            uniform_buffer,
        });
        self.input_dims.reset();
    }

    fn ensure_input_texture(&mut self, dims: Dimensions) {
        if !self.input_dims.needs_update(dims) {
            return;
        }
        let texture = self.create_texture(dims, "filter_input_texture");
        if let Some(resources) = self.resources.as_mut() {
            resources.input_texture = Some(texture);
            self.input_dims.update(dims);
        }
    }

    /// Upload, dispatch and read back one frame
    fn run(&mut self, input: &PixelBuffer, time: f64) -> Result<Vec<u8>, RenderError> {
        let output = self
            .format
            .output_dimensions()
            .ok_or_else(|| RenderError::PipelineCreation("Filter not set up".to_string()))?;
        self.ensure_input_texture(input.dimensions());

        let resources = self
            .resources
            .as_ref()
            .ok_or_else(|| RenderError::PipelineCreation("Resources not allocated".to_string()))?;
        let input_texture = resources
            .input_texture
            .as_ref()
            .ok_or_else(|| RenderError::PipelineCreation("Input texture not allocated".to_string()))?;

        self.upload(input_texture, input);

        let mut params = FilterParams {
            input_width: input.width(),
            input_height: input.height(),
            output_width: output.width,
            output_height: output.height,
            filter_mode: self.mode,
            has_overlay: self.overlay.is_some() as u32,
            time: time as f32,
            _padding: 0,
            transform_abcd: [0.0; 4],
            transform_t: [0.0; 4],
        };
        params.set_transform(&self.format.transform);

        let device = self.ctx.device();
        let queue = self.ctx.queue();
        queue.write_buffer(&resources.uniform_buffer, 0, bytemuck::bytes_of(&params));

        let input_view = input_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let overlay_view = resources
            .overlay_texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filter_bind_group"),
            layout: self.kernels.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(self.kernels.sampler()),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&overlay_view),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("filter_encoder"),
        });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("filter_compute_pass"),
                timestamp_writes: None,
            });

            compute_pass.set_pipeline(self.kernels.pipeline());
            compute_pass.set_bind_group(0, Some(&bind_group), &[]);
            compute_pass.dispatch_workgroups(
                compute_dispatch_size(output.width, WORKGROUP_SIZE),
                compute_dispatch_size(output.height, WORKGROUP_SIZE),
                1,
            );
        }

        encoder.copy_buffer_to_buffer(
            &resources.output_buffer,
            0,
            &resources.staging_buffer,
            0,
            output.rgba_len() as u64,
        );
        queue.submit(std::iter::once(encoder.finish()));

        pollster::block_on(read_buffer_async(device, &resources.staging_buffer))
    }
}

impl FilterUnit for GpuFilter {
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) {
        let format = self.format.setup(input, transform, output);
        debug!(
            kernel = self.label,
            input = %input,
            output = %format.dimensions,
            "GPU filter set up"
        );
        self.allocate(format.dimensions);
        self.ensure_input_texture(input);
        self.pool = Some(BufferPool::new(format.dimensions, self.retained_buffers));
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.format.format
    }

    fn process(&mut self, input: &PixelBuffer, time: f64) -> Option<PixelBuffer> {
        self.format.format?;
        // Check for a free slot before doing any GPU work
        let pool = self.pool.as_ref()?;
        if pool.in_flight() >= pool.capacity() {
            return None;
        }

        let pixels = match self.run(input, time) {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!(kernel = self.label, error = %e, "GPU filter pass failed");
                return None;
            }
        };

        self.pool.as_mut()?.render(|data| {
            let len = data.len().min(pixels.len());
            data[..len].copy_from_slice(&pixels[..len]);
        })
    }

    fn cleanup(&mut self) {
        self.format.clear();
        self.pool = None;
        self.resources = None;
        self.input_dims.reset();
    }

    fn switch_input_dimensions(&self) -> bool {
        self.format.switch_input_dimensions
    }

    fn set_switch_input_dimensions(&mut self, switch: bool) {
        self.format.switch_input_dimensions = switch;
    }
}
