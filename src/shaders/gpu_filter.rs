// SPDX-License-Identifier: GPL-3.0-only
//! Compiled filter compute pipeline
//!
//! One [`FilterKernels`] per GPU context holds the shader module, pipeline and
//! sampler. Filter units own their textures and buffers and only borrow the
//! pipeline when they dispatch.

use crate::errors::RenderError;
use crate::gpu::wgpu;
use crate::media::FrameTransform;
use tracing::info;

/// Filter parameters uniform (matches `FilterParams` in filter_compute.wgsl)
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FilterParams {
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub filter_mode: u32,
    pub has_overlay: u32,
    pub time: f32,
    pub _padding: u32,
    pub transform_abcd: [f32; 4],
    pub transform_t: [f32; 4],
}

impl FilterParams {
    pub fn set_transform(&mut self, transform: &FrameTransform) {
        let [abcd, t] = transform.to_uniform();
        self.transform_abcd = abcd;
        self.transform_t = t;
    }
}

/// Full shader source: shared kernels followed by the compute entry point
pub fn filter_shader_source() -> String {
    format!(
        "{}\n{}",
        super::FILTER_FUNCTIONS,
        include_str!("filter_compute.wgsl")
    )
}

/// Filter compute pipeline shared by all GPU filter units of one device
pub struct FilterKernels {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl FilterKernels {
    /// Compile the filter shader and build the pipeline
    ///
    /// Validation errors are captured in an error scope and returned instead
    /// of reaching the device's uncaptured error handler.
    pub fn new(device: &wgpu::Device) -> Result<Self, RenderError> {
        info!("Compiling GPU filter kernels");

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("filter_compute_shader"),
            source: wgpu::ShaderSource::Wgsl(filter_shader_source().into()),
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("filter_bind_group_layout"),
            entries: &[
                // Input texture
                texture_entry(0),
                // Output storage buffer
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Uniform buffer
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Overlay texture (1x1 transparent when unused)
                texture_entry(4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("filter_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("filter_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("filter_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::PipelineCreation(error.to_string()));
        }

        Ok(Self {
            pipeline,
            bind_group_layout,
            sampler,
        })
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}
