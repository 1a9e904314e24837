// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization for the compute filter backend.
//!
//! A [`GpuContext`] owns one wgpu device and queue plus the lazily compiled
//! filter kernels. Every GPU filter unit built by the factory shares it.

use crate::errors::RenderError;
use crate::shaders::FilterKernels;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Re-export wgpu under its usual name for the compute pipelines
pub use wgpu_compute as wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, ...)
    pub backend: wgpu::Backend,
}

/// Device, queue and compiled kernels shared by all GPU filter units
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
    kernels: OnceLock<Result<Arc<FilterKernels>, RenderError>>,
}

impl GpuContext {
    /// Create a context on the best available adapter
    pub async fn new(label: &str) -> Result<Self, RenderError> {
        let (device, queue, info) = create_compute_device(label).await?;
        Ok(Self {
            device,
            queue,
            info,
            kernels: OnceLock::new(),
        })
    }

    /// Process-wide context, created on first use
    pub fn shared() -> Result<Arc<GpuContext>, RenderError> {
        static SHARED: OnceLock<Result<Arc<GpuContext>, RenderError>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                pollster::block_on(GpuContext::new("snapreel_filters")).map(Arc::new)
            })
            .clone()
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    /// Filter kernels, compiled once per context
    pub fn kernels(&self) -> Result<Arc<FilterKernels>, RenderError> {
        self.kernels
            .get_or_init(|| {
                let kernels = FilterKernels::new(&self.device).map(Arc::new);
                if let Err(e) = &kernels {
                    warn!(error = %e, "Failed to build GPU filter kernels");
                }
                kernels
            })
            .clone()
    }
}

/// Create a wgpu device and queue for compute work.
///
/// # Arguments
///
/// * `label` - A label for the device (for debugging)
pub async fn create_compute_device(
    label: &str,
) -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>, GpuDeviceInfo), RenderError> {
    info!(label = label, "Creating GPU device for compute");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::VULKAN | wgpu::Backends::METAL,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| RenderError::NoGpuDevice(format!("No suitable GPU adapter: {}", e)))?;

    let adapter_info = adapter.get_info();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected for compute"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| RenderError::NoGpuDevice(format!("Failed to create GPU device: {}", e)))?;

    debug!(label = label, "GPU device ready");

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
    };

    Ok((Arc::new(device), Arc::new(queue), info))
}
