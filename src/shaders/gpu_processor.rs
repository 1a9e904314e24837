// SPDX-License-Identifier: GPL-3.0-only

//! Shared GPU processor infrastructure
//!
//! - Resource allocation with dimension caching
//! - Blocking buffer readback
//! - Dispatch sizing

use crate::errors::RenderError;
use crate::gpu::wgpu;
use crate::media::Dimensions;

/// Cached resource dimensions - avoids reallocation when dimensions match
#[derive(Default, Clone, Copy, PartialEq, Debug)]
pub struct CachedDimensions {
    pub width: u32,
    pub height: u32,
}

impl CachedDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check if dimensions have changed and need update
    pub fn needs_update(&self, dims: Dimensions) -> bool {
        self.width != dims.width || self.height != dims.height
    }

    pub fn update(&mut self, dims: Dimensions) {
        self.width = dims.width;
        self.height = dims.height;
    }

    /// Check if dimensions are initialized (non-zero)
    pub fn is_initialized(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Map a MAP_READ buffer, copy its contents out and unmap it
pub async fn read_buffer_async(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
) -> Result<Vec<u8>, RenderError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = device.poll(wgpu::PollType::wait_indefinitely());

    receiver
        .await
        .map_err(|_| RenderError::Readback("Failed to receive buffer mapping".to_string()))?
        .map_err(|e| RenderError::Readback(format!("Failed to map buffer: {:?}", e)))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

/// Number of workgroups needed to cover `dimension`
#[inline]
pub fn compute_dispatch_size(dimension: u32, workgroup_size: u32) -> u32 {
    dimension.div_ceil(workgroup_size)
}
