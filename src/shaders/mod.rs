// SPDX-License-Identifier: GPL-3.0-only
//! Shared shader definitions and GPU filter pipeline
//!
//! `filters.wgsl` is the single source of the effect kernels on the GPU; the
//! CPU rendition lives in `crate::filters::kernels`.

mod gpu_filter;
mod gpu_processor;

pub use gpu_filter::{FilterKernels, FilterParams, filter_shader_source};
pub use gpu_processor::{CachedDimensions, compute_dispatch_size, read_buffer_async};

/// Shared filter functions (WGSL)
/// Contains: luminance(), hash(), warp(), shade()
pub const FILTER_FUNCTIONS: &str = include_str!("filters.wgsl");
