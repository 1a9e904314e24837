// SPDX-License-Identifier: GPL-3.0-only

//! Filter factory
//!
//! Maps a (filter type, backend) pair to a concrete filter unit and stacks one
//! alpha-blend stage per overlay on top of it.

use super::{
    AlphaBlendFilter, CpuFilter, FilterBackend, FilterType, FilterUnit, GpuFilter, GroupFilter,
    PassthroughFilter,
};
use crate::constants::render::RETAINED_BUFFER_COUNT;
use crate::media::PixelBuffer;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds single-stage units
///
/// The default implementation dispatches on the backend; tests install their
/// own to observe or stub the units a renderer receives.
pub trait UnitBuilder: Send + Sync {
    fn build_filter(&self, filter_type: FilterType) -> Box<dyn FilterUnit>;

    fn build_alpha_blend(&self, overlay: PixelBuffer) -> Box<dyn FilterUnit>;
}

struct BackendBuilder {
    backend: FilterBackend,
    retained_buffers: usize,
}

impl UnitBuilder for BackendBuilder {
    fn build_filter(&self, filter_type: FilterType) -> Box<dyn FilterUnit> {
        match &self.backend {
            FilterBackend::Cpu if !filter_type.filter_applied() => Box::new(
                PassthroughFilter::with_retained_buffers(self.retained_buffers),
            ),
            FilterBackend::Cpu => Box::new(CpuFilter::with_retained_buffers(
                filter_type,
                self.retained_buffers,
            )),
            FilterBackend::Gpu(ctx) => match GpuFilter::with_retained_buffers(
                Arc::clone(ctx),
                filter_type,
                self.retained_buffers,
            ) {
                Ok(unit) => Box::new(unit),
                Err(e) => {
                    warn!(
                        filter = %filter_type,
                        error = %e,
                        "GPU kernel unavailable, using identity"
                    );
                    Box::new(PassthroughFilter::with_retained_buffers(
                        self.retained_buffers,
                    ))
                }
            },
        }
    }

    fn build_alpha_blend(&self, overlay: PixelBuffer) -> Box<dyn FilterUnit> {
        if let FilterBackend::Gpu(ctx) = &self.backend {
            match GpuFilter::alpha_blend_with_retained_buffers(
                Arc::clone(ctx),
                overlay.clone(),
                self.retained_buffers,
            ) {
                Ok(unit) => return Box::new(unit),
                Err(e) => warn!(error = %e, "GPU alpha blend unavailable, blending on CPU"),
            }
        }
        Box::new(AlphaBlendFilter::with_retained_buffers(
            overlay,
            self.retained_buffers,
        ))
    }
}

/// Constructs filter units for one backend
#[derive(Clone)]
pub struct FilterFactory {
    backend: FilterBackend,
    builder: Arc<dyn UnitBuilder>,
}

impl FilterFactory {
    pub fn new(backend: FilterBackend) -> Self {
        Self::with_retained_buffers(backend, RETAINED_BUFFER_COUNT)
    }

    /// Factory whose units keep `retained_buffers` output buffers each
    pub fn with_retained_buffers(backend: FilterBackend, retained_buffers: usize) -> Self {
        let builder = Arc::new(BackendBuilder {
            backend: backend.clone(),
            retained_buffers: retained_buffers.max(1),
        });
        Self { backend, builder }
    }

    /// Factory that delegates unit construction to `builder`
    pub fn with_builder(backend: FilterBackend, builder: Arc<dyn UnitBuilder>) -> Self {
        Self { backend, builder }
    }

    pub fn backend(&self) -> &FilterBackend {
        &self.backend
    }

    /// The unit for `filter_type`; never fails
    pub fn create(&self, filter_type: FilterType) -> Box<dyn FilterUnit> {
        self.builder.build_filter(filter_type)
    }

    /// The unit for `filter_type` followed by one blend stage per overlay
    ///
    /// Returns the bare unit when there are no overlays.
    pub fn create_with_overlays(
        &self,
        filter_type: FilterType,
        overlays: &[PixelBuffer],
    ) -> Box<dyn FilterUnit> {
        let primary = self.create(filter_type);
        if overlays.is_empty() {
            return primary;
        }

        debug!(
            filter = %filter_type,
            backend = self.backend.name(),
            overlays = overlays.len(),
            "Composing filter group"
        );
        let mut stages = Vec::with_capacity(overlays.len() + 1);
        stages.push(primary);
        stages.extend(
            overlays
                .iter()
                .map(|overlay| self.builder.build_alpha_blend(overlay.clone())),
        );
        Box::new(GroupFilter::new(stages))
    }
}

impl fmt::Debug for FilterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterFactory")
            .field("backend", &self.backend)
            .finish()
    }
}
