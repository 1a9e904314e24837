// SPDX-License-Identifier: GPL-3.0-only

//! Output geometry for a renderer's filter unit
//!
//! Turns the first frame's stored size, the source orientation and an
//! optional scale-to-fill target into the `(transform, output)` pair handed
//! to `setup_format_description`.

use crate::media::{Dimensions, FrameTransform, MediaTransform};

/// Arguments for `FilterUnit::setup_format_description`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderGeometry {
    pub transform: Option<FrameTransform>,
    pub output: Option<Dimensions>,
}

impl RenderGeometry {
    /// Sample the input unchanged at its native size
    pub const NATIVE: RenderGeometry = RenderGeometry {
        transform: None,
        output: None,
    };
}

/// Upright size of a stored frame
///
/// Either a rotated orientation or the explicit switch flag swaps the edges;
/// both together still swap once.
pub fn upright_dimensions(
    input: Dimensions,
    media: MediaTransform,
    switch_input_dimensions: bool,
) -> Dimensions {
    if media.switches_dimensions() || switch_input_dimensions {
        input.swapped()
    } else {
        input
    }
}

/// Largest centered rectangle of `source` with the aspect ratio of `target`
///
/// Returns the crop size in pixels and the normalized crop rectangle
/// `(x, y, w, h)`.
pub fn aspect_fill_crop(source: Dimensions, target: Dimensions) -> (Dimensions, [f32; 4]) {
    if source.is_zero() || target.is_zero() {
        return (source, [0.0, 0.0, 1.0, 1.0]);
    }

    let src_w = source.width as f64;
    let src_h = source.height as f64;
    let target_aspect = target.width as f64 / target.height as f64;

    if src_w / src_h > target_aspect {
        // Source is wider: keep the height, trim the sides
        let width = (src_h * target_aspect).round().clamp(1.0, src_w);
        let frac = (width / src_w) as f32;
        (
            Dimensions::new(width as u32, source.height),
            [(1.0 - frac) / 2.0, 0.0, frac, 1.0],
        )
    } else {
        // Source is taller (or equal): keep the width, trim top and bottom
        let height = (src_w / target_aspect).round().clamp(1.0, src_h);
        let frac = (height / src_h) as f32;
        (
            Dimensions::new(source.width, height as u32),
            [0.0, (1.0 - frac) / 2.0, 1.0, frac],
        )
    }
}

/// Geometry for a stored frame of size `input`
///
/// Without orientation or fill target the unit is left to derive its own
/// size, which keeps its switch flag meaningful.
pub fn render_geometry(
    input: Dimensions,
    media: MediaTransform,
    switch_input_dimensions: bool,
    scale_to_fill: Option<Dimensions>,
) -> RenderGeometry {
    let fill = scale_to_fill.filter(|dims| !dims.is_zero());
    let upright = upright_dimensions(input, media, switch_input_dimensions);

    match fill {
        None if media.is_identity() => RenderGeometry::NATIVE,
        None => RenderGeometry {
            transform: Some(media.to_frame_transform()),
            output: Some(upright),
        },
        Some(target) => {
            let (output, [x, y, w, h]) = aspect_fill_crop(upright, target);
            let transform =
                FrameTransform::crop(x, y, w, h).followed_by(media.to_frame_transform());
            RenderGeometry {
                transform: Some(transform),
                output: Some(output),
            }
        }
    }
}
