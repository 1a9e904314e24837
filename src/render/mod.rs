// SPDX-License-Identifier: GPL-3.0-only

//! Frame rendering
//!
//! [`Renderer`] wraps one filter unit built by a
//! [`FilterFactory`](crate::filters::FilterFactory) and serializes every frame
//! through it. [`geometry`] holds the scale-to-fill and orientation math used
//! to set the unit up.

pub mod geometry;
mod renderer;

pub use geometry::{RenderGeometry, aspect_fill_crop, render_geometry};
pub use renderer::{Renderer, RendererDelegate};
