// SPDX-License-Identifier: MPL-2.0

//! Media primitives, decoding and encoding
//!
//! # Buffers
//!
//! Everything the pipeline moves around is a tightly packed RGBA8
//! [`PixelBuffer`]. A [`Frame`] pairs one with its presentation time and a
//! [`BufferPool`] hands out a fixed number of reusable output buffers.
//!
//! # Orientation
//!
//! Sources report their orientation as a [`MediaTransform`]; filter units
//! sample through a [`FrameTransform`] built from it.
//!
//! # Modules
//!
//! - [`decoders`]: still image loading and GStreamer video sources
//! - [`encoders`]: export presets and the GStreamer frame writer

pub mod decoders;
pub mod encoders;
pub mod frame;
pub mod transform;

pub use decoders::{MediaAsset, VideoSource, VideoTrackInfo};
pub use encoders::{ExportPreset, FrameWriter, WriterFactory, WriterSettings};
pub use frame::{BufferPool, Dimensions, Frame, PixelBuffer};
pub use transform::{FrameTransform, MediaTransform, Rotation};
