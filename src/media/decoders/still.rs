// SPDX-License-Identifier: GPL-3.0-only

//! Still image loading

use crate::errors::RenderError;
use crate::media::PixelBuffer;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbaImage};
use std::path::Path;
use tracing::{debug, info};

/// Load an image file as an upright RGBA pixel buffer
///
/// EXIF orientation is applied, so the result never needs a media transform.
/// Supports common image formats: PNG, JPEG, GIF, BMP, WebP
pub fn load_image(path: &Path) -> Result<PixelBuffer, RenderError> {
    info!(path = %path.display(), "Loading image file");

    let decode_err =
        |e: image::ImageError| RenderError::Decode(format!("'{}': {}", path.display(), e));

    let mut decoder = ImageReader::open(path)
        .map_err(|e| RenderError::Decode(format!("'{}': {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| RenderError::Decode(format!("'{}': {}", path.display(), e)))?
        .into_decoder()
        .map_err(decode_err)?;
    let orientation = decoder.orientation().map_err(decode_err)?;

    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);
    debug!(?orientation, "Applied image orientation");

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    info!(width, height, "Image loaded successfully");

    PixelBuffer::from_rgba(width, height, rgba.into_raw())
}

/// Convert an overlay layer (drawing, text) into a pixel buffer
///
/// Returns `None` for an empty image.
pub fn overlay_from_image(image: &RgbaImage) -> Option<PixelBuffer> {
    PixelBuffer::from_image(image)
}
