// SPDX-License-Identifier: GPL-3.0-only

//! Pixel buffers, timed frames and output buffer pools
//!
//! All buffers are tightly packed RGBA8. Storage is shared through
//! `Arc<[u8]>` so handing a buffer to several observers never copies pixels.

use crate::errors::RenderError;
use image::RgbaImage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Width and height of a buffer in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const ZERO: Dimensions = Dimensions {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either edge is zero ("unspecified" when used as a target size)
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn swapped(&self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    /// Byte length of an RGBA buffer with these dimensions
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An RGBA8 image buffer with shared storage
#[derive(Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl PixelBuffer {
    /// Wrap packed RGBA data, validating its length
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, RenderError> {
        Self::from_shared(width, height, Arc::from(data))
    }

    /// Wrap already shared RGBA data, validating its length
    pub fn from_shared(width: u32, height: u32, data: Arc<[u8]>) -> Result<Self, RenderError> {
        if data.len() != Dimensions::new(width, height).rgba_len() {
            return Err(RenderError::InvalidBuffer {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A buffer filled with one color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(Dimensions::new(width, height).rgba_len())
            .collect();
        Self {
            width,
            height,
            data: Arc::from(data),
        }
    }

    /// Convert a decoded image; `None` for an empty image
    pub fn from_image(image: &RgbaImage) -> Option<Self> {
        if image.width() == 0 || image.height() == 0 {
            return None;
        }
        Self::from_rgba(image.width(), image.height(), image.as_raw().clone()).ok()
    }

    /// Copy the pixels into an `image` buffer
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.to_vec())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    /// RGBA value at a pixel, `None` outside the buffer
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.stride() + x as usize * 4;
        Some([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }

    /// True if both buffers share the same storage
    pub fn shares_storage_with(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A pixel buffer paired with its presentation time
#[derive(Debug, Clone)]
pub struct Frame {
    pub buffer: PixelBuffer,
    pub presentation_time: Duration,
}

impl Frame {
    pub fn new(buffer: PixelBuffer, presentation_time: Duration) -> Self {
        Self {
            buffer,
            presentation_time,
        }
    }

    /// Wrap a buffer at a time given in seconds
    ///
    /// Returns `None` for negative or non-finite times.
    pub fn at_seconds(buffer: PixelBuffer, seconds: f64) -> Option<Self> {
        let presentation_time = Duration::try_from_secs_f64(seconds).ok()?;
        Some(Self::new(buffer, presentation_time))
    }

    pub fn dimensions(&self) -> Dimensions {
        self.buffer.dimensions()
    }
}

/// Fixed-capacity pool of output buffers
///
/// A slot is free again once every `PixelBuffer` handed out from it has been
/// dropped. When all slots are in use `render` returns `None`, which filter
/// units report as "ran out of buffers".
pub struct BufferPool {
    dimensions: Dimensions,
    capacity: usize,
    slots: Vec<Arc<[u8]>>,
}

impl BufferPool {
    pub fn new(dimensions: Dimensions, capacity: usize) -> Self {
        debug!(%dimensions, capacity, "Creating output buffer pool");
        Self {
            dimensions,
            capacity,
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently referenced outside the pool
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }

    /// Fill a free slot and hand it out as a pixel buffer
    pub fn render<F>(&mut self, fill: F) -> Option<PixelBuffer>
    where
        F: FnOnce(&mut [u8]),
    {
        let len = self.dimensions.rgba_len();
        let index = self
            .slots
            .iter()
            .position(|slot| Arc::strong_count(slot) == 1 && Arc::weak_count(slot) == 0)
            .or_else(|| {
                (self.slots.len() < self.capacity).then(|| {
                    self.slots.push(Arc::from(vec![0u8; len]));
                    self.slots.len() - 1
                })
            })?;

        let data = Arc::get_mut(&mut self.slots[index])?;
        fill(data);

        Some(PixelBuffer {
            width: self.dimensions.width,
            height: self.dimensions.height,
            data: Arc::clone(&self.slots[index]),
        })
    }

    /// Release every slot; buffers still held elsewhere stay valid
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
