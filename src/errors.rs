// SPDX-License-Identifier: MPL-2.0

//! Error types for the rendering and export pipeline
//!
//! Filter units never return errors from `process`: running out of pooled
//! buffers is reported as `None` and surfaced through the renderer's
//! "ran out of buffers" signal. Everything here is a setup or export failure
//! that is handed back to the caller.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Crate-level error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Rendering/filter errors
    Render(RenderError),
    /// Composition request errors
    Compositor(CompositorError),
    /// Export errors
    Export(ExportError),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Other(String),
}

/// Filter backend and pixel buffer errors
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// No usable GPU adapter or device
    NoGpuDevice(String),
    /// Compute pipeline or shader creation failed
    PipelineCreation(String),
    /// Pixel data does not match the declared geometry
    InvalidBuffer {
        width: u32,
        height: u32,
        len: usize,
    },
    /// Reading filtered pixels back from the GPU failed
    Readback(String),
    /// Image decoding failed
    Decode(String),
}

/// Errors a single composition request can finish with
#[derive(Debug, Clone, PartialEq)]
pub enum CompositorError {
    /// The request names no source track
    MissingTrack,
    /// The source track produced no frame at the requested time
    MissingSourceFrame { track_id: u32, time_secs: f64 },
    /// The source frame could not be wrapped with timing information
    MissingSampleBuffer { time_secs: f64 },
    /// The renderer had no free output buffer for this request
    RanOutOfBuffers,
    /// The renderer returned without producing or rejecting a frame
    NoRenderedFrame { time_secs: f64 },
    /// The request was cancelled before it completed
    Cancelled,
}

/// Export job errors
#[derive(Debug, Clone, PartialEq)]
pub enum ExportError {
    /// The source image could not be converted into a pixel buffer
    NoPixelBuffer,
    /// The pixel buffer could not be wrapped into a timed frame
    NoSampleBuffer,
    /// Rendering produced no output image
    NoProcessedImage,
    /// No encoder preset is available for the source asset
    NoPresets,
    /// The source asset has no video track
    NoVideoTrack,
    /// The export session has no custom compositor attached
    NoCompositor,
    /// The export session failed
    Export(String),
    /// The export session ended without completing
    Incomplete,
    /// Output file handling failed
    Io(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Render(e) => write!(f, "Render error: {}", e),
            AppError::Compositor(e) => write!(f, "Compositor error: {}", e),
            AppError::Export(e) => write!(f, "Export error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NoGpuDevice(msg) => write!(f, "No GPU device: {}", msg),
            RenderError::PipelineCreation(msg) => write!(f, "Pipeline creation failed: {}", msg),
            RenderError::InvalidBuffer { width, height, len } => write!(
                f,
                "Buffer of {} bytes does not hold {}x{} RGBA pixels",
                len, width, height
            ),
            RenderError::Readback(msg) => write!(f, "GPU readback failed: {}", msg),
            RenderError::Decode(msg) => write!(f, "Decode failed: {}", msg),
        }
    }
}

impl fmt::Display for CompositorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositorError::MissingTrack => {
                write!(f, "Composition request does not reference a source track")
            }
            CompositorError::MissingSourceFrame {
                track_id,
                time_secs,
            } => write!(
                f,
                "No source frame on track {} at {:.3}s",
                track_id, time_secs
            ),
            CompositorError::MissingSampleBuffer { time_secs } => {
                write!(f, "Could not create a timed frame at {:.3}s", time_secs)
            }
            CompositorError::RanOutOfBuffers => write!(f, "Renderer ran out of buffers"),
            CompositorError::NoRenderedFrame { time_secs } => {
                write!(f, "Renderer produced no frame at {:.3}s", time_secs)
            }
            CompositorError::Cancelled => write!(f, "Composition request cancelled"),
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::NoPixelBuffer => write!(f, "Could not create a pixel buffer"),
            ExportError::NoSampleBuffer => write!(f, "Could not create a sample buffer"),
            ExportError::NoProcessedImage => write!(f, "Rendering produced no image"),
            ExportError::NoPresets => write!(f, "No export presets available"),
            ExportError::NoVideoTrack => write!(f, "Source has no video track"),
            ExportError::NoCompositor => write!(f, "Export session has no compositor"),
            ExportError::Export(msg) => write!(f, "Export failed: {}", msg),
            ExportError::Incomplete => write!(f, "Export did not complete"),
            ExportError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for RenderError {}
impl std::error::Error for CompositorError {}
impl std::error::Error for ExportError {}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::Render(err)
    }
}

impl From<CompositorError> for AppError {
    fn from(err: CompositorError) -> Self {
        AppError::Compositor(err)
    }
}

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        AppError::Export(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err.to_string())
    }
}

impl From<CompositorError> for ExportError {
    fn from(err: CompositorError) -> Self {
        match err {
            CompositorError::Cancelled => ExportError::Incomplete,
            other => ExportError::Export(other.to_string()),
        }
    }
}
